//! Tunables for every subsystem, deserializable from TOML/JSON.
//!
//! All sections carry `#[serde(default)]` so a config file only needs to name
//! the values it overrides.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::VIVACITY_MAX;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A value is outside its allowed range.
    OutOfRange { field: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::OutOfRange { field, reason } => {
                write!(f, "invalid config value for {field}: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

fn out_of_range(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::OutOfRange {
        field,
        reason: reason.into(),
    }
}

/// Capacity and hysteresis policy for the spatial field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    /// Length of every node coordinate vector.
    pub dimension: usize,
    /// Absolute maximum node count.
    pub hard_cap: usize,
    /// Soft threshold: reaching it starts a purge.
    pub trigger_threshold: usize,
    /// The purge flag clears once size falls to or below this.
    pub release_threshold: usize,
    /// Fraction of `hard_cap` kept by a purge (before the release cap applies).
    pub keep_ratio: f64,
    /// Survivors are preferred at or above this vivacity.
    pub vivacity_floor: f64,
    /// Fields larger than this are sampled during neighbor queries.
    pub dense_scan_limit: usize,
    /// Sample size for neighbor queries over dense fields.
    pub dense_sample_size: usize,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            dimension: 18,
            hard_cap: 1000,
            trigger_threshold: 800,
            release_threshold: 650,
            keep_ratio: 0.6,
            vivacity_floor: 1.5,
            dense_scan_limit: 500,
            dense_sample_size: 100,
        }
    }
}

impl FieldConfig {
    /// Gap between trigger and release thresholds.
    pub fn hysteresis_band(&self) -> usize {
        self.trigger_threshold.saturating_sub(self.release_threshold)
    }

    /// Largest field a purge may leave behind.
    pub fn survivor_cap(&self) -> usize {
        self.hard_cap
            .min(self.release_threshold.saturating_sub(1))
            .max(1)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dimension < 2 {
            return Err(out_of_range("field.dimension", "must be >= 2"));
        }
        if self.release_threshold == 0 {
            return Err(out_of_range("field.release_threshold", "must be > 0"));
        }
        if self.release_threshold >= self.trigger_threshold {
            return Err(out_of_range(
                "field.release_threshold",
                format!(
                    "must be below trigger_threshold ({} >= {})",
                    self.release_threshold, self.trigger_threshold
                ),
            ));
        }
        if self.trigger_threshold > self.hard_cap {
            return Err(out_of_range(
                "field.trigger_threshold",
                format!(
                    "must not exceed hard_cap ({} > {})",
                    self.trigger_threshold, self.hard_cap
                ),
            ));
        }
        if !(self.keep_ratio > 0.0 && self.keep_ratio <= 1.0) {
            return Err(out_of_range("field.keep_ratio", "must be in (0, 1]"));
        }
        if self.dense_sample_size == 0 {
            return Err(out_of_range("field.dense_sample_size", "must be > 0"));
        }
        Ok(())
    }
}

/// Thresholds used by the mode arbiter and its signal sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    /// Screen size used to derive quadrants.
    pub screen_width: f64,
    pub screen_height: f64,
    /// Rolling window of quadrant observations kept by the habit tracker.
    pub habit_window: usize,
    /// Bilateral symmetry score that fires the necessity check.
    pub symmetry_threshold: f64,
    /// Necessity is only evaluated when density exceeds this.
    pub density_threshold: usize,
    /// Fraction of the hard cap that forces an emergency jump.
    pub emergency_ratio: f64,
    /// Habit posterior above which GUARD is promoted to HABIT.
    pub habit_posterior_threshold: f64,
    /// Jump posterior above which any mode is promoted to INTUITION-JUMP.
    pub jump_posterior_threshold: f64,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            screen_width: 1920.0,
            screen_height: 1080.0,
            habit_window: 5,
            symmetry_threshold: 0.9,
            density_threshold: 50,
            emergency_ratio: 0.95,
            habit_posterior_threshold: 0.55,
            jump_posterior_threshold: 0.45,
        }
    }
}

impl ArbiterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.screen_width > 0.0 && self.screen_height > 0.0) {
            return Err(out_of_range("arbiter.screen_*", "screen size must be positive"));
        }
        if self.habit_window < 4 {
            return Err(out_of_range(
                "arbiter.habit_window",
                "must hold a 3-quadrant context plus its successor (>= 4)",
            ));
        }
        if !(0.0..=1.0).contains(&self.symmetry_threshold) {
            return Err(out_of_range("arbiter.symmetry_threshold", "must be in [0, 1]"));
        }
        if !(self.emergency_ratio > 0.0 && self.emergency_ratio <= 1.0) {
            return Err(out_of_range("arbiter.emergency_ratio", "must be in (0, 1]"));
        }
        Ok(())
    }
}

/// Evidence tracker smoothing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    /// Evidence weight halves every `half_life_secs`.
    pub half_life_secs: f64,
    /// Capacity of the recent-outcome window.
    pub outcome_window: usize,
    /// Blend weight of the long-run success rate (recent window gets the rest).
    pub long_run_weight: f64,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            half_life_secs: 24.0 * 3600.0,
            outcome_window: 100,
            long_run_weight: 0.7,
        }
    }
}

impl EvidenceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.half_life_secs > 0.0) {
            return Err(out_of_range("evidence.half_life_secs", "must be > 0"));
        }
        if self.outcome_window == 0 {
            return Err(out_of_range("evidence.outcome_window", "must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.long_run_weight) {
            return Err(out_of_range("evidence.long_run_weight", "must be in [0, 1]"));
        }
        Ok(())
    }
}

/// Idle-time forgetting cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    pub factor: f64,
    pub floor: f64,
    pub interval_ms: u64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            factor: 0.99,
            floor: 0.5,
            interval_ms: 1000,
        }
    }
}

impl DecayConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.factor > 0.0 && self.factor <= 1.0) {
            return Err(out_of_range("decay.factor", "must be in (0, 1]"));
        }
        if !(0.0..=VIVACITY_MAX).contains(&self.floor) {
            return Err(out_of_range(
                "decay.floor",
                format!("must be in [0, {VIVACITY_MAX}]"),
            ));
        }
        if self.interval_ms == 0 {
            return Err(out_of_range("decay.interval_ms", "must be > 0"));
        }
        Ok(())
    }
}

/// Complete controller configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbConfig {
    pub field: FieldConfig,
    pub arbiter: ArbiterConfig,
    pub evidence: EvidenceConfig,
    pub decay: DecayConfig,
}

impl OrbConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.field.validate()?;
        self.arbiter.validate()?;
        self.evidence.validate()?;
        self.decay.validate()
    }
}
