//! Discrete mode arbitration.
//!
//! Rules are applied in a fixed order and later rules may override earlier
//! ones:
//!
//! 1. A fired necessity check selects INTUITION-JUMP and stops.
//! 2. A habit prediction selects HABIT (confidence > 0.35) or GUARD-HABIT;
//!    no prediction leaves GUARD.
//! 3. Density pressure: at the purge trigger GUARD becomes GUARD-HABIT; at
//!    `emergency_ratio * hard_cap` anything becomes INTUITION-JUMP.
//! 4. Evidence: a strong habit posterior promotes GUARD / GUARD-HABIT to
//!    HABIT; a strong jump posterior promotes anything to INTUITION-JUMP.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{ArbiterConfig, FieldConfig};
use crate::constants::{BASE_CONFIDENCE, HABIT_ACTIVE_CONFIDENCE, MAX_CONFIDENCE};
use crate::habit::Prediction;
use crate::necessity::NecessityResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Mode {
    #[serde(rename = "GUARD")]
    Guard,
    #[serde(rename = "GUARD-HABIT")]
    GuardHabit,
    #[serde(rename = "HABIT")]
    Habit,
    #[serde(rename = "INTUITION-JUMP")]
    IntuitionJump,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Guard, Mode::GuardHabit, Mode::Habit, Mode::IntuitionJump];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Guard => "GUARD",
            Mode::GuardHabit => "GUARD-HABIT",
            Mode::Habit => "HABIT",
            Mode::IntuitionJump => "INTUITION-JUMP",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Mode::ALL.into_iter().find(|m| m.as_str() == s)
    }

    fn is_guarding(self) -> bool {
        matches!(self, Mode::Guard | Mode::GuardHabit)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the arbiter looks at, rebuilt for each stimulus.
#[derive(Debug, Clone, Default)]
pub struct ArbiterSignals {
    pub prediction: Option<Prediction>,
    pub necessity: Option<NecessityResult>,
    pub habit_posterior: f64,
    pub jump_posterior: f64,
    pub guard_posterior: f64,
    pub live_density: usize,
    pub breach_density: usize,
}

impl ArbiterSignals {
    pub fn effective_density(&self) -> usize {
        self.live_density.max(self.breach_density)
    }

    fn jump_fired(&self) -> bool {
        self.necessity.as_ref().is_some_and(|n| n.jump_triggered)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub mode: Mode,
    pub effective_density: usize,
    /// Prediction confidence exceeded the habit threshold.
    pub habit_active: bool,
    /// The necessity check fired.
    pub jump_triggered: bool,
    /// 1.0 for a forced GUARD-HABIT, 1.5 for an emergency jump.
    pub density_penalty: Option<f64>,
    pub prediction: Option<Prediction>,
    pub necessity: Option<NecessityResult>,
    pub habit_posterior: f64,
    pub jump_posterior: f64,
    pub guard_posterior: f64,
}

#[derive(Debug, Clone)]
pub struct ModeArbiter {
    config: ArbiterConfig,
    trigger_threshold: usize,
    hard_cap: usize,
}

impl ModeArbiter {
    pub fn new(config: ArbiterConfig, field: &FieldConfig) -> Self {
        Self {
            config,
            trigger_threshold: field.trigger_threshold,
            hard_cap: field.hard_cap,
        }
    }

    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    pub fn arbitrate(&self, signals: ArbiterSignals) -> Decision {
        let effective_density = signals.effective_density();
        let jump_triggered = signals.jump_fired();
        let ArbiterSignals {
            prediction,
            necessity,
            habit_posterior,
            jump_posterior,
            guard_posterior,
            ..
        } = signals;

        let mut decision = Decision {
            mode: Mode::Guard,
            effective_density,
            habit_active: false,
            jump_triggered,
            density_penalty: None,
            prediction,
            necessity,
            habit_posterior,
            jump_posterior,
            guard_posterior,
        };

        if jump_triggered {
            decision.mode = Mode::IntuitionJump;
            return decision;
        }

        if let Some(p) = &decision.prediction {
            decision.habit_active = p.confidence > HABIT_ACTIVE_CONFIDENCE;
            decision.mode = if decision.habit_active {
                Mode::Habit
            } else {
                Mode::GuardHabit
            };
        }

        if decision.mode.is_guarding() && effective_density >= self.trigger_threshold {
            decision.mode = Mode::GuardHabit;
            decision.density_penalty = Some(1.0);
            tracing::warn!(
                density = effective_density,
                trigger = self.trigger_threshold,
                "guard invalidated by density, forcing GUARD-HABIT"
            );
        }
        let emergency = self.config.emergency_ratio * self.hard_cap as f64;
        if effective_density as f64 >= emergency && decision.mode != Mode::IntuitionJump {
            decision.mode = Mode::IntuitionJump;
            decision.density_penalty = Some(1.5);
            tracing::warn!(density = effective_density, "emergency jump at critical density");
        }

        if decision.mode.is_guarding() && habit_posterior > self.config.habit_posterior_threshold
        {
            decision.mode = Mode::Habit;
        }
        if decision.mode != Mode::IntuitionJump
            && jump_posterior > self.config.jump_posterior_threshold
        {
            decision.mode = Mode::IntuitionJump;
        }
        decision
    }

    /// Pulse confidence: 0.85 base, +0.14 for a necessity jump (else +0.08
    /// for an active habit), +0.02 with three or more shadows, plus up to
    /// 0.02 from the L1 magnitude of the thought vector. Capped at 0.99.
    pub fn confidence(decision: &Decision, shadow_count: usize, vector: &[f64]) -> f64 {
        let mut c = BASE_CONFIDENCE;
        if decision.jump_triggered {
            c += 0.14;
        } else if decision.habit_active {
            c += 0.08;
        }
        if shadow_count >= 3 {
            c += 0.02;
        }
        let magnitude: f64 = vector.iter().map(|v| v.abs()).sum();
        c += (magnitude * 0.001).min(0.02);
        c.min(MAX_CONFIDENCE)
    }
}
