//! Cursor-derived input records and their canonical identity.
//!
//! Every stimulus is canonicalized as compact JSON (struct fields in
//! declaration order, `meta` keys sorted). The blake3 digest of that encoding
//! is the stimulus identity used for field placement and the crystallization
//! cache.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_INTENSITY;

pub const CURSOR_MOVEMENT: &str = "cursor_movement";
pub const SURVEILLANCE: &str = "surveillance_probe";

#[derive(Debug, Clone, PartialEq)]
pub enum StimulusError {
    /// Input was not a well-formed stimulus record.
    Parse(String),
    /// A coordinate is NaN or infinite.
    NonFiniteCoordinate { axis: usize, value: f64 },
    /// Velocity is negative, NaN or infinite.
    InvalidVelocity(f64),
    /// Intensity is outside [0, 1].
    InvalidIntensity(f64),
}

impl fmt::Display for StimulusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StimulusError::Parse(msg) => write!(f, "malformed stimulus: {msg}"),
            StimulusError::NonFiniteCoordinate { axis, value } => {
                write!(f, "coordinate {axis} is not finite: {value}")
            }
            StimulusError::InvalidVelocity(v) => {
                write!(f, "velocity must be a finite non-negative number, got {v}")
            }
            StimulusError::InvalidIntensity(v) => {
                write!(f, "intensity must be in [0, 1], got {v}")
            }
        }
    }
}

impl std::error::Error for StimulusError {}

impl From<serde_json::Error> for StimulusError {
    fn from(e: serde_json::Error) -> Self {
        StimulusError::Parse(e.to_string())
    }
}

/// Optional metadata. `test_mode` bypasses the sovereignty gate; any other keys
/// are preserved and take part in the stimulus identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StimulusMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_mode: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl StimulusMeta {
    pub fn is_empty(&self) -> bool {
        self.test_mode.is_none() && self.extra.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stimulus {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: [f64; 2],
    pub velocity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f64>,
    #[serde(default, skip_serializing_if = "StimulusMeta::is_empty")]
    pub meta: StimulusMeta,
}

impl Stimulus {
    /// A plain cursor movement with no metadata.
    pub fn cursor(x: f64, y: f64, velocity: f64) -> Self {
        Self {
            kind: CURSOR_MOVEMENT.to_string(),
            coordinates: [x, y],
            velocity,
            intent: Some("navigation".to_string()),
            intensity: None,
            meta: StimulusMeta::default(),
        }
    }

    /// Builder: attach a metadata key.
    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.meta.extra.insert(key.to_string(), value.into());
        self
    }

    /// Builder: mark as synthetic (bypasses the sovereignty gate).
    pub fn in_test_mode(mut self) -> Self {
        self.meta.test_mode = Some(true);
        self
    }

    /// Parse and validate a JSON stimulus.
    pub fn from_json(input: &str) -> Result<Self, StimulusError> {
        let stimulus: Stimulus = serde_json::from_str(input)?;
        stimulus.validate()?;
        Ok(stimulus)
    }

    /// Boundary check run before a stimulus reaches the field.
    pub fn validate(&self) -> Result<(), StimulusError> {
        for (axis, value) in self.coordinates.iter().enumerate() {
            if !value.is_finite() {
                return Err(StimulusError::NonFiniteCoordinate {
                    axis,
                    value: *value,
                });
            }
        }
        if !self.velocity.is_finite() || self.velocity < 0.0 {
            return Err(StimulusError::InvalidVelocity(self.velocity));
        }
        if let Some(i) = self.intensity
            && !(0.0..=1.0).contains(&i)
        {
            return Err(StimulusError::InvalidIntensity(i));
        }
        Ok(())
    }

    /// Intensity clamped to `[0, 1]`, defaulting when absent.
    pub fn intensity(&self) -> f64 {
        match self.intensity {
            Some(i) if i.is_finite() => i.clamp(0.0, 1.0),
            _ => DEFAULT_INTENSITY,
        }
    }

    pub fn is_cursor_movement(&self) -> bool {
        self.kind == CURSOR_MOVEMENT
    }

    pub fn is_test_mode(&self) -> bool {
        self.meta.test_mode == Some(true)
    }

    /// Compact JSON encoding used as hash input.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        // Serialization cannot fail: every map key is a string.
        serde_json::to_vec(self).unwrap_or_else(|_| format!("{self:?}").into_bytes())
    }

    pub fn digest(&self) -> blake3::Hash {
        blake3::hash(&self.canonical_bytes())
    }

    pub fn key(&self) -> StimulusKey {
        StimulusKey(self.digest().to_hex().to_string())
    }
}

/// Hex digest of a stimulus' canonical content. Keys the crystallization cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StimulusKey(String);

impl StimulusKey {
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StimulusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_record() {
        let s = Stimulus::from_json(
            r#"{"type":"cursor_movement","coordinates":[100,200],"velocity":5.0,
                "intent":"navigation","meta":{"test_mode":true,"iteration":3}}"#,
        )
        .unwrap();
        assert!(s.is_cursor_movement());
        assert!(s.is_test_mode());
        assert_eq!(s.coordinates, [100.0, 200.0]);
        assert_eq!(s.meta.extra.get("iteration"), Some(&serde_json::json!(3)));
        assert!((s.intensity() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_missing_coordinates_rejected() {
        let err = Stimulus::from_json(r#"{"type":"cursor_movement","velocity":1.0}"#).unwrap_err();
        assert!(matches!(err, StimulusError::Parse(_)));
    }

    #[test]
    fn test_negative_velocity_rejected() {
        let s = Stimulus::cursor(1.0, 2.0, -3.0);
        assert_eq!(s.validate(), Err(StimulusError::InvalidVelocity(-3.0)));
    }

    #[test]
    fn test_intensity_outside_unit_range_rejected() {
        let mut s = Stimulus::cursor(10.0, 10.0, 0.0);
        s.intensity = Some(-5.0);
        assert_eq!(s.validate(), Err(StimulusError::InvalidIntensity(-5.0)));
        s.intensity = Some(1.5);
        assert_eq!(s.validate(), Err(StimulusError::InvalidIntensity(1.5)));
        s.intensity = Some(f64::NAN);
        assert!(matches!(s.validate(), Err(StimulusError::InvalidIntensity(_))));
        s.intensity = Some(1.0);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_unvalidated_intensity_is_clamped() {
        let mut s = Stimulus::cursor(10.0, 10.0, 0.0);
        s.intensity = Some(-5.0);
        assert_eq!(s.intensity(), 0.0);
        s.intensity = Some(7.0);
        assert_eq!(s.intensity(), 1.0);
        s.intensity = Some(f64::INFINITY);
        assert_eq!(s.intensity(), DEFAULT_INTENSITY);
    }

    #[test]
    fn test_non_finite_coordinate_rejected() {
        let s = Stimulus::cursor(f64::NAN, 2.0, 1.0);
        assert!(matches!(
            s.validate(),
            Err(StimulusError::NonFiniteCoordinate { axis: 0, .. })
        ));
    }

    #[test]
    fn test_key_is_deterministic_and_content_sensitive() {
        let a = Stimulus::cursor(10.0, 20.0, 1.0);
        let b = Stimulus::cursor(10.0, 20.0, 1.0);
        let c = Stimulus::cursor(10.0, 20.0, 1.0).with_meta("iteration", 1);
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
        assert_eq!(a.key().as_str().len(), 64);
    }

    #[test]
    fn test_meta_key_order_does_not_change_identity() {
        let a = Stimulus::from_json(
            r#"{"type":"cursor_movement","coordinates":[1,2],"velocity":0,"meta":{"a":1,"b":2}}"#,
        )
        .unwrap();
        let b = Stimulus::from_json(
            r#"{"type":"cursor_movement","coordinates":[1,2],"velocity":0,"meta":{"b":2,"a":1}}"#,
        )
        .unwrap();
        assert_eq!(a.key(), b.key());
    }
}
