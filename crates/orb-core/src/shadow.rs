use serde::{Deserialize, Serialize};

use crate::stimulus::Stimulus;

/// Names of the default lenses, in digest byte order.
pub const DEFAULT_LENSES: [&str; 4] = ["empiricist", "skeptic", "critical", "monist"];

/// One named confidence estimate for a stimulus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shadow {
    pub name: String,
    pub confidence: f64,
    pub reliability: f64,
}

/// Supplies named shadow confidences for a stimulus.
pub trait ShadowSource: Send {
    fn shadows(&self, stimulus: &Stimulus) -> Vec<Shadow>;
}

/// Deterministic shadows derived from the stimulus digest: lens `i` reads
/// byte `i`, giving `0.5 + 0.5 * byte / 255` rounded to three decimals.
#[derive(Debug, Clone)]
pub struct DigestShadows {
    lenses: Vec<String>,
}

impl DigestShadows {
    /// Custom lens names. At most 32 are meaningful (one per digest byte).
    pub fn with_lenses(lenses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            lenses: lenses.into_iter().map(Into::into).take(32).collect(),
        }
    }
}

impl Default for DigestShadows {
    fn default() -> Self {
        Self::with_lenses(DEFAULT_LENSES)
    }
}

impl ShadowSource for DigestShadows {
    fn shadows(&self, stimulus: &Stimulus) -> Vec<Shadow> {
        let digest = stimulus.digest();
        let bytes = digest.as_bytes();
        self.lenses
            .iter()
            .zip(bytes.iter())
            .map(|(name, byte)| {
                let raw = 0.5 + 0.5 * (*byte as f64 / 255.0);
                Shadow {
                    name: name.clone(),
                    confidence: (raw * 1000.0).round() / 1000.0,
                    reliability: 1.0,
                }
            })
            .collect()
    }
}
