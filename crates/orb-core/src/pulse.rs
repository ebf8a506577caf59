use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::arbiter::Mode;
use crate::habit::Prediction;
use crate::node::{Node, NodeKey};

/// Where the node behind a pulse lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialCoordinate {
    pub node: NodeKey,
    pub depth: u32,
    pub coordinates: Vec<f64>,
    pub adjacency: f64,
}

impl From<&Node> for SpatialCoordinate {
    fn from(node: &Node) -> Self {
        Self {
            node: node.key,
            depth: node.key.depth,
            coordinates: node.coordinates.clone(),
            adjacency: node.adjacency,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PulseSource {
    #[default]
    Computed,
    /// Replayed from the crystallization cache.
    Crystallized,
}

/// Render instruction produced for one stimulus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pulse {
    pub cognitive_mode: Mode,
    pub glow_intensity: f64,
    pub field_density: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predictive_intent: Option<Prediction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jump_vector: Option<[f64; 2]>,
    pub bayes_habit_prob: f64,
    pub bayes_jump_prob: f64,
    pub bayes_guard_prob: f64,
    /// Shadow name -> posterior of its persistence hypothesis.
    pub epistemic_bayes: BTreeMap<String, f64>,
    /// Mean shadow confidence; 0 without shadows.
    pub epistemic_alignment: f64,
    pub deterministic: bool,
    pub spatial: SpatialCoordinate,
    #[serde(default)]
    pub source: PulseSource,
}

impl Pulse {
    /// Same pulse, marked as served from the cache.
    pub fn crystallized(mut self) -> Self {
        self.source = PulseSource::Crystallized;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pulse() -> Pulse {
        let coords = vec![0.25, -0.5];
        let node = Node::new(NodeKey::new(2, 3, &coords), coords, 1.0, 0.5);
        Pulse {
            cognitive_mode: Mode::Habit,
            glow_intensity: 0.93,
            field_density: 12,
            predictive_intent: None,
            jump_vector: None,
            bayes_habit_prob: 0.6,
            bayes_jump_prob: 0.3,
            bayes_guard_prob: 0.7,
            epistemic_bayes: BTreeMap::from([("skeptic".to_string(), 0.66)]),
            epistemic_alignment: 0.75,
            deterministic: false,
            spatial: SpatialCoordinate::from(&node),
            source: PulseSource::Computed,
        }
    }

    #[test]
    fn test_wire_shape() {
        let json = serde_json::to_value(pulse()).unwrap();
        assert_eq!(json["cognitive_mode"], "HABIT");
        assert_eq!(json["source"], "computed");
        assert_eq!(json["spatial"]["depth"], 3);
        assert_eq!(json["epistemic_bayes"]["skeptic"], 0.66);
        assert!(json.get("jump_vector").is_none());
    }

    #[test]
    fn test_crystallized_marks_source() {
        let p = pulse().crystallized();
        assert_eq!(p.source, PulseSource::Crystallized);
        let back: Pulse = serde_json::from_str(&serde_json::to_string(&p).unwrap()).unwrap();
        assert_eq!(back.source, PulseSource::Crystallized);
        assert_eq!(back.cognitive_mode, Mode::Habit);
        assert_eq!(back.spatial.node, p.spatial.node);
    }
}
