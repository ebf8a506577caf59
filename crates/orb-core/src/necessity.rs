use serde::{Deserialize, Serialize};

use crate::config::ArbiterConfig;
use crate::constants::MIRROR_TOLERANCE;
use crate::field::SpatialField;
use crate::node::Node;

const FIRED_CERTAINTY: f64 = 0.98;

/// Outcome of a necessity (bilateral symmetry) check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NecessityResult {
    pub jump_triggered: bool,
    /// Fraction of mirrored node pairs; 0 when the check was not evaluated.
    pub unity_score: f64,
    /// Centroid of the first two coordinates over all nodes (set when fired).
    pub vector: Option<[f64; 2]>,
    pub bypass_steps: usize,
    pub certainty: f64,
    pub field_density: usize,
}

impl NecessityResult {
    fn quiet(field_density: usize, unity_score: f64) -> Self {
        Self {
            jump_triggered: false,
            unity_score,
            vector: None,
            bypass_steps: 0,
            certainty: 0.0,
            field_density,
        }
    }
}

/// Stateless symmetry detector over a SpatialField.
pub struct NecessityCheck;

impl NecessityCheck {
    /// Evaluated only when the field holds more than `density_threshold`
    /// nodes; fires when bilateral symmetry exceeds `symmetry_threshold`.
    pub fn check(field: &SpatialField, config: &ArbiterConfig) -> NecessityResult {
        let density = field.size();
        if density <= config.density_threshold {
            return NecessityResult::quiet(density, 0.0);
        }

        let nodes: Vec<&Node> = field.nodes().collect();
        let score = bilateral_symmetry(&nodes);
        if score <= config.symmetry_threshold {
            return NecessityResult::quiet(density, score);
        }

        tracing::debug!(density, score, "necessity check fired");
        NecessityResult {
            jump_triggered: true,
            unity_score: score,
            vector: Some(centroid(&nodes)),
            bypass_steps: density / 10,
            certainty: FIRED_CERTAINTY,
            field_density: density,
        }
    }
}

/// Fraction of node pairs mirrored across the vertical axis:
/// `|a0 + b0| < 0.2 && |a1 - b1| < 0.2`. Zero with fewer than two nodes.
pub fn bilateral_symmetry(nodes: &[&Node]) -> f64 {
    let n = nodes.len();
    if n < 2 {
        return 0.0;
    }
    let mut mirrored = 0usize;
    for (i, a) in nodes.iter().enumerate() {
        for b in &nodes[i + 1..] {
            if is_mirror_pair(&a.coordinates, &b.coordinates) {
                mirrored += 1;
            }
        }
    }
    let pairs = n * (n - 1) / 2;
    mirrored as f64 / pairs as f64
}

fn is_mirror_pair(a: &[f64], b: &[f64]) -> bool {
    match (a, b) {
        ([a0, a1, ..], [b0, b1, ..]) => {
            (a0 + b0).abs() < MIRROR_TOLERANCE && (a1 - b1).abs() < MIRROR_TOLERANCE
        }
        _ => false,
    }
}

fn centroid(nodes: &[&Node]) -> [f64; 2] {
    if nodes.is_empty() {
        return [0.0, 0.0];
    }
    let mut sum = [0.0, 0.0];
    for node in nodes {
        for (slot, c) in sum.iter_mut().zip(node.coordinates.iter()) {
            *slot += c;
        }
    }
    let n = nodes.len() as f64;
    [sum[0] / n, sum[1] / n]
}
