use serde::{Deserialize, Serialize};

use crate::constants::{NEWBORN_OCCUPANCY, NEWBORN_VIVACITY, VIVACITY_MAX};

/// Composite identity of a field node: scale (n), depth (k) and a digest of
/// the coordinate vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub scale: u32,
    pub depth: u32,
    pub digest: u64,
}

impl NodeKey {
    pub fn new(scale: u32, depth: u32, coordinates: &[f64]) -> Self {
        Self {
            scale,
            depth,
            digest: coordinate_digest(coordinates),
        }
    }
}

/// Stable digest over the bit patterns of a coordinate vector.
pub fn coordinate_digest(coordinates: &[f64]) -> u64 {
    let mut hasher = blake3::Hasher::new();
    for c in coordinates {
        hasher.update(&c.to_bits().to_le_bytes());
    }
    let bytes = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&bytes.as_bytes()[..8]);
    u64::from_le_bytes(head)
}

/// A location in the spatial field.
///
/// Vivacity is the node's strength: it grows with repeated visits, fades with
/// idle decay, and decides who survives a purge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub key: NodeKey,
    pub coordinates: Vec<f64>,
    pub vivacity: f64,
    pub occupancy: u32,
    /// Adjacency to the center of the most recent neighbor query that
    /// returned this node. Zero until then.
    #[serde(default)]
    pub adjacency: f64,
}

impl Node {
    /// Fresh node from a first visit: `1 + velocity/5 + intensity*3`, clamped.
    pub fn new(key: NodeKey, coordinates: Vec<f64>, velocity: f64, intensity: f64) -> Self {
        let vivacity = (1.0 + velocity / 5.0 + intensity * 3.0).min(VIVACITY_MAX);
        Self {
            key,
            coordinates,
            vivacity,
            occupancy: 1,
            adjacency: 0.0,
        }
    }

    /// Reinforce on a repeat visit.
    pub fn revisit(&mut self, velocity: f64, intensity: f64) {
        let boost = repetition_boost(self.occupancy) + intensity * 1.5 + velocity / 10.0;
        self.vivacity = (self.vivacity + boost).min(VIVACITY_MAX);
        if self.occupancy <= NEWBORN_OCCUPANCY && self.vivacity < NEWBORN_VIVACITY {
            self.vivacity = NEWBORN_VIVACITY;
        }
        self.occupancy = self.occupancy.saturating_add(1);
    }

    /// Directional adjacency from `self` (the center) to `other`:
    /// `n * |n - n'| * exp(-|k - k'|)`. Asymmetric in the leading `n`.
    pub fn adjacency_to(&self, other: &Node) -> f64 {
        let (n, k) = (self.key.scale, self.key.depth);
        if n == 0 || k == 0 {
            return 0.0;
        }
        let dn = (n as f64 - other.key.scale as f64).abs();
        let dk = (k as f64 - other.key.depth as f64).abs();
        n as f64 * dn * (-dk).exp()
    }
}

/// `0.3 + 0.2 * ln(1 + c)`: diminishing reinforcement per repeat.
pub fn repetition_boost(occupancy: u32) -> f64 {
    0.3 + 0.2 * (occupancy as f64).ln_1p()
}
