use rand::Rng;
use rand::seq::IteratorRandom;

use crate::constants::{SAMPLED_NEIGHBOR_LIMIT, SCAN_NEIGHBOR_LIMIT};
use crate::field::SpatialField;
use crate::node::{Node, NodeKey};

/// A node adjacent to a query center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub key: NodeKey,
    /// Directional adjacency from the center to this node.
    pub adjacency: f64,
}

/// Stateless adjacency search over a SpatialField.
pub struct NeighborQuery;

impl NeighborQuery {
    /// Nodes within `radius` of `center`, closest first.
    ///
    /// Fields up to `dense_scan_limit` nodes are scanned in full (max 10
    /// results). Denser fields are uniformly sampled down to
    /// `dense_sample_size` candidates first (max 5 results).
    pub fn neighbors(
        field: &SpatialField,
        center: &NodeKey,
        radius: f64,
        rng: &mut impl Rng,
    ) -> Vec<Neighbor> {
        let Some(center_node) = field.get(center) else {
            return Vec::new();
        };
        let config = field.config();

        let (candidates, limit): (Vec<&Node>, usize) = if field.size() > config.dense_scan_limit
        {
            (
                field.nodes().choose_multiple(rng, config.dense_sample_size),
                SAMPLED_NEIGHBOR_LIMIT,
            )
        } else {
            (field.nodes().collect(), SCAN_NEIGHBOR_LIMIT)
        };

        let mut found: Vec<Neighbor> = candidates
            .into_iter()
            .filter(|n| n.key != *center)
            .filter_map(|n| {
                let adjacency = center_node.adjacency_to(n);
                (adjacency > 0.0 && adjacency <= radius).then_some(Neighbor {
                    key: n.key,
                    adjacency,
                })
            })
            .collect();

        found.sort_by(|a, b| {
            a.adjacency
                .total_cmp(&b.adjacency)
                .then_with(|| a.key.cmp(&b.key))
        });
        found.truncate(limit);
        found
    }

    /// Per-dimension average of coordinates weighted by
    /// `vivacity * (1 + adjacency)`. Zero vector when empty or weightless.
    pub fn weighted_vector<'a>(
        nodes: impl IntoIterator<Item = &'a Node>,
        dimension: usize,
    ) -> Vec<f64> {
        let mut vector = vec![0.0; dimension];
        let mut total_weight = 0.0;

        for node in nodes {
            let weight = node.vivacity * (1.0 + node.adjacency);
            for (slot, coord) in vector.iter_mut().zip(node.coordinates.iter()) {
                *slot += coord * weight;
            }
            total_weight += weight;
        }

        if total_weight > 0.0 {
            for v in &mut vector {
                *v /= total_weight;
            }
        } else {
            vector.iter_mut().for_each(|v| *v = 0.0);
        }
        vector
    }
}
