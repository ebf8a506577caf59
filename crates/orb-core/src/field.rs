//! Bounded spatial memory field.
//!
//! Stimuli are hashed to deterministic locations (scale, depth, coordinate
//! vector). Revisits reinforce a node's vivacity. Density is bounded by a
//! hysteresis purge: reaching `trigger_threshold` keeps only the most vivid
//! nodes, leaving the field below `release_threshold`, and no new purge is
//! armed until density has been observed at or below the release threshold.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, FieldConfig};
use crate::constants::{DEPTH_LEVELS, PULSE_STEP};
use crate::events::{EventBuffer, FieldEvent, PurgeReport};
use crate::node::{Node, NodeKey};
use crate::stimulus::Stimulus;

const EVENT_CAPACITY: usize = 256;

/// Phase pulse reported to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldPulse {
    pub frequency: f64,
    pub field_density: usize,
    pub purge_active: bool,
}

#[derive(Debug, Clone)]
pub struct SpatialField {
    config: FieldConfig,
    nodes: BTreeMap<NodeKey, Node>,
    purge_active: bool,
    /// Density that triggered the latest purge; zero once released.
    last_density_breach: usize,
    phase: f64,
    events: EventBuffer,
}

impl Default for SpatialField {
    fn default() -> Self {
        Self::with_valid_config(FieldConfig::default())
    }
}

impl SpatialField {
    pub fn new(config: FieldConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: FieldConfig) -> Self {
        tracing::debug!(
            trigger = config.trigger_threshold,
            release = config.release_threshold,
            band = config.hysteresis_band(),
            hard_cap = config.hard_cap,
            "spatial field initialized"
        );
        Self {
            config,
            nodes: BTreeMap::new(),
            purge_active: false,
            last_density_breach: 0,
            phase: 0.0,
            events: EventBuffer::new(EVENT_CAPACITY),
        }
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn purge_active(&self) -> bool {
        self.purge_active
    }

    pub fn last_density_breach(&self) -> usize {
        self.last_density_breach
    }

    /// Density seen by the arbiter: the larger of the live size and the
    /// pre-purge density of an unreleased purge.
    pub fn effective_density(&self) -> usize {
        self.size().max(self.last_density_breach)
    }

    pub fn get(&self, key: &NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn contains(&self, key: &NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    /// Nodes in key order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Drain buffered field events.
    pub fn take_events(&mut self) -> Vec<FieldEvent> {
        self.events.drain()
    }

    /// Deterministic location of a stimulus: node key plus coordinates.
    ///
    /// Scale and depth come from the first four digest bytes; coordinate `i`
    /// hashes the canonical content with `i` appended and maps it to [-1, 1).
    pub fn locate(&self, stimulus: &Stimulus) -> (NodeKey, Vec<f64>) {
        let canonical = stimulus.canonical_bytes();
        let digest = blake3::hash(&canonical);
        let bytes = digest.as_bytes();
        let dimension = self.config.dimension;

        let scale = u16::from_le_bytes([bytes[0], bytes[1]]) as u32 % dimension as u32 + 1;
        let depth = u16::from_le_bytes([bytes[2], bytes[3]]) as u32 % DEPTH_LEVELS + 1;

        let coordinates: Vec<f64> = (0..dimension)
            .map(|i| {
                let mut hasher = blake3::Hasher::new();
                hasher.update(&canonical);
                hasher.update(&(i as u64).to_le_bytes());
                let h = hasher.finalize();
                let mut head = [0u8; 8];
                head.copy_from_slice(&h.as_bytes()[..8]);
                let unit = (u64::from_le_bytes(head) % 1000) as f64 / 1000.0;
                unit * 2.0 - 1.0
            })
            .collect();

        (NodeKey::new(scale, depth, &coordinates), coordinates)
    }

    /// Map a stimulus into the field, creating or reinforcing its node, then
    /// apply the purge policy. The returned key is always resident.
    pub fn map(&mut self, stimulus: &Stimulus) -> NodeKey {
        let (key, coordinates) = self.locate(stimulus);
        let velocity = stimulus.velocity;
        let intensity = stimulus.intensity();

        match self.nodes.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(Node::new(key, coordinates, velocity, intensity));
            }
            Entry::Occupied(mut slot) => {
                slot.get_mut().revisit(velocity, intensity);
            }
        }

        self.apply_purge_policy(key);
        debug_assert!(
            self.nodes.contains_key(&key),
            "just-mapped node must survive its own purge"
        );
        key
    }

    fn apply_purge_policy(&mut self, touched: NodeKey) {
        let density = self.nodes.len();
        let FieldConfig {
            hard_cap,
            trigger_threshold: trigger,
            release_threshold: release,
            ..
        } = self.config;

        if self.purge_active && density <= release {
            self.purge_active = false;
            self.last_density_breach = 0;
            tracing::debug!(density, release, "hysteresis released");
            self.events
                .push(FieldEvent::HysteresisReleased { density, release });
        }

        let should_purge = density >= hard_cap || (!self.purge_active && density >= trigger);
        if should_purge {
            self.last_density_breach = density;
            tracing::warn!(density, trigger, release, "density threshold reached, purging");
            self.events.push(FieldEvent::PurgeTriggered {
                density,
                trigger,
                release,
            });
            self.evict(Some(&touched));
        }
    }

    /// Purge down to the most vivid survivors.
    ///
    /// No-op while the field is below the trigger and within the hard cap.
    /// `preserve` (when resident) is always kept.
    pub fn evict(&mut self, preserve: Option<&NodeKey>) -> Option<PurgeReport> {
        let before = self.nodes.len();
        let FieldConfig {
            hard_cap,
            trigger_threshold,
            keep_ratio,
            vivacity_floor,
            ..
        } = self.config;
        if before < trigger_threshold && before <= hard_cap {
            return None;
        }

        let over_cap = before > hard_cap;
        if over_cap {
            tracing::error!(density = before, hard_cap, "hard cap exceeded, forcing purge");
        }

        let survivor_cap = self.config.survivor_cap();
        let mut keep = self.ranked_keys();
        let target = ((hard_cap as f64 * keep_ratio) as usize)
            .max(1)
            .min(survivor_cap)
            .min(keep.len());

        let qualified: Vec<NodeKey> = keep
            .iter()
            .filter(|k| self.nodes[*k].vivacity >= vivacity_floor)
            .take(target)
            .copied()
            .collect();
        if qualified.len() >= (target / 2).max(1) {
            keep = qualified;
        } else {
            keep.truncate(target);
        }

        if let Some(p) = preserve
            && self.nodes.contains_key(p)
        {
            keep.retain(|k| k != p);
            keep.insert(0, *p);
        }
        keep.truncate(survivor_cap);

        self.rebuild_from(&keep);
        self.purge_active = true;

        let kept = self.nodes.len();
        let avg_vivacity_kept = if kept == 0 {
            0.0
        } else {
            self.nodes.values().map(|n| n.vivacity).sum::<f64>() / kept as f64
        };
        let report = PurgeReport {
            before,
            kept,
            purged: before - kept,
            avg_vivacity_kept,
            over_cap,
        };
        tracing::info!(
            purged = report.purged,
            kept,
            avg_vivacity_kept,
            band = self.config.hysteresis_band(),
            "purge complete"
        );
        self.events.push(FieldEvent::Purged(report.clone()));

        self.enforce_hard_cap(preserve);
        Some(report)
    }

    /// Manual purge with no node to preserve.
    pub fn purge(&mut self) -> Option<PurgeReport> {
        self.evict(None)
    }

    /// Keys sorted by descending vivacity, ties by key.
    fn ranked_keys(&self) -> Vec<NodeKey> {
        let mut ranked: Vec<&Node> = self.nodes.values().collect();
        ranked.sort_by(|a, b| {
            b.vivacity
                .total_cmp(&a.vivacity)
                .then_with(|| a.key.cmp(&b.key))
        });
        ranked.into_iter().map(|n| n.key).collect()
    }

    /// Build a fresh map holding only `keep` and swap it in.
    fn rebuild_from(&mut self, keep: &[NodeKey]) {
        let mut previous = std::mem::take(&mut self.nodes);
        self.nodes = keep
            .iter()
            .filter_map(|k| previous.remove_entry(k))
            .collect();
    }

    /// Last line of defence for the size bound: truncate to the survivor cap.
    fn enforce_hard_cap(&mut self, preserve: Option<&NodeKey>) {
        let density = self.nodes.len();
        let hard_cap = self.config.hard_cap;
        if density <= hard_cap {
            return;
        }
        tracing::error!(density, hard_cap, "field above hard cap after purge, re-bounding");
        self.events
            .push(FieldEvent::HardCapViolation { density, hard_cap });

        let mut keep = self.ranked_keys();
        if let Some(p) = preserve
            && self.nodes.contains_key(p)
        {
            keep.retain(|k| k != p);
            keep.insert(0, *p);
        }
        keep.truncate(self.config.survivor_cap());
        self.rebuild_from(&keep);
        self.purge_active = true;
    }

    /// Idle-time forgetting: `v = max(v * factor, floor)` for every node.
    pub fn decay(&mut self, factor: f64, floor: f64) {
        for node in self.nodes.values_mut() {
            node.vivacity = (node.vivacity * factor).max(floor);
        }
        tracing::trace!(nodes = self.nodes.len(), factor, floor, "vivacity decayed");
        self.events.push(FieldEvent::Decayed {
            nodes: self.nodes.len(),
            factor,
            floor,
        });
    }

    /// Record a measured adjacency on a resident node. Returns false if absent.
    pub fn note_adjacency(&mut self, key: &NodeKey, adjacency: f64) -> bool {
        match self.nodes.get_mut(key) {
            Some(node) => {
                node.adjacency = adjacency;
                true
            }
            None => false,
        }
    }

    /// Advance the render phase and report density.
    pub fn pulse(&mut self) -> FieldPulse {
        self.phase = (self.phase + PULSE_STEP) % TAU;
        FieldPulse {
            frequency: self.phase,
            field_density: self.nodes.len(),
            purge_active: self.purge_active,
        }
    }

    /// Replace the field contents with previously exported nodes.
    ///
    /// Nodes whose coordinate length does not match the field dimension are
    /// skipped. The purge policy runs afterwards so the size bound holds.
    /// Returns the number of nodes accepted.
    pub fn restore(&mut self, nodes: impl IntoIterator<Item = Node>) -> usize {
        let dimension = self.config.dimension;
        self.nodes.clear();
        self.purge_active = false;
        self.last_density_breach = 0;

        let mut skipped = 0usize;
        for node in nodes {
            if node.coordinates.len() != dimension {
                skipped += 1;
                continue;
            }
            self.nodes.insert(node.key, node);
        }
        if skipped > 0 {
            tracing::warn!(skipped, dimension, "restore skipped nodes with wrong dimension");
        }

        let accepted = self.nodes.len();
        if accepted >= self.config.trigger_threshold || accepted > self.config.hard_cap {
            self.last_density_breach = accepted;
            self.evict(None);
        }
        accepted
    }

    /// Re-arm the hysteresis state recorded alongside restored nodes. Ignored
    /// when the field already sits at or below the release threshold.
    pub(crate) fn resume_hysteresis(&mut self, purge_active: bool, breach: usize) {
        if purge_active && self.nodes.len() > self.config.release_threshold {
            self.purge_active = true;
            self.last_density_breach = self.last_density_breach.max(breach);
        }
    }
}
