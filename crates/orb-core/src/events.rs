//! Structured observability for the field.
//!
//! The field records what it did as typed events and mirrors them to
//! `tracing` with structured fields. Hosts drain the buffer with
//! `SpatialField::take_events` for metrics; nothing here formats text.

use serde::Serialize;

/// Outcome of one purge pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurgeReport {
    /// Node count before the purge.
    pub before: usize,
    /// Node count after the purge.
    pub kept: usize,
    /// `before - kept`.
    pub purged: usize,
    /// Mean vivacity of the survivors.
    pub avg_vivacity_kept: f64,
    /// True when the purge started above the hard cap.
    pub over_cap: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FieldEvent {
    /// Density reached the trigger (or the hard cap) and a purge was started.
    PurgeTriggered {
        density: usize,
        trigger: usize,
        release: usize,
    },
    /// A purge completed.
    Purged(PurgeReport),
    /// Density fell to the release threshold; purging is re-armed.
    HysteresisReleased { density: usize, release: usize },
    /// The field exceeded its hard cap after a purge and was re-bounded.
    HardCapViolation { density: usize, hard_cap: usize },
    /// Idle decay pass.
    Decayed { nodes: usize, factor: f64, floor: f64 },
}

/// Bounded event buffer; oldest events are dropped first once full.
#[derive(Debug, Clone)]
pub(crate) struct EventBuffer {
    events: std::collections::VecDeque<FieldEvent>,
    capacity: usize,
}

impl EventBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            events: std::collections::VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, event: FieldEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub(crate) fn drain(&mut self) -> Vec<FieldEvent> {
        self.events.drain(..).collect()
    }
}
