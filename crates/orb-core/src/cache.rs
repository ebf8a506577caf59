//! Seams to the persistence collaborators.
//!
//! The controller only talks to these traits. Implementations are expected
//! to be best-effort: a failing backend logs and carries on, it never fails
//! a tick.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::arbiter::Mode;
use crate::pulse::{Pulse, PulseSource};
use crate::stimulus::StimulusKey;

/// Crystallization cache: resolved pulses keyed by canonical stimulus.
pub trait PulseCache: Send {
    fn lookup(&self, key: &StimulusKey) -> Option<Pulse>;
    fn store(&mut self, key: &StimulusKey, pulse: &Pulse);
}

/// In-process cache.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: HashMap<StimulusKey, Pulse>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PulseCache for MemoryCache {
    fn lookup(&self, key: &StimulusKey) -> Option<Pulse> {
        self.entries.get(key).cloned()
    }

    fn store(&mut self, key: &StimulusKey, pulse: &Pulse) {
        self.entries.insert(key.clone(), pulse.clone());
    }
}

/// Cache that never hits. Every stimulus is computed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl PulseCache for NoCache {
    fn lookup(&self, _key: &StimulusKey) -> Option<Pulse> {
        None
    }

    fn store(&mut self, _key: &StimulusKey, _pulse: &Pulse) {}
}

/// One line of the append-only trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub timestamp: f64,
    pub stimulus_key: StimulusKey,
    pub mode: Mode,
    pub confidence: f64,
    pub field_density: usize,
    pub source: PulseSource,
}

pub trait TraceSink: Send {
    fn record(&mut self, entry: TraceEntry);

    /// Push buffered entries to durable storage.
    fn flush(&mut self) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullTrace;

impl TraceSink for NullTrace {
    fn record(&mut self, _entry: TraceEntry) {}
}

/// Keeps every entry in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryTrace {
    pub entries: Vec<TraceEntry>,
}

impl TraceSink for MemoryTrace {
    fn record(&mut self, entry: TraceEntry) {
        self.entries.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(mode: Mode) -> TraceEntry {
        TraceEntry {
            timestamp: 1.0,
            stimulus_key: StimulusKey::from_hex("ab"),
            mode,
            confidence: 0.9,
            field_density: 3,
            source: PulseSource::Computed,
        }
    }

    #[test]
    fn test_memory_trace_keeps_order() {
        let mut trace = MemoryTrace::default();
        trace.record(entry(Mode::Guard));
        trace.record(entry(Mode::Habit));
        trace.flush();
        let modes: Vec<Mode> = trace.entries.iter().map(|e| e.mode).collect();
        assert_eq!(modes, vec![Mode::Guard, Mode::Habit]);
    }

    #[test]
    fn test_trace_entry_json() {
        let json = serde_json::to_value(entry(Mode::IntuitionJump)).unwrap();
        assert_eq!(json["mode"], "INTUITION-JUMP");
        assert_eq!(json["stimulus_key"], "ab");
        assert_eq!(json["source"], "computed");
    }
}
