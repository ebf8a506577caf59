//! SQLite-backed implementations of the controller's cache and trace seams.
//!
//! Both are best-effort: storage errors are logged and swallowed so a broken
//! database never fails a tick.

use std::path::Path;

use uuid::Uuid;

use orb_core::{Pulse, PulseCache, StimulusKey, TraceEntry, TraceSink};

use crate::error::Result;
use crate::store::Store;

/// Entries buffered by a `TraceLog` before it writes a batch.
pub const TRACE_BATCH: usize = 64;

/// Crystallization cache persisted in the `crystals` table.
pub struct SqliteCache {
    store: Store,
}

impl SqliteCache {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Store::open(path)?))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

impl PulseCache for SqliteCache {
    fn lookup(&self, key: &StimulusKey) -> Option<Pulse> {
        match self.store.load_crystal(key) {
            Ok(pulse) => pulse,
            Err(e) => {
                tracing::error!(error = %e, %key, "crystal lookup failed");
                None
            }
        }
    }

    fn store(&mut self, key: &StimulusKey, pulse: &Pulse) {
        if let Err(e) = self.store.save_crystal(key, pulse) {
            tracing::error!(error = %e, %key, "crystal write failed");
        }
    }
}

/// Append-only trace, tagged with a per-process session id and written in
/// batches. Whatever is still buffered is written on drop.
pub struct TraceLog {
    store: Store,
    session_id: String,
    buffer: Vec<TraceEntry>,
    batch: usize,
}

impl TraceLog {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            session_id: Uuid::new_v4().to_string(),
            buffer: Vec::with_capacity(TRACE_BATCH),
            batch: TRACE_BATCH,
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Store::open(path)?))
    }

    pub fn with_batch(mut self, batch: usize) -> Self {
        self.batch = batch.max(1);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

impl TraceSink for TraceLog {
    fn record(&mut self, entry: TraceEntry) {
        self.buffer.push(entry);
        if self.buffer.len() >= self.batch {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        match self.store.append_trace(&self.session_id, &self.buffer) {
            Ok(n) => tracing::debug!(entries = n, session = %self.session_id, "trace flushed"),
            Err(e) => tracing::error!(
                error = %e,
                dropped = self.buffer.len(),
                "trace flush failed"
            ),
        }
        self.buffer.clear();
    }
}

impl Drop for TraceLog {
    fn drop(&mut self) {
        self.flush();
    }
}
