//! Versioned JSON export of a field's nodes.

use serde::{Deserialize, Serialize};

use crate::field::SpatialField;
use crate::node::Node;
use crate::time::now_unix_secs;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSnapshot {
    pub version: u32,
    /// Unix seconds at export.
    pub taken_at: u64,
    pub dimension: usize,
    #[serde(default)]
    pub purge_active: bool,
    #[serde(default)]
    pub last_density_breach: usize,
    pub nodes: Vec<Node>,
}

#[derive(Debug)]
pub enum SnapshotError {
    Json(serde_json::Error),
    UnsupportedVersion(u32),
    DimensionMismatch { snapshot: usize, field: usize },
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotError::Json(e) => write!(f, "snapshot json: {e}"),
            SnapshotError::UnsupportedVersion(v) => {
                write!(f, "unsupported snapshot version {v} (expected {SNAPSHOT_VERSION})")
            }
            SnapshotError::DimensionMismatch { snapshot, field } => {
                write!(f, "snapshot dimension {snapshot} does not match field dimension {field}")
            }
        }
    }
}

impl std::error::Error for SnapshotError {}

impl From<serde_json::Error> for SnapshotError {
    fn from(e: serde_json::Error) -> Self {
        SnapshotError::Json(e)
    }
}

impl FieldSnapshot {
    pub fn capture(field: &SpatialField) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            taken_at: now_unix_secs(),
            dimension: field.config().dimension,
            purge_active: field.purge_active(),
            last_density_breach: field.last_density_breach(),
            nodes: field.nodes().cloned().collect(),
        }
    }

    /// Replace `field`'s contents with this snapshot. Returns nodes accepted.
    pub fn restore_into(self, field: &mut SpatialField) -> Result<usize, SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }
        let expected = field.config().dimension;
        if self.dimension != expected {
            return Err(SnapshotError::DimensionMismatch {
                snapshot: self.dimension,
                field: expected,
            });
        }
        let accepted = field.restore(self.nodes);
        field.resume_hysteresis(self.purge_active, self.last_density_breach);
        tracing::info!(accepted, size = field.size(), "field restored from snapshot");
        Ok(accepted)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

pub fn export_json(field: &SpatialField) -> Result<String, serde_json::Error> {
    serde_json::to_string(&FieldSnapshot::capture(field))
}

pub fn import_json(json: &str) -> Result<FieldSnapshot, SnapshotError> {
    Ok(serde_json::from_str(json)?)
}
