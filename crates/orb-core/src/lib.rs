//! Spatial memory field and mode arbitration for the cursor orb.
//!
//! Cursor stimuli are hashed into a bounded field of nodes whose vivacity
//! grows with repetition and fades with idle decay. A hysteresis purge keeps
//! density under a hard cap. For every stimulus the controller combines a
//! quadrant habit predictor, a bilateral symmetry check, field density and
//! smoothed evidence into one of four render modes.
//!
//! Zero I/O: persistence and transport plug in through `PulseCache` and
//! `TraceSink`.

pub mod arbiter;
pub mod cache;
pub mod config;
pub mod constants;
pub mod controller;
pub mod events;
pub mod evidence;
pub mod field;
pub mod habit;
pub mod necessity;
pub mod neighbors;
pub mod node;
pub mod pulse;
pub mod shadow;
pub mod snapshot;
pub mod stimulus;
pub mod synth;
pub mod time;

pub use arbiter::{ArbiterSignals, Decision, Mode, ModeArbiter};
pub use cache::{MemoryCache, MemoryTrace, NoCache, NullTrace, PulseCache, TraceEntry, TraceSink};
pub use config::{ArbiterConfig, ConfigError, DecayConfig, EvidenceConfig, FieldConfig, OrbConfig};
pub use controller::{ControllerStats, OrbController};
pub use events::{FieldEvent, PurgeReport};
pub use evidence::{Evidence, EvidenceSummary, EvidenceTracker, HypothesisRank, Prior};
pub use field::{FieldPulse, SpatialField};
pub use habit::{HabitTracker, Prediction, PredictionKind, Quadrant};
pub use necessity::{NecessityCheck, NecessityResult, bilateral_symmetry};
pub use neighbors::{Neighbor, NeighborQuery};
pub use node::{Node, NodeKey};
pub use pulse::{Pulse, PulseSource, SpatialCoordinate};
pub use shadow::{DigestShadows, Shadow, ShadowSource};
pub use snapshot::{FieldSnapshot, SNAPSHOT_VERSION, SnapshotError, export_json, import_json};
pub use stimulus::{Stimulus, StimulusError, StimulusKey, StimulusMeta};
pub use synth::{Pattern, StimulusGenerator};
