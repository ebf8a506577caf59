/// Upper clamp for node vivacity.
pub const VIVACITY_MAX: f64 = 10.0;

/// Vivacity granted to newborn nodes (occupancy <= NEWBORN_OCCUPANCY)
/// so a single weak visit is not purged immediately.
pub const NEWBORN_VIVACITY: f64 = 1.5;

/// Occupancy at or below which a node still counts as newborn.
pub const NEWBORN_OCCUPANCY: u32 = 2;

/// Intensity assumed when a stimulus carries none.
pub const DEFAULT_INTENSITY: f64 = 0.5;

/// Depth (k) values range over 1..=DEPTH_LEVELS.
pub const DEPTH_LEVELS: u32 = 10;

/// Maximum neighbors returned by a full scan.
pub const SCAN_NEIGHBOR_LIMIT: usize = 10;

/// Maximum neighbors returned by a sampled scan over a dense field.
pub const SAMPLED_NEIGHBOR_LIMIT: usize = 5;

/// Radius used by the controller for neighbor queries.
pub const NEIGHBOR_RADIUS: f64 = 3.0;

/// Phase advance per `SpatialField::pulse` call (radians).
pub const PULSE_STEP: f64 = 0.1;

/// Mirror tolerance on each axis for bilateral symmetry pairs.
pub const MIRROR_TOLERANCE: f64 = 0.2;

/// Confidence floor of every computed pulse.
pub const BASE_CONFIDENCE: f64 = 0.85;

/// Confidence ceiling of every computed pulse.
pub const MAX_CONFIDENCE: f64 = 0.99;

/// Prediction confidence above which the habit is considered active.
pub const HABIT_ACTIVE_CONFIDENCE: f64 = 0.35;

/// Prediction confidence above which a habit outcome counts as a success.
pub const HABIT_SUCCESS_CONFIDENCE: f64 = 0.4;

/// Seconds in the "recent" window of an evidence summary (7 days).
pub const RECENT_EVIDENCE_SECS: f64 = 7.0 * 24.0 * 3600.0;

/// Seed hypotheses maintained by the controller.
pub const HYPOTHESIS_HABIT: &str = "habit_continues";
pub const HYPOTHESIS_JUMP: &str = "jump_necessary";
pub const HYPOTHESIS_GUARD: &str = "guard_sufficient";
