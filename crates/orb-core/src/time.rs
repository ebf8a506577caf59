//! Wall-clock helpers. Everything in the core that needs "now" goes through
//! here so tests can use the explicit `*_at` variants instead.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current UTC time as whole Unix seconds.
pub fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Current UTC time as fractional Unix seconds.
pub fn now_unix_secs_f64() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
