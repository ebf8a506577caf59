pub mod config;
pub mod error;
pub mod schema;
pub mod sinks;
pub mod store;

pub use error::{Result, StoreError};
pub use sinks::{SqliteCache, TRACE_BATCH, TraceLog};
pub use store::{Store, StoreStats};
