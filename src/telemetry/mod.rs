//! Logging setup and engine counters.

mod stats;
mod tracing;

pub use self::stats::{EngineStats, StatsSnapshot};
pub use self::tracing::{init_tracing, TracingConfig};
