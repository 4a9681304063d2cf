//! Telemetry for the load generator: rolling throughput, counters, component
//! health and tracing setup.

pub mod aggregator;
pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use aggregator::*;
pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
