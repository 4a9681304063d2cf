//! Admission control for the load engine.
//!
//! - [`RateGate`] paces batches to the configured message rate
//! - [`ConcurrencyGate`] bounds in-flight batches and is the lever the
//!   backpressure controller pulls to pause and resume production

pub mod concurrency;
pub mod rate_gate;

pub use concurrency::*;
pub use rate_gate::*;
