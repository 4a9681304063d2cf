//! The load engine.
//!
//! - Load loop (rate gate → concurrency gate → buffer pool → dispatcher)
//! - Backpressure controller (queue depth → pause/resume)
//! - Scheduler (wiring, telemetry reporter, shutdown)

pub mod backpressure;
pub mod load_loop;
pub mod scheduler;

pub use backpressure::{BackpressureController, RunState, Transition};
pub use load_loop::*;
pub use scheduler::*;
