//! Transport collaborators for the load generator.
//!
//! - [`Dispatcher`] and [`QueueLengthSource`], the two capabilities the load
//!   engine consumes
//! - [`BatchBufferPool`], pooled batch buffers handed to dispatchers
//! - the filesystem learning transport

pub mod batch;
pub mod config;
pub mod dispatch;
pub mod health;
pub mod learning;

pub use batch::*;
pub use config::*;
pub use dispatch::*;
pub use learning::*;
