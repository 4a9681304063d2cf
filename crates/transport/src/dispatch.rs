//! Outbound dispatch and queue-length capabilities.
//!
//! The load engine depends only on these two traits; concrete transports live
//! alongside them (see [`crate::learning`]) and tests substitute mocks.

use async_trait::async_trait;
use loadgen_core::{OutboundMessage, Result};

/// Sends a batch of messages to a destination queue.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Dispatches every message in `batch` to `destination`.
    ///
    /// The batch is borrowed from a pooled buffer; implementations must not
    /// keep references past the returned future.
    async fn dispatch(&self, destination: &str, batch: &[OutboundMessage]) -> Result<()>;
}

/// Reports the current depth of a queue.
#[async_trait]
pub trait QueueLengthSource: Send + Sync {
    async fn queue_length(&self, queue: &str) -> Result<u64>;
}
