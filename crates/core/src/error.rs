//! Unified error types for the load generator.
//!
//! Only `Config` and `Validation` are fatal, and only at startup. Dispatch and
//! queue-length failures are transient and are absorbed by the engine loops.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the load generator.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// The dispatcher failed to deliver a batch.
    #[error("dispatch to {destination} failed: {message}")]
    Dispatch {
        destination: String,
        message: String,
    },

    /// The queue-length source could not report a depth.
    #[error("queue length query for {queue} failed: {message}")]
    QueueLength { queue: String, message: String },

    /// A wait was interrupted by shutdown.
    #[error("operation cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a dispatch error for the given destination.
    pub fn dispatch(destination: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Dispatch {
            destination: destination.into(),
            message: msg.into(),
        }
    }

    /// Create a queue-length query error for the given queue.
    pub fn queue_length(queue: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::QueueLength {
            queue: queue.into(),
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error came from a shutdown request rather than a fault.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
