//! Core types, configuration, and errors for the queue load generator.

pub mod config;
pub mod error;
pub mod message;

pub use config::*;
pub use error::{Error, Result};
pub use message::*;
