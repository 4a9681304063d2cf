//! Load engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::error::Result;

/// Load engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoadConfig {
    /// Target queue name
    #[serde(default = "default_destination")]
    #[validate(length(min = 1, max = 260))]
    pub destination: String,
    /// Produce failed-message shaped messages instead of audit shaped ones
    #[serde(default)]
    pub is_error: bool,
    /// Queue depth above which production pauses
    #[serde(default = "default_max_queue_length")]
    #[validate(range(min = 1))]
    pub max_queue_length: u64,
    /// Target messages per second
    #[serde(default = "default_rate_limit")]
    #[validate(range(min = 1, max = 1000000))]
    pub rate_limit: u32,
    /// Maximum batches in flight
    #[serde(default = "default_max_concurrency")]
    #[validate(range(min = 1, max = 100000))]
    pub max_concurrency: usize,
    /// Messages per dispatched batch
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1, max = 100000))]
    pub batch_size: usize,
    /// Queue depth poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    #[validate(range(min = 10))]
    pub poll_interval_ms: u64,
    /// How long shutdown waits for in-flight batches, in milliseconds
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// Telemetry report interval in milliseconds
    #[serde(default = "default_report_interval_ms")]
    #[validate(range(min = 100))]
    pub report_interval_ms: u64,
}

fn default_destination() -> String {
    "audit".to_string()
}

fn default_max_queue_length() -> u64 {
    100_000
}

fn default_rate_limit() -> u32 {
    200
}

fn default_max_concurrency() -> usize {
    100
}

fn default_batch_size() -> usize {
    10
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_shutdown_grace_ms() -> u64 {
    10_000
}

fn default_report_interval_ms() -> u64 {
    5000
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            destination: default_destination(),
            is_error: false,
            max_queue_length: default_max_queue_length(),
            rate_limit: default_rate_limit(),
            max_concurrency: default_max_concurrency(),
            batch_size: default_batch_size(),
            poll_interval_ms: default_poll_interval_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            report_interval_ms: default_report_interval_ms(),
        }
    }
}

impl LoadConfig {
    /// Checks field ranges. Called once at startup; failure is fatal.
    pub fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }
}
