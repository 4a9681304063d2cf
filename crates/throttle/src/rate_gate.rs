//! Sliding-window rate gate.

use loadgen_core::{Error, Result};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

/// Granularity used when splitting a per-second rate into permit windows.
const TICK: Duration = Duration::from_millis(100);

/// Permits-per-window derived from a message rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateGateSettings {
    pub permits: usize,
    pub window: Duration,
}

impl RateGateSettings {
    /// Derives batch permits from a target message rate.
    ///
    /// Each permit admits one batch of `batch_size` messages, so the gate runs
    /// at `rate_limit / batch_size` batches per second. Permits are handed out
    /// per 100ms tick; when that is less than one permit, the gate grants a
    /// single permit per correspondingly longer window.
    pub fn derive(rate_limit: u32, batch_size: usize) -> Self {
        let batches_per_second = f64::from(rate_limit.max(1)) / batch_size.max(1) as f64;
        let per_tick = batches_per_second * TICK.as_secs_f64();

        let permits = if per_tick < 1.0 {
            1
        } else {
            per_tick.floor() as usize
        };

        Self {
            permits,
            window: Duration::from_secs_f64(permits as f64 / batches_per_second),
        }
    }

    /// Effective batches per second.
    pub fn batches_per_second(&self) -> f64 {
        self.permits as f64 / self.window.as_secs_f64()
    }
}

/// Admits at most `permits` grants in any trailing `window`.
///
/// Grant instants are kept in a queue, so the bound holds over every interval
/// and not only over aligned buckets. Waiters queue on a fair mutex and are
/// served in arrival order.
pub struct RateGate {
    permits: usize,
    window: Duration,
    grants: Mutex<VecDeque<Instant>>,
}

impl RateGate {
    /// Allows `permits` grants per `window`.
    ///
    /// Zero permits is raised to one and the window is kept as given, so the
    /// rate is one per `window`. [`RateGateSettings::derive`] never yields
    /// zero permits.
    pub fn new(permits: usize, window: Duration) -> Self {
        Self {
            permits: permits.max(1),
            window,
            grants: Mutex::new(VecDeque::new()),
        }
    }

    pub fn from_settings(settings: RateGateSettings) -> Self {
        Self::new(settings.permits, settings.window)
    }

    pub fn permits(&self) -> usize {
        self.permits
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Waits for a permit and consumes it.
    ///
    /// Returns `Error::Cancelled` without consuming anything if `cancel` fires
    /// first.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        let mut grants = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            grants = self.grants.lock() => grants,
        };

        loop {
            let now = Instant::now();
            while let Some(&oldest) = grants.front() {
                if now.duration_since(oldest) >= self.window {
                    grants.pop_front();
                } else {
                    break;
                }
            }

            if grants.len() < self.permits {
                grants.push_back(now);
                return Ok(());
            }

            let Some(&oldest) = grants.front() else {
                continue;
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = sleep_until(oldest + self.window) => {}
            }
        }
    }
}
