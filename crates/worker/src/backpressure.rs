//! Queue-depth driven pause/resume.
//!
//! The controller polls the destination's backlog. When it exceeds the
//! threshold, production pauses by taking every slot of the concurrency gate;
//! when the backlog falls back to or below the threshold, the slots are handed
//! back.

use loadgen_core::{Error, Result};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use telemetry::{health, Metrics, ThroughputAggregator};
use throttle::ConcurrencyGate;
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use transport::QueueLengthSource;

/// Whether the load loop may dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    Running = 0,
    Paused = 1,
}

impl RunState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Paused,
            _ => Self::Running,
        }
    }
}

/// Run state cell. Only changes through [`AtomicRunState::transition`].
#[derive(Debug)]
struct AtomicRunState(AtomicU8);

impl AtomicRunState {
    fn new(state: RunState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn load(&self) -> RunState {
        RunState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves `from` to `to`. Returns `true` only for the caller that won.
    fn transition(&self, from: RunState, to: RunState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Outcome of evaluating one depth observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Paused,
    Resumed,
    Unchanged,
}

pub struct BackpressureController {
    gate: Arc<ConcurrencyGate>,
    source: Arc<dyn QueueLengthSource>,
    destination: String,
    threshold: u64,
    poll_interval: Duration,
    state: AtomicRunState,
    // Held for the whole of a drain or refill.
    transitions: Mutex<()>,
    metrics: Arc<Metrics>,
    throughput: Arc<ThroughputAggregator>,
}

impl BackpressureController {
    pub fn new(
        gate: Arc<ConcurrencyGate>,
        source: Arc<dyn QueueLengthSource>,
        destination: impl Into<String>,
        threshold: u64,
        poll_interval: Duration,
        metrics: Arc<Metrics>,
        throughput: Arc<ThroughputAggregator>,
    ) -> Self {
        Self {
            gate,
            source,
            destination: destination.into(),
            threshold,
            poll_interval,
            state: AtomicRunState::new(RunState::Running),
            transitions: Mutex::new(()),
            metrics,
            throughput,
        }
    }

    pub fn state(&self) -> RunState {
        self.state.load()
    }

    pub fn is_paused(&self) -> bool {
        self.state() == RunState::Paused
    }

    /// Completed drains.
    pub fn drain_count(&self) -> u64 {
        self.metrics.drains.get()
    }

    /// Completed refills.
    pub fn refill_count(&self) -> u64 {
        self.metrics.refills.get()
    }

    /// Applies one depth observation.
    ///
    /// Pausing waits until every in-flight batch has released its slot. Only
    /// the caller that wins the state change drains or refills.
    pub async fn evaluate(&self, depth: u64, cancel: &CancellationToken) -> Result<Transition> {
        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            guard = self.transitions.lock() => guard,
        };

        if depth > self.threshold {
            if !self.state.transition(RunState::Running, RunState::Paused) {
                return Ok(Transition::Unchanged);
            }

            self.metrics.paused.set(1);
            info!(
                queue = %self.destination,
                depth,
                threshold = self.threshold,
                "Queue over threshold, pausing"
            );
            self.gate.drain(cancel).await?;
            self.metrics.drains.inc();
            debug!(capacity = self.gate.capacity(), "Concurrency gate drained");
            Ok(Transition::Paused)
        } else {
            if !self.state.transition(RunState::Paused, RunState::Running) {
                return Ok(Transition::Unchanged);
            }

            let released = self.gate.refill();
            self.metrics.refills.inc();
            self.metrics.paused.set(0);
            info!(
                queue = %self.destination,
                depth,
                threshold = self.threshold,
                released,
                "Queue back under threshold, resuming"
            );
            Ok(Transition::Resumed)
        }
    }

    /// Queries the backlog once and evaluates it.
    ///
    /// A failed query changes nothing and is returned to the caller. The query
    /// is abandoned if `cancel` fires first.
    pub async fn poll_once(&self, cancel: &CancellationToken) -> Result<Transition> {
        self.metrics.queue_polls.inc();

        let queried = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            queried = self.source.queue_length(&self.destination) => queried,
        };

        let depth = match queried {
            Ok(depth) => depth,
            Err(e) => {
                self.metrics.queue_length_errors.inc();
                health().queue_length.set_unhealthy(e.to_string());
                warn!(queue = %self.destination, error = %e, "Queue length query failed");
                return Err(e);
            }
        };

        health().queue_length.set_healthy();
        self.metrics.record_queue_depth(depth);

        let rates = self.throughput.rates();
        info!(
            queue = %self.destination,
            depth,
            paused = self.is_paused(),
            current_per_second = rates.current_per_second,
            last_ten_seconds_per_second = rates.last_ten_seconds_per_second,
            "Queue depth"
        );

        self.evaluate(depth, cancel).await
    }

    /// Polls until cancelled. The first poll happens immediately.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            queue = %self.destination,
            threshold = self.threshold,
            interval_ms = self.poll_interval.as_millis() as u64,
            "Backpressure poller starting"
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.poll_once(&cancel).await {
                Ok(_) => {}
                Err(e) if e.is_cancelled() => break,
                // Already logged and counted.
                Err(_) => {}
            }
        }

        info!(queue = %self.destination, "Backpressure poller stopped");
    }
}
