//! In-process metrics for the load engine.
//!
//! Collected in memory and reported periodically through tracing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::aggregator::{Rates, ThroughputAggregator};
use crate::health::{health, HealthReport};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Histogram for latency tracking.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (i, &bound) in Self::BUCKET_BOUNDS.iter().enumerate() {
            if ms <= bound {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        // Value exceeds all buckets, add to last
        self.buckets[10].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns bucket counts.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the load engine.
#[derive(Debug, Default)]
pub struct Metrics {
    // Load loop
    pub batches_offered: Counter,
    pub messages_offered: Counter,
    pub batches_sent: Counter,
    pub messages_sent: Counter,
    pub dispatch_faults: Counter,

    // Backpressure
    pub queue_polls: Counter,
    pub queue_length_errors: Counter,
    pub drains: Counter,
    pub refills: Counter,

    pub dispatch_latency_ms: Histogram,

    // Gauges
    pub in_flight: Gauge,
    pub queue_depth: Gauge,
    pub paused: Gauge,

    /// Set once any depth query has succeeded.
    queue_depth_known: AtomicBool,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successfully observed queue depth.
    pub fn record_queue_depth(&self, depth: u64) {
        self.queue_depth.set(depth);
        self.queue_depth_known.store(true, Ordering::Release);
    }

    /// Last observed depth, `None` until a query has succeeded.
    pub fn observed_queue_depth(&self) -> Option<u64> {
        self.queue_depth_known
            .load(Ordering::Acquire)
            .then(|| self.queue_depth.get())
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub timestamp: DateTime<Utc>,
    pub rates: Rates,
    pub paused: bool,
    /// Last reported depth, `None` until a poll has succeeded.
    pub queue_depth: Option<u64>,
    pub batches_offered: u64,
    pub messages_offered: u64,
    pub batches_sent: u64,
    pub messages_sent: u64,
    pub dispatch_faults: u64,
    pub queue_length_errors: u64,
    pub drains: u64,
    pub refills: u64,
    pub in_flight: u64,
    pub dispatch_latency_mean_ms: f64,
    pub health: HealthReport,
}

impl Metrics {
    /// Takes a snapshot of current metrics together with rolling rates.
    pub fn snapshot(&self, throughput: &ThroughputAggregator) -> TelemetrySnapshot {
        TelemetrySnapshot {
            timestamp: Utc::now(),
            rates: throughput.rates(),
            paused: self.paused.get() > 0,
            queue_depth: self.observed_queue_depth(),
            batches_offered: self.batches_offered.get(),
            messages_offered: self.messages_offered.get(),
            batches_sent: self.batches_sent.get(),
            messages_sent: self.messages_sent.get(),
            dispatch_faults: self.dispatch_faults.get(),
            queue_length_errors: self.queue_length_errors.get(),
            drains: self.drains.get(),
            refills: self.refills.get(),
            in_flight: self.in_flight.get(),
            dispatch_latency_mean_ms: self.dispatch_latency_ms.mean(),
            health: health().report(),
        }
    }
}
