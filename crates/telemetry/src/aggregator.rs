//! Rolling throughput rates over several trailing windows.
//!
//! Raw `(timestamp, value)` samples are kept only for the current wall-clock
//! second. When an observation lands in a later second, the pending samples are
//! summed into a one-second bucket keyed by the last rolled second. Windows of
//! ten seconds and longer are answered from buckets; buckets older than an
//! hour are evicted as observations arrive.

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

const MILLIS_PER_SECOND: i64 = 1000;
const TEN_SECONDS_MS: i64 = 10 * MILLIS_PER_SECOND;
const ONE_MINUTE_MS: i64 = 60 * MILLIS_PER_SECOND;
const TEN_MINUTES_MS: i64 = 10 * ONE_MINUTE_MS;
const ONE_HOUR_MS: i64 = 60 * ONE_MINUTE_MS;

#[derive(Debug, Clone, Copy)]
struct Sample {
    at_ms: i64,
    value: u64,
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    second: i64,
    sum: u64,
}

impl Bucket {
    fn start_ms(&self) -> i64 {
        self.second * MILLIS_PER_SECOND
    }
}

/// Per-second rates over each supported window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rates {
    /// Absolute count observed in the trailing second.
    pub current_per_second: f64,
    pub last_ten_seconds_per_second: f64,
    pub last_minute_per_second: f64,
    pub last_ten_minutes_per_second: f64,
    pub last_hour_per_second: f64,
    pub lifetime_per_second: f64,
}

/// Aggregates observed counts into rolling rates.
///
/// `observe` may be called from any number of tasks. Second rollover is
/// claimed with a compare-and-swap on the last rolled second, so exactly one
/// caller folds each second's samples into a bucket.
#[derive(Debug)]
pub struct ThroughputAggregator {
    started_at_ms: i64,
    total: AtomicU64,
    last_rolled_second: AtomicI64,
    current: Mutex<VecDeque<Sample>>,
    buckets: Mutex<VecDeque<Bucket>>,
}

impl Default for ThroughputAggregator {
    fn default() -> Self {
        Self::new()
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl ThroughputAggregator {
    pub fn new() -> Self {
        Self::starting_at(now_ms())
    }

    /// Creates an aggregator whose clock starts at `started_at_ms` (Unix millis).
    pub fn starting_at(started_at_ms: i64) -> Self {
        Self {
            started_at_ms,
            total: AtomicU64::new(0),
            last_rolled_second: AtomicI64::new(started_at_ms.div_euclid(MILLIS_PER_SECOND)),
            current: Mutex::new(VecDeque::new()),
            buckets: Mutex::new(VecDeque::new()),
        }
    }

    /// Records `value` completed units of work now.
    pub fn observe(&self, value: u64) {
        self.observe_at(value, now_ms());
    }

    /// Records `value` completed units of work at `at_ms` (Unix millis).
    pub fn observe_at(&self, value: u64, at_ms: i64) {
        self.total.fetch_add(value, Ordering::Relaxed);
        self.current.lock().push_back(Sample { at_ms, value });
        self.roll(at_ms);
        self.evict(at_ms);
    }

    /// Total units observed since creation.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Number of one-second buckets currently retained.
    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }

    fn roll(&self, at_ms: i64) {
        let second = at_ms.div_euclid(MILLIS_PER_SECOND);
        let last = self.last_rolled_second.load(Ordering::Acquire);
        if second <= last {
            return;
        }

        if self
            .last_rolled_second
            .compare_exchange(last, second, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Another observer claimed this rollover.
            return;
        }

        let boundary_ms = second * MILLIS_PER_SECOND;

        // Lock order: buckets, then samples.
        let mut buckets = self.buckets.lock();
        let sum = {
            let mut current = self.current.lock();
            let mut sum = 0u64;
            let mut rolled = 0usize;
            current.retain(|sample| {
                if sample.at_ms < boundary_ms {
                    sum += sample.value;
                    rolled += 1;
                    false
                } else {
                    true
                }
            });
            if rolled == 0 {
                return;
            }
            sum
        };

        // A rollover that lost the race for the bucket lock lands behind a
        // newer bucket; keep the deque ordered.
        let index = buckets.partition_point(|b| b.second < last);
        match buckets.get_mut(index) {
            Some(existing) if existing.second == last => existing.sum += sum,
            _ => buckets.insert(index, Bucket { second: last, sum }),
        }
    }

    fn evict(&self, now_ms: i64) {
        let cutoff = now_ms - ONE_HOUR_MS;
        let mut buckets = self.buckets.lock();
        while buckets.front().is_some_and(|b| b.start_ms() < cutoff) {
            buckets.pop_front();
        }
    }

    fn current_rate(&self, now_ms: i64) -> f64 {
        self.current
            .lock()
            .iter()
            .filter(|s| now_ms - s.at_ms <= MILLIS_PER_SECOND)
            .map(|s| s.value as f64)
            .sum()
    }

    fn window_rate(&self, window_ms: i64, now_ms: i64) -> f64 {
        let window_start = now_ms - window_ms;
        let buckets = self.buckets.lock();

        let mut sum = 0u64;
        let mut latest: Option<i64> = None;
        for bucket in buckets.iter().filter(|b| b.start_ms() >= window_start) {
            sum += bucket.sum;
            latest = Some(latest.map_or(bucket.start_ms(), |l| l.max(bucket.start_ms())));
        }

        match latest {
            // Stale data decays to zero instead of being projected forward.
            Some(latest) if now_ms - latest <= window_ms => {
                sum as f64 / (window_ms as f64 / MILLIS_PER_SECOND as f64)
            }
            _ => 0.0,
        }
    }

    fn lifetime_rate(&self, now_ms: i64) -> f64 {
        let elapsed_ms = now_ms - self.started_at_ms;
        if elapsed_ms <= 0 {
            return 0.0;
        }
        self.total() as f64 / (elapsed_ms as f64 / MILLIS_PER_SECOND as f64)
    }

    /// Current rates.
    pub fn rates(&self) -> Rates {
        self.rates_at(now_ms())
    }

    /// Rates as of `now_ms` (Unix millis).
    pub fn rates_at(&self, now_ms: i64) -> Rates {
        Rates {
            current_per_second: self.current_rate(now_ms),
            last_ten_seconds_per_second: self.window_rate(TEN_SECONDS_MS, now_ms),
            last_minute_per_second: self.window_rate(ONE_MINUTE_MS, now_ms),
            last_ten_minutes_per_second: self.window_rate(TEN_MINUTES_MS, now_ms),
            last_hour_per_second: self.window_rate(ONE_HOUR_MS, now_ms),
            lifetime_per_second: self.lifetime_rate(now_ms),
        }
    }
}
