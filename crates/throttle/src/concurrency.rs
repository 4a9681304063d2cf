//! Bounded concurrency gate.
//!
//! A counting semaphore whose permits are held outside of RAII guards while a
//! batch is in flight, so the backpressure controller can take every permit
//! (drain) and later hand them all back (refill) from a different task.

use loadgen_core::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Counting gate bounding in-flight batches.
///
/// `available() + held() == capacity()` whenever no acquire is mid-flight.
/// Waiters are served in FIFO order.
#[derive(Debug)]
pub struct ConcurrencyGate {
    semaphore: Semaphore,
    capacity: usize,
    held: AtomicUsize,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Semaphore::new(capacity),
            capacity,
            held: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Permits currently taken by slots or a drain.
    pub fn held(&self) -> usize {
        self.held.load(Ordering::Acquire)
    }

    /// Waits for one slot. The slot is released when dropped.
    pub async fn acquire(self: &Arc<Self>, cancel: &CancellationToken) -> Result<ConcurrencySlot> {
        self.acquire_many(1, cancel).await?;
        Ok(ConcurrencySlot {
            gate: Arc::clone(self),
        })
    }

    /// Takes a slot only if one is free right now.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ConcurrencySlot> {
        let permit = self.semaphore.try_acquire().ok()?;
        permit.forget();
        self.held.fetch_add(1, Ordering::AcqRel);
        Some(ConcurrencySlot {
            gate: Arc::clone(self),
        })
    }

    /// Waits until `n` permits are free and takes all of them at once.
    ///
    /// On cancellation no permit is taken.
    pub async fn acquire_many(&self, n: usize, cancel: &CancellationToken) -> Result<()> {
        let n = n.min(self.capacity);
        let count = u32::try_from(n).map_err(|_| Error::internal("permit count overflow"))?;

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            permit = self.semaphore.acquire_many(count) => permit
                .map_err(|_| Error::internal("concurrency gate closed"))?,
        };

        permit.forget();
        self.held.fetch_add(n, Ordering::AcqRel);
        Ok(())
    }

    /// Returns up to `n` permits, capped at the number currently held.
    ///
    /// Returns how many were actually released.
    pub fn release(&self, n: usize) -> usize {
        let previous = self
            .held
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |held| {
                Some(held - held.min(n))
            })
            .unwrap_or(0);

        let released = previous.min(n);
        if released > 0 {
            self.semaphore.add_permits(released);
        }
        released
    }

    /// Takes every permit, waiting for in-flight batches to finish first.
    pub async fn drain(&self, cancel: &CancellationToken) -> Result<()> {
        debug!(capacity = self.capacity, "Draining concurrency gate");
        self.acquire_many(self.capacity, cancel).await
    }

    /// Hands every held permit back.
    pub fn refill(&self) -> usize {
        let released = self.release(self.capacity);
        debug!(released, capacity = self.capacity, "Refilled concurrency gate");
        released
    }
}

/// One in-flight batch's share of the gate.
#[derive(Debug)]
pub struct ConcurrencySlot {
    gate: Arc<ConcurrencyGate>,
}

impl Drop for ConcurrencySlot {
    fn drop(&mut self) {
        self.gate.release(1);
    }
}
