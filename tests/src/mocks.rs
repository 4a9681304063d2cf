//! Mock implementations for testing.

use async_trait::async_trait;
use loadgen_core::{OutboundMessage, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use transport::{Dispatcher, QueueLengthSource};

/// One batch as the mock dispatcher received it.
#[derive(Debug, Clone)]
pub struct CapturedBatch {
    pub destination: String,
    pub message_ids: Vec<String>,
    pub at: Instant,
}

/// Mock dispatcher that records every batch in memory.
///
/// Implements the same `Dispatcher` trait as the learning transport, so the
/// load loop runs its real code paths without touching the filesystem.
#[derive(Clone)]
pub struct MockDispatcher {
    batches: Arc<Mutex<Vec<CapturedBatch>>>,
    should_fail: Arc<Mutex<bool>>,
    delay: Arc<Mutex<Duration>>,
}

impl MockDispatcher {
    pub fn new() -> Self {
        Self {
            batches: Arc::new(Mutex::new(Vec::new())),
            should_fail: Arc::new(Mutex::new(false)),
            delay: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Get all captured batches.
    pub fn captured_batches(&self) -> Vec<CapturedBatch> {
        self.batches.lock().clone()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().len()
    }

    /// Messages across every captured batch.
    pub fn message_count(&self) -> usize {
        self.batches.lock().iter().map(|b| b.message_ids.len()).sum()
    }

    /// Set failure mode for testing error handling.
    pub fn set_should_fail(&self, fail: bool) {
        *self.should_fail.lock() = fail;
    }

    /// Make every dispatch take `delay` before completing.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }
}

impl Default for MockDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Dispatcher for MockDispatcher {
    async fn dispatch(&self, destination: &str, batch: &[OutboundMessage]) -> Result<()> {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if *self.should_fail.lock() {
            return Err(loadgen_core::Error::dispatch(destination, "Mock dispatcher failure"));
        }

        self.batches.lock().push(CapturedBatch {
            destination: destination.to_string(),
            message_ids: batch.iter().map(|m| m.id.clone()).collect(),
            at: Instant::now(),
        });
        Ok(())
    }
}

/// Queue length source whose depth the test controls.
#[derive(Clone)]
pub struct MockQueueLength {
    depth: Arc<Mutex<u64>>,
    should_fail: Arc<Mutex<bool>>,
    hang: Arc<Mutex<bool>>,
    queries: Arc<Mutex<Vec<String>>>,
}

impl MockQueueLength {
    pub fn new(depth: u64) -> Self {
        Self {
            depth: Arc::new(Mutex::new(depth)),
            should_fail: Arc::new(Mutex::new(false)),
            hang: Arc::new(Mutex::new(false)),
            queries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn set_depth(&self, depth: u64) {
        *self.depth.lock() = depth;
    }

    pub fn set_should_fail(&self, fail: bool) {
        *self.should_fail.lock() = fail;
    }

    /// Make every later query wait forever without answering.
    pub fn set_hang(&self, hang: bool) {
        *self.hang.lock() = hang;
    }

    /// Queue names asked for, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl QueueLengthSource for MockQueueLength {
    async fn queue_length(&self, queue: &str) -> Result<u64> {
        self.queries.lock().push(queue.to_string());
        if *self.hang.lock() {
            std::future::pending::<()>().await;
        }
        if *self.should_fail.lock() {
            return Err(loadgen_core::Error::queue_length(queue, "Mock queue length failure"));
        }
        Ok(*self.depth.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str) -> OutboundMessage {
        OutboundMessage {
            id: id.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_mock_dispatcher_captures_batches() {
        let mock = MockDispatcher::new();

        mock.dispatch("audit", &[message("a"), message("b")]).await.unwrap();

        assert_eq!(mock.batch_count(), 1);
        assert_eq!(mock.message_count(), 2);
        let captured = mock.captured_batches();
        assert_eq!(captured[0].destination, "audit");
        assert_eq!(captured[0].message_ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_mock_dispatcher_failure_mode() {
        let mock = MockDispatcher::new();
        mock.set_should_fail(true);

        assert!(mock.dispatch("audit", &[message("a")]).await.is_err());
        assert_eq!(mock.batch_count(), 0);
    }

    #[tokio::test]
    async fn test_mock_queue_length() {
        let mock = MockQueueLength::new(7);
        assert_eq!(mock.queue_length("audit").await.unwrap(), 7);

        mock.set_depth(9);
        assert_eq!(mock.queue_length("audit").await.unwrap(), 9);

        mock.set_should_fail(true);
        assert!(mock.queue_length("audit").await.is_err());
        assert_eq!(mock.queries().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_queue_length_hang() {
        let mock = MockQueueLength::new(7);
        mock.set_hang(true);

        let query = tokio::time::timeout(Duration::from_secs(60), mock.queue_length("audit"));
        assert!(query.await.is_err());
        assert_eq!(mock.queries(), vec!["audit"]);
    }
}
