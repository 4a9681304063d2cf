//! Queue-depth backpressure through the full scheduler.

use std::time::Duration;

use integration_tests::{fixtures, setup::TestContext};
use worker::RunState;

const POLL: Duration = Duration::from_secs(1);

/// Dispatching plateaus within one poll interval of the queue overflowing and
/// resumes within one poll interval of it draining.
#[tokio::test(start_paused = true)]
async fn test_overflow_pauses_and_recovery_resumes() {
    let ctx = TestContext::new(fixtures::config_with(100, POLL.as_millis() as u64));
    let handle = ctx.start();

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    let before_overflow = ctx.dispatcher.batch_count();
    assert!(before_overflow > 0);

    ctx.queue.set_depth(1_000_000);
    tokio::time::sleep(POLL + Duration::from_millis(100)).await;
    assert!(ctx.is_paused());
    let plateau = ctx.dispatcher.batch_count();

    tokio::time::sleep(POLL * 3).await;
    assert_eq!(ctx.dispatcher.batch_count(), plateau, "dispatched while paused");
    assert_eq!(ctx.scheduler.gate().available(), 0);

    ctx.queue.set_depth(0);
    tokio::time::sleep(POLL + Duration::from_millis(100)).await;
    assert_eq!(ctx.scheduler.controller().state(), RunState::Running);
    assert!(
        ctx.dispatcher.batch_count() > plateau,
        "no batches after recovery"
    );

    ctx.stop(handle).await;

    let controller = ctx.scheduler.controller();
    assert_eq!(controller.drain_count(), 1);
    assert_eq!(controller.refill_count(), 1);
}

/// Consecutive over-threshold polls drain only once.
#[tokio::test(start_paused = true)]
async fn test_sustained_overflow_drains_once() {
    let ctx = TestContext::with_depth(
        fixtures::config_with(100, POLL.as_millis() as u64),
        1_000_000,
    );

    let handle = ctx.start();
    tokio::time::sleep(POLL * 3 + Duration::from_millis(500)).await;

    assert!(ctx.is_paused());
    assert!(ctx.scheduler.metrics().queue_polls.get() >= 3);
    assert_eq!(ctx.scheduler.controller().drain_count(), 1);
    assert!(ctx.scheduler.snapshot().paused);

    ctx.stop(handle).await;
}

/// A depth exactly at the threshold keeps producing.
#[tokio::test(start_paused = true)]
async fn test_depth_at_threshold_keeps_running() {
    let config = fixtures::config_with(100, POLL.as_millis() as u64);
    let threshold = config.max_queue_length;
    let ctx = TestContext::with_depth(config, threshold);

    ctx.run_for(POLL * 2).await;

    assert!(!ctx.is_paused());
    assert_eq!(ctx.scheduler.controller().drain_count(), 0);
    assert!(ctx.dispatcher.batch_count() >= 18);
}

/// Failed depth queries leave production alone.
#[tokio::test(start_paused = true)]
async fn test_queue_length_errors_do_not_pause() {
    let ctx = TestContext::new(fixtures::config_with(100, POLL.as_millis() as u64));
    ctx.queue.set_should_fail(true);

    ctx.run_for(POLL * 2 + Duration::from_millis(100)).await;

    assert!(!ctx.is_paused());
    assert!(ctx.dispatcher.batch_count() > 0);
    let snapshot = ctx.scheduler.snapshot();
    assert!(snapshot.queue_length_errors >= 2);
    assert_eq!(snapshot.queue_depth, None);
}

/// A failed query while paused keeps the run paused.
#[tokio::test(start_paused = true)]
async fn test_queue_length_error_while_paused_stays_paused() {
    let ctx = TestContext::with_depth(
        fixtures::config_with(100, POLL.as_millis() as u64),
        1_000_000,
    );

    let handle = ctx.start();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(ctx.is_paused());

    ctx.queue.set_should_fail(true);
    tokio::time::sleep(POLL * 2).await;
    assert!(ctx.is_paused());
    assert_eq!(ctx.scheduler.controller().refill_count(), 0);

    ctx.stop(handle).await;
}

/// The depth stays unknown while a query is outstanding after a failed one.
#[tokio::test(start_paused = true)]
async fn test_depth_unknown_until_query_succeeds() {
    let ctx = TestContext::new(fixtures::config_with(100, POLL.as_millis() as u64));
    ctx.queue.set_should_fail(true);

    let handle = ctx.start();
    tokio::time::sleep(Duration::from_millis(500)).await;
    ctx.queue.set_should_fail(false);
    ctx.queue.set_hang(true);

    tokio::time::sleep(POLL).await;
    let snapshot = ctx.scheduler.snapshot();
    assert_eq!(ctx.queue.queries().len(), 2);
    assert_eq!(snapshot.queue_length_errors, 1);
    assert_eq!(snapshot.queue_depth, None);
    assert_eq!(snapshot.health.components.len(), 2);

    ctx.stop(handle).await;
}
