//! End-to-end tests for the load loop.
//!
//! These run the real scheduler, gates, buffer pool and backpressure poller
//! against a mock dispatcher on a paused clock:
//! RateGate → ConcurrencyGate → BatchBufferPool → MockDispatcher

use std::collections::HashSet;
use std::time::Duration;

use integration_tests::{fixtures, setup::TestContext};

/// 100 msg/s in batches of 10 for two seconds with an empty queue.
#[tokio::test(start_paused = true)]
async fn test_reference_rate_e2e() {
    let ctx = TestContext::new(fixtures::reference_config());

    let summary = ctx.run_for(Duration::from_secs(2)).await;

    let messages = ctx.dispatcher.message_count();
    assert!(
        (180..=220).contains(&messages),
        "dispatched {messages} messages, expected about 200"
    );
    assert!(
        (18..=22).contains(&ctx.dispatcher.batch_count()),
        "dispatched {} batches",
        ctx.dispatcher.batch_count()
    );
    assert!(!ctx.is_paused());
    assert_eq!(summary.abandoned, 0);
    assert_eq!(summary.completed, summary.batches_offered);

    let snapshot = ctx.scheduler.snapshot();
    assert_eq!(snapshot.messages_sent, messages as u64);
    assert_eq!(snapshot.dispatch_faults, 0);
    assert!(!snapshot.paused);
}

/// Every batch goes to the configured destination.
#[tokio::test(start_paused = true)]
async fn test_batches_target_destination() {
    let config = loadgen_core::LoadConfig {
        destination: "audit.loadtest".to_string(),
        ..fixtures::reference_config()
    };
    let ctx = TestContext::new(config);

    ctx.run_for(Duration::from_millis(500)).await;

    let batches = ctx.dispatcher.captured_batches();
    assert!(!batches.is_empty());
    assert!(batches.iter().all(|b| b.destination == "audit.loadtest"));
    assert!(ctx.queue.queries().iter().all(|q| q == "audit.loadtest"));
}

/// Pooled buffers are refilled from the factory, so no message is sent twice.
#[tokio::test(start_paused = true)]
async fn test_pooled_batches_carry_fresh_messages() {
    let ctx = TestContext::new(fixtures::reference_config());

    ctx.run_for(Duration::from_secs(1)).await;

    let ids: Vec<String> = ctx
        .dispatcher
        .captured_batches()
        .into_iter()
        .flat_map(|b| b.message_ids)
        .collect();
    let unique: HashSet<&String> = ids.iter().collect();

    assert!(ids.len() >= 100);
    assert_eq!(unique.len(), ids.len());
    assert!(ctx.dispatcher.captured_batches().iter().all(|b| b.message_ids.len() == 10));
}

/// Grants never outpace the configured rate, even over short spans.
#[tokio::test(start_paused = true)]
async fn test_dispatch_spacing_respects_rate() {
    let ctx = TestContext::new(fixtures::reference_config());

    ctx.run_for(Duration::from_secs(1)).await;

    let batches = ctx.dispatcher.captured_batches();
    for pair in batches.windows(2) {
        assert!(
            pair[1].at.duration_since(pair[0].at) >= Duration::from_millis(100),
            "two batches within one 100ms window"
        );
    }
}

/// Dispatch failures are counted and the loop keeps producing.
#[tokio::test(start_paused = true)]
async fn test_faults_do_not_stop_production() {
    let ctx = TestContext::new(fixtures::reference_config());
    ctx.dispatcher.set_should_fail(true);

    let handle = ctx.start();
    tokio::time::sleep(Duration::from_millis(550)).await;

    let faults = ctx.scheduler.metrics().dispatch_faults.get();
    assert!(faults >= 5, "only {faults} faults");
    assert_eq!(ctx.dispatcher.batch_count(), 0);

    ctx.dispatcher.set_should_fail(false);
    tokio::time::sleep(Duration::from_millis(500)).await;
    let summary = ctx.stop(handle).await;

    assert!(ctx.dispatcher.batch_count() >= 4);
    let snapshot = ctx.scheduler.snapshot();
    assert_eq!(
        snapshot.dispatch_faults + snapshot.batches_sent,
        summary.batches_offered
    );
    assert!(!ctx.is_paused());
}

/// Telemetry rates pick up successful sends.
#[tokio::test(start_paused = true)]
async fn test_snapshot_serializes() {
    let ctx = TestContext::new(fixtures::reference_config());

    ctx.run_for(Duration::from_millis(300)).await;

    let snapshot = ctx.scheduler.snapshot();
    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["paused"], false);
    assert_eq!(json["queue_depth"], 0);
    assert!(json["rates"]["lifetime_per_second"].is_number());
    assert_eq!(ctx.scheduler.throughput().total(), snapshot.messages_sent);
}
