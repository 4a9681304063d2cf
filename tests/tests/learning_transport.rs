//! The scheduler against the filesystem learning transport.
//!
//! Runs on the real clock; file I/O goes through blocking threads.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use integration_tests::fixtures;
use loadgen_core::LoadConfig;
use transport::{Dispatcher, LearningDispatcher, LearningQueueLength, QueueLengthSource};
use worker::LoadScheduler;

fn metadata_files(queue: &Path) -> usize {
    std::fs::read_dir(queue)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_name().to_string_lossy().ends_with(".metadata.txt"))
                .count()
        })
        .unwrap_or(0)
}

fn scheduler(root: &Path, config: LoadConfig, is_error: bool) -> Arc<LoadScheduler> {
    let factory = if is_error {
        fixtures::error_factory()
    } else {
        fixtures::audit_factory()
    };
    Arc::new(LoadScheduler::new(
        config,
        Arc::new(LearningDispatcher::new(root)),
        Arc::new(LearningQueueLength::new(root)),
        factory,
    )
    .unwrap())
}

async fn run_for(scheduler: &Arc<LoadScheduler>, duration: Duration) -> worker::LoadSummary {
    let handle = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run().await })
    };
    tokio::time::sleep(duration).await;
    scheduler.cancel_token().cancel();
    handle.await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_messages_land_in_queue_directory() {
    let dir = tempfile::tempdir().unwrap();
    let config = LoadConfig {
        rate_limit: 200,
        ..fixtures::reference_config()
    };
    let scheduler = scheduler(dir.path(), config, false);

    let summary = run_for(&scheduler, Duration::from_millis(500)).await;

    let queue = dir.path().join("audit");
    let files = metadata_files(&queue);
    assert!(files > 0);
    assert_eq!(files as u64, scheduler.snapshot().messages_sent);
    assert_eq!(files as u64, summary.completed * 10);

    let depth = LearningQueueLength::new(dir.path())
        .queue_length("audit")
        .await
        .unwrap();
    assert_eq!(depth, files as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_error_shape_headers_written() {
    let dir = tempfile::tempdir().unwrap();
    let config = LoadConfig {
        destination: "error".to_string(),
        is_error: true,
        ..fixtures::reference_config()
    };
    let scheduler = scheduler(dir.path(), config, true);

    run_for(&scheduler, Duration::from_millis(250)).await;

    let queue = dir.path().join("error");
    let entry = std::fs::read_dir(&queue)
        .unwrap()
        .filter_map(|e| e.ok())
        .find(|e| e.file_name().to_string_lossy().ends_with(".metadata.txt"))
        .expect("no message written");
    let headers: BTreeMap<String, String> =
        serde_json::from_slice(&std::fs::read(entry.path()).unwrap()).unwrap();

    assert!(headers.contains_key("NServiceBus.FailedQ"));
    assert!(headers.contains_key("NServiceBus.ExceptionInfo.Message"));
    assert!(queue.join(".bodies").is_dir());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_backlog_pauses_production() {
    let dir = tempfile::tempdir().unwrap();
    let config = LoadConfig {
        rate_limit: 200,
        max_queue_length: 50,
        poll_interval_ms: 100,
        ..fixtures::reference_config()
    };
    let scheduler = scheduler(dir.path(), config, false);

    run_for(&scheduler, Duration::from_millis(1_500)).await;

    let files = metadata_files(&dir.path().join("audit"));
    assert!(scheduler.controller().is_paused());
    assert!(files > 50);
    // Unthrottled, 1.5s at 200 msg/s is about 300 messages.
    assert!(files < 200, "wrote {files} messages despite the backlog");
}

#[tokio::test]
async fn test_direct_dispatch_counts() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = LearningDispatcher::new(dir.path());

    dispatcher
        .dispatch("audit", &fixtures::messages("batch", 12))
        .await
        .unwrap();

    assert_eq!(metadata_files(&dir.path().join("audit")), 12);
}
