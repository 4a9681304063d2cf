//! Wires the load loop, the backpressure poller and the reporter together.

use loadgen_core::{LoadConfig, MessageFactory, Result};
use std::sync::Arc;
use telemetry::{Metrics, TelemetrySnapshot, ThroughputAggregator};
use throttle::{ConcurrencyGate, RateGate, RateGateSettings};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use transport::{Dispatcher, QueueLengthSource};

use crate::backpressure::BackpressureController;
use crate::load_loop::{LoadLoop, LoadLoopConfig, LoadSummary};

/// Owns every moving part of one load run.
pub struct LoadScheduler {
    config: LoadConfig,
    gate: Arc<ConcurrencyGate>,
    controller: Arc<BackpressureController>,
    load: LoadLoop,
    metrics: Arc<Metrics>,
    throughput: Arc<ThroughputAggregator>,
    cancel: CancellationToken,
}

impl LoadScheduler {
    /// Builds a scheduler. Fails if `config` is out of range.
    pub fn new(
        config: LoadConfig,
        dispatcher: Arc<dyn Dispatcher>,
        source: Arc<dyn QueueLengthSource>,
        factory: Arc<dyn MessageFactory>,
    ) -> Result<Self> {
        let config = config.validated()?;
        let metrics = Arc::new(Metrics::new());
        let throughput = Arc::new(ThroughputAggregator::new());
        let gate = Arc::new(ConcurrencyGate::new(config.max_concurrency));

        let settings = RateGateSettings::derive(config.rate_limit, config.batch_size);
        let rate = Arc::new(RateGate::from_settings(settings));

        let controller = Arc::new(BackpressureController::new(
            gate.clone(),
            source,
            config.destination.clone(),
            config.max_queue_length,
            config.poll_interval(),
            metrics.clone(),
            throughput.clone(),
        ));

        let load = LoadLoop::new(
            LoadLoopConfig {
                destination: config.destination.clone(),
                batch_size: config.batch_size,
                shutdown_grace: config.shutdown_grace(),
            },
            rate,
            gate.clone(),
            dispatcher,
            factory,
            metrics.clone(),
            throughput.clone(),
        );

        Ok(Self {
            config,
            gate,
            controller,
            load,
            metrics,
            throughput,
            cancel: CancellationToken::new(),
        })
    }

    /// Token that stops the whole run when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn controller(&self) -> &Arc<BackpressureController> {
        &self.controller
    }

    pub fn gate(&self) -> &Arc<ConcurrencyGate> {
        &self.gate
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn throughput(&self) -> &Arc<ThroughputAggregator> {
        &self.throughput
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.metrics.snapshot(&self.throughput)
    }

    /// Starts the backpressure poller and the telemetry reporter.
    pub fn start_background(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let controller = self.controller.clone();
        let cancel = self.cancel.clone();
        handles.push(tokio::spawn(async move {
            controller.run(cancel).await;
        }));

        let metrics = self.metrics.clone();
        let throughput = self.throughput.clone();
        let cancel = self.cancel.clone();
        let report_interval = self.config.report_interval();
        handles.push(tokio::spawn(async move {
            let mut ticker = interval(report_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Skip the immediate first tick; nothing has happened yet.
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => report(&metrics.snapshot(&throughput)),
                }
            }
        }));

        info!("Background workers started");
        handles
    }

    /// Runs until the cancel token fires, then shuts everything down.
    pub async fn run(&self) -> LoadSummary {
        info!(
            destination = %self.config.destination,
            is_error = self.config.is_error,
            rate_limit = self.config.rate_limit,
            batch_size = self.config.batch_size,
            max_concurrency = self.config.max_concurrency,
            max_queue_length = self.config.max_queue_length,
            "Load run starting"
        );

        let handles = self.start_background();
        let summary = self.load.run(self.cancel.clone()).await;

        // The load loop only returns once cancelled; make sure the rest follow.
        self.cancel.cancel();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Background worker panicked: {}", e);
            }
        }

        report(&self.snapshot());
        summary
    }
}

fn report(snapshot: &TelemetrySnapshot) {
    match serde_json::to_string(snapshot) {
        Ok(json) => info!(
            paused = snapshot.paused,
            health = ?snapshot.health.status,
            messages_sent = snapshot.messages_sent,
            dispatch_faults = snapshot.dispatch_faults,
            current_per_second = snapshot.rates.current_per_second,
            snapshot = %json,
            "Load report"
        ),
        Err(e) => warn!("Failed to serialize telemetry snapshot: {}", e),
    }
}
