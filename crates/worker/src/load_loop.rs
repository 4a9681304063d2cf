//! Rate-limited, concurrency-bounded batch production.

use loadgen_core::{MessageFactory, OutboundMessage};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use telemetry::{health, Metrics, ThroughputAggregator};
use throttle::{ConcurrencyGate, ConcurrencySlot, RateGate};
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use transport::{BatchBufferPool, Dispatcher};

/// Load loop settings.
#[derive(Debug, Clone)]
pub struct LoadLoopConfig {
    /// Queue every batch is sent to
    pub destination: String,
    /// Messages per batch
    pub batch_size: usize,
    /// How long shutdown waits for in-flight batches
    pub shutdown_grace: Duration,
}

/// What a finished run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Batches admitted by both gates and spawned.
    pub batches_offered: u64,
    /// Dispatch tasks that finished, successfully or not.
    pub completed: u64,
    /// Dispatch tasks still running when the grace period ran out.
    pub abandoned: u64,
}

pub struct LoadLoop {
    destination: Arc<str>,
    batch_size: usize,
    shutdown_grace: Duration,
    rate: Arc<RateGate>,
    gate: Arc<ConcurrencyGate>,
    pool: Arc<BatchBufferPool<OutboundMessage>>,
    dispatcher: Arc<dyn Dispatcher>,
    metrics: Arc<Metrics>,
    throughput: Arc<ThroughputAggregator>,
}

impl LoadLoop {
    pub fn new(
        config: LoadLoopConfig,
        rate: Arc<RateGate>,
        gate: Arc<ConcurrencyGate>,
        dispatcher: Arc<dyn Dispatcher>,
        factory: Arc<dyn MessageFactory>,
        metrics: Arc<Metrics>,
        throughput: Arc<ThroughputAggregator>,
    ) -> Self {
        let pool = Arc::new(BatchBufferPool::new(config.batch_size, move || {
            factory.create()
        }));

        Self {
            destination: Arc::from(config.destination),
            batch_size: pool.batch_size(),
            shutdown_grace: config.shutdown_grace,
            rate,
            gate,
            pool,
            dispatcher,
            metrics,
            throughput,
        }
    }

    pub fn pool(&self) -> &Arc<BatchBufferPool<OutboundMessage>> {
        &self.pool
    }

    /// Produces batches until `cancel` fires, then waits up to the shutdown
    /// grace period for in-flight batches.
    pub async fn run(&self, cancel: CancellationToken) -> LoadSummary {
        info!(
            destination = %self.destination,
            batch_size = self.batch_size,
            permits = self.rate.permits(),
            window_ms = self.rate.window().as_millis() as u64,
            max_concurrency = self.gate.capacity(),
            "Load loop starting"
        );

        let mut in_flight = JoinSet::new();
        let mut summary = LoadSummary::default();

        loop {
            while let Some(result) = in_flight.try_join_next() {
                summary.completed += 1;
                if let Err(e) = result {
                    error!(error = %e, "Dispatch task failed");
                }
            }

            if self.rate.wait(&cancel).await.is_err() {
                break;
            }

            let slot = match self.gate.acquire(&cancel).await {
                Ok(slot) => slot,
                Err(e) => {
                    if !e.is_cancelled() {
                        error!(error = %e, "Concurrency gate failed");
                    }
                    break;
                }
            };

            summary.batches_offered += 1;
            self.metrics.batches_offered.inc();
            self.metrics.messages_offered.inc_by(self.batch_size as u64);

            in_flight.spawn(self.dispatch_batch(slot));
        }

        info!(
            in_flight = in_flight.len(),
            grace_ms = self.shutdown_grace.as_millis() as u64,
            "Load loop stopping"
        );

        let deadline = Instant::now() + self.shutdown_grace;
        while !in_flight.is_empty() {
            match timeout_at(deadline, in_flight.join_next()).await {
                Ok(Some(result)) => {
                    summary.completed += 1;
                    if let Err(e) = result {
                        error!(error = %e, "Dispatch task failed");
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }

        summary.abandoned = in_flight.len() as u64;
        if summary.abandoned > 0 {
            warn!(abandoned = summary.abandoned, "Abandoning in-flight batches");
            in_flight.detach_all();
        }

        info!(
            batches_offered = summary.batches_offered,
            completed = summary.completed,
            abandoned = summary.abandoned,
            "Load loop stopped"
        );
        summary
    }

    fn dispatch_batch(&self, slot: ConcurrencySlot) -> impl Future<Output = ()> + Send + 'static {
        let destination = self.destination.clone();
        let pool = self.pool.clone();
        let dispatcher = self.dispatcher.clone();
        let metrics = self.metrics.clone();
        let throughput = self.throughput.clone();

        async move {
            metrics.in_flight.inc();
            let batch = pool.rent();
            let started = Instant::now();

            match dispatcher.dispatch(&destination, &batch).await {
                Ok(()) => {
                    let sent = batch.len() as u64;
                    metrics.batches_sent.inc();
                    metrics.messages_sent.inc_by(sent);
                    metrics
                        .dispatch_latency_ms
                        .observe(started.elapsed().as_millis() as u64);
                    throughput.observe(sent);
                    health().transport.set_healthy();
                    debug!(destination = %destination, sent, "Batch dispatched");
                }
                Err(e) => {
                    metrics.dispatch_faults.inc();
                    health().transport.set_unhealthy(e.to_string());
                    warn!(destination = %destination, error = %e, "Batch dispatch failed");
                }
            }

            drop(batch);
            drop(slot);
            metrics.in_flight.dec();
        }
    }
}
