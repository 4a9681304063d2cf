//! Queue load generator
//!
//! Produces a rate-limited stream of synthetic audit or error messages into a
//! destination queue and pauses while the queue's backlog is over a threshold.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};

use loadgen_core::{LoadConfig, MessageShape, SyntheticMessageFactory};
use telemetry::{health, init_tracing_from_env};
use transport::{LearningDispatcher, LearningQueueLength, TransportConfig};
use worker::LoadScheduler;

/// Application configuration.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default)]
    load: LoadConfig,

    #[serde(default)]
    transport: TransportConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting queue load generator v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    let transport = config
        .transport
        .clone()
        .validated()
        .context("Invalid transport configuration")?;
    let load = config.load.clone();

    info!(
        root = %transport.learning_root.display(),
        destination = %load.destination,
        "Loaded configuration"
    );

    check_health(&config).await;

    let dispatcher = Arc::new(LearningDispatcher::from_config(&transport));
    let source = Arc::new(LearningQueueLength::from_config(&transport));
    let factory = Arc::new(SyntheticMessageFactory::new(MessageShape::from_is_error(
        load.is_error,
    )));

    let scheduler = LoadScheduler::new(load, dispatcher, source, factory)
        .context("Invalid load configuration")?;

    let cancel = scheduler.cancel_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutting down...");
        cancel.cancel();
    });

    let summary = scheduler.run().await;

    info!(
        batches_offered = summary.batches_offered,
        completed = summary.completed,
        abandoned = summary.abandoned,
        "Shutdown complete"
    );
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("LOADGEN")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // The config crate's nested parsing doesn't work reliably with underscored
    // field names, so the common knobs also have flat variables.
    if let Ok(destination) = std::env::var("LOADGEN_DESTINATION") {
        config.load.destination = destination;
    }
    override_parsed("LOADGEN_IS_ERROR", &mut config.load.is_error)?;
    override_parsed("LOADGEN_MAX_QUEUE_LENGTH", &mut config.load.max_queue_length)?;
    override_parsed("LOADGEN_RATE_LIMIT", &mut config.load.rate_limit)?;
    override_parsed("LOADGEN_MAX_CONCURRENCY", &mut config.load.max_concurrency)?;
    override_parsed("LOADGEN_BATCH_SIZE", &mut config.load.batch_size)?;
    override_parsed("LOADGEN_POLL_INTERVAL_MS", &mut config.load.poll_interval_ms)?;
    override_parsed("LOADGEN_SHUTDOWN_GRACE_MS", &mut config.load.shutdown_grace_ms)?;

    if let Ok(root) = std::env::var("LOADGEN_LEARNING_ROOT") {
        config.transport.learning_root = root.into();
    }

    Ok(config)
}

fn override_parsed<T>(name: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Ok(raw) = std::env::var(name) {
        *target = raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {name}: {raw}"))?;
    }
    Ok(())
}

/// Check component health on startup.
async fn check_health(config: &Config) {
    if transport::health::check_connection(&config.transport).await {
        health().transport.set_healthy();
        info!("Transport: healthy");
    } else {
        // Dispatch failures are counted and retried per batch; keep going.
        health().transport.set_unhealthy("Transport root not writable");
        error!("Transport: unhealthy");
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
