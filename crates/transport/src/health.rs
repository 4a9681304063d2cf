//! Transport health checks.

use crate::config::{TransportConfig, TransportKind};
use tokio::fs;
use tracing::{debug, error};

/// Check that the configured transport can accept messages.
pub async fn check_connection(config: &TransportConfig) -> bool {
    match config.kind {
        TransportKind::Learning => match fs::create_dir_all(&config.learning_root).await {
            Ok(()) => {
                debug!(
                    root = %config.learning_root.display(),
                    "Learning transport root is writable"
                );
                true
            }
            Err(e) => {
                error!(
                    root = %config.learning_root.display(),
                    "Failed to prepare learning transport root: {}", e
                );
                false
            }
        },
    }
}
