//! Filesystem "learning" transport.
//!
//! Each queue is a directory under the transport root. A message is a
//! `<id>.metadata.txt` file holding its headers as JSON, with the body stored
//! next to it in `.bodies/<id>.body.txt`. Queue depth is the number of
//! metadata files in the queue directory.

use async_trait::async_trait;
use loadgen_core::{Error, OutboundMessage, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::dispatch::{Dispatcher, QueueLengthSource};

const METADATA_SUFFIX: &str = ".metadata.txt";
const BODY_SUFFIX: &str = ".body.txt";
const BODIES_DIR: &str = ".bodies";

/// Message ids may contain path separators; file names may not.
fn file_stem(id: &str) -> String {
    id.chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect()
}

/// Writes batches into learning transport queue directories.
pub struct LearningDispatcher {
    root: PathBuf,
}

impl LearningDispatcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(config.learning_root.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn write_message(&self, queue_dir: &Path, message: &OutboundMessage) -> Result<()> {
        let stem = file_stem(&message.id);

        let body_path = queue_dir.join(BODIES_DIR).join(format!("{stem}{BODY_SUFFIX}"));
        fs::write(&body_path, &message.body).await?;

        // Write metadata under a temporary name and move it into place so a
        // reader never sees a half-written message.
        let metadata = serde_json::to_vec(&message.headers)?;
        let temp_path = queue_dir.join(format!(".{stem}.tmp"));
        let final_path = queue_dir.join(format!("{stem}{METADATA_SUFFIX}"));
        fs::write(&temp_path, metadata).await?;
        fs::rename(&temp_path, &final_path).await?;

        Ok(())
    }
}

#[async_trait]
impl Dispatcher for LearningDispatcher {
    async fn dispatch(&self, destination: &str, batch: &[OutboundMessage]) -> Result<()> {
        let queue_dir = self.root.join(destination);

        let result = async {
            fs::create_dir_all(queue_dir.join(BODIES_DIR)).await?;
            for message in batch {
                self.write_message(&queue_dir, message).await?;
            }
            Ok::<_, Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                debug!(destination, count = batch.len(), "Wrote batch to learning transport");
                Ok(())
            }
            Err(e) => {
                warn!(destination, error = %e, "Learning transport write failed");
                Err(Error::dispatch(destination, e.to_string()))
            }
        }
    }
}

/// Counts messages waiting in learning transport queues.
pub struct LearningQueueLength {
    root: PathBuf,
}

impl LearningQueueLength {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(config.learning_root.clone())
    }
}

#[async_trait]
impl QueueLengthSource for LearningQueueLength {
    async fn queue_length(&self, queue: &str) -> Result<u64> {
        let queue_dir = self.root.join(queue);

        let mut entries = match fs::read_dir(&queue_dir).await {
            Ok(entries) => entries,
            // A queue nobody has written to yet holds nothing.
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::queue_length(queue, e.to_string())),
        };

        let mut count = 0u64;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::queue_length(queue, e.to_string()))?
        {
            if entry.file_name().to_string_lossy().ends_with(METADATA_SUFFIX) {
                count += 1;
            }
        }

        Ok(count)
    }
}
