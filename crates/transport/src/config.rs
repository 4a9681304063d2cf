//! Transport configuration.

use loadgen_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which transport to produce into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Filesystem queues, one directory per queue.
    #[default]
    Learning,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,
    /// Root folder of the learning transport
    #[serde(default = "default_learning_root")]
    pub learning_root: PathBuf,
}

fn default_learning_root() -> PathBuf {
    PathBuf::from(".learningtransport")
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            learning_root: default_learning_root(),
        }
    }
}

impl TransportConfig {
    /// Checks the settings the selected transport needs.
    pub fn validated(self) -> Result<Self> {
        match self.kind {
            TransportKind::Learning if self.learning_root.as_os_str().is_empty() => {
                Err(Error::config("learning_root must not be empty"))
            }
            TransportKind::Learning => Ok(self),
        }
    }
}
