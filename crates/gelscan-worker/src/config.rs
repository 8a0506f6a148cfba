//! Worker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::checkpoint::Backoff;

/// Tunables for the background worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// First backoff delay of a waiting job, in milliseconds. Each retry
    /// doubles it.
    pub backoff_base_ms: u64,
    /// Name of the worker OS thread.
    pub thread_name: String,
}

impl WorkerConfig {
    /// The backoff schedule for checkpoints.
    #[must_use]
    pub const fn backoff(&self) -> Backoff {
        Backoff::new(Duration::from_millis(self.backoff_base_ms))
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            backoff_base_ms: 10,
            thread_name: "gelscan-worker".to_owned(),
        }
    }
}
