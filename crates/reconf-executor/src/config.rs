use serde::{Deserialize, Serialize};

use crate::error::ExecutorError;

// ---------------------------------------------------------------------------
// ExecutorConfig
// ---------------------------------------------------------------------------

/// Tunables of an [`crate::Executor`].
///
/// Found under `executor:` in plan documents; every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Upper bound on actuators executing at the same time.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Worker threads of the runtime built by [`crate::Executor::execute`].
    /// `None` lets tokio pick.
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

fn default_max_concurrency() -> usize {
    64
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            worker_threads: None,
        }
    }
}

impl ExecutorConfig {
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn validate(&self) -> Result<(), ExecutorError> {
        if self.max_concurrency == 0 {
            return Err(ExecutorError::Config(
                "max_concurrency must be at least 1".into(),
            ));
        }
        // tokio::sync::Semaphore refuses more permits than this.
        if self.max_concurrency > tokio::sync::Semaphore::MAX_PERMITS {
            return Err(ExecutorError::Config(format!(
                "max_concurrency must not exceed {}",
                tokio::sync::Semaphore::MAX_PERMITS
            )));
        }
        if self.worker_threads == Some(0) {
            return Err(ExecutorError::Config(
                "worker_threads must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
