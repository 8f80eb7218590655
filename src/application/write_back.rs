//! Bounded pool for detached cache write-backs.
//!
//! A write-back outlives the request that triggered it, so it is spawned
//! onto the runtime rather than awaited. Each task runs under its own
//! timeout, and the pool caps how many may be in flight at once; when the
//! cap is reached new tasks are dropped, since a skipped cache fill only
//! costs a later miss.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

const TARGET: &str = "lectern::application::write_back";

const METRIC_COMPLETED: &str = "lectern_write_back_completed_total";
const METRIC_FAILED: &str = "lectern_write_back_failed_total";
const METRIC_DROPPED: &str = "lectern_write_back_dropped_total";
const METRIC_TIMED_OUT: &str = "lectern_write_back_timed_out_total";

const DEFAULT_CONCURRENCY: u32 = 64;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteBackConfig {
    pub concurrency: u32,
    pub timeout: Duration,
}

impl Default for WriteBackConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl From<&crate::config::WriteBackSettings> for WriteBackConfig {
    fn from(settings: &crate::config::WriteBackSettings) -> Self {
        Self {
            concurrency: settings.concurrency.get(),
            timeout: settings.timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WriteBack {
    permits: Arc<Semaphore>,
    config: WriteBackConfig,
}

impl WriteBack {
    pub fn new(config: WriteBackConfig) -> Self {
        let config = WriteBackConfig {
            concurrency: config.concurrency.max(1),
            ..config
        };
        Self {
            permits: Arc::new(Semaphore::new(config.concurrency as usize)),
            config,
        }
    }

    /// Spawn `work` as a detached task.
    ///
    /// Returns `false` when the pool is saturated and the task was dropped.
    pub fn spawn<F, E>(&self, task: &'static str, work: F) -> bool
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                counter!(METRIC_DROPPED, "task" => task).increment(1);
                warn!(target = TARGET, task, "Write-back pool saturated; task dropped");
                return false;
            }
        };

        let timeout = self.config.timeout;
        tokio::spawn(async move {
            let _permit = permit;
            match tokio::time::timeout(timeout, work).await {
                Ok(Ok(())) => {
                    counter!(METRIC_COMPLETED, "task" => task).increment(1);
                    debug!(target = TARGET, task, "Write-back completed");
                }
                Ok(Err(err)) => {
                    counter!(METRIC_FAILED, "task" => task).increment(1);
                    warn!(target = TARGET, task, error = %err, "Write-back failed");
                }
                Err(_) => {
                    counter!(METRIC_TIMED_OUT, "task" => task).increment(1);
                    warn!(
                        target = TARGET,
                        task,
                        timeout_ms = timeout.as_millis() as u64,
                        "Write-back timed out"
                    );
                }
            }
        });
        true
    }

    /// Wait until every task spawned so far has finished.
    pub async fn flush(&self) {
        if let Ok(all) = self.permits.acquire_many(self.config.concurrency).await {
            drop(all);
        }
    }
}

impl Default for WriteBack {
    fn default() -> Self {
        Self::new(WriteBackConfig::default())
    }
}
