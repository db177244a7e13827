//! Interval scheduler for the pull worker
//!
//! Runs `PullWorker::run_cycle` on a fixed interval with an explicit
//! lifecycle: join handles are tracked, cancellation is explicit, and
//! every cycle is bounded by a timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::scheduling::error::{SchedulerError, SchedulerResult};
use crate::sync::PullWorker;

/// Configuration for the pull scheduler
#[derive(Debug, Clone)]
pub struct PullSchedulerConfig {
    /// Interval between pull cycles
    pub pull_interval: Duration,
    /// Timeout applied to a single cycle
    pub cycle_timeout: Duration,
    /// Maximum time to wait for the loop task when stopping
    pub join_timeout: Duration,
}

impl Default for PullSchedulerConfig {
    fn default() -> Self {
        Self {
            pull_interval: Duration::from_secs(300),
            cycle_timeout: Duration::from_secs(120),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Drives periodic busy-block refreshes with explicit lifecycle management
pub struct PullScheduler {
    worker: Arc<PullWorker>,
    config: PullSchedulerConfig,
    cancellation_token: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl PullScheduler {
    pub fn new(worker: Arc<PullWorker>, config: PullSchedulerConfig) -> Self {
        Self { worker, config, cancellation_token: CancellationToken::new(), task_handle: None }
    }

    /// Start the interval loop
    pub fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        info!(
            interval_secs = self.config.pull_interval.as_secs(),
            "starting pull scheduler"
        );

        self.cancellation_token = CancellationToken::new();
        let worker = Arc::clone(&self.worker);
        let config = self.config.clone();
        let cancellation_token = self.cancellation_token.clone();

        let handle = tokio::spawn(async move {
            Self::run_loop(worker, config, cancellation_token).await;
        });

        self.task_handle = Some(handle);
        info!("pull scheduler started");
        Ok(())
    }

    /// Stop the loop and wait for the task to finish
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        let Some(handle) = self.task_handle.take() else {
            return Err(SchedulerError::NotRunning);
        };

        info!("stopping pull scheduler");
        self.cancellation_token.cancel();

        match tokio::time::timeout(self.config.join_timeout, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(join_error)) => {
                warn!(error = %join_error, "pull scheduler task panicked during shutdown");
                return Err(SchedulerError::MonitorJoin(join_error.to_string()));
            }
            Err(_) => {
                warn!("pull scheduler task did not stop within join timeout");
                return Err(SchedulerError::Timeout {
                    op: "join",
                    seconds: self.config.join_timeout.as_secs(),
                });
            }
        }

        self.cancellation_token = CancellationToken::new();
        info!("pull scheduler stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    async fn run_loop(
        worker: Arc<PullWorker>,
        config: PullSchedulerConfig,
        cancellation_token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    debug!("pull scheduler loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(config.pull_interval) => {
                    match tokio::time::timeout(config.cycle_timeout, worker.run_cycle()).await {
                        Ok(Ok(stats)) => {
                            debug!(
                                synced = stats.synced,
                                failed = stats.failed,
                                skipped = stats.skipped,
                                "pull cycle finished"
                            );
                        }
                        Ok(Err(cycle_error)) => {
                            error!(error = %cycle_error, "pull cycle failed");
                        }
                        Err(_) => {
                            warn!(
                                timeout_secs = config.cycle_timeout.as_secs(),
                                "pull cycle timed out"
                            );
                        }
                    }
                }
            }
        }
    }
}

impl Drop for PullScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("pull scheduler dropped while running, cancelling task");
            self.cancellation_token.cancel();
        }
    }
}
