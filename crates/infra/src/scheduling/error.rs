//! Failure modes shared by the pull and completion schedulers

use bookline_domain::BooklineError;
use thiserror::Error;

use crate::errors::InfraError;

/// What can go wrong while driving a background scheduler
///
/// Lifecycle misuse (starting twice, stopping a stopped scheduler) is
/// the caller's mistake; everything else is a fault of the cron
/// machinery or the tokio runtime.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// `start` was called on a running scheduler
    #[error("scheduler is already running")]
    AlreadyRunning,

    /// `stop` was called on a scheduler that never started
    #[error("scheduler is not running")]
    NotRunning,

    /// The cron machinery rejected the expression or the job
    #[error("cron setup failed: {0}")]
    Cron(String),

    /// Startup or shutdown of the underlying scheduler failed
    #[error("scheduler {op} failed: {detail}")]
    Runtime { op: &'static str, detail: String },

    /// A lifecycle step exceeded its deadline
    #[error("scheduler {op} did not finish within {seconds}s")]
    Timeout { op: &'static str, seconds: u64 },

    /// The monitor task panicked or was aborted
    #[error("monitor task did not join cleanly: {0}")]
    MonitorJoin(String),
}

impl From<SchedulerError> for InfraError {
    fn from(err: SchedulerError) -> Self {
        let domain_err = match err {
            SchedulerError::AlreadyRunning | SchedulerError::NotRunning => {
                BooklineError::InvalidInput(err.to_string())
            }
            _ => BooklineError::Internal(err.to_string()),
        };
        InfraError(domain_err)
    }
}

impl From<SchedulerError> for BooklineError {
    fn from(err: SchedulerError) -> Self {
        InfraError::from(err).into()
    }
}

/// Convenience type alias for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;
