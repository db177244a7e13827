//! Lifecycle wrappers for background work
//!
//! Two schedulers drive the sync engine: the pull scheduler runs the
//! external-calendar pull cycle on a fixed interval, and the completion
//! scheduler sweeps overdue confirmed appointments on a cron expression.
//! Both follow the same runtime rules: explicit start/stop, tracked join
//! handles, cancellation tokens, and timeouts on every async operation.

pub mod completion_scheduler;
pub mod error;
pub mod pull_scheduler;

pub use completion_scheduler::{CompletionScheduler, CompletionSchedulerConfig};
pub use error::{SchedulerError, SchedulerResult};
pub use pull_scheduler::{PullScheduler, PullSchedulerConfig};
