//! Cron scheduler for the appointment completion sweep
//!
//! Periodically marks confirmed appointments whose end time has passed
//! as completed, freeing providers from closing each one by hand. The
//! sweep is a single idempotent UPDATE, so overlapping runs are
//! harmless.

use std::sync::Arc;
use std::time::Duration;

use bookline_core::AppointmentRepository;
use bookline_domain::Result as DomainResult;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::observability::SyncMetrics;
use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Configuration for the completion scheduler
#[derive(Debug, Clone)]
pub struct CompletionSchedulerConfig {
    /// Cron expression describing the sweep schedule
    pub cron_expression: String,
    /// Timeout applied to a single sweep
    pub job_timeout: Duration,
    /// Timeout for starting the underlying scheduler
    pub start_timeout: Duration,
    /// Timeout for stopping the scheduler
    pub stop_timeout: Duration,
    /// Timeout for awaiting the monitor task join handle
    pub join_timeout: Duration,
}

impl Default for CompletionSchedulerConfig {
    fn default() -> Self {
        Self {
            cron_expression: "0 */5 * * * *".into(),
            job_timeout: Duration::from_secs(60),
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Appointment completion sweep with explicit lifecycle management
pub struct CompletionScheduler {
    scheduler: Option<JobScheduler>,
    config: CompletionSchedulerConfig,
    monitor_handle: Option<JoinHandle<()>>,
    cancellation_token: CancellationToken,
    appointments: Arc<dyn AppointmentRepository>,
    metrics: Arc<SyncMetrics>,
}

impl CompletionScheduler {
    /// Create a scheduler running on the given cron expression
    pub fn new(
        cron_expression: String,
        appointments: Arc<dyn AppointmentRepository>,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        let config = CompletionSchedulerConfig { cron_expression, ..Default::default() };
        Self::with_config(config, appointments, metrics)
    }

    pub fn with_config(
        config: CompletionSchedulerConfig,
        appointments: Arc<dyn AppointmentRepository>,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        Self {
            scheduler: None,
            config,
            monitor_handle: None,
            cancellation_token: CancellationToken::new(),
            appointments,
            metrics,
        }
    }

    /// Start the scheduler, spawning the monitoring task
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.cancellation_token = CancellationToken::new();

        let scheduler_instance = self.build_scheduler().await?;
        let start_timeout = self.config.start_timeout;

        let start_result = tokio::time::timeout(start_timeout, scheduler_instance.start())
            .await
            .map_err(|_| SchedulerError::Timeout { op: "start", seconds: start_timeout.as_secs() })?;
        start_result
            .map_err(|e| SchedulerError::Runtime { op: "start", detail: e.to_string() })?;

        self.scheduler = Some(scheduler_instance);

        let cancellation_token = self.cancellation_token.clone();
        let handle = tokio::spawn(async move {
            Self::monitor_task(cancellation_token).await;
        });
        self.monitor_handle = Some(handle);

        info!(cron = %self.config.cron_expression, "completion scheduler started");
        Ok(())
    }

    /// Stop the scheduler and wait for the monitor task to finish
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        self.cancellation_token.cancel();

        let mut scheduler = match self.scheduler.take() {
            Some(scheduler) => scheduler,
            None => return Err(SchedulerError::NotRunning),
        };

        let stop_timeout = self.config.stop_timeout;
        let stop_result =
            tokio::time::timeout(stop_timeout, async move { scheduler.shutdown().await })
                .await
                .map_err(|_| SchedulerError::Timeout { op: "stop", seconds: stop_timeout.as_secs() })?;
        stop_result.map_err(|e| SchedulerError::Runtime { op: "stop", detail: e.to_string() })?;

        if let Some(handle) = self.monitor_handle.take() {
            match tokio::time::timeout(self.config.join_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(join_error)) => {
                    return Err(SchedulerError::MonitorJoin(join_error.to_string()));
                }
                Err(_) => {
                    return Err(SchedulerError::Timeout {
                        op: "join",
                        seconds: self.config.join_timeout.as_secs(),
                    });
                }
            }
        }

        info!("completion scheduler stopped");
        self.cancellation_token = CancellationToken::new();
        Ok(())
    }

    /// Returns true when a scheduler instance is active
    pub fn is_running(&self) -> bool {
        self.scheduler.is_some()
    }

    async fn build_scheduler(&self) -> SchedulerResult<JobScheduler> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| SchedulerError::Cron(e.to_string()))?;

        let appointments = Arc::clone(&self.appointments);
        let metrics = Arc::clone(&self.metrics);
        let job_timeout = self.config.job_timeout;

        let job = Job::new_async(self.config.cron_expression.as_str(), move |_id, _lock| {
            let appointments = Arc::clone(&appointments);
            let metrics = Arc::clone(&metrics);

            Box::pin(async move {
                match tokio::time::timeout(job_timeout, Self::sweep(appointments, metrics)).await
                {
                    Ok(Ok(completed)) => {
                        if completed > 0 {
                            info!(completed, "completion sweep finished");
                        } else {
                            debug!("completion sweep found nothing overdue");
                        }
                    }
                    Ok(Err(sweep_error)) => {
                        error!(error = %sweep_error, "completion sweep failed");
                    }
                    Err(_) => {
                        warn!(
                            timeout_secs = job_timeout.as_secs(),
                            "completion sweep timed out"
                        );
                    }
                }
            })
        })
        .map_err(|e| SchedulerError::Cron(e.to_string()))?;

        scheduler
            .add(job)
            .await
            .map_err(|e| SchedulerError::Cron(e.to_string()))?;

        debug!(cron = %self.config.cron_expression, "registered completion sweep job");
        Ok(scheduler)
    }

    async fn sweep(
        appointments: Arc<dyn AppointmentRepository>,
        metrics: Arc<SyncMetrics>,
    ) -> DomainResult<u64> {
        let completed = appointments.complete_overdue(Utc::now()).await?;
        if completed > 0 {
            metrics.record_appointments_completed(completed);
        }
        Ok(completed)
    }

    async fn monitor_task(cancellation_token: CancellationToken) {
        cancellation_token.cancelled().await;
        debug!("completion scheduler monitor cancelled");
    }
}

impl Drop for CompletionScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("completion scheduler dropped while running, cancelling tasks");
            self.cancellation_token.cancel();
        }
    }
}
