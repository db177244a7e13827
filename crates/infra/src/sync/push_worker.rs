//! Background worker that drains the push queue into vendor calendars
//!
//! Polls for due jobs on an interval, delivers each one through the
//! gateway for its integration's vendor, and settles the job as sent,
//! failed (retry later with backoff) or dismissed (terminal). Local
//! bookkeeping failures abort the batch; vendor failures only burn the
//! job's attempt budget.

use std::sync::Arc;
use std::time::Duration;

use bookline_core::{
    AppointmentRepository, CalendarEventPayload, IntegrationRepository, PushQueue,
};
use bookline_domain::{
    AppointmentStatus, BooklineError, PushJob, PushOperation, Result as DomainResult,
};
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::observability::SyncMetrics;
use crate::scheduling::{SchedulerError, SchedulerResult};
use crate::sync::{calculate_backoff, truncate_reason, GatewaySet};

/// Configuration for the push worker
#[derive(Debug, Clone)]
pub struct PushWorkerConfig {
    /// Maximum jobs drained per polling cycle
    pub batch_size: usize,
    /// Interval between queue polls
    pub poll_interval: Duration,
    /// Maximum time for one batch before it is abandoned
    pub processing_timeout: Duration,
    /// Attempts before a job is dead-lettered
    pub max_retries: u32,
    /// Maximum time to wait for the worker task when stopping
    pub join_timeout: Duration,
}

impl Default for PushWorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            poll_interval: Duration::from_secs(10),
            processing_timeout: Duration::from_secs(120),
            max_retries: 5,
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// How a single job settled within a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobOutcome {
    /// Delivered to the vendor and marked sent
    Delivered,
    /// Marked failed with a future retry gate
    Retried,
    /// Terminally removed from the queue
    Dismissed,
    /// Left untouched for a later cycle
    Deferred,
}

/// Polling worker that delivers queued push jobs
pub struct PushWorker {
    queue: Arc<dyn PushQueue>,
    integrations: Arc<dyn IntegrationRepository>,
    appointments: Arc<dyn AppointmentRepository>,
    gateways: GatewaySet,
    metrics: Arc<SyncMetrics>,
    config: PushWorkerConfig,
    cancellation_token: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl PushWorker {
    pub fn new(
        queue: Arc<dyn PushQueue>,
        integrations: Arc<dyn IntegrationRepository>,
        appointments: Arc<dyn AppointmentRepository>,
        gateways: GatewaySet,
        metrics: Arc<SyncMetrics>,
        config: PushWorkerConfig,
    ) -> Self {
        Self {
            queue,
            integrations,
            appointments,
            gateways,
            metrics,
            config,
            cancellation_token: CancellationToken::new(),
            task_handle: None,
        }
    }

    /// Start the polling loop
    pub fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        info!(
            batch_size = self.config.batch_size,
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "starting push worker"
        );

        self.cancellation_token = CancellationToken::new();
        let queue = Arc::clone(&self.queue);
        let integrations = Arc::clone(&self.integrations);
        let appointments = Arc::clone(&self.appointments);
        let gateways = self.gateways.clone();
        let metrics = Arc::clone(&self.metrics);
        let config = self.config.clone();
        let cancellation_token = self.cancellation_token.clone();

        let handle = tokio::spawn(async move {
            Self::process_loop(
                queue,
                integrations,
                appointments,
                gateways,
                metrics,
                config,
                cancellation_token,
            )
            .await;
        });

        self.task_handle = Some(handle);
        info!("push worker started");
        Ok(())
    }

    /// Stop the polling loop and wait for the task to finish
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        let Some(handle) = self.task_handle.take() else {
            return Err(SchedulerError::NotRunning);
        };

        info!("stopping push worker");
        self.cancellation_token.cancel();

        match tokio::time::timeout(self.config.join_timeout, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(join_error)) => {
                warn!(error = %join_error, "push worker task panicked during shutdown");
                return Err(SchedulerError::MonitorJoin(join_error.to_string()));
            }
            Err(_) => {
                warn!("push worker task did not stop within join timeout");
                return Err(SchedulerError::Timeout {
                    op: "join",
                    seconds: self.config.join_timeout.as_secs(),
                });
            }
        }

        self.cancellation_token = CancellationToken::new();
        info!("push worker stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_loop(
        queue: Arc<dyn PushQueue>,
        integrations: Arc<dyn IntegrationRepository>,
        appointments: Arc<dyn AppointmentRepository>,
        gateways: GatewaySet,
        metrics: Arc<SyncMetrics>,
        config: PushWorkerConfig,
        cancellation_token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    debug!("push worker loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(config.poll_interval) => {
                    let batch = tokio::time::timeout(
                        config.processing_timeout,
                        Self::process_batch(
                            &queue,
                            &integrations,
                            &appointments,
                            &gateways,
                            &metrics,
                            config.batch_size,
                            config.max_retries,
                        ),
                    )
                    .await;

                    match batch {
                        Ok(Ok(())) => {}
                        Ok(Err(batch_error)) => {
                            error!(error = %batch_error, "push batch failed");
                        }
                        Err(_) => {
                            warn!(
                                timeout_secs = config.processing_timeout.as_secs(),
                                "push batch timed out"
                            );
                        }
                    }
                }
            }
        }
    }

    /// Process one batch of due jobs
    ///
    /// Returns `Err` only when queue or repository bookkeeping fails;
    /// vendor rejections are settled per job and do not fail the batch.
    pub(crate) async fn process_batch(
        queue: &Arc<dyn PushQueue>,
        integrations: &Arc<dyn IntegrationRepository>,
        appointments: &Arc<dyn AppointmentRepository>,
        gateways: &GatewaySet,
        metrics: &Arc<SyncMetrics>,
        batch_size: usize,
        max_retries: u32,
    ) -> Result<(), String> {
        let now = Utc::now();
        let jobs = queue
            .due_jobs(batch_size, now)
            .await
            .map_err(|e| format!("failed to read due jobs: {e}"))?;

        if jobs.is_empty() {
            debug!("no due push jobs");
            return Ok(());
        }

        info!(count = jobs.len(), "processing push batch");

        let mut fatal_errors: Vec<String> = Vec::new();
        let mut delivered = 0u64;
        let mut retried = 0u64;
        let mut dismissed = 0u64;
        let mut deferred = 0u64;

        for job in &jobs {
            let outcome = Self::process_job(
                queue,
                integrations,
                appointments,
                gateways,
                metrics,
                max_retries,
                job,
                now,
            )
            .await;

            match outcome {
                Ok(JobOutcome::Delivered) => delivered = delivered.saturating_add(1),
                Ok(JobOutcome::Retried) => retried = retried.saturating_add(1),
                Ok(JobOutcome::Dismissed) => dismissed = dismissed.saturating_add(1),
                Ok(JobOutcome::Deferred) => deferred = deferred.saturating_add(1),
                Err(store_error) => {
                    warn!(job_id = %job.id, error = %store_error, "push job bookkeeping failed");
                    fatal_errors.push(format!("job {}: {store_error}", job.id));
                }
            }
        }

        debug!(delivered, retried, dismissed, deferred, "push batch settled");

        if fatal_errors.is_empty() {
            Ok(())
        } else {
            Err(fatal_errors.join("; "))
        }
    }

    /// Deliver one job and settle its queue row
    ///
    /// `Err` means a local write failed and the row is in an unknown
    /// state; the job stays due and the batch reports the error.
    #[allow(clippy::too_many_arguments)]
    async fn process_job(
        queue: &Arc<dyn PushQueue>,
        integrations: &Arc<dyn IntegrationRepository>,
        appointments: &Arc<dyn AppointmentRepository>,
        gateways: &GatewaySet,
        metrics: &Arc<SyncMetrics>,
        max_retries: u32,
        job: &PushJob,
        now: DateTime<Utc>,
    ) -> DomainResult<JobOutcome> {
        let Some(mut integration) = integrations.find(job.integration_id).await? else {
            return Self::dismiss(queue, metrics, job, "integration no longer exists").await;
        };
        if !integration.enabled {
            return Self::dismiss(queue, metrics, job, "integration disabled").await;
        }
        if !integration.retry_gate_open(now) {
            debug!(job_id = %job.id, integration_id = %integration.id, "integration retry gate closed");
            return Ok(JobOutcome::Deferred);
        }

        let gateway = gateways.for_vendor(integration.vendor);

        if integration.token_stale(now) {
            match gateway.refresh_token(&integration).await {
                Ok(refreshed) => {
                    integrations
                        .update_tokens(integration.id, &refreshed.access_token, refreshed.expires_at)
                        .await?;
                    integration.access_token = refreshed.access_token;
                    integration.token_expires_at = Some(refreshed.expires_at);
                }
                Err(refresh_error) => {
                    warn!(
                        job_id = %job.id,
                        integration_id = %integration.id,
                        error = %refresh_error,
                        "token refresh failed"
                    );
                    integrations
                        .record_sync_failure(
                            integration.id,
                            now + calculate_backoff(integration.consecutive_failures),
                        )
                        .await?;
                    return Self::settle_failure(
                        queue,
                        metrics,
                        max_retries,
                        job,
                        now,
                        &refresh_error.to_string(),
                    )
                    .await;
                }
            }
        }

        let Some(appointment) = appointments.find(job.appointment_id).await? else {
            return Self::dismiss(queue, metrics, job, "appointment no longer exists").await;
        };

        let delivery = match job.operation {
            PushOperation::Upsert => {
                if appointment.status != AppointmentStatus::Confirmed {
                    let reason = format!("appointment is {}", appointment.status);
                    return Self::dismiss(queue, metrics, job, &reason).await;
                }
                let payload = CalendarEventPayload::from_appointment(&appointment);
                match gateway.upsert_event(&integration, &payload).await {
                    Ok(external_event_id) => {
                        appointments
                            .set_external_link(appointment.id, &external_event_id, integration.id)
                            .await?;
                        Ok(())
                    }
                    Err(vendor_error) => Err(vendor_error),
                }
            }
            PushOperation::Delete => match appointment.external_event_id.as_deref() {
                Some(external_event_id) => gateway.delete_event(&integration, external_event_id).await,
                None => {
                    return Self::dismiss(queue, metrics, job, "no external event recorded").await;
                }
            },
        };

        match delivery {
            Ok(()) => {
                queue.mark_sent(job.id, now).await?;
                integrations.record_sync_success(integration.id, now).await?;
                metrics.record_push_sent();
                debug!(job_id = %job.id, appointment_id = %job.appointment_id, "push job delivered");
                Ok(JobOutcome::Delivered)
            }
            Err(vendor_error) => {
                warn!(
                    job_id = %job.id,
                    integration_id = %integration.id,
                    error = %vendor_error,
                    "push delivery failed"
                );
                // First non-auth failure is usually transient noise; only a
                // rejected credential or a repeat offender degrades the
                // integration's health.
                if matches!(vendor_error, BooklineError::Auth(_)) || job.attempts >= 1 {
                    integrations
                        .record_sync_failure(
                            integration.id,
                            now + calculate_backoff(integration.consecutive_failures),
                        )
                        .await?;
                }
                Self::settle_failure(
                    queue,
                    metrics,
                    max_retries,
                    job,
                    now,
                    &vendor_error.to_string(),
                )
                .await
            }
        }
    }

    async fn dismiss(
        queue: &Arc<dyn PushQueue>,
        metrics: &Arc<SyncMetrics>,
        job: &PushJob,
        reason: &str,
    ) -> DomainResult<JobOutcome> {
        info!(job_id = %job.id, reason, "dismissing push job");
        queue.mark_dismissed(job.id, reason).await?;
        metrics.record_dismissal();
        Ok(JobOutcome::Dismissed)
    }

    /// Retry the job with backoff, or dead-letter it once the attempt
    /// budget is exhausted
    async fn settle_failure(
        queue: &Arc<dyn PushQueue>,
        metrics: &Arc<SyncMetrics>,
        max_retries: u32,
        job: &PushJob,
        now: DateTime<Utc>,
        reason: &str,
    ) -> DomainResult<JobOutcome> {
        let reason = truncate_reason(reason);
        let attempts_after = job.attempts.saturating_add(1);

        if attempts_after >= max_retries {
            let final_reason = format!("gave up after {attempts_after} attempts: {reason}");
            queue.mark_dismissed(job.id, &final_reason).await?;
            metrics.record_dismissal();
            warn!(job_id = %job.id, attempts = attempts_after, "push job dead-lettered");
            Ok(JobOutcome::Dismissed)
        } else {
            queue
                .mark_failed(job.id, &reason, now + calculate_backoff(job.attempts))
                .await?;
            metrics.record_push_failure();
            Ok(JobOutcome::Retried)
        }
    }
}

impl Drop for PushWorker {
    fn drop(&mut self) {
        if self.task_handle.is_some() {
            warn!("push worker dropped while running, cancelling task");
            self.cancellation_token.cancel();
        }
    }
}
