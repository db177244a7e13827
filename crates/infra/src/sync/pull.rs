//! Pull-side calendar synchronization
//!
//! Refreshes the busy-block cache from every enabled integration and
//! reconciles orphaned appointments against the vendor calendar. A
//! failed integration keeps its previously cached blocks; availability
//! math degrades to stale data rather than to an empty calendar.

use std::sync::Arc;
use std::time::Duration;

use bookline_core::{AppointmentRepository, BusyBlockStore, IntegrationRepository};
use bookline_domain::{BooklineError, CalendarIntegration, Result as DomainResult};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::observability::SyncMetrics;
use crate::sync::{calculate_backoff, GatewaySet};

/// Configuration for the pull worker
#[derive(Debug, Clone)]
pub struct PullWorkerConfig {
    /// How far ahead busy blocks are fetched
    pub lookahead_days: u32,
    /// Maximum time for one integration before it is abandoned
    pub integration_timeout: Duration,
}

impl Default for PullWorkerConfig {
    fn default() -> Self {
        Self { lookahead_days: 14, integration_timeout: Duration::from_secs(30) }
    }
}

/// Outcome counts for one pull cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PullCycleStats {
    /// Integrations whose cache was refreshed
    pub synced: usize,
    /// Integrations that errored or timed out
    pub failed: usize,
    /// Integrations skipped because their retry gate was closed
    pub skipped: usize,
}

enum IntegrationOutcome {
    Synced { blocks: usize },
    Failed,
    Skipped,
}

/// Refreshes busy blocks and orphan flags from vendor calendars
pub struct PullWorker {
    integrations: Arc<dyn IntegrationRepository>,
    appointments: Arc<dyn AppointmentRepository>,
    cache: Arc<dyn BusyBlockStore>,
    gateways: GatewaySet,
    metrics: Arc<SyncMetrics>,
    config: PullWorkerConfig,
}

impl PullWorker {
    pub fn new(
        integrations: Arc<dyn IntegrationRepository>,
        appointments: Arc<dyn AppointmentRepository>,
        cache: Arc<dyn BusyBlockStore>,
        gateways: GatewaySet,
        metrics: Arc<SyncMetrics>,
        config: PullWorkerConfig,
    ) -> Self {
        Self { integrations, appointments, cache, gateways, metrics, config }
    }

    /// Refresh every enabled integration once
    ///
    /// Integrations run concurrently, each bounded by the configured
    /// timeout. Returns `Err` only when the integration list itself
    /// cannot be read.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> DomainResult<PullCycleStats> {
        let integrations = self.integrations.list_enabled().await?;
        if integrations.is_empty() {
            debug!("no enabled integrations to pull");
            self.metrics.record_pull_cycle();
            return Ok(PullCycleStats::default());
        }

        let outcomes = futures::future::join_all(
            integrations.into_iter().map(|integration| self.pull_integration(integration)),
        )
        .await;

        let mut stats = PullCycleStats::default();
        let mut cached_blocks = 0u64;
        for outcome in outcomes {
            match outcome {
                IntegrationOutcome::Synced { blocks } => {
                    stats.synced += 1;
                    cached_blocks += blocks as u64;
                }
                IntegrationOutcome::Failed => stats.failed += 1,
                IntegrationOutcome::Skipped => stats.skipped += 1,
            }
        }

        self.metrics.record_pull_cycle();
        self.metrics.set_busy_blocks_cached(cached_blocks);

        info!(
            synced = stats.synced,
            failed = stats.failed,
            skipped = stats.skipped,
            "pull cycle completed"
        );
        Ok(stats)
    }

    /// Synchronize a single integration on demand
    ///
    /// Ignores the retry gate: an explicit request overrides automatic
    /// backoff. Returns the number of busy blocks cached.
    #[instrument(skip(self))]
    pub async fn run_for_integration(&self, id: Uuid) -> DomainResult<usize> {
        let Some(mut integration) = self.integrations.find(id).await? else {
            return Err(BooklineError::NotFound(format!("integration {id}")));
        };
        if !integration.enabled {
            return Err(BooklineError::InvalidInput(format!("integration {id} is disabled")));
        }

        match self.sync_integration(&mut integration).await {
            Ok(blocks) => {
                self.integrations.record_sync_success(integration.id, Utc::now()).await?;
                Ok(blocks)
            }
            Err(sync_error) => {
                warn!(integration_id = %id, error = %sync_error, "on-demand sync failed");
                self.metrics.record_pull_failure();
                let next_retry =
                    Utc::now() + calculate_backoff(integration.consecutive_failures);
                self.integrations.record_sync_failure(integration.id, next_retry).await?;
                Err(sync_error)
            }
        }
    }

    /// One integration within a cycle: gate check, timeout, bookkeeping
    async fn pull_integration(&self, mut integration: CalendarIntegration) -> IntegrationOutcome {
        let now = Utc::now();
        if !integration.retry_gate_open(now) {
            debug!(integration_id = %integration.id, "retry gate closed, skipping pull");
            return IntegrationOutcome::Skipped;
        }

        let synced = tokio::time::timeout(
            self.config.integration_timeout,
            self.sync_integration(&mut integration),
        )
        .await;

        match synced {
            Ok(Ok(blocks)) => {
                match self.integrations.record_sync_success(integration.id, Utc::now()).await {
                    Ok(()) => {
                        debug!(integration_id = %integration.id, blocks, "integration pulled");
                        IntegrationOutcome::Synced { blocks }
                    }
                    Err(store_error) => {
                        warn!(
                            integration_id = %integration.id,
                            error = %store_error,
                            "failed to record sync success"
                        );
                        IntegrationOutcome::Failed
                    }
                }
            }
            Ok(Err(sync_error)) => {
                warn!(integration_id = %integration.id, error = %sync_error, "pull failed");
                self.note_integration_failure(&integration).await;
                IntegrationOutcome::Failed
            }
            Err(_) => {
                warn!(
                    integration_id = %integration.id,
                    timeout_secs = self.config.integration_timeout.as_secs(),
                    "pull timed out"
                );
                self.note_integration_failure(&integration).await;
                IntegrationOutcome::Failed
            }
        }
    }

    async fn note_integration_failure(&self, integration: &CalendarIntegration) {
        self.metrics.record_pull_failure();
        let next_retry = Utc::now() + calculate_backoff(integration.consecutive_failures);
        if let Err(store_error) =
            self.integrations.record_sync_failure(integration.id, next_retry).await
        {
            warn!(
                integration_id = %integration.id,
                error = %store_error,
                "failed to record sync failure"
            );
        }
    }

    /// Fetch busy blocks into the cache and reconcile orphan flags
    ///
    /// The `enabled` flag is re-read before every vendor call: a provider
    /// can disconnect the calendar while a cycle is in flight, and a
    /// disable must take effect immediately, not after the cycle.
    async fn sync_integration(&self, integration: &mut CalendarIntegration) -> DomainResult<usize> {
        let now = Utc::now();
        let gateway = self.gateways.for_vendor(integration.vendor);

        if integration.token_stale(now) {
            if !self.still_enabled(integration.id).await? {
                debug!(integration_id = %integration.id, "integration disabled mid-run, aborting pull");
                return Ok(0);
            }
            let refreshed = gateway.refresh_token(integration).await?;
            self.integrations
                .update_tokens(integration.id, &refreshed.access_token, refreshed.expires_at)
                .await?;
            integration.access_token = refreshed.access_token;
            integration.token_expires_at = Some(refreshed.expires_at);
        }

        if !self.still_enabled(integration.id).await? {
            debug!(integration_id = %integration.id, "integration disabled mid-run, aborting pull");
            return Ok(0);
        }
        let horizon = now + chrono::Duration::days(i64::from(self.config.lookahead_days));
        let blocks = gateway.fetch_busy_blocks(integration, now, horizon).await?;
        let block_count = blocks.len();
        self.cache.replace_blocks(integration.provider_id, integration.id, blocks);

        self.reconcile_orphans(integration).await?;

        Ok(block_count)
    }

    /// Whether the integration row still exists and is enabled
    async fn still_enabled(&self, id: Uuid) -> DomainResult<bool> {
        Ok(self.integrations.find(id).await?.is_some_and(|i| i.enabled))
    }

    /// Flag confirmed appointments whose external event vanished, and
    /// clear the flag when the event reappears
    ///
    /// Never cancels on the provider's behalf; an orphan is surfaced
    /// for manual resolution.
    async fn reconcile_orphans(&self, integration: &CalendarIntegration) -> DomainResult<()> {
        let linked = self.appointments.linked_to_integration(integration.id).await?;
        let mut flagged = 0u64;

        for appointment in linked {
            let Some(external_event_id) = appointment.external_event_id.as_deref() else {
                continue;
            };
            if !self.still_enabled(integration.id).await? {
                debug!(
                    integration_id = %integration.id,
                    "integration disabled mid-run, stopping orphan reconciliation"
                );
                break;
            }
            let exists = self
                .gateways
                .for_vendor(integration.vendor)
                .event_exists(integration, external_event_id)
                .await?;

            if !exists && !appointment.orphaned {
                info!(
                    appointment_id = %appointment.id,
                    external_event_id,
                    "external event vanished, flagging appointment as orphaned"
                );
                self.appointments.set_orphaned(appointment.id, true).await?;
                flagged += 1;
            } else if exists && appointment.orphaned {
                info!(
                    appointment_id = %appointment.id,
                    external_event_id,
                    "external event restored, clearing orphan flag"
                );
                self.appointments.set_orphaned(appointment.id, false).await?;
            }
        }

        if flagged > 0 {
            self.metrics.record_orphans_flagged(flagged);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use bookline_core::{CalendarEventPayload, CalendarGateway, TokenRefresh};
    use bookline_domain::{
        ActorRole, Appointment, AppointmentStatus, CalendarVendor, ContactSnapshot,
        ExternalBusyBlock, SyncHealth,
    };
    use chrono::{DateTime, Duration as ChronoDuration, Utc};
    use tokio::sync::Mutex as TokioMutex;

    use super::*;
    use crate::cache::BusyBlockCache;

    type IntegrationStore = Arc<TokioMutex<Vec<CalendarIntegration>>>;
    type OutcomeStore = Arc<TokioMutex<Vec<Uuid>>>;
    type AppointmentStore = Arc<TokioMutex<Vec<Appointment>>>;
    type OrphanStore = Arc<TokioMutex<Vec<(Uuid, bool)>>>;
    type BlockQueue = TokioMutex<Vec<DomainResult<Vec<ExternalBusyBlock>>>>;

    fn sample_integration() -> CalendarIntegration {
        CalendarIntegration {
            id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            vendor: CalendarVendor::Google,
            external_calendar_id: "primary".to_string(),
            access_token: "live-token".to_string(),
            refresh_token: "refresh-token".to_string(),
            token_expires_at: Some(Utc::now() + ChronoDuration::hours(1)),
            sync_health: SyncHealth::Ok,
            enabled: true,
            consecutive_failures: 0,
            next_retry_at: None,
            last_synced_at: None,
        }
    }

    fn sample_block(integration: &CalendarIntegration, offset_hours: i64) -> ExternalBusyBlock {
        let start = Utc::now() + ChronoDuration::hours(offset_hours);
        ExternalBusyBlock { integration_id: integration.id, start, end: start + ChronoDuration::hours(1) }
    }

    fn linked_appointment(
        integration: &CalendarIntegration,
        external_event_id: &str,
        orphaned: bool,
    ) -> Appointment {
        let now = Utc::now();
        Appointment {
            id: Uuid::new_v4(),
            provider_id: integration.provider_id,
            requester_id: "client-1".to_string(),
            requester_contact: ContactSnapshot {
                name: "Ada Lovelace".to_string(),
                email: "ada@example.com".to_string(),
                phone: None,
            },
            start_at: now + ChronoDuration::days(1),
            duration_minutes: 30,
            buffer_minutes: 0,
            status: AppointmentStatus::Confirmed,
            orphaned,
            external_event_id: Some(external_event_id.to_string()),
            integration_id: Some(integration.id),
            cancelled_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    struct MockIntegrationRepo {
        integrations: IntegrationStore,
        successes: OutcomeStore,
        failures: OutcomeStore,
    }

    impl MockIntegrationRepo {
        fn new(integrations: Vec<CalendarIntegration>) -> Self {
            Self {
                integrations: Arc::new(TokioMutex::new(integrations)),
                successes: Arc::new(TokioMutex::new(Vec::new())),
                failures: Arc::new(TokioMutex::new(Vec::new())),
            }
        }

        async fn recorded_successes(&self) -> Vec<Uuid> {
            self.successes.lock().await.clone()
        }

        async fn recorded_failures(&self) -> Vec<Uuid> {
            self.failures.lock().await.clone()
        }
    }

    #[async_trait]
    impl IntegrationRepository for MockIntegrationRepo {
        async fn find(&self, id: Uuid) -> DomainResult<Option<CalendarIntegration>> {
            Ok(self.integrations.lock().await.iter().find(|i| i.id == id).cloned())
        }

        async fn find_enabled_for_provider(
            &self,
            provider_id: Uuid,
        ) -> DomainResult<Option<CalendarIntegration>> {
            Ok(self
                .integrations
                .lock()
                .await
                .iter()
                .find(|i| i.provider_id == provider_id && i.enabled)
                .cloned())
        }

        async fn list_enabled(&self) -> DomainResult<Vec<CalendarIntegration>> {
            Ok(self.integrations.lock().await.iter().filter(|i| i.enabled).cloned().collect())
        }

        async fn upsert(&self, integration: &CalendarIntegration) -> DomainResult<()> {
            let mut integrations = self.integrations.lock().await;
            integrations.retain(|i| i.id != integration.id);
            integrations.push(integration.clone());
            Ok(())
        }

        async fn update_tokens(
            &self,
            id: Uuid,
            access_token: &str,
            expires_at: DateTime<Utc>,
        ) -> DomainResult<()> {
            let mut integrations = self.integrations.lock().await;
            if let Some(integration) = integrations.iter_mut().find(|i| i.id == id) {
                integration.access_token = access_token.to_string();
                integration.token_expires_at = Some(expires_at);
            }
            Ok(())
        }

        async fn record_sync_success(&self, id: Uuid, _now: DateTime<Utc>) -> DomainResult<()> {
            self.successes.lock().await.push(id);
            Ok(())
        }

        async fn record_sync_failure(
            &self,
            id: Uuid,
            _next_retry_at: DateTime<Utc>,
        ) -> DomainResult<()> {
            self.failures.lock().await.push(id);
            Ok(())
        }
    }

    struct MockAppointmentRepo {
        appointments: AppointmentStore,
        orphan_updates: OrphanStore,
    }

    impl MockAppointmentRepo {
        fn new(appointments: Vec<Appointment>) -> Self {
            Self {
                appointments: Arc::new(TokioMutex::new(appointments)),
                orphan_updates: Arc::new(TokioMutex::new(Vec::new())),
            }
        }

        async fn recorded_orphan_updates(&self) -> Vec<(Uuid, bool)> {
            self.orphan_updates.lock().await.clone()
        }
    }

    #[async_trait]
    impl AppointmentRepository for MockAppointmentRepo {
        async fn reserve(&self, appointment: &Appointment, _capacity: u32) -> DomainResult<()> {
            self.appointments.lock().await.push(appointment.clone());
            Ok(())
        }

        async fn find(&self, id: Uuid) -> DomainResult<Option<Appointment>> {
            Ok(self.appointments.lock().await.iter().find(|a| a.id == id).cloned())
        }

        async fn list_for_requester(&self, _requester_id: &str) -> DomainResult<Vec<Appointment>> {
            Ok(Vec::new())
        }

        async fn list_for_provider(
            &self,
            _provider_id: Uuid,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> DomainResult<Vec<Appointment>> {
            Ok(Vec::new())
        }

        async fn capacity_holders_between(
            &self,
            _provider_id: Uuid,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> DomainResult<Vec<Appointment>> {
            Ok(Vec::new())
        }

        async fn update_status(
            &self,
            _id: Uuid,
            _expected: AppointmentStatus,
            _next: AppointmentStatus,
            _cancelled_by: Option<ActorRole>,
            _now: DateTime<Utc>,
        ) -> DomainResult<Appointment> {
            Err(BooklineError::Internal("update_status unused in these tests".into()))
        }

        async fn complete_overdue(&self, _now: DateTime<Utc>) -> DomainResult<u64> {
            Ok(0)
        }

        async fn set_external_link(
            &self,
            _id: Uuid,
            _external_event_id: &str,
            _integration_id: Uuid,
        ) -> DomainResult<()> {
            Ok(())
        }

        async fn set_orphaned(&self, id: Uuid, orphaned: bool) -> DomainResult<()> {
            self.orphan_updates.lock().await.push((id, orphaned));
            let mut appointments = self.appointments.lock().await;
            if let Some(appointment) = appointments.iter_mut().find(|a| a.id == id) {
                appointment.orphaned = orphaned;
            }
            Ok(())
        }

        async fn linked_to_integration(
            &self,
            integration_id: Uuid,
        ) -> DomainResult<Vec<Appointment>> {
            Ok(self
                .appointments
                .lock()
                .await
                .iter()
                .filter(|a| a.integration_id == Some(integration_id))
                .cloned()
                .collect())
        }
    }

    struct MockGateway {
        block_responses: BlockQueue,
        existing_events: HashMap<String, bool>,
        refresh_response: TokioMutex<Option<DomainResult<TokenRefresh>>>,
        event_checks: Arc<AtomicUsize>,
        disable_on_fetch: Option<IntegrationStore>,
    }

    impl MockGateway {
        fn new() -> Self {
            Self {
                block_responses: TokioMutex::new(Vec::new()),
                existing_events: HashMap::new(),
                refresh_response: TokioMutex::new(None),
                event_checks: Arc::new(AtomicUsize::new(0)),
                disable_on_fetch: None,
            }
        }

        fn with_block_responses(self, responses: Vec<DomainResult<Vec<ExternalBusyBlock>>>) -> Self {
            Self { block_responses: TokioMutex::new(responses), ..self }
        }

        fn with_event(mut self, external_event_id: &str, exists: bool) -> Self {
            self.existing_events.insert(external_event_id.to_string(), exists);
            self
        }

        fn with_refresh_response(self, response: DomainResult<TokenRefresh>) -> Self {
            Self { refresh_response: TokioMutex::new(Some(response)), ..self }
        }

        /// Flip every stored integration to disabled when busy blocks
        /// are fetched, simulating a disconnect racing the cycle
        fn disabling_on_fetch(self, store: IntegrationStore) -> Self {
            Self { disable_on_fetch: Some(store), ..self }
        }
    }

    #[async_trait]
    impl CalendarGateway for MockGateway {
        async fn refresh_token(
            &self,
            _integration: &CalendarIntegration,
        ) -> DomainResult<TokenRefresh> {
            match self.refresh_response.lock().await.take() {
                Some(response) => response,
                None => Err(BooklineError::Auth("no refresh response configured".into())),
            }
        }

        async fn fetch_busy_blocks(
            &self,
            _integration: &CalendarIntegration,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> DomainResult<Vec<ExternalBusyBlock>> {
            if let Some(store) = &self.disable_on_fetch {
                for integration in store.lock().await.iter_mut() {
                    integration.enabled = false;
                }
            }
            let mut responses = self.block_responses.lock().await;
            if responses.is_empty() {
                Ok(Vec::new())
            } else {
                responses.remove(0)
            }
        }

        async fn upsert_event(
            &self,
            _integration: &CalendarIntegration,
            _payload: &CalendarEventPayload,
        ) -> DomainResult<String> {
            Err(BooklineError::Internal("upsert_event unused in these tests".into()))
        }

        async fn delete_event(
            &self,
            _integration: &CalendarIntegration,
            _external_event_id: &str,
        ) -> DomainResult<()> {
            Err(BooklineError::Internal("delete_event unused in these tests".into()))
        }

        async fn event_exists(
            &self,
            _integration: &CalendarIntegration,
            external_event_id: &str,
        ) -> DomainResult<bool> {
            self.event_checks.fetch_add(1, Ordering::SeqCst);
            Ok(*self.existing_events.get(external_event_id).unwrap_or(&true))
        }
    }

    struct Harness {
        integrations: Arc<MockIntegrationRepo>,
        appointments: Arc<MockAppointmentRepo>,
        cache: Arc<BusyBlockCache>,
        metrics: Arc<SyncMetrics>,
        worker: PullWorker,
    }

    fn build_harness(
        integrations: MockIntegrationRepo,
        appointments: MockAppointmentRepo,
        gateway: MockGateway,
    ) -> Harness {
        let integrations = Arc::new(integrations);
        let appointments = Arc::new(appointments);
        let cache = Arc::new(BusyBlockCache::default());
        let metrics = Arc::new(SyncMetrics::new());

        let integrations_port: Arc<dyn IntegrationRepository> = integrations.clone();
        let appointments_port: Arc<dyn AppointmentRepository> = appointments.clone();
        let cache_port: Arc<dyn BusyBlockStore> = cache.clone();
        let gateway: Arc<dyn CalendarGateway> = Arc::new(gateway);
        let worker = PullWorker::new(
            integrations_port,
            appointments_port,
            cache_port,
            GatewaySet::new(gateway.clone(), gateway),
            metrics.clone(),
            PullWorkerConfig::default(),
        );

        Harness { integrations, appointments, cache, metrics, worker }
    }

    #[tokio::test]
    async fn cycle_refreshes_the_cache_for_enabled_integrations() {
        let integration = sample_integration();
        let provider_id = integration.provider_id;
        let blocks = vec![sample_block(&integration, 2), sample_block(&integration, 5)];

        let harness = build_harness(
            MockIntegrationRepo::new(vec![integration.clone()]),
            MockAppointmentRepo::new(Vec::new()),
            MockGateway::new().with_block_responses(vec![Ok(blocks)]),
        );

        let stats = harness.worker.run_cycle().await.unwrap();

        assert_eq!(stats, PullCycleStats { synced: 1, failed: 0, skipped: 0 });
        assert_eq!(harness.cache.blocks_for_provider(provider_id).len(), 2);
        assert_eq!(harness.integrations.recorded_successes().await, vec![integration.id]);
        let snapshot = harness.metrics.snapshot();
        assert_eq!(snapshot.pull_cycles, 1);
        assert_eq!(snapshot.busy_blocks_cached, 2);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previously_cached_blocks() {
        let integration = sample_integration();
        let provider_id = integration.provider_id;
        let stale_block = sample_block(&integration, 3);

        let harness = build_harness(
            MockIntegrationRepo::new(vec![integration.clone()]),
            MockAppointmentRepo::new(Vec::new()),
            MockGateway::new()
                .with_block_responses(vec![Err(BooklineError::Network("vendor 503".into()))]),
        );
        harness.cache.replace_blocks(provider_id, integration.id, vec![stale_block]);

        let stats = harness.worker.run_cycle().await.unwrap();

        assert_eq!(stats, PullCycleStats { synced: 0, failed: 1, skipped: 0 });
        assert_eq!(harness.cache.blocks_for_provider(provider_id), vec![stale_block]);
        assert_eq!(harness.integrations.recorded_failures().await, vec![integration.id]);
        assert_eq!(harness.metrics.snapshot().pull_failures, 1);
    }

    #[tokio::test]
    async fn closed_retry_gate_skips_the_integration() {
        let mut integration = sample_integration();
        integration.next_retry_at = Some(Utc::now() + ChronoDuration::hours(1));

        let harness = build_harness(
            MockIntegrationRepo::new(vec![integration]),
            MockAppointmentRepo::new(Vec::new()),
            MockGateway::new(),
        );

        let stats = harness.worker.run_cycle().await.unwrap();

        assert_eq!(stats, PullCycleStats { synced: 0, failed: 0, skipped: 1 });
        assert!(harness.integrations.recorded_successes().await.is_empty());
        assert!(harness.integrations.recorded_failures().await.is_empty());
    }

    #[tokio::test]
    async fn vanished_event_flags_the_appointment_as_orphaned() {
        let integration = sample_integration();
        let gone = linked_appointment(&integration, "evt-gone", false);
        let restored = linked_appointment(&integration, "evt-back", true);
        let untouched = linked_appointment(&integration, "evt-live", false);

        let harness = build_harness(
            MockIntegrationRepo::new(vec![integration.clone()]),
            MockAppointmentRepo::new(vec![gone.clone(), restored.clone(), untouched]),
            MockGateway::new()
                .with_event("evt-gone", false)
                .with_event("evt-back", true)
                .with_event("evt-live", true),
        );

        let stats = harness.worker.run_cycle().await.unwrap();

        assert_eq!(stats.synced, 1);
        let updates = harness.appointments.recorded_orphan_updates().await;
        assert_eq!(updates, vec![(gone.id, true), (restored.id, false)]);
        assert_eq!(harness.metrics.snapshot().orphans_flagged, 1);
    }

    #[tokio::test]
    async fn mid_run_disable_halts_further_vendor_calls() {
        let integration = sample_integration();
        let provider_id = integration.provider_id;
        let linked = linked_appointment(&integration, "evt-live", false);

        let repo = MockIntegrationRepo::new(vec![integration.clone()]);
        let store = repo.integrations.clone();
        let gateway = MockGateway::new()
            .with_block_responses(vec![Ok(vec![sample_block(&integration, 2)])])
            .with_event("evt-live", true)
            .disabling_on_fetch(store);
        let event_checks = gateway.event_checks.clone();

        let harness =
            build_harness(repo, MockAppointmentRepo::new(vec![linked]), gateway);

        harness.worker.run_cycle().await.unwrap();

        // Blocks fetched before the disable are kept, but reconciliation
        // stops before touching the vendor again
        assert_eq!(harness.cache.blocks_for_provider(provider_id).len(), 1);
        assert_eq!(event_checks.load(Ordering::SeqCst), 0);
        assert!(harness.appointments.recorded_orphan_updates().await.is_empty());
    }

    #[tokio::test]
    async fn stale_token_is_refreshed_before_fetching() {
        let mut integration = sample_integration();
        integration.token_expires_at = None;

        let refreshed = TokenRefresh {
            access_token: "fresh-token".to_string(),
            expires_at: Utc::now() + ChronoDuration::hours(1),
        };
        let harness = build_harness(
            MockIntegrationRepo::new(vec![integration.clone()]),
            MockAppointmentRepo::new(Vec::new()),
            MockGateway::new().with_refresh_response(Ok(refreshed)),
        );

        let stats = harness.worker.run_cycle().await.unwrap();

        assert_eq!(stats.synced, 1);
        let stored = harness.integrations.find(integration.id).await.unwrap().unwrap();
        assert_eq!(stored.access_token, "fresh-token");
    }

    #[tokio::test]
    async fn refresh_failure_counts_as_a_pull_failure() {
        let mut integration = sample_integration();
        integration.token_expires_at = None;

        let harness = build_harness(
            MockIntegrationRepo::new(vec![integration.clone()]),
            MockAppointmentRepo::new(Vec::new()),
            MockGateway::new()
                .with_refresh_response(Err(BooklineError::Auth("invalid_grant".into()))),
        );

        let stats = harness.worker.run_cycle().await.unwrap();

        assert_eq!(stats, PullCycleStats { synced: 0, failed: 1, skipped: 0 });
        assert_eq!(harness.integrations.recorded_failures().await, vec![integration.id]);
    }

    #[tokio::test]
    async fn on_demand_sync_ignores_the_retry_gate() {
        let mut integration = sample_integration();
        integration.next_retry_at = Some(Utc::now() + ChronoDuration::hours(1));
        let blocks = vec![sample_block(&integration, 2)];

        let harness = build_harness(
            MockIntegrationRepo::new(vec![integration.clone()]),
            MockAppointmentRepo::new(Vec::new()),
            MockGateway::new().with_block_responses(vec![Ok(blocks)]),
        );

        let cached = harness.worker.run_for_integration(integration.id).await.unwrap();

        assert_eq!(cached, 1);
        assert_eq!(harness.integrations.recorded_successes().await, vec![integration.id]);
    }

    #[tokio::test]
    async fn on_demand_sync_for_unknown_integration_is_not_found() {
        let harness = build_harness(
            MockIntegrationRepo::new(Vec::new()),
            MockAppointmentRepo::new(Vec::new()),
            MockGateway::new(),
        );

        let result = harness.worker.run_for_integration(Uuid::new_v4()).await;
        assert!(matches!(result, Err(BooklineError::NotFound(_))));
    }
}
