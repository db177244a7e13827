//! Application context - dependency injection container
//!
//! Builds the whole object graph once at startup: configuration, the
//! SQLite pool, the repositories behind the core ports, the scheduling
//! services, and the background sync workers. Handlers receive the
//! context as shared state and never construct dependencies themselves.

use std::sync::Arc;
use std::time::Duration;

use bookline_core::{
    AppointmentRepository, AvailabilityService, BookingService, BusyBlockStore, IdentityResolver,
    IntegrationRepository, LifecycleService, PushQueue, RuleRepository, SlotService,
};
use bookline_domain::{BooklineError, CalendarVendor, Config, Result};
use bookline_infra::scheduling::{CompletionSchedulerConfig, PullSchedulerConfig};
use bookline_infra::{
    create_calendar_gateway, BusyBlockCache, CompletionScheduler, DbManager, GatewaySet,
    HttpIdentityResolver, OauthCredentials, PullScheduler, PullWorker, PullWorkerConfig,
    PushWorker, PushWorkerConfig, SchedulerError, SqliteAppointmentRepository,
    SqliteIntegrationRepository, SqlitePushQueue, SqliteRuleRepository, SyncMetrics,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::utils::health::{ComponentHealth, HealthStatus};

/// Type alias for rule repository port trait object
type DynRuleRepository = dyn RuleRepository + 'static;

/// Type alias for appointment repository port trait object
type DynAppointmentRepository = dyn AppointmentRepository + 'static;

/// Type alias for integration repository port trait object
type DynIntegrationRepository = dyn IntegrationRepository + 'static;

/// Type alias for push queue port trait object
type DynPushQueue = dyn PushQueue + 'static;

/// Type alias for identity resolver port trait object
type DynIdentityResolver = dyn IdentityResolver + 'static;

/// How long a worker gets to start or stop before startup/shutdown fails
const WORKER_LIFECYCLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Background workers, guarded together so start/stop is one critical
/// section
struct Workers {
    push: PushWorker,
    pull: PullScheduler,
    completion: CompletionScheduler,
    started: bool,
}

/// Application context - holds all services and dependencies
pub struct AppContext {
    pub config: Config,
    pub db: Arc<DbManager>,

    // Ports
    pub rules: Arc<DynRuleRepository>,
    pub appointments: Arc<DynAppointmentRepository>,
    pub integrations: Arc<DynIntegrationRepository>,
    pub push_queue: Arc<DynPushQueue>,
    pub busy_blocks: Arc<BusyBlockCache>,
    pub identity: Arc<DynIdentityResolver>,

    // Core services
    pub availability: Arc<AvailabilityService>,
    pub slots: Arc<SlotService>,
    pub booking: Arc<BookingService>,
    pub lifecycle: Arc<LifecycleService>,

    // Sync machinery
    pub pull_worker: Arc<PullWorker>,
    pub metrics: Arc<SyncMetrics>,

    workers: Mutex<Workers>,
}

impl AppContext {
    /// Create a new application context with default configuration
    pub async fn new() -> Result<Self> {
        Self::new_with_config(Config::default()).await
    }

    /// Create a new application context with custom configuration
    ///
    /// Tests use this with a temporary database path and a wiremock
    /// identity endpoint.
    pub async fn new_with_config(config: Config) -> Result<Self> {
        let db = Arc::new(DbManager::new(&config.database.path, config.database.pool_size)?);
        db.run_migrations()?;

        let rules: Arc<DynRuleRepository> =
            Arc::new(SqliteRuleRepository::new(Arc::clone(&db)));
        let appointments: Arc<DynAppointmentRepository> =
            Arc::new(SqliteAppointmentRepository::new(Arc::clone(&db)));
        let integrations: Arc<DynIntegrationRepository> =
            Arc::new(SqliteIntegrationRepository::new(Arc::clone(&db)));
        let push_queue: Arc<DynPushQueue> = Arc::new(SqlitePushQueue::new(Arc::clone(&db)));

        let busy_blocks = Arc::new(BusyBlockCache::new());
        let busy_block_store: Arc<dyn BusyBlockStore> = Arc::clone(&busy_blocks) as _;

        let request_timeout = Duration::from_secs(config.sync.request_timeout_seconds);
        let identity: Arc<DynIdentityResolver> = Arc::new(HttpIdentityResolver::new(
            config.identity.introspect_url.clone(),
            request_timeout,
        ));

        let gateways = GatewaySet::new(
            create_calendar_gateway(
                CalendarVendor::Google,
                vendor_credentials("BOOKLINE_GOOGLE"),
                request_timeout,
            ),
            create_calendar_gateway(
                CalendarVendor::Microsoft,
                vendor_credentials("BOOKLINE_MICROSOFT"),
                request_timeout,
            ),
        );

        let availability = Arc::new(AvailabilityService::new(Arc::clone(&rules)));
        let slots = Arc::new(SlotService::new(
            Arc::clone(&rules),
            Arc::clone(&appointments),
            Arc::clone(&busy_block_store),
        ));
        let booking = Arc::new(BookingService::new(
            Arc::clone(&rules),
            Arc::clone(&appointments),
            Arc::clone(&integrations),
            Arc::clone(&push_queue),
            Arc::clone(&busy_block_store),
        ));
        let lifecycle = Arc::new(LifecycleService::new(
            Arc::clone(&appointments),
            Arc::clone(&integrations),
            Arc::clone(&push_queue),
        ));

        let metrics = Arc::new(SyncMetrics::new());
        let pull_worker = Arc::new(PullWorker::new(
            Arc::clone(&integrations),
            Arc::clone(&appointments),
            Arc::clone(&busy_block_store),
            gateways.clone(),
            Arc::clone(&metrics),
            PullWorkerConfig {
                lookahead_days: config.sync.lookahead_days,
                integration_timeout: request_timeout,
            },
        ));

        let push = PushWorker::new(
            Arc::clone(&push_queue),
            Arc::clone(&integrations),
            Arc::clone(&appointments),
            gateways,
            Arc::clone(&metrics),
            PushWorkerConfig {
                batch_size: config.sync.push_batch_size,
                poll_interval: Duration::from_secs(config.sync.push_poll_interval_seconds),
                ..Default::default()
            },
        );
        let pull = PullScheduler::new(
            Arc::clone(&pull_worker),
            PullSchedulerConfig {
                pull_interval: Duration::from_secs(config.sync.pull_interval_seconds),
                ..Default::default()
            },
        );
        let completion = CompletionScheduler::with_config(
            CompletionSchedulerConfig {
                cron_expression: config.sync.completion_sweep_cron.clone(),
                ..Default::default()
            },
            Arc::clone(&appointments),
            Arc::clone(&metrics),
        );

        Ok(Self {
            config,
            db,
            rules,
            appointments,
            integrations,
            push_queue,
            busy_blocks,
            identity,
            availability,
            slots,
            booking,
            lifecycle,
            pull_worker,
            metrics,
            workers: Mutex::new(Workers { push, pull, completion, started: false }),
        })
    }

    /// Start the background workers (fail-fast)
    ///
    /// A no-op when sync is disabled in configuration. Any worker that
    /// cannot start aborts startup; a half-started process would silently
    /// stop reconciling calendars.
    pub async fn start_workers(&self) -> Result<()> {
        if !self.config.sync.enabled {
            info!("background sync disabled by configuration");
            return Ok(());
        }

        let mut workers = self.workers.lock().await;
        if workers.started {
            return Err(BooklineError::Internal("workers already started".to_string()));
        }

        workers.push.start().map_err(startup_error("push worker"))?;
        workers.pull.start().map_err(startup_error("pull scheduler"))?;
        tokio::time::timeout(WORKER_LIFECYCLE_TIMEOUT, workers.completion.start())
            .await
            .map_err(|_| {
                BooklineError::Internal("completion scheduler start timed out".to_string())
            })?
            .map_err(startup_error("completion scheduler"))?;

        workers.started = true;
        info!("background workers started");
        Ok(())
    }

    /// Stop the background workers, waiting for their loops to drain
    ///
    /// Safe to call more than once; a second call finds nothing running.
    pub async fn shutdown(&self) {
        let mut workers = self.workers.lock().await;
        if !workers.started {
            return;
        }

        for (name, outcome) in [
            ("push worker", workers.push.stop().await),
            ("pull scheduler", workers.pull.stop().await),
            ("completion scheduler", workers.completion.stop().await),
        ] {
            if let Err(err) = outcome {
                warn!(worker = name, error = %err, "worker did not stop cleanly");
            }
        }

        workers.started = false;
        info!("background workers stopped");
    }

    /// Check health of all application components
    ///
    /// Returns a `HealthStatus` with individual component checks and an
    /// overall score. Workers only count while sync is enabled.
    pub async fn health_check(&self) -> HealthStatus {
        let mut status = HealthStatus::new();

        status = status.add_component(self.check_database_health().await);

        if self.config.sync.enabled {
            let workers = self.workers.lock().await;
            status = status
                .add_component(running("push_worker", workers.push.is_running()))
                .add_component(running("pull_scheduler", workers.pull.is_running()))
                .add_component(running("completion_scheduler", workers.completion.is_running()));
        }

        status = status.add_component(match self.push_queue.pending_count().await {
            Ok(pending) => {
                let mut component = ComponentHealth::healthy("push_queue");
                component.message = Some(format!("{pending} pending jobs"));
                component
            }
            Err(err) => ComponentHealth::unhealthy("push_queue", err.to_string()),
        });

        status.calculate_score();
        status
    }

    async fn check_database_health(&self) -> ComponentHealth {
        let db = Arc::clone(&self.db);
        let probe = tokio::task::spawn_blocking(move || db.health_check()).await;

        match probe {
            Ok(Ok(())) => ComponentHealth::healthy("database"),
            Ok(Err(err)) => ComponentHealth::unhealthy("database", err.to_string()),
            Err(join_err) => {
                ComponentHealth::unhealthy("database", format!("probe panicked: {join_err}"))
            }
        }
    }
}

fn running(name: &str, is_running: bool) -> ComponentHealth {
    if is_running {
        ComponentHealth::healthy(name)
    } else {
        ComponentHealth::unhealthy(name, "not running")
    }
}

fn startup_error(worker: &'static str) -> impl Fn(SchedulerError) -> BooklineError {
    move |err| BooklineError::Internal(format!("failed to start {worker}: {err}"))
}

/// OAuth client credentials from the environment
///
/// Absent credentials are not a startup error: the gateways are built
/// regardless and token refresh fails with `Auth` at call time, which
/// degrades the affected integration without blocking local booking.
fn vendor_credentials(prefix: &str) -> OauthCredentials {
    OauthCredentials {
        client_id: std::env::var(format!("{prefix}_CLIENT_ID")).unwrap_or_default(),
        client_secret: std::env::var(format!("{prefix}_CLIENT_SECRET")).unwrap_or_default(),
    }
}
