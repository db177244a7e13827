//! Infrastructure layer for Bookline
//!
//! Everything that touches the outside world lives here: the SQLite
//! persistence behind the core ports, the Google/Microsoft calendar
//! connectors, the identity-service client, and the background workers
//! that push the outbox and pull external busy blocks.
//!
//! The layer depends inward only. `bookline-core` defines the port
//! traits; this crate implements them and never reaches back into
//! service logic.

pub mod cache;
pub mod config;
pub mod database;
pub mod errors;
pub mod integrations;
pub mod observability;
pub mod scheduling;
pub mod sync;

pub use cache::BusyBlockCache;
pub use database::{
    DbManager, SqliteAppointmentRepository, SqliteIntegrationRepository, SqlitePushQueue,
    SqliteRuleRepository,
};
pub use errors::InfraError;
pub use integrations::calendar::{create_calendar_gateway, OauthCredentials};
pub use integrations::identity::HttpIdentityResolver;
pub use observability::SyncMetrics;
pub use scheduling::{CompletionScheduler, PullScheduler, SchedulerError, SchedulerResult};
pub use sync::{
    GatewaySet, PullCycleStats, PullWorker, PullWorkerConfig, PushWorker, PushWorkerConfig,
};
