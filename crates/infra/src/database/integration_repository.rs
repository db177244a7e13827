//! SQLite implementation of the calendar integration store.

use std::sync::Arc;

use async_trait::async_trait;
use bookline_core::IntegrationRepository;
use bookline_domain::{BooklineError, CalendarIntegration, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use tokio::task;
use tracing::instrument;
use uuid::Uuid;

use super::manager::DbManager;
use super::{map_join_error, read_instant, read_status, read_uuid};
use crate::errors::InfraError;

/// SQLite-backed storage for calendar integration rows.
pub struct SqliteIntegrationRepository {
    db: Arc<DbManager>,
}

impl SqliteIntegrationRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

const INTEGRATION_COLUMNS: &str = "id, provider_id, vendor, external_calendar_id, access_token, \
     refresh_token, token_expires_at, sync_health, enabled, consecutive_failures, next_retry_at, \
     last_synced_at";

fn map_integration_row(row: &Row<'_>) -> rusqlite::Result<CalendarIntegration> {
    let id: String = row.get(0)?;
    let provider_id: String = row.get(1)?;
    let vendor: String = row.get(2)?;
    let sync_health: String = row.get(7)?;
    let token_expires_at: Option<i64> = row.get(6)?;
    let next_retry_at: Option<i64> = row.get(10)?;
    let last_synced_at: Option<i64> = row.get(11)?;

    Ok(CalendarIntegration {
        id: read_uuid(0, &id)?,
        provider_id: read_uuid(1, &provider_id)?,
        vendor: read_status(2, &vendor)?,
        external_calendar_id: row.get(3)?,
        access_token: row.get(4)?,
        refresh_token: row.get(5)?,
        token_expires_at: token_expires_at.map(|secs| read_instant(6, secs)).transpose()?,
        sync_health: read_status(7, &sync_health)?,
        enabled: row.get(8)?,
        consecutive_failures: row.get(9)?,
        next_retry_at: next_retry_at.map(|secs| read_instant(10, secs)).transpose()?,
        last_synced_at: last_synced_at.map(|secs| read_instant(11, secs)).transpose()?,
    })
}

#[async_trait]
impl IntegrationRepository for SqliteIntegrationRepository {
    #[instrument(skip(self))]
    async fn find(&self, id: Uuid) -> Result<Option<CalendarIntegration>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Option<CalendarIntegration>> {
            let conn = db.get_connection()?;
            let result = conn.query_row(
                &format!("SELECT {INTEGRATION_COLUMNS} FROM calendar_integrations WHERE id = ?1"),
                params![id.to_string()],
                map_integration_row,
            );

            match result {
                Ok(integration) => Ok(Some(integration)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(InfraError::from(e).into()),
            }
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self))]
    async fn find_enabled_for_provider(
        &self,
        provider_id: Uuid,
    ) -> Result<Option<CalendarIntegration>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Option<CalendarIntegration>> {
            let conn = db.get_connection()?;
            let result = conn.query_row(
                &format!(
                    "SELECT {INTEGRATION_COLUMNS} FROM calendar_integrations
                     WHERE provider_id = ?1 AND enabled = 1
                     ORDER BY id LIMIT 1"
                ),
                params![provider_id.to_string()],
                map_integration_row,
            );

            match result {
                Ok(integration) => Ok(Some(integration)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(InfraError::from(e).into()),
            }
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self))]
    async fn list_enabled(&self) -> Result<Vec<CalendarIntegration>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<CalendarIntegration>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {INTEGRATION_COLUMNS} FROM calendar_integrations
                     WHERE enabled = 1 ORDER BY id"
                ))
                .map_err(InfraError::from)?;

            let rows = stmt
                .query_map([], map_integration_row)
                .map_err(InfraError::from)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(InfraError::from)?;

            Ok(rows)
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self, integration), fields(integration_id = %integration.id))]
    async fn upsert(&self, integration: &CalendarIntegration) -> Result<()> {
        let db = Arc::clone(&self.db);
        let integration = integration.clone();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;

            conn.execute(
                &format!(
                    "INSERT INTO calendar_integrations ({INTEGRATION_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                     ON CONFLICT(id) DO UPDATE SET
                         external_calendar_id = excluded.external_calendar_id,
                         access_token = excluded.access_token,
                         refresh_token = excluded.refresh_token,
                         token_expires_at = excluded.token_expires_at,
                         sync_health = excluded.sync_health,
                         enabled = excluded.enabled,
                         consecutive_failures = excluded.consecutive_failures,
                         next_retry_at = excluded.next_retry_at,
                         last_synced_at = excluded.last_synced_at"
                ),
                params![
                    integration.id.to_string(),
                    integration.provider_id.to_string(),
                    integration.vendor.to_string(),
                    integration.external_calendar_id,
                    integration.access_token,
                    integration.refresh_token,
                    integration.token_expires_at.map(|at| at.timestamp()),
                    integration.sync_health.to_string(),
                    integration.enabled,
                    integration.consecutive_failures,
                    integration.next_retry_at.map(|at| at.timestamp()),
                    integration.last_synced_at.map(|at| at.timestamp()),
                ],
            )
            .map_err(InfraError::from)?;

            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self, access_token))]
    async fn update_tokens(
        &self,
        id: Uuid,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let db = Arc::clone(&self.db);
        let access_token = access_token.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let changed = conn
                .execute(
                    "UPDATE calendar_integrations
                     SET access_token = ?1, token_expires_at = ?2
                     WHERE id = ?3",
                    params![access_token, expires_at.timestamp(), id.to_string()],
                )
                .map_err(InfraError::from)?;

            if changed == 0 {
                return Err(BooklineError::NotFound(format!("integration {id}")));
            }
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self))]
    async fn record_sync_success(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let changed = conn
                .execute(
                    "UPDATE calendar_integrations
                     SET sync_health = 'ok',
                         consecutive_failures = 0,
                         next_retry_at = NULL,
                         last_synced_at = ?1
                     WHERE id = ?2",
                    params![now.timestamp(), id.to_string()],
                )
                .map_err(InfraError::from)?;

            if changed == 0 {
                return Err(BooklineError::NotFound(format!("integration {id}")));
            }
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self))]
    async fn record_sync_failure(&self, id: Uuid, next_retry_at: DateTime<Utc>) -> Result<()> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let changed = conn
                .execute(
                    "UPDATE calendar_integrations
                     SET sync_health = 'degraded',
                         consecutive_failures = consecutive_failures + 1,
                         next_retry_at = ?1
                     WHERE id = ?2",
                    params![next_retry_at.timestamp(), id.to_string()],
                )
                .map_err(InfraError::from)?;

            if changed == 0 {
                return Err(BooklineError::NotFound(format!("integration {id}")));
            }
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }
}
