//! SQLite implementation of the push outbox.
//!
//! A job that failed an attempt keeps its armed `next_attempt_at` and is
//! picked up again once the gate passes; only `sent` and `dismissed` rows
//! leave the queue.

use std::sync::Arc;

use async_trait::async_trait;
use bookline_core::PushQueue;
use bookline_domain::{BooklineError, PushJob, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use tokio::task;
use tracing::instrument;
use uuid::Uuid;

use super::manager::DbManager;
use super::{map_join_error, read_instant, read_status, read_uuid};
use crate::errors::InfraError;

/// SQLite-backed push outbox.
pub struct SqlitePushQueue {
    db: Arc<DbManager>,
}

impl SqlitePushQueue {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

const PUSH_JOB_COLUMNS: &str = "id, appointment_id, integration_id, operation, status, attempts, \
     last_error, next_attempt_at, created_at, sent_at";

fn map_push_job_row(row: &Row<'_>) -> rusqlite::Result<PushJob> {
    let id: String = row.get(0)?;
    let appointment_id: String = row.get(1)?;
    let integration_id: String = row.get(2)?;
    let operation: String = row.get(3)?;
    let status: String = row.get(4)?;
    let created_at: i64 = row.get(8)?;
    let next_attempt_at: Option<i64> = row.get(7)?;
    let sent_at: Option<i64> = row.get(9)?;

    Ok(PushJob {
        id: read_uuid(0, &id)?,
        appointment_id: read_uuid(1, &appointment_id)?,
        integration_id: read_uuid(2, &integration_id)?,
        operation: read_status(3, &operation)?,
        status: read_status(4, &status)?,
        attempts: row.get(5)?,
        last_error: row.get(6)?,
        next_attempt_at: next_attempt_at.map(|secs| read_instant(7, secs)).transpose()?,
        created_at: read_instant(8, created_at)?,
        sent_at: sent_at.map(|secs| read_instant(9, secs)).transpose()?,
    })
}

#[async_trait]
impl PushQueue for SqlitePushQueue {
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    async fn enqueue(&self, job: &PushJob) -> Result<()> {
        let db = Arc::clone(&self.db);
        let job = job.clone();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;

            conn.execute(
                &format!(
                    "INSERT INTO push_jobs ({PUSH_JOB_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    job.id.to_string(),
                    job.appointment_id.to_string(),
                    job.integration_id.to_string(),
                    job.operation.to_string(),
                    job.status.to_string(),
                    job.attempts,
                    job.last_error,
                    job.next_attempt_at.map(|at| at.timestamp()),
                    job.created_at.timestamp(),
                    job.sent_at.map(|at| at.timestamp()),
                ],
            )
            .map_err(InfraError::from)?;

            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self))]
    async fn due_jobs(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<PushJob>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<PushJob>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {PUSH_JOB_COLUMNS} FROM push_jobs
                     WHERE status IN ('pending', 'failed')
                       AND (next_attempt_at IS NULL OR next_attempt_at <= ?1)
                     ORDER BY created_at ASC, id ASC
                     LIMIT ?2"
                ))
                .map_err(InfraError::from)?;

            let jobs = stmt
                .query_map(params![now.timestamp(), limit as i64], map_push_job_row)
                .map_err(InfraError::from)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(InfraError::from)?;

            Ok(jobs)
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self))]
    async fn mark_sent(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let changed = conn
                .execute(
                    "UPDATE push_jobs SET status = 'sent', sent_at = ?1 WHERE id = ?2",
                    params![now.timestamp(), id.to_string()],
                )
                .map_err(InfraError::from)?;

            if changed == 0 {
                return Err(BooklineError::NotFound(format!("push job {id}")));
            }
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self, reason))]
    async fn mark_failed(
        &self,
        id: Uuid,
        reason: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<()> {
        let db = Arc::clone(&self.db);
        let reason = reason.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let changed = conn
                .execute(
                    "UPDATE push_jobs
                     SET status = 'failed',
                         attempts = attempts + 1,
                         last_error = ?1,
                         next_attempt_at = ?2
                     WHERE id = ?3",
                    params![reason, next_attempt_at.timestamp(), id.to_string()],
                )
                .map_err(InfraError::from)?;

            if changed == 0 {
                return Err(BooklineError::NotFound(format!("push job {id}")));
            }
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self, reason))]
    async fn mark_dismissed(&self, id: Uuid, reason: &str) -> Result<()> {
        let db = Arc::clone(&self.db);
        let reason = reason.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let changed = conn
                .execute(
                    "UPDATE push_jobs
                     SET status = 'dismissed', last_error = ?1, next_attempt_at = NULL
                     WHERE id = ?2",
                    params![reason, id.to_string()],
                )
                .map_err(InfraError::from)?;

            if changed == 0 {
                return Err(BooklineError::NotFound(format!("push job {id}")));
            }
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self))]
    async fn pending_count(&self) -> Result<u64> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<u64> {
            let conn = db.get_connection()?;
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM push_jobs WHERE status IN ('pending', 'failed')",
                    [],
                    |row| row.get(0),
                )
                .map_err(InfraError::from)?;

            Ok(count as u64)
        })
        .await
        .map_err(map_join_error)?
    }
}
