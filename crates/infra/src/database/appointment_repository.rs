//! SQLite implementation of the appointment ledger port.
//!
//! The reserve path runs its capacity count and insert inside one
//! `BEGIN IMMEDIATE` transaction. SQLite admits a single writer, so two
//! concurrent reservations for the last opening serialize here and the
//! loser sees the winner's row in its count.

use std::sync::Arc;

use async_trait::async_trait;
use bookline_core::AppointmentRepository;
use bookline_domain::{
    ActorRole, Appointment, AppointmentStatus, BooklineError, ContactSnapshot, Result,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row, TransactionBehavior};
use tokio::task;
use tracing::instrument;
use uuid::Uuid;

use super::manager::DbManager;
use super::{map_join_error, read_instant, read_status, read_uuid};
use crate::errors::InfraError;

/// SQLite-backed appointment ledger.
pub struct SqliteAppointmentRepository {
    db: Arc<DbManager>,
}

impl SqliteAppointmentRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

const APPOINTMENT_COLUMNS: &str = "id, provider_id, requester_id, requester_name, \
     requester_email, requester_phone, start_at, duration_minutes, buffer_minutes, status, \
     orphaned, external_event_id, integration_id, cancelled_by, created_at, updated_at";

const APPOINTMENT_INSERT_SQL: &str = "INSERT INTO appointments (
        id, provider_id, requester_id, requester_name, requester_email, requester_phone,
        start_at, duration_minutes, buffer_minutes, status, orphaned, external_event_id,
        integration_id, cancelled_by, created_at, updated_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)";

// Padded-overlap predicate against [?from, ?to): a row occupies
// capacity from start_at to start_at + (duration + buffer) * 60.
const OVERLAP_PREDICATE: &str = "status IN ('pending', 'confirmed')
       AND start_at < ?2
       AND ?3 < start_at + (duration_minutes + buffer_minutes) * 60";

fn map_appointment_row(row: &Row<'_>) -> rusqlite::Result<Appointment> {
    let id: String = row.get(0)?;
    let provider_id: String = row.get(1)?;
    let status: String = row.get(9)?;
    let integration_id: Option<String> = row.get(12)?;
    let cancelled_by: Option<String> = row.get(13)?;

    Ok(Appointment {
        id: read_uuid(0, &id)?,
        provider_id: read_uuid(1, &provider_id)?,
        requester_id: row.get(2)?,
        requester_contact: ContactSnapshot {
            name: row.get(3)?,
            email: row.get(4)?,
            phone: row.get(5)?,
        },
        start_at: read_instant(6, row.get(6)?)?,
        duration_minutes: row.get(7)?,
        buffer_minutes: row.get(8)?,
        status: read_status(9, &status)?,
        orphaned: row.get(10)?,
        external_event_id: row.get(11)?,
        integration_id: integration_id.as_deref().map(|raw| read_uuid(12, raw)).transpose()?,
        cancelled_by: cancelled_by.as_deref().map(|raw| read_status(13, raw)).transpose()?,
        created_at: read_instant(14, row.get(14)?)?,
        updated_at: read_instant(15, row.get(15)?)?,
    })
}

fn insert_appointment(tx: &rusqlite::Transaction<'_>, appointment: &Appointment) -> Result<()> {
    let id = appointment.id.to_string();
    let provider_id = appointment.provider_id.to_string();
    let status = appointment.status.to_string();
    let integration_id = appointment.integration_id.map(|v| v.to_string());
    let cancelled_by = appointment.cancelled_by.map(|v| v.to_string());
    let start_at = appointment.start_at.timestamp();
    let created_at = appointment.created_at.timestamp();
    let updated_at = appointment.updated_at.timestamp();

    let sql_params: [&dyn rusqlite::ToSql; 16] = [
        &id,
        &provider_id,
        &appointment.requester_id,
        &appointment.requester_contact.name,
        &appointment.requester_contact.email,
        &appointment.requester_contact.phone,
        &start_at,
        &appointment.duration_minutes,
        &appointment.buffer_minutes,
        &status,
        &appointment.orphaned,
        &appointment.external_event_id,
        &integration_id,
        &cancelled_by,
        &created_at,
        &updated_at,
    ];

    tx.execute(APPOINTMENT_INSERT_SQL, sql_params.as_slice()).map_err(InfraError::from)?;
    Ok(())
}

#[async_trait]
impl AppointmentRepository for SqliteAppointmentRepository {
    #[instrument(skip(self, appointment), fields(appointment_id = %appointment.id))]
    async fn reserve(&self, appointment: &Appointment, capacity: u32) -> Result<()> {
        let db = Arc::clone(&self.db);
        let appointment = appointment.clone();

        task::spawn_blocking(move || -> Result<()> {
            let mut conn = db.get_connection()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(InfraError::from)?;

            let occupied: u32 = tx
                .query_row(
                    &format!(
                        "SELECT COUNT(*) FROM appointments WHERE provider_id = ?1 AND {OVERLAP_PREDICATE}"
                    ),
                    params![
                        appointment.provider_id.to_string(),
                        appointment.padded_end_at().timestamp(),
                        appointment.start_at.timestamp(),
                    ],
                    |row| row.get(0),
                )
                .map_err(InfraError::from)?;

            if occupied >= capacity {
                return Err(BooklineError::SlotTaken(format!(
                    "provider {} at {}",
                    appointment.provider_id,
                    appointment.start_at.to_rfc3339()
                )));
            }

            insert_appointment(&tx, &appointment)?;
            tx.commit().map_err(InfraError::from)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self))]
    async fn find(&self, id: Uuid) -> Result<Option<Appointment>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Option<Appointment>> {
            let conn = db.get_connection()?;
            let result = conn.query_row(
                &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1"),
                params![id.to_string()],
                map_appointment_row,
            );

            match result {
                Ok(appointment) => Ok(Some(appointment)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(InfraError::from(e).into()),
            }
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self))]
    async fn list_for_requester(&self, requester_id: &str) -> Result<Vec<Appointment>> {
        let db = Arc::clone(&self.db);
        let requester_id = requester_id.to_string();

        task::spawn_blocking(move || -> Result<Vec<Appointment>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {APPOINTMENT_COLUMNS} FROM appointments
                     WHERE requester_id = ?1 ORDER BY start_at DESC"
                ))
                .map_err(InfraError::from)?;

            let rows = stmt
                .query_map(params![requester_id], map_appointment_row)
                .map_err(InfraError::from)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(InfraError::from)?;

            Ok(rows)
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self))]
    async fn list_for_provider(
        &self,
        provider_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<Appointment>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {APPOINTMENT_COLUMNS} FROM appointments
                     WHERE provider_id = ?1 AND start_at >= ?2 AND start_at < ?3
                     ORDER BY start_at ASC"
                ))
                .map_err(InfraError::from)?;

            let rows = stmt
                .query_map(
                    params![provider_id.to_string(), from.timestamp(), to.timestamp()],
                    map_appointment_row,
                )
                .map_err(InfraError::from)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(InfraError::from)?;

            Ok(rows)
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self))]
    async fn capacity_holders_between(
        &self,
        provider_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<Appointment>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {APPOINTMENT_COLUMNS} FROM appointments
                     WHERE provider_id = ?1 AND {OVERLAP_PREDICATE}
                     ORDER BY start_at ASC"
                ))
                .map_err(InfraError::from)?;

            let rows = stmt
                .query_map(
                    params![provider_id.to_string(), to.timestamp(), from.timestamp()],
                    map_appointment_row,
                )
                .map_err(InfraError::from)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(InfraError::from)?;

            Ok(rows)
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self))]
    async fn update_status(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        next: AppointmentStatus,
        cancelled_by: Option<ActorRole>,
        now: DateTime<Utc>,
    ) -> Result<Appointment> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Appointment> {
            let mut conn = db.get_connection()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(InfraError::from)?;

            let changed = tx
                .execute(
                    "UPDATE appointments
                     SET status = ?1,
                         cancelled_by = COALESCE(?2, cancelled_by),
                         updated_at = ?3
                     WHERE id = ?4 AND status = ?5",
                    params![
                        next.to_string(),
                        cancelled_by.map(|role| role.to_string()),
                        now.timestamp(),
                        id.to_string(),
                        expected.to_string(),
                    ],
                )
                .map_err(InfraError::from)?;

            if changed == 0 {
                // Distinguish a vanished row from a lost status race
                let current = tx.query_row(
                    "SELECT status FROM appointments WHERE id = ?1",
                    params![id.to_string()],
                    |row| row.get::<_, String>(0),
                );

                return match current {
                    Ok(actual) => Err(BooklineError::InvalidTransition(format!(
                        "appointment {id} is {actual}, expected {expected}"
                    ))),
                    Err(rusqlite::Error::QueryReturnedNoRows) => {
                        Err(BooklineError::NotFound(format!("appointment {id}")))
                    }
                    Err(e) => Err(InfraError::from(e).into()),
                };
            }

            let updated = tx
                .query_row(
                    &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1"),
                    params![id.to_string()],
                    map_appointment_row,
                )
                .map_err(InfraError::from)?;

            tx.commit().map_err(InfraError::from)?;
            Ok(updated)
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self))]
    async fn complete_overdue(&self, now: DateTime<Utc>) -> Result<u64> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<u64> {
            let conn = db.get_connection()?;
            let changed = conn
                .execute(
                    "UPDATE appointments
                     SET status = 'completed', updated_at = ?1
                     WHERE status = 'confirmed'
                       AND start_at + duration_minutes * 60 <= ?1",
                    params![now.timestamp()],
                )
                .map_err(InfraError::from)?;

            Ok(changed as u64)
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self, external_event_id))]
    async fn set_external_link(
        &self,
        id: Uuid,
        external_event_id: &str,
        integration_id: Uuid,
    ) -> Result<()> {
        let db = Arc::clone(&self.db);
        let external_event_id = external_event_id.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let changed = conn
                .execute(
                    "UPDATE appointments
                     SET external_event_id = ?1, integration_id = ?2
                     WHERE id = ?3",
                    params![external_event_id, integration_id.to_string(), id.to_string()],
                )
                .map_err(InfraError::from)?;

            if changed == 0 {
                return Err(BooklineError::NotFound(format!("appointment {id}")));
            }
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self))]
    async fn set_orphaned(&self, id: Uuid, orphaned: bool) -> Result<()> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let changed = conn
                .execute(
                    "UPDATE appointments SET orphaned = ?1 WHERE id = ?2",
                    params![orphaned, id.to_string()],
                )
                .map_err(InfraError::from)?;

            if changed == 0 {
                return Err(BooklineError::NotFound(format!("appointment {id}")));
            }
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self))]
    async fn linked_to_integration(&self, integration_id: Uuid) -> Result<Vec<Appointment>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<Appointment>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {APPOINTMENT_COLUMNS} FROM appointments
                     WHERE integration_id = ?1
                       AND status = 'confirmed'
                       AND external_event_id IS NOT NULL
                     ORDER BY start_at ASC"
                ))
                .map_err(InfraError::from)?;

            let rows = stmt
                .query_map(params![integration_id.to_string()], map_appointment_row)
                .map_err(InfraError::from)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(InfraError::from)?;

            Ok(rows)
        })
        .await
        .map_err(map_join_error)?
    }
}
