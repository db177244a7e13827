//! SQLite implementation of the availability configuration port.

use std::sync::Arc;

use async_trait::async_trait;
use bookline_core::RuleRepository;
use bookline_domain::{AvailabilityOverride, AvailabilityRule, BookingPolicy, Result};
use chrono::NaiveDate;
use rusqlite::{params, Row};
use tokio::task;
use tracing::instrument;
use uuid::Uuid;

use super::manager::DbManager;
use super::{map_join_error, read_date, read_time, read_uuid, DATE_FORMAT, TIME_FORMAT};
use crate::errors::InfraError;

/// SQLite-backed storage for weekly rules, overrides, and policies.
pub struct SqliteRuleRepository {
    db: Arc<DbManager>,
}

impl SqliteRuleRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

const RULE_COLUMNS: &str =
    "provider_id, weekday, start_time, end_time, enabled, max_concurrent, buffer_minutes";

const OVERRIDE_COLUMNS: &str = "provider_id, date, kind, start_time, end_time";

const POLICY_COLUMNS: &str = "provider_id, slot_duration_minutes, min_advance_hours, \
     max_advance_days, cancellation_cutoff_hours, lunch_start, lunch_end, timezone";

fn map_rule_row(row: &Row<'_>) -> rusqlite::Result<AvailabilityRule> {
    let provider_id: String = row.get(0)?;
    let start_time: String = row.get(2)?;
    let end_time: String = row.get(3)?;

    Ok(AvailabilityRule {
        provider_id: read_uuid(0, &provider_id)?,
        weekday: row.get(1)?,
        start_time: read_time(2, &start_time)?,
        end_time: read_time(3, &end_time)?,
        enabled: row.get(4)?,
        max_concurrent: row.get(5)?,
        buffer_minutes: row.get(6)?,
    })
}

fn map_override_row(row: &Row<'_>) -> rusqlite::Result<AvailabilityOverride> {
    let provider_id: String = row.get(0)?;
    let date: String = row.get(1)?;
    let kind: String = row.get(2)?;

    let kind = match kind.as_str() {
        "closed" => bookline_domain::OverrideKind::Closed,
        "window" => {
            let start_time: String = row.get(3)?;
            let end_time: String = row.get(4)?;
            bookline_domain::OverrideKind::Window {
                start_time: read_time(3, &start_time)?,
                end_time: read_time(4, &end_time)?,
            }
        }
        other => {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown override kind: {other}").into(),
            ))
        }
    };

    Ok(AvailabilityOverride {
        provider_id: read_uuid(0, &provider_id)?,
        date: read_date(1, &date)?,
        kind,
    })
}

fn map_policy_row(row: &Row<'_>) -> rusqlite::Result<BookingPolicy> {
    let provider_id: String = row.get(0)?;
    let lunch_start: Option<String> = row.get(5)?;
    let lunch_end: Option<String> = row.get(6)?;

    Ok(BookingPolicy {
        provider_id: read_uuid(0, &provider_id)?,
        slot_duration_minutes: row.get(1)?,
        min_advance_hours: row.get(2)?,
        max_advance_days: row.get(3)?,
        cancellation_cutoff_hours: row.get(4)?,
        lunch_start: lunch_start.as_deref().map(|raw| read_time(5, raw)).transpose()?,
        lunch_end: lunch_end.as_deref().map(|raw| read_time(6, raw)).transpose()?,
        timezone: row.get(7)?,
    })
}

#[async_trait]
impl RuleRepository for SqliteRuleRepository {
    #[instrument(skip(self))]
    async fn weekly_rules(&self, provider_id: Uuid) -> Result<Vec<AvailabilityRule>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<AvailabilityRule>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {RULE_COLUMNS} FROM availability_rules
                     WHERE provider_id = ?1 ORDER BY weekday"
                ))
                .map_err(InfraError::from)?;

            let rules = stmt
                .query_map(params![provider_id.to_string()], map_rule_row)
                .map_err(InfraError::from)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(InfraError::from)?;

            Ok(rules)
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self, rules), fields(rule_count = rules.len()))]
    async fn replace_weekly_rules(
        &self,
        provider_id: Uuid,
        rules: &[AvailabilityRule],
    ) -> Result<()> {
        let db = Arc::clone(&self.db);
        let rules = rules.to_vec();

        task::spawn_blocking(move || -> Result<()> {
            let mut conn = db.get_connection()?;
            let tx = conn.transaction().map_err(InfraError::from)?;

            tx.execute(
                "DELETE FROM availability_rules WHERE provider_id = ?1",
                params![provider_id.to_string()],
            )
            .map_err(InfraError::from)?;

            for rule in &rules {
                tx.execute(
                    &format!(
                        "INSERT INTO availability_rules ({RULE_COLUMNS})
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                    ),
                    params![
                        rule.provider_id.to_string(),
                        rule.weekday,
                        rule.start_time.format(TIME_FORMAT).to_string(),
                        rule.end_time.format(TIME_FORMAT).to_string(),
                        rule.enabled,
                        rule.max_concurrent,
                        rule.buffer_minutes,
                    ],
                )
                .map_err(InfraError::from)?;
            }

            tx.commit().map_err(InfraError::from)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self))]
    async fn find_override(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<AvailabilityOverride>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Option<AvailabilityOverride>> {
            let conn = db.get_connection()?;
            let result = conn.query_row(
                &format!(
                    "SELECT {OVERRIDE_COLUMNS} FROM availability_overrides
                     WHERE provider_id = ?1 AND date = ?2"
                ),
                params![provider_id.to_string(), date.format(DATE_FORMAT).to_string()],
                map_override_row,
            );

            match result {
                Ok(value) => Ok(Some(value)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(InfraError::from(e).into()),
            }
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self))]
    async fn overrides_between(
        &self,
        provider_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AvailabilityOverride>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<AvailabilityOverride>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {OVERRIDE_COLUMNS} FROM availability_overrides
                     WHERE provider_id = ?1 AND date BETWEEN ?2 AND ?3
                     ORDER BY date"
                ))
                .map_err(InfraError::from)?;

            let overrides = stmt
                .query_map(
                    params![
                        provider_id.to_string(),
                        from.format(DATE_FORMAT).to_string(),
                        to.format(DATE_FORMAT).to_string(),
                    ],
                    map_override_row,
                )
                .map_err(InfraError::from)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(InfraError::from)?;

            Ok(overrides)
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self, value))]
    async fn upsert_override(&self, value: &AvailabilityOverride) -> Result<()> {
        let db = Arc::clone(&self.db);
        let value = value.clone();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;

            let (kind, start_time, end_time) = match value.kind {
                bookline_domain::OverrideKind::Closed => ("closed", None, None),
                bookline_domain::OverrideKind::Window { start_time, end_time } => (
                    "window",
                    Some(start_time.format(TIME_FORMAT).to_string()),
                    Some(end_time.format(TIME_FORMAT).to_string()),
                ),
            };

            conn.execute(
                &format!(
                    "INSERT INTO availability_overrides ({OVERRIDE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(provider_id, date) DO UPDATE SET
                         kind = excluded.kind,
                         start_time = excluded.start_time,
                         end_time = excluded.end_time"
                ),
                params![
                    value.provider_id.to_string(),
                    value.date.format(DATE_FORMAT).to_string(),
                    kind,
                    start_time,
                    end_time,
                ],
            )
            .map_err(InfraError::from)?;

            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self))]
    async fn get_policy(&self, provider_id: Uuid) -> Result<Option<BookingPolicy>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Option<BookingPolicy>> {
            let conn = db.get_connection()?;
            let result = conn.query_row(
                &format!("SELECT {POLICY_COLUMNS} FROM booking_policies WHERE provider_id = ?1"),
                params![provider_id.to_string()],
                map_policy_row,
            );

            match result {
                Ok(policy) => Ok(Some(policy)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(InfraError::from(e).into()),
            }
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self, policy))]
    async fn upsert_policy(&self, policy: &BookingPolicy) -> Result<()> {
        let db = Arc::clone(&self.db);
        let policy = policy.clone();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;

            conn.execute(
                &format!(
                    "INSERT INTO booking_policies ({POLICY_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(provider_id) DO UPDATE SET
                         slot_duration_minutes = excluded.slot_duration_minutes,
                         min_advance_hours = excluded.min_advance_hours,
                         max_advance_days = excluded.max_advance_days,
                         cancellation_cutoff_hours = excluded.cancellation_cutoff_hours,
                         lunch_start = excluded.lunch_start,
                         lunch_end = excluded.lunch_end,
                         timezone = excluded.timezone"
                ),
                params![
                    policy.provider_id.to_string(),
                    policy.slot_duration_minutes,
                    policy.min_advance_hours,
                    policy.max_advance_days,
                    policy.cancellation_cutoff_hours,
                    policy.lunch_start.map(|t| t.format(TIME_FORMAT).to_string()),
                    policy.lunch_end.map(|t| t.format(TIME_FORMAT).to_string()),
                    policy.timezone,
                ],
            )
            .map_err(InfraError::from)?;

            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }
}
