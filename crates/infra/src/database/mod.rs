//! SQLite persistence layer
//!
//! One repository per core port, all sharing the pooled [`DbManager`].
//! Blocking rusqlite work runs on the tokio blocking pool; every
//! repository method is async at the trait boundary.
//!
//! Column conventions: UUIDs and status enums are stored as TEXT,
//! instants as unix seconds, wall-clock times as `HH:MM:SS`, dates as
//! `YYYY-MM-DD`.

mod appointment_repository;
mod integration_repository;
mod manager;
mod push_queue_repository;
mod rule_repository;

pub use appointment_repository::SqliteAppointmentRepository;
pub use integration_repository::SqliteIntegrationRepository;
pub use manager::{DbConnection, DbManager};
pub use push_queue_repository::SqlitePushQueue;
pub use rule_repository::SqliteRuleRepository;

use bookline_domain::BooklineError;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::types::Type;
use uuid::Uuid;

pub(crate) const TIME_FORMAT: &str = "%H:%M:%S";
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn read_uuid(idx: usize, raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn read_instant(idx: usize, secs: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, secs))
}

pub(crate) fn read_time(idx: usize, raw: &str) -> rusqlite::Result<NaiveTime> {
    NaiveTime::parse_from_str(raw, TIME_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn read_date(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Parse a stored status string, surfacing bad data as a conversion
/// failure instead of a silent default.
pub(crate) fn read_status<T>(idx: usize, raw: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

pub(crate) fn map_join_error(err: tokio::task::JoinError) -> BooklineError {
    if err.is_cancelled() {
        BooklineError::Internal("database task cancelled".into())
    } else {
        BooklineError::Internal(format!("database task panic: {err}"))
    }
}
