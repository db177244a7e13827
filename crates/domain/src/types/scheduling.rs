//! Availability configuration and slot types
//!
//! These types represent the provider-facing scheduling configuration:
//! recurring weekly rules, one-off date overrides, and the booking policy
//! that governs slot length, notice windows, and cancellation.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{BooklineError, Result};

/// Recurring weekly availability window
///
/// One rule per (provider, weekday). Weekdays are numbered 0 = Monday
/// through 6 = Sunday, matching `chrono::Weekday::num_days_from_monday`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityRule {
    pub provider_id: Uuid,
    pub weekday: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub enabled: bool,
    /// Number of simultaneous bookings a single time window may hold
    pub max_concurrent: u32,
    /// Idle minutes enforced after each booking before the next may start
    pub buffer_minutes: u32,
}

impl AvailabilityRule {
    /// Whether this rule covers the given calendar date
    pub fn covers_date(&self, date: NaiveDate) -> bool {
        date.weekday().num_days_from_monday() == u32::from(self.weekday)
    }
}

/// One-off replacement for a provider's recurring rule on a specific date
///
/// Used for holidays and exceptions; always wins over the weekly rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityOverride {
    pub provider_id: Uuid,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub kind: OverrideKind,
}

/// Override payload: the date is either fully closed or open with a
/// replacement window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverrideKind {
    Closed,
    Window { start_time: NaiveTime, end_time: NaiveTime },
}

/// Per-provider booking policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingPolicy {
    pub provider_id: Uuid,
    pub slot_duration_minutes: u32,
    /// Earliest a booking may start, in hours from "now"
    pub min_advance_hours: u32,
    /// Furthest-in-future day a booking may be made, in days from "now"
    pub max_advance_days: u32,
    /// Requester-initiated cancellation is rejected inside this window
    pub cancellation_cutoff_hours: u32,
    /// Optional lunch window subtracted from every working day
    pub lunch_start: Option<NaiveTime>,
    pub lunch_end: Option<NaiveTime>,
    /// IANA timezone name; weekly rule times are wall-clock in this zone
    pub timezone: String,
}

impl BookingPolicy {
    /// Parse the policy timezone, failing with `Config` when the stored
    /// name is not a known IANA zone
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| BooklineError::Config(format!("unknown timezone: {}", self.timezone)))
    }

    /// Lunch window when both bounds are set
    pub fn lunch_window(&self) -> Option<(NaiveTime, NaiveTime)> {
        match (self.lunch_start, self.lunch_end) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            provider_id: Uuid::nil(),
            slot_duration_minutes: 30,
            min_advance_hours: 2,
            max_advance_days: 90,
            cancellation_cutoff_hours: 24,
            lunch_start: None,
            lunch_end: None,
            timezone: "UTC".to_string(),
        }
    }
}

/// A candidate bookable start time plus duration, not yet reserved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub start: DateTime<Utc>,
    pub duration_minutes: u32,
}
