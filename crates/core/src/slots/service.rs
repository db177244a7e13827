//! Fetches scheduling state and runs the generator over it

use std::sync::Arc;

use bookline_domain::{BooklineError, Result, Slot};
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::availability::ports::RuleRepository;
use crate::booking::ports::AppointmentRepository;
use crate::slots::generator::{generate_slots, DateSpan, SlotQuery};
use crate::sync::ports::BusyBlockStore;

/// Longest date span a single query may cover
const MAX_SPAN_DAYS: i64 = 366;

/// Read side of scheduling: assembles one consistent snapshot and
/// generates the open slots from it
pub struct SlotService {
    rules: Arc<dyn RuleRepository>,
    appointments: Arc<dyn AppointmentRepository>,
    busy_blocks: Arc<dyn BusyBlockStore>,
}

impl SlotService {
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        appointments: Arc<dyn AppointmentRepository>,
        busy_blocks: Arc<dyn BusyBlockStore>,
    ) -> Self {
        Self { rules, appointments, busy_blocks }
    }

    /// Every open slot for the provider across the span
    pub async fn open_slots(
        &self,
        provider_id: Uuid,
        span: DateSpan,
        now: DateTime<Utc>,
    ) -> Result<Vec<Slot>> {
        if span.to < span.from {
            return Err(BooklineError::InvalidInput(
                "date span end precedes start".to_string(),
            ));
        }
        if span.num_days() > MAX_SPAN_DAYS {
            return Err(BooklineError::InvalidInput(format!(
                "date span exceeds {MAX_SPAN_DAYS} days"
            )));
        }

        let policy = self.rules.get_policy(provider_id).await?.ok_or_else(|| {
            BooklineError::NotFound(format!("no booking policy for provider {provider_id}"))
        })?;
        let rules = self.rules.weekly_rules(provider_id).await?;
        let overrides = self.rules.overrides_between(provider_id, span.from, span.to).await?;

        // The two day margin absorbs timezone offsets and bookings whose
        // padded interval reaches into the span
        let fetch_from =
            Utc.from_utc_datetime(&span.from.and_time(NaiveTime::MIN)) - Duration::days(2);
        let fetch_to =
            Utc.from_utc_datetime(&span.to.and_time(NaiveTime::MIN)) + Duration::days(3);
        let appointments = self
            .appointments
            .capacity_holders_between(provider_id, fetch_from, fetch_to)
            .await?;
        let busy_blocks = self.busy_blocks.blocks_for_provider(provider_id);

        debug!(
            %provider_id,
            rules = rules.len(),
            appointments = appointments.len(),
            busy_blocks = busy_blocks.len(),
            "generating slots"
        );

        let query = SlotQuery {
            provider_id,
            policy: &policy,
            rules: &rules,
            overrides: &overrides,
            appointments: &appointments,
            busy_blocks: &busy_blocks,
        };
        generate_slots(&query, span, now)
    }
}
