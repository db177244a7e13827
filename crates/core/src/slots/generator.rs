//! Deterministic candidate-slot generation
//!
//! The generator is a pure function over inputs the caller has already
//! fetched: no clock access, no I/O. All filtering happens against the
//! single `now` passed in, so one request sees one consistent snapshot.
//!
//! Per local date the pipeline is:
//! 1. resolve the effective window (override wins over the weekly rule)
//! 2. subtract the policy lunch window, leaving up to two sub-windows
//! 3. cut each sub-window into `duration + buffer` chunks from its start,
//!    keeping chunks whose `duration` still fits before the window end
//! 4. drop starts inside the minimum-advance period or past the horizon
//! 5. drop starts whose padded interval is already at capacity

use bookline_domain::{
    Appointment, AvailabilityOverride, AvailabilityRule, BookingPolicy, BooklineError,
    ExternalBusyBlock, OverrideKind, Result, Slot,
};
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

/// Inclusive range of local calendar dates to generate slots for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateSpan {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateSpan {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    /// Number of dates covered, zero when the span is inverted
    pub fn num_days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }
}

/// Everything the generator reads, fetched up front by the caller
///
/// `appointments` and `busy_blocks` must cover the span with enough margin
/// that intervals padding into it are included.
#[derive(Debug, Clone, Copy)]
pub struct SlotQuery<'a> {
    pub provider_id: Uuid,
    pub policy: &'a BookingPolicy,
    pub rules: &'a [AvailabilityRule],
    pub overrides: &'a [AvailabilityOverride],
    pub appointments: &'a [Appointment],
    pub busy_blocks: &'a [ExternalBusyBlock],
}

/// Working window for one date after override-over-rule precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveDay {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub buffer_minutes: u32,
    pub max_concurrent: u32,
}

/// Resolve the working window for a date, or `None` when the provider
/// does not work that day
///
/// A date override always wins over the weekly rule. An override window
/// opens the day even when the matching weekly rule is disabled or
/// absent; capacity settings still come from the weekday rule when one
/// exists, else a single unbuffered booking is assumed.
pub fn resolve_effective_day(
    date: NaiveDate,
    rules: &[AvailabilityRule],
    overrides: &[AvailabilityOverride],
) -> Option<EffectiveDay> {
    match overrides.iter().find(|o| o.date == date).map(|o| &o.kind) {
        Some(OverrideKind::Closed) => None,
        Some(OverrideKind::Window { start_time, end_time }) => {
            let weekday_rule = rules.iter().find(|r| r.covers_date(date));
            Some(EffectiveDay {
                date,
                start_time: *start_time,
                end_time: *end_time,
                buffer_minutes: weekday_rule.map_or(0, |r| r.buffer_minutes),
                max_concurrent: weekday_rule.map_or(1, |r| r.max_concurrent),
            })
        }
        None => rules.iter().find(|r| r.enabled && r.covers_date(date)).map(|r| EffectiveDay {
            date,
            start_time: r.start_time,
            end_time: r.end_time,
            buffer_minutes: r.buffer_minutes,
            max_concurrent: r.max_concurrent,
        }),
    }
}

/// All chunk boundaries for one effective day, in UTC, before any
/// advance/horizon/capacity filtering
///
/// The reserve path uses this to check that a requested start is one the
/// generator would have offered.
pub fn day_boundaries(policy: &BookingPolicy, day: &EffectiveDay) -> Result<Vec<DateTime<Utc>>> {
    let tz = policy.tz()?;
    let mut starts = Vec::new();
    for (sub_start, sub_end) in subtract_lunch(day.start_time, day.end_time, policy.lunch_window())
    {
        window_starts(
            day.date,
            sub_start,
            sub_end,
            policy.slot_duration_minutes,
            day.buffer_minutes,
            tz,
            &mut starts,
        );
    }
    Ok(starts)
}

/// Generate every open slot for the span, ordered by start ascending
///
/// Identical inputs always produce identical output; `now` is the only
/// clock the function sees.
pub fn generate_slots(
    query: &SlotQuery<'_>,
    span: DateSpan,
    now: DateTime<Utc>,
) -> Result<Vec<Slot>> {
    if span.to < span.from {
        return Err(BooklineError::InvalidInput(format!(
            "date span end {} precedes start {}",
            span.to, span.from
        )));
    }

    let policy = query.policy;
    let earliest = now + Duration::hours(i64::from(policy.min_advance_hours));
    let horizon = now + Duration::days(i64::from(policy.max_advance_days));

    let mut slots = Vec::new();
    let mut date = span.from;
    loop {
        if let Some(day) = resolve_effective_day(date, query.rules, query.overrides) {
            let padding = Duration::minutes(i64::from(
                policy.slot_duration_minutes + day.buffer_minutes,
            ));
            for start in day_boundaries(policy, &day)? {
                if start < earliest || start > horizon {
                    continue;
                }
                if occupancy(query, start, start + padding) >= day.max_concurrent as usize {
                    continue;
                }
                slots.push(Slot { start, duration_minutes: policy.slot_duration_minutes });
            }
        }
        if date >= span.to {
            break;
        }
        date = date
            .succ_opt()
            .ok_or_else(|| BooklineError::InvalidInput("date beyond calendar range".to_string()))?;
    }

    // DST fall-back can emit a later local boundary at an earlier instant
    slots.sort_by_key(|s| s.start);
    Ok(slots)
}

/// Count of capacity consumers whose padded interval overlaps
/// `[start, padded_end)`
fn occupancy(query: &SlotQuery<'_>, start: DateTime<Utc>, padded_end: DateTime<Utc>) -> usize {
    let held = query
        .appointments
        .iter()
        .filter(|a| a.provider_id == query.provider_id)
        .filter(|a| a.status.holds_capacity())
        .filter(|a| a.overlaps_padded(start, padded_end))
        .count();
    let busy =
        query.busy_blocks.iter().filter(|b| b.overlaps(start, padded_end)).count();
    held + busy
}

/// Subtract the lunch window from `[start, end)`, yielding up to two
/// non-empty sub-windows in order
fn subtract_lunch(
    start: NaiveTime,
    end: NaiveTime,
    lunch: Option<(NaiveTime, NaiveTime)>,
) -> Vec<(NaiveTime, NaiveTime)> {
    let Some((lunch_start, lunch_end)) = lunch else {
        return vec![(start, end)];
    };
    if lunch_end <= start || end <= lunch_start {
        return vec![(start, end)];
    }
    let mut parts = Vec::with_capacity(2);
    if start < lunch_start {
        parts.push((start, lunch_start));
    }
    if lunch_end < end {
        parts.push((lunch_end, end));
    }
    parts
}

/// Emit chunk starts for one local sub-window into `out`
///
/// Boundaries step by `duration + buffer` from the window start; a
/// boundary is kept while a full `duration` still fits before the end.
/// Local times that fall into a DST gap are skipped; ambiguous ones
/// resolve to the earlier UTC offset.
fn window_starts(
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    duration_minutes: u32,
    buffer_minutes: u32,
    tz: Tz,
    out: &mut Vec<DateTime<Utc>>,
) {
    let duration_secs = i64::from(duration_minutes) * 60;
    let step_secs = i64::from(duration_minutes + buffer_minutes) * 60;
    if step_secs == 0 {
        return;
    }

    let end_secs = i64::from(end.num_seconds_from_midnight());
    let mut cursor = i64::from(start.num_seconds_from_midnight());
    while end_secs - cursor >= duration_secs {
        let time = NaiveTime::from_num_seconds_from_midnight_opt(cursor as u32, 0)
            .unwrap_or(NaiveTime::MIN);
        match tz.from_local_datetime(&date.and_time(time)) {
            LocalResult::Single(dt) => out.push(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(earlier, _) => out.push(earlier.with_timezone(&Utc)),
            LocalResult::None => {}
        }
        cursor += step_secs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookline_domain::{AppointmentStatus, ContactSnapshot};

    fn t(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().to_utc()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rule(provider_id: Uuid, weekday: u8, start: NaiveTime, end: NaiveTime) -> AvailabilityRule {
        AvailabilityRule {
            provider_id,
            weekday,
            start_time: start,
            end_time: end,
            enabled: true,
            max_concurrent: 1,
            buffer_minutes: 10,
        }
    }

    fn policy(provider_id: Uuid) -> BookingPolicy {
        BookingPolicy {
            provider_id,
            slot_duration_minutes: 30,
            min_advance_hours: 0,
            max_advance_days: 90,
            cancellation_cutoff_hours: 24,
            lunch_start: None,
            lunch_end: None,
            timezone: "UTC".to_string(),
        }
    }

    fn booked(provider_id: Uuid, start: DateTime<Utc>) -> Appointment {
        Appointment {
            id: Uuid::now_v7(),
            provider_id,
            requester_id: "req-1".into(),
            requester_contact: ContactSnapshot {
                name: "Ada".into(),
                email: "ada@example.com".into(),
                phone: None,
            },
            start_at: start,
            duration_minutes: 30,
            buffer_minutes: 10,
            status: AppointmentStatus::Confirmed,
            orphaned: false,
            external_event_id: None,
            integration_id: None,
            cancelled_by: None,
            created_at: start,
            updated_at: start,
        }
    }

    fn query<'a>(
        provider_id: Uuid,
        policy: &'a BookingPolicy,
        rules: &'a [AvailabilityRule],
        overrides: &'a [AvailabilityOverride],
        appointments: &'a [Appointment],
        busy_blocks: &'a [ExternalBusyBlock],
    ) -> SlotQuery<'a> {
        SlotQuery { provider_id, policy, rules, overrides, appointments, busy_blocks }
    }

    // 2025-03-03 is a Monday.
    const MONDAY: (i32, u32, u32) = (2025, 3, 3);

    fn monday() -> NaiveDate {
        date(MONDAY.0, MONDAY.1, MONDAY.2)
    }

    #[test]
    fn test_buffered_grid_for_single_day() {
        let provider_id = Uuid::now_v7();
        let policy = policy(provider_id);
        let rules = vec![rule(provider_id, 0, hm(9, 0), hm(18, 0))];
        let q = query(provider_id, &policy, &rules, &[], &[], &[]);

        let slots = generate_slots(
            &q,
            DateSpan::new(monday(), monday()),
            t("2025-03-01T00:00:00Z"),
        )
        .unwrap();

        // 09:00-18:00 with 30min slots on a 40min stride
        assert_eq!(slots.len(), 13);
        assert_eq!(slots[0].start, t("2025-03-03T09:00:00Z"));
        assert_eq!(slots[1].start, t("2025-03-03T09:40:00Z"));
        assert_eq!(slots[2].start, t("2025-03-03T10:20:00Z"));
        assert_eq!(slots[12].start, t("2025-03-03T17:00:00Z"));
        assert!(slots.iter().all(|s| s.duration_minutes == 30));
    }

    #[test]
    fn test_booked_slot_is_excluded() {
        let provider_id = Uuid::now_v7();
        let policy = policy(provider_id);
        let rules = vec![rule(provider_id, 0, hm(9, 0), hm(18, 0))];
        let appointments = vec![booked(provider_id, t("2025-03-03T09:00:00Z"))];
        let q = query(provider_id, &policy, &rules, &[], &appointments, &[]);

        let slots = generate_slots(
            &q,
            DateSpan::new(monday(), monday()),
            t("2025-03-01T00:00:00Z"),
        )
        .unwrap();

        assert_eq!(slots.len(), 12);
        assert_eq!(slots[0].start, t("2025-03-03T09:40:00Z"));
    }

    #[test]
    fn test_cancelled_appointment_frees_the_slot() {
        let provider_id = Uuid::now_v7();
        let policy = policy(provider_id);
        let rules = vec![rule(provider_id, 0, hm(9, 0), hm(18, 0))];
        let mut cancelled = booked(provider_id, t("2025-03-03T09:00:00Z"));
        cancelled.status = AppointmentStatus::Cancelled;
        let appointments = vec![cancelled];
        let q = query(provider_id, &policy, &rules, &[], &appointments, &[]);

        let slots = generate_slots(
            &q,
            DateSpan::new(monday(), monday()),
            t("2025-03-01T00:00:00Z"),
        )
        .unwrap();

        assert_eq!(slots[0].start, t("2025-03-03T09:00:00Z"));
    }

    #[test]
    fn test_minimum_advance_drops_near_slots() {
        let provider_id = Uuid::now_v7();
        let mut policy = policy(provider_id);
        policy.min_advance_hours = 2;
        let rules = vec![rule(provider_id, 0, hm(9, 0), hm(18, 0))];
        let q = query(provider_id, &policy, &rules, &[], &[], &[]);

        // 08:00 on the day itself: 09:00 and 09:40 are under two hours away
        let slots = generate_slots(
            &q,
            DateSpan::new(monday(), monday()),
            t("2025-03-03T08:00:00Z"),
        )
        .unwrap();

        assert_eq!(slots[0].start, t("2025-03-03T10:20:00Z"));
    }

    #[test]
    fn test_horizon_drops_far_slots() {
        let provider_id = Uuid::now_v7();
        let mut policy = policy(provider_id);
        policy.max_advance_days = 1;
        let rules = vec![rule(provider_id, 0, hm(9, 0), hm(18, 0))];
        let q = query(provider_id, &policy, &rules, &[], &[], &[]);

        // Monday is three days past `now + 1 day`
        let slots = generate_slots(
            &q,
            DateSpan::new(monday(), monday()),
            t("2025-02-27T00:00:00Z"),
        )
        .unwrap();

        assert!(slots.is_empty());
    }

    #[test]
    fn test_lunch_splits_the_window() {
        let provider_id = Uuid::now_v7();
        let mut policy = policy(provider_id);
        policy.lunch_start = Some(hm(11, 0));
        policy.lunch_end = Some(hm(12, 0));
        let mut rules = vec![rule(provider_id, 0, hm(9, 0), hm(13, 0))];
        rules[0].buffer_minutes = 0;
        let q = query(provider_id, &policy, &rules, &[], &[], &[]);

        let slots = generate_slots(
            &q,
            DateSpan::new(monday(), monday()),
            t("2025-03-01T00:00:00Z"),
        )
        .unwrap();

        let starts: Vec<_> = slots.iter().map(|s| s.start).collect();
        assert_eq!(
            starts,
            vec![
                t("2025-03-03T09:00:00Z"),
                t("2025-03-03T09:30:00Z"),
                t("2025-03-03T10:00:00Z"),
                t("2025-03-03T10:30:00Z"),
                t("2025-03-03T12:00:00Z"),
                t("2025-03-03T12:30:00Z"),
            ]
        );
    }

    #[test]
    fn test_closed_override_removes_the_day() {
        let provider_id = Uuid::now_v7();
        let policy = policy(provider_id);
        let rules = vec![rule(provider_id, 0, hm(9, 0), hm(18, 0))];
        let overrides = vec![AvailabilityOverride {
            provider_id,
            date: monday(),
            kind: OverrideKind::Closed,
        }];
        let q = query(provider_id, &policy, &rules, &overrides, &[], &[]);

        let slots = generate_slots(
            &q,
            DateSpan::new(monday(), monday()),
            t("2025-03-01T00:00:00Z"),
        )
        .unwrap();

        assert!(slots.is_empty());
    }

    #[test]
    fn test_window_override_replaces_the_rule() {
        let provider_id = Uuid::now_v7();
        let policy = policy(provider_id);
        let rules = vec![rule(provider_id, 0, hm(9, 0), hm(18, 0))];
        let overrides = vec![AvailabilityOverride {
            provider_id,
            date: monday(),
            kind: OverrideKind::Window { start_time: hm(14, 0), end_time: hm(16, 0) },
        }];
        let q = query(provider_id, &policy, &rules, &overrides, &[], &[]);

        let slots = generate_slots(
            &q,
            DateSpan::new(monday(), monday()),
            t("2025-03-01T00:00:00Z"),
        )
        .unwrap();

        // Buffer still comes from the Monday rule
        let starts: Vec<_> = slots.iter().map(|s| s.start).collect();
        assert_eq!(
            starts,
            vec![
                t("2025-03-03T14:00:00Z"),
                t("2025-03-03T14:40:00Z"),
                t("2025-03-03T15:20:00Z"),
            ]
        );
    }

    #[test]
    fn test_window_override_opens_a_day_without_a_rule() {
        let provider_id = Uuid::now_v7();
        let policy = policy(provider_id);
        // 2025-03-09 is a Sunday and no rule covers it
        let sunday = date(2025, 3, 9);
        let overrides = vec![AvailabilityOverride {
            provider_id,
            date: sunday,
            kind: OverrideKind::Window { start_time: hm(10, 0), end_time: hm(11, 0) },
        }];
        let q = query(provider_id, &policy, &[], &overrides, &[], &[]);

        let slots = generate_slots(
            &q,
            DateSpan::new(sunday, sunday),
            t("2025-03-01T00:00:00Z"),
        )
        .unwrap();

        // No rule means no buffer: a plain 30min grid
        let starts: Vec<_> = slots.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![t("2025-03-09T10:00:00Z"), t("2025-03-09T10:30:00Z")]);
    }

    #[test]
    fn test_disabled_rule_yields_nothing() {
        let provider_id = Uuid::now_v7();
        let policy = policy(provider_id);
        let mut rules = vec![rule(provider_id, 0, hm(9, 0), hm(18, 0))];
        rules[0].enabled = false;
        let q = query(provider_id, &policy, &rules, &[], &[], &[]);

        let slots = generate_slots(
            &q,
            DateSpan::new(monday(), monday()),
            t("2025-03-01T00:00:00Z"),
        )
        .unwrap();

        assert!(slots.is_empty());
    }

    #[test]
    fn test_busy_block_consumes_capacity() {
        let provider_id = Uuid::now_v7();
        let policy = policy(provider_id);
        let rules = vec![rule(provider_id, 0, hm(9, 0), hm(18, 0))];
        let busy = vec![ExternalBusyBlock {
            integration_id: Uuid::now_v7(),
            start: t("2025-03-03T09:30:00Z"),
            end: t("2025-03-03T10:00:00Z"),
        }];
        let q = query(provider_id, &policy, &rules, &[], &[], &busy);

        let slots = generate_slots(
            &q,
            DateSpan::new(monday(), monday()),
            t("2025-03-01T00:00:00Z"),
        )
        .unwrap();

        // The block shadows the 09:00 and 09:40 padded intervals
        assert_eq!(slots[0].start, t("2025-03-03T10:20:00Z"));
        assert_eq!(slots.len(), 11);
    }

    #[test]
    fn test_max_concurrent_allows_parallel_bookings() {
        let provider_id = Uuid::now_v7();
        let policy = policy(provider_id);
        let mut rules = vec![rule(provider_id, 0, hm(9, 0), hm(18, 0))];
        rules[0].max_concurrent = 2;

        let one = vec![booked(provider_id, t("2025-03-03T09:00:00Z"))];
        let q = query(provider_id, &policy, &rules, &[], &one, &[]);
        let slots = generate_slots(
            &q,
            DateSpan::new(monday(), monday()),
            t("2025-03-01T00:00:00Z"),
        )
        .unwrap();
        assert_eq!(slots[0].start, t("2025-03-03T09:00:00Z"));

        let two = vec![
            booked(provider_id, t("2025-03-03T09:00:00Z")),
            booked(provider_id, t("2025-03-03T09:00:00Z")),
        ];
        let q = query(provider_id, &policy, &rules, &[], &two, &[]);
        let slots = generate_slots(
            &q,
            DateSpan::new(monday(), monday()),
            t("2025-03-01T00:00:00Z"),
        )
        .unwrap();
        assert_eq!(slots[0].start, t("2025-03-03T09:40:00Z"));
    }

    #[test]
    fn test_wall_clock_rules_follow_the_policy_timezone() {
        let provider_id = Uuid::now_v7();
        let mut policy = policy(provider_id);
        policy.timezone = "Europe/Berlin".to_string();
        let rules = vec![rule(provider_id, 0, hm(9, 0), hm(10, 0))];
        let q = query(provider_id, &policy, &rules, &[], &[], &[]);

        let slots = generate_slots(
            &q,
            DateSpan::new(monday(), monday()),
            t("2025-03-01T00:00:00Z"),
        )
        .unwrap();

        // 09:00 CET is 08:00 UTC in early March
        assert_eq!(slots[0].start, t("2025-03-03T08:00:00Z"));
    }

    #[test]
    fn test_dst_gap_skips_nonexistent_local_times() {
        let provider_id = Uuid::now_v7();
        let mut policy = policy(provider_id);
        policy.timezone = "Europe/Berlin".to_string();
        // Berlin springs forward 02:00 -> 03:00 on 2025-03-30 (a Sunday)
        let rules = vec![rule(provider_id, 6, hm(2, 0), hm(4, 0))];
        let q = query(provider_id, &policy, &rules, &[], &[], &[]);

        let spring = date(2025, 3, 30);
        let slots = generate_slots(
            &q,
            DateSpan::new(spring, spring),
            t("2025-03-29T00:00:00Z"),
        )
        .unwrap();

        // 02:00 and 02:40 never exist that night; only 03:20 CEST remains
        let starts: Vec<_> = slots.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![t("2025-03-30T01:20:00Z")]);
    }

    #[test]
    fn test_dst_fallback_resolves_to_earlier_offset() {
        let provider_id = Uuid::now_v7();
        let mut policy = policy(provider_id);
        policy.timezone = "Europe/Berlin".to_string();
        // Berlin falls back 03:00 -> 02:00 on 2025-10-26 (a Sunday)
        let mut rules = vec![rule(provider_id, 6, hm(2, 0), hm(3, 0))];
        rules[0].buffer_minutes = 0;
        let q = query(provider_id, &policy, &rules, &[], &[], &[]);

        let autumn = date(2025, 10, 26);
        let slots = generate_slots(
            &q,
            DateSpan::new(autumn, autumn),
            t("2025-10-25T00:00:00Z"),
        )
        .unwrap();

        // Both boundaries are ambiguous; the first occurrence (CEST) wins
        let starts: Vec<_> = slots.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![t("2025-10-26T00:00:00Z"), t("2025-10-26T00:30:00Z")]);
    }

    #[test]
    fn test_multi_day_output_is_ordered() {
        let provider_id = Uuid::now_v7();
        let policy = policy(provider_id);
        let rules = vec![
            rule(provider_id, 0, hm(9, 0), hm(11, 0)),
            rule(provider_id, 1, hm(9, 0), hm(11, 0)),
        ];
        let q = query(provider_id, &policy, &rules, &[], &[], &[]);

        let slots = generate_slots(
            &q,
            DateSpan::new(monday(), date(2025, 3, 4)),
            t("2025-03-01T00:00:00Z"),
        )
        .unwrap();

        assert!(!slots.is_empty());
        assert!(slots.windows(2).all(|w| w[0].start < w[1].start));
    }

    #[test]
    fn test_inverted_span_is_rejected() {
        let provider_id = Uuid::now_v7();
        let policy = policy(provider_id);
        let q = query(provider_id, &policy, &[], &[], &[], &[]);

        let result = generate_slots(
            &q,
            DateSpan::new(monday(), date(2025, 3, 1)),
            t("2025-03-01T00:00:00Z"),
        );

        assert!(matches!(result, Err(BooklineError::InvalidInput(_))));
    }

    #[test]
    fn test_subtract_lunch_cases() {
        let window = (hm(9, 0), hm(13, 0));

        assert_eq!(subtract_lunch(window.0, window.1, None), vec![(hm(9, 0), hm(13, 0))]);
        // Lunch entirely outside the window
        assert_eq!(
            subtract_lunch(window.0, window.1, Some((hm(14, 0), hm(15, 0)))),
            vec![(hm(9, 0), hm(13, 0))]
        );
        // Lunch in the middle splits it
        assert_eq!(
            subtract_lunch(window.0, window.1, Some((hm(11, 0), hm(12, 0)))),
            vec![(hm(9, 0), hm(11, 0)), (hm(12, 0), hm(13, 0))]
        );
        // Lunch overlapping the start clamps it
        assert_eq!(
            subtract_lunch(window.0, window.1, Some((hm(8, 0), hm(10, 0)))),
            vec![(hm(10, 0), hm(13, 0))]
        );
        // Lunch covering the whole window removes it
        assert!(subtract_lunch(window.0, window.1, Some((hm(8, 0), hm(14, 0)))).is_empty());
    }

    #[test]
    fn test_resolve_effective_day_precedence() {
        let provider_id = Uuid::now_v7();
        let rules = vec![rule(provider_id, 0, hm(9, 0), hm(18, 0))];

        let day = resolve_effective_day(monday(), &rules, &[]).unwrap();
        assert_eq!(day.start_time, hm(9, 0));
        assert_eq!(day.buffer_minutes, 10);

        let closed = vec![AvailabilityOverride {
            provider_id,
            date: monday(),
            kind: OverrideKind::Closed,
        }];
        assert!(resolve_effective_day(monday(), &rules, &closed).is_none());

        let window = vec![AvailabilityOverride {
            provider_id,
            date: monday(),
            kind: OverrideKind::Window { start_time: hm(12, 0), end_time: hm(15, 0) },
        }];
        let day = resolve_effective_day(monday(), &rules, &window).unwrap();
        assert_eq!(day.start_time, hm(12, 0));
        assert_eq!(day.max_concurrent, 1);
        assert_eq!(day.buffer_minutes, 10);
    }

    #[test]
    fn test_short_tail_is_not_offered() {
        let provider_id = Uuid::now_v7();
        let mut policy = policy(provider_id);
        policy.slot_duration_minutes = 45;
        // 90 minutes holds one 45min slot on a 55min stride: 09:00 fits,
        // 09:55 leaves only 35 minutes
        let rules = vec![rule(provider_id, 0, hm(9, 0), hm(10, 30))];
        let q = query(provider_id, &policy, &rules, &[], &[], &[]);

        let slots = generate_slots(
            &q,
            DateSpan::new(monday(), monday()),
            t("2025-03-01T00:00:00Z"),
        )
        .unwrap();

        let starts: Vec<_> = slots.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![t("2025-03-03T09:00:00Z")]);
    }
}
