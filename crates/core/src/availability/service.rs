//! Validation and persistence of provider scheduling configuration

use std::collections::HashSet;
use std::sync::Arc;

use bookline_domain::{
    AvailabilityOverride, AvailabilityRule, BookingPolicy, BooklineError, OverrideKind, Result,
};
use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::availability::ports::RuleRepository;

/// A provider's full scheduling configuration for a date range
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSchedule {
    pub rules: Vec<AvailabilityRule>,
    pub overrides: Vec<AvailabilityOverride>,
    pub policy: Option<BookingPolicy>,
}

/// Validates and stores weekly rules, overrides, and booking policies
pub struct AvailabilityService {
    rules: Arc<dyn RuleRepository>,
}

impl AvailabilityService {
    pub fn new(rules: Arc<dyn RuleRepository>) -> Self {
        Self { rules }
    }

    /// Replace the provider's weekly rule set
    ///
    /// Rejects malformed windows and duplicate weekdays before anything
    /// is written; the replacement itself is atomic in storage.
    pub async fn replace_weekly_rules(
        &self,
        provider_id: Uuid,
        rules: Vec<AvailabilityRule>,
    ) -> Result<()> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if rule.provider_id != provider_id {
                return Err(BooklineError::InvalidInput(
                    "rule provider_id does not match the target provider".to_string(),
                ));
            }
            validate_rule(rule)?;
            if !seen.insert(rule.weekday) {
                return Err(BooklineError::InvalidRule(format!(
                    "more than one rule for weekday {}",
                    rule.weekday
                )));
            }
        }

        debug!(%provider_id, count = rules.len(), "replacing weekly rules");
        self.rules.replace_weekly_rules(provider_id, &rules).await
    }

    /// Insert or replace the override for one date
    pub async fn upsert_override(&self, value: AvailabilityOverride) -> Result<()> {
        if let OverrideKind::Window { start_time, end_time } = &value.kind {
            if start_time >= end_time {
                return Err(BooklineError::InvalidRule(
                    "override start_time must be before end_time".to_string(),
                ));
            }
        }

        debug!(provider_id = %value.provider_id, date = %value.date, "storing date override");
        self.rules.upsert_override(&value).await
    }

    /// Validate and store the provider's booking policy
    pub async fn set_policy(&self, policy: BookingPolicy) -> Result<()> {
        validate_policy(&policy)?;
        debug!(provider_id = %policy.provider_id, "storing booking policy");
        self.rules.upsert_policy(&policy).await
    }

    /// The provider's rules, overrides in range, and policy in one read
    pub async fn schedule(
        &self,
        provider_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<ProviderSchedule> {
        if to < from {
            return Err(BooklineError::InvalidInput(
                "schedule range end precedes start".to_string(),
            ));
        }
        let rules = self.rules.weekly_rules(provider_id).await?;
        let overrides = self.rules.overrides_between(provider_id, from, to).await?;
        let policy = self.rules.get_policy(provider_id).await?;
        Ok(ProviderSchedule { rules, overrides, policy })
    }
}

fn validate_rule(rule: &AvailabilityRule) -> Result<()> {
    if rule.weekday > 6 {
        return Err(BooklineError::InvalidRule(format!(
            "weekday {} is out of range 0 (Monday) to 6 (Sunday)",
            rule.weekday
        )));
    }
    if rule.start_time >= rule.end_time {
        return Err(BooklineError::InvalidRule(
            "rule start_time must be before end_time".to_string(),
        ));
    }
    if rule.max_concurrent == 0 {
        return Err(BooklineError::InvalidRule(
            "max_concurrent must be at least 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_policy(policy: &BookingPolicy) -> Result<()> {
    if policy.slot_duration_minutes == 0 {
        return Err(BooklineError::InvalidRule(
            "slot_duration_minutes must be at least 1".to_string(),
        ));
    }
    if policy.max_advance_days == 0 {
        return Err(BooklineError::InvalidRule(
            "max_advance_days must be at least 1".to_string(),
        ));
    }
    if policy.min_advance_hours > policy.max_advance_days * 24 {
        return Err(BooklineError::InvalidRule(
            "minimum advance notice exceeds the booking horizon".to_string(),
        ));
    }
    if policy.timezone.parse::<Tz>().is_err() {
        return Err(BooklineError::InvalidRule(format!(
            "unknown timezone: {}",
            policy.timezone
        )));
    }
    match (policy.lunch_start, policy.lunch_end) {
        (None, None) => {}
        (Some(start), Some(end)) if start < end => {}
        (Some(_), Some(_)) => {
            return Err(BooklineError::InvalidRule(
                "lunch_start must be before lunch_end".to_string(),
            ));
        }
        _ => {
            return Err(BooklineError::InvalidRule(
                "lunch window requires both lunch_start and lunch_end".to_string(),
            ));
        }
    }
    Ok(())
}
