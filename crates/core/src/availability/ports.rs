//! Port interfaces for availability configuration storage

use async_trait::async_trait;
use bookline_domain::{AvailabilityOverride, AvailabilityRule, BookingPolicy, Result};
use chrono::NaiveDate;
use uuid::Uuid;

/// Storage for weekly rules, date overrides, and booking policies
#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// All weekly rules for a provider, enabled or not
    async fn weekly_rules(&self, provider_id: Uuid) -> Result<Vec<AvailabilityRule>>;

    /// Replace the provider's weekly rule set atomically
    async fn replace_weekly_rules(
        &self,
        provider_id: Uuid,
        rules: &[AvailabilityRule],
    ) -> Result<()>;

    /// The override for one date, if any
    async fn find_override(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<AvailabilityOverride>>;

    /// Overrides falling inside the inclusive date range
    async fn overrides_between(
        &self,
        provider_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AvailabilityOverride>>;

    /// Insert or replace the override for its date
    async fn upsert_override(&self, value: &AvailabilityOverride) -> Result<()>;

    /// The provider's booking policy, if one has been configured
    async fn get_policy(&self, provider_id: Uuid) -> Result<Option<BookingPolicy>>;

    /// Insert or replace the provider's booking policy
    async fn upsert_policy(&self, policy: &BookingPolicy) -> Result<()>;
}
