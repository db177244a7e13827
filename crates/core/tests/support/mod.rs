//! In-memory port implementations for cross-service tests
//!
//! These mirror the storage semantics the production repositories
//! promise: the reserve capacity check runs atomically under a single
//! lock and status updates guard against concurrent transitions.

use std::collections::HashMap;

use async_trait::async_trait;
use bookline_core::{
    AppointmentRepository, BusyBlockStore, IntegrationRepository, PushQueue, RuleRepository,
};
use bookline_domain::{
    ActorRole, Appointment, AppointmentStatus, AvailabilityOverride, AvailabilityRule,
    BookingPolicy, BooklineError, CalendarIntegration, ContactSnapshot, ExternalBusyBlock,
    Identity, PushJob, PushStatus, Result,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryRuleRepository {
    rules: Mutex<Vec<AvailabilityRule>>,
    overrides: Mutex<Vec<AvailabilityOverride>>,
    policies: Mutex<HashMap<Uuid, BookingPolicy>>,
}

#[async_trait]
impl RuleRepository for InMemoryRuleRepository {
    async fn weekly_rules(&self, provider_id: Uuid) -> Result<Vec<AvailabilityRule>> {
        Ok(self
            .rules
            .lock()
            .await
            .iter()
            .filter(|r| r.provider_id == provider_id)
            .cloned()
            .collect())
    }

    async fn replace_weekly_rules(
        &self,
        provider_id: Uuid,
        rules: &[AvailabilityRule],
    ) -> Result<()> {
        let mut stored = self.rules.lock().await;
        stored.retain(|r| r.provider_id != provider_id);
        stored.extend_from_slice(rules);
        Ok(())
    }

    async fn find_override(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<AvailabilityOverride>> {
        Ok(self
            .overrides
            .lock()
            .await
            .iter()
            .find(|o| o.provider_id == provider_id && o.date == date)
            .cloned())
    }

    async fn overrides_between(
        &self,
        provider_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AvailabilityOverride>> {
        Ok(self
            .overrides
            .lock()
            .await
            .iter()
            .filter(|o| o.provider_id == provider_id && o.date >= from && o.date <= to)
            .cloned()
            .collect())
    }

    async fn upsert_override(&self, value: &AvailabilityOverride) -> Result<()> {
        let mut overrides = self.overrides.lock().await;
        overrides.retain(|o| !(o.provider_id == value.provider_id && o.date == value.date));
        overrides.push(value.clone());
        Ok(())
    }

    async fn get_policy(&self, provider_id: Uuid) -> Result<Option<BookingPolicy>> {
        Ok(self.policies.lock().await.get(&provider_id).cloned())
    }

    async fn upsert_policy(&self, policy: &BookingPolicy) -> Result<()> {
        self.policies.lock().await.insert(policy.provider_id, policy.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAppointmentRepository {
    rows: Mutex<Vec<Appointment>>,
}

#[async_trait]
impl AppointmentRepository for InMemoryAppointmentRepository {
    async fn reserve(&self, appointment: &Appointment, capacity: u32) -> Result<()> {
        // Count and insert under one lock so concurrent reserves for the
        // last opening cannot both succeed
        let mut rows = self.rows.lock().await;
        let padded_end = appointment.padded_end_at();
        let held = rows
            .iter()
            .filter(|a| a.provider_id == appointment.provider_id)
            .filter(|a| a.status.holds_capacity())
            .filter(|a| a.overlaps_padded(appointment.start_at, padded_end))
            .count();
        if held >= capacity as usize {
            return Err(BooklineError::SlotTaken(
                "the requested slot is no longer available".to_string(),
            ));
        }
        rows.push(appointment.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Appointment>> {
        Ok(self.rows.lock().await.iter().find(|a| a.id == id).cloned())
    }

    async fn list_for_requester(&self, requester_id: &str) -> Result<Vec<Appointment>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|a| a.requester_id == requester_id)
            .cloned()
            .collect())
    }

    async fn list_for_provider(
        &self,
        provider_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|a| a.provider_id == provider_id && a.start_at >= from && a.start_at < to)
            .cloned()
            .collect())
    }

    async fn capacity_holders_between(
        &self,
        provider_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|a| a.provider_id == provider_id && a.status.holds_capacity())
            .filter(|a| a.overlaps_padded(from, to))
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        next: AppointmentStatus,
        cancelled_by: Option<ActorRole>,
        now: DateTime<Utc>,
    ) -> Result<Appointment> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| BooklineError::NotFound(format!("appointment {id}")))?;
        if row.status != expected {
            return Err(BooklineError::InvalidTransition(format!(
                "appointment is {} not {expected}",
                row.status
            )));
        }
        row.status = next;
        if next == AppointmentStatus::Cancelled {
            row.cancelled_by = cancelled_by;
        }
        row.updated_at = now;
        Ok(row.clone())
    }

    async fn complete_overdue(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut rows = self.rows.lock().await;
        let mut changed = 0;
        for row in rows.iter_mut() {
            if row.status == AppointmentStatus::Confirmed && row.end_at() <= now {
                row.status = AppointmentStatus::Completed;
                row.updated_at = now;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn set_external_link(
        &self,
        id: Uuid,
        external_event_id: &str,
        integration_id: Uuid,
    ) -> Result<()> {
        let mut rows = self.rows.lock().await;
        if let Some(row) = rows.iter_mut().find(|a| a.id == id) {
            row.external_event_id = Some(external_event_id.to_string());
            row.integration_id = Some(integration_id);
        }
        Ok(())
    }

    async fn set_orphaned(&self, id: Uuid, orphaned: bool) -> Result<()> {
        let mut rows = self.rows.lock().await;
        if let Some(row) = rows.iter_mut().find(|a| a.id == id) {
            row.orphaned = orphaned;
        }
        Ok(())
    }

    async fn linked_to_integration(&self, integration_id: Uuid) -> Result<Vec<Appointment>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|a| {
                a.integration_id == Some(integration_id)
                    && a.status == AppointmentStatus::Confirmed
                    && a.external_event_id.is_some()
            })
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryIntegrationRepository {
    rows: Mutex<Vec<CalendarIntegration>>,
}

#[async_trait]
impl IntegrationRepository for InMemoryIntegrationRepository {
    async fn find(&self, id: Uuid) -> Result<Option<CalendarIntegration>> {
        Ok(self.rows.lock().await.iter().find(|i| i.id == id).cloned())
    }

    async fn find_enabled_for_provider(
        &self,
        provider_id: Uuid,
    ) -> Result<Option<CalendarIntegration>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .find(|i| i.provider_id == provider_id && i.enabled)
            .cloned())
    }

    async fn list_enabled(&self) -> Result<Vec<CalendarIntegration>> {
        Ok(self.rows.lock().await.iter().filter(|i| i.enabled).cloned().collect())
    }

    async fn upsert(&self, integration: &CalendarIntegration) -> Result<()> {
        let mut rows = self.rows.lock().await;
        rows.retain(|i| i.id != integration.id);
        rows.push(integration.clone());
        Ok(())
    }

    async fn update_tokens(
        &self,
        id: Uuid,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut rows = self.rows.lock().await;
        if let Some(row) = rows.iter_mut().find(|i| i.id == id) {
            row.access_token = access_token.to_string();
            row.token_expires_at = Some(expires_at);
        }
        Ok(())
    }

    async fn record_sync_success(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let mut rows = self.rows.lock().await;
        if let Some(row) = rows.iter_mut().find(|i| i.id == id) {
            row.sync_health = bookline_domain::SyncHealth::Ok;
            row.consecutive_failures = 0;
            row.next_retry_at = None;
            row.last_synced_at = Some(now);
        }
        Ok(())
    }

    async fn record_sync_failure(&self, id: Uuid, next_retry_at: DateTime<Utc>) -> Result<()> {
        let mut rows = self.rows.lock().await;
        if let Some(row) = rows.iter_mut().find(|i| i.id == id) {
            row.sync_health = bookline_domain::SyncHealth::Degraded;
            row.consecutive_failures += 1;
            row.next_retry_at = Some(next_retry_at);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPushQueue {
    jobs: Mutex<Vec<PushJob>>,
}

impl InMemoryPushQueue {
    pub async fn all_jobs(&self) -> Vec<PushJob> {
        self.jobs.lock().await.clone()
    }
}

#[async_trait]
impl PushQueue for InMemoryPushQueue {
    async fn enqueue(&self, job: &PushJob) -> Result<()> {
        self.jobs.lock().await.push(job.clone());
        Ok(())
    }

    async fn due_jobs(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<PushJob>> {
        Ok(self
            .jobs
            .lock()
            .await
            .iter()
            .filter(|j| j.status == PushStatus::Pending)
            .filter(|j| j.next_attempt_at.map_or(true, |at| at <= now))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_sent(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            job.status = PushStatus::Sent;
            job.sent_at = Some(now);
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, reason: &str, next_attempt_at: DateTime<Utc>) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            job.status = PushStatus::Failed;
            job.attempts += 1;
            job.last_error = Some(reason.to_string());
            job.next_attempt_at = Some(next_attempt_at);
        }
        Ok(())
    }

    async fn mark_dismissed(&self, id: Uuid, reason: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            job.status = PushStatus::Dismissed;
            job.last_error = Some(reason.to_string());
        }
        Ok(())
    }

    async fn pending_count(&self) -> Result<u64> {
        Ok(self
            .jobs
            .lock()
            .await
            .iter()
            .filter(|j| j.status == PushStatus::Pending)
            .count() as u64)
    }
}

#[derive(Default)]
pub struct InMemoryBusyBlockStore {
    blocks: std::sync::Mutex<HashMap<Uuid, HashMap<Uuid, Vec<ExternalBusyBlock>>>>,
}

impl BusyBlockStore for InMemoryBusyBlockStore {
    fn replace_blocks(
        &self,
        provider_id: Uuid,
        integration_id: Uuid,
        blocks: Vec<ExternalBusyBlock>,
    ) {
        self.blocks
            .lock()
            .unwrap()
            .entry(provider_id)
            .or_default()
            .insert(integration_id, blocks);
    }

    fn blocks_for_provider(&self, provider_id: Uuid) -> Vec<ExternalBusyBlock> {
        self.blocks
            .lock()
            .unwrap()
            .get(&provider_id)
            .map(|by_integration| by_integration.values().flatten().copied().collect())
            .unwrap_or_default()
    }

    fn clear_integration(&self, integration_id: Uuid) {
        for by_integration in self.blocks.lock().unwrap().values_mut() {
            by_integration.remove(&integration_id);
        }
    }
}

/// Seed a provider with a Monday 09:00-18:00 rule and a 30/10 policy
pub async fn seed_weekday_provider(rules: &InMemoryRuleRepository) -> Uuid {
    let provider_id = Uuid::now_v7();
    rules
        .upsert_policy(&BookingPolicy {
            provider_id,
            slot_duration_minutes: 30,
            min_advance_hours: 2,
            max_advance_days: 90,
            cancellation_cutoff_hours: 24,
            lunch_start: None,
            lunch_end: None,
            timezone: "UTC".to_string(),
        })
        .await
        .expect("seed policy");
    rules
        .replace_weekly_rules(
            provider_id,
            &[AvailabilityRule {
                provider_id,
                weekday: 0,
                start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
                enabled: true,
                max_concurrent: 1,
                buffer_minutes: 10,
            }],
        )
        .await
        .expect("seed rules");
    provider_id
}

pub fn client(subject: &str) -> Identity {
    Identity { subject: subject.to_string(), role: ActorRole::Client }
}

pub fn contact() -> ContactSnapshot {
    ContactSnapshot {
        name: "Ada Lovelace".to_string(),
        email: "ada@example.com".to_string(),
        phone: None,
    }
}
