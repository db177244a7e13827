//! Reservation and cancellation flows
//!
//! Reserve re-derives the candidate boundaries for the requested date and
//! rejects anything the generator would not have offered, then hands the
//! final capacity check to the repository so the count and insert happen
//! atomically. Calendar pushes ride the outbox and never gate a booking.

use std::sync::Arc;

use bookline_domain::{
    ActorRole, Appointment, AppointmentStatus, BooklineError, ContactSnapshot, Identity,
    PushOperation, Result,
};
use chrono::{DateTime, Duration, Utc};
use tracing::info;
use uuid::Uuid;

use crate::availability::ports::RuleRepository;
use crate::booking::ports::AppointmentRepository;
use crate::slots::generator::{day_boundaries, resolve_effective_day};
use crate::sync::ports::{BusyBlockStore, IntegrationRepository, PushQueue};

/// Input to a reservation attempt
#[derive(Debug, Clone)]
pub struct ReserveRequest {
    pub provider_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub requester: Identity,
    pub contact: ContactSnapshot,
    /// Reserve as a `pending` hold that still needs confirmation; the
    /// hold occupies capacity like a confirmed booking
    pub pending: bool,
}

/// Input to a cancellation attempt
#[derive(Debug, Clone)]
pub struct CancelRequest {
    pub appointment_id: Uuid,
    pub actor: Identity,
}

/// Books and cancels appointments
pub struct BookingService {
    rules: Arc<dyn RuleRepository>,
    appointments: Arc<dyn AppointmentRepository>,
    integrations: Arc<dyn IntegrationRepository>,
    push_queue: Arc<dyn PushQueue>,
    busy_blocks: Arc<dyn BusyBlockStore>,
}

impl BookingService {
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        appointments: Arc<dyn AppointmentRepository>,
        integrations: Arc<dyn IntegrationRepository>,
        push_queue: Arc<dyn PushQueue>,
        busy_blocks: Arc<dyn BusyBlockStore>,
    ) -> Self {
        Self { rules, appointments, integrations, push_queue, busy_blocks }
    }

    /// Reserve a slot, or fail with `SlotTaken` when it is gone
    ///
    /// The requested start must be a boundary the generator offers for
    /// that date and must respect the advance-notice and horizon policy
    /// against the single `now` snapshot.
    pub async fn reserve(&self, request: ReserveRequest, now: DateTime<Utc>) -> Result<Appointment> {
        let provider_id = request.provider_id;
        let policy = self.rules.get_policy(provider_id).await?.ok_or_else(|| {
            BooklineError::NotFound(format!("no booking policy for provider {provider_id}"))
        })?;
        let tz = policy.tz()?;

        let local_date = request.start_at.with_timezone(&tz).date_naive();
        let weekly = self.rules.weekly_rules(provider_id).await?;
        let overrides = match self.rules.find_override(provider_id, local_date).await? {
            Some(o) => vec![o],
            None => Vec::new(),
        };

        let day = resolve_effective_day(local_date, &weekly, &overrides).ok_or_else(|| {
            BooklineError::OutsideBookingWindow(format!(
                "provider is not available on {local_date}"
            ))
        })?;
        if !day_boundaries(&policy, &day)?.contains(&request.start_at) {
            return Err(BooklineError::OutsideBookingWindow(
                "requested start does not fall on an offered slot".to_string(),
            ));
        }
        if request.start_at < now + Duration::hours(i64::from(policy.min_advance_hours)) {
            return Err(BooklineError::OutsideBookingWindow(format!(
                "bookings require at least {} hours of notice",
                policy.min_advance_hours
            )));
        }
        if request.start_at > now + Duration::days(i64::from(policy.max_advance_days)) {
            return Err(BooklineError::OutsideBookingWindow(format!(
                "bookings open {} days ahead at most",
                policy.max_advance_days
            )));
        }

        let padded_end = request.start_at
            + Duration::minutes(i64::from(policy.slot_duration_minutes + day.buffer_minutes));
        let busy = self
            .busy_blocks
            .blocks_for_provider(provider_id)
            .iter()
            .filter(|b| b.overlaps(request.start_at, padded_end))
            .count();
        if busy >= day.max_concurrent as usize {
            return Err(BooklineError::SlotTaken(
                "the requested slot is no longer available".to_string(),
            ));
        }

        let appointment = Appointment {
            id: Uuid::now_v7(),
            provider_id,
            requester_id: request.requester.subject.clone(),
            requester_contact: request.contact,
            start_at: request.start_at,
            duration_minutes: policy.slot_duration_minutes,
            buffer_minutes: day.buffer_minutes,
            status: if request.pending {
                AppointmentStatus::Pending
            } else {
                AppointmentStatus::Confirmed
            },
            orphaned: false,
            external_event_id: None,
            integration_id: None,
            cancelled_by: None,
            created_at: now,
            updated_at: now,
        };

        // External busy blocks already claimed part of the capacity; the
        // repository atomically checks the rest against stored rows
        let capacity = day.max_concurrent - busy as u32;
        self.appointments.reserve(&appointment, capacity).await?;

        info!(
            appointment_id = %appointment.id,
            %provider_id,
            start_at = %appointment.start_at,
            status = %appointment.status,
            "appointment reserved"
        );

        if appointment.status == AppointmentStatus::Confirmed {
            self.enqueue_push(&appointment, PushOperation::Upsert, now).await;
        }
        Ok(appointment)
    }

    /// Cancel an appointment on behalf of its requester or provider
    ///
    /// Requesters are held to the cancellation cutoff; the provider may
    /// cancel at any time before a terminal state.
    pub async fn cancel(&self, request: CancelRequest, now: DateTime<Utc>) -> Result<Appointment> {
        let appointment = self
            .appointments
            .find(request.appointment_id)
            .await?
            .ok_or_else(|| {
                BooklineError::NotFound(format!(
                    "appointment {} does not exist",
                    request.appointment_id
                ))
            })?;

        authorize_actor(&request.actor, &appointment)?;

        if !appointment.status.can_transition_to(AppointmentStatus::Cancelled) {
            return Err(BooklineError::InvalidTransition(format!(
                "cannot cancel a {} appointment",
                appointment.status
            )));
        }

        if !request.actor.is_provider() {
            // Absent policy rows fall back to the default cutoff
            let cutoff_hours = self
                .rules
                .get_policy(appointment.provider_id)
                .await?
                .map_or(24, |p| p.cancellation_cutoff_hours);
            let cutoff = appointment.start_at - Duration::hours(i64::from(cutoff_hours));
            if now > cutoff {
                return Err(BooklineError::PastCancellationCutoff(format!(
                    "cancellations close {cutoff_hours} hours before the start"
                )));
            }
        }

        let updated = self
            .appointments
            .update_status(
                appointment.id,
                appointment.status,
                AppointmentStatus::Cancelled,
                Some(request.actor.role),
                now,
            )
            .await?;

        info!(
            appointment_id = %updated.id,
            cancelled_by = %request.actor.role,
            "appointment cancelled"
        );

        if updated.external_event_id.is_some() {
            self.enqueue_push(&updated, PushOperation::Delete, now).await;
        }
        Ok(updated)
    }

    /// Appointments visible to the acting identity
    pub async fn list_for_actor(
        &self,
        actor: &Identity,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>> {
        match actor.role {
            ActorRole::Client => self.appointments.list_for_requester(&actor.subject).await,
            ActorRole::Provider => {
                let provider_id = provider_subject_id(actor)?;
                self.appointments.list_for_provider(provider_id, from, to).await
            }
        }
    }

    async fn enqueue_push(
        &self,
        appointment: &Appointment,
        operation: PushOperation,
        now: DateTime<Utc>,
    ) {
        crate::sync::outbox::enqueue_appointment_push(
            self.integrations.as_ref(),
            self.push_queue.as_ref(),
            appointment,
            operation,
            now,
        )
        .await;
    }
}

/// Parse a provider identity's subject as its provider id
pub(crate) fn provider_subject_id(actor: &Identity) -> Result<Uuid> {
    Uuid::parse_str(&actor.subject).map_err(|_| {
        BooklineError::Auth("provider subject is not a valid provider id".to_string())
    })
}

/// Reject actors with no claim on the appointment
pub(crate) fn authorize_actor(actor: &Identity, appointment: &Appointment) -> Result<()> {
    match actor.role {
        ActorRole::Client if actor.subject == appointment.requester_id => Ok(()),
        ActorRole::Provider if provider_subject_id(actor)? == appointment.provider_id => Ok(()),
        _ => Err(BooklineError::Auth(
            "actor has no access to this appointment".to_string(),
        )),
    }
}
