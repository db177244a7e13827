//! Confirmation, no-show marking, and the completion sweep
//!
//! Completion is driven by elapsed time rather than user action: a
//! periodic sweep moves every confirmed appointment whose end has passed
//! to `completed`. Running the sweep twice is harmless.

use std::sync::Arc;

use bookline_domain::{
    Appointment, AppointmentStatus, BooklineError, Identity, PushOperation, Result,
};
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::booking::ports::AppointmentRepository;
use crate::booking::service::{authorize_actor, provider_subject_id};
use crate::sync::outbox::enqueue_appointment_push;
use crate::sync::ports::{IntegrationRepository, PushQueue};

/// Drives appointment state transitions after the initial reservation
pub struct LifecycleService {
    appointments: Arc<dyn AppointmentRepository>,
    integrations: Arc<dyn IntegrationRepository>,
    push_queue: Arc<dyn PushQueue>,
}

impl LifecycleService {
    pub fn new(
        appointments: Arc<dyn AppointmentRepository>,
        integrations: Arc<dyn IntegrationRepository>,
        push_queue: Arc<dyn PushQueue>,
    ) -> Self {
        Self { appointments, integrations, push_queue }
    }

    /// Confirm a pending hold
    ///
    /// The calendar push is deferred until this point so an abandoned
    /// hold never reaches the external calendar.
    pub async fn confirm(
        &self,
        appointment_id: Uuid,
        actor: &Identity,
        now: DateTime<Utc>,
    ) -> Result<Appointment> {
        let appointment = self.load(appointment_id).await?;
        authorize_actor(actor, &appointment)?;
        if !appointment.status.can_transition_to(AppointmentStatus::Confirmed) {
            return Err(BooklineError::InvalidTransition(format!(
                "cannot confirm a {} appointment",
                appointment.status
            )));
        }

        let updated = self
            .appointments
            .update_status(
                appointment_id,
                appointment.status,
                AppointmentStatus::Confirmed,
                None,
                now,
            )
            .await?;

        info!(appointment_id = %updated.id, "appointment confirmed");
        enqueue_appointment_push(
            self.integrations.as_ref(),
            self.push_queue.as_ref(),
            &updated,
            PushOperation::Upsert,
            now,
        )
        .await;
        Ok(updated)
    }

    /// Record that the requester did not show up
    ///
    /// Providers only, and only once the appointment has ended; before
    /// that the absence cannot be established.
    pub async fn mark_no_show(
        &self,
        appointment_id: Uuid,
        actor: &Identity,
        now: DateTime<Utc>,
    ) -> Result<Appointment> {
        let appointment = self.load(appointment_id).await?;
        if !actor.is_provider() || provider_subject_id(actor)? != appointment.provider_id {
            return Err(BooklineError::Auth(
                "only the provider may record a no-show".to_string(),
            ));
        }
        if !appointment.status.can_transition_to(AppointmentStatus::NoShow) {
            return Err(BooklineError::InvalidTransition(format!(
                "cannot mark a {} appointment as no-show",
                appointment.status
            )));
        }
        if now < appointment.end_at() {
            return Err(BooklineError::InvalidTransition(
                "appointment has not ended yet".to_string(),
            ));
        }

        let updated = self
            .appointments
            .update_status(appointment_id, appointment.status, AppointmentStatus::NoShow, None, now)
            .await?;
        info!(appointment_id = %updated.id, "appointment marked as no-show");
        Ok(updated)
    }

    /// Move every confirmed appointment whose end has passed to
    /// `completed`, returning how many rows changed
    pub async fn complete_elapsed(&self, now: DateTime<Utc>) -> Result<u64> {
        let completed = self.appointments.complete_overdue(now).await?;
        if completed > 0 {
            info!(count = completed, "completed elapsed appointments");
        }
        Ok(completed)
    }

    async fn load(&self, appointment_id: Uuid) -> Result<Appointment> {
        self.appointments.find(appointment_id).await?.ok_or_else(|| {
            BooklineError::NotFound(format!("appointment {appointment_id} does not exist"))
        })
    }
}
