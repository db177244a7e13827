//! Outbox enqueue helper shared by the booking and lifecycle flows

use bookline_domain::{Appointment, PushJob, PushOperation};
use chrono::{DateTime, Utc};
use tracing::error;

use crate::sync::ports::{IntegrationRepository, PushQueue};

/// Queue a calendar push for `appointment`, resolving the target
/// integration when the row is not linked yet
///
/// Outbox trouble is logged and swallowed: a booking or transition must
/// never fail because its push could not be queued.
pub(crate) async fn enqueue_appointment_push(
    integrations: &dyn IntegrationRepository,
    push_queue: &dyn PushQueue,
    appointment: &Appointment,
    operation: PushOperation,
    now: DateTime<Utc>,
) {
    let integration_id = match appointment.integration_id {
        Some(id) => Some(id),
        None => match integrations.find_enabled_for_provider(appointment.provider_id).await {
            Ok(found) => found.map(|i| i.id),
            Err(err) => {
                error!(
                    error = %err,
                    appointment_id = %appointment.id,
                    "integration lookup failed; calendar push skipped"
                );
                return;
            }
        },
    };
    let Some(integration_id) = integration_id else {
        return;
    };

    let job = PushJob::new(appointment.id, integration_id, operation, now);
    if let Err(err) = push_queue.enqueue(&job).await {
        error!(
            error = %err,
            appointment_id = %appointment.id,
            "failed to enqueue calendar push"
        );
    }
}
