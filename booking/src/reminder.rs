//! Finds reservations due a start reminder.

use crate::providers::ReservationStore;
use campus_gsr_core::config::PolicyConfig;
use campus_gsr_core::{Reservation, ReservationId, Result};
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;

/// Selects reservations starting within the reminder lead.
pub struct ReminderSweep {
    reservations: Arc<dyn ReservationStore>,
    lead: TimeDelta,
}

impl ReminderSweep {
    /// Create a sweep using the configured lead time.
    #[must_use]
    pub fn new(reservations: Arc<dyn ReservationStore>, policy: &PolicyConfig) -> Self {
        Self {
            reservations,
            lead: policy.reminder_lead,
        }
    }

    /// Live reservations, not yet reminded, starting in `[now, now + lead)`.
    ///
    /// # Errors
    ///
    /// `Storage` on ledger failure.
    pub async fn due(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>> {
        let due = self.reservations.due_reminders(now, self.lead).await?;
        tracing::debug!(count = due.len(), "Reminders due");
        Ok(due)
    }

    /// Record that the reminder went out.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown reservation, `Storage` on ledger failure.
    pub async fn mark_sent(&self, id: ReservationId) -> Result<()> {
        self.reservations.mark_reminder_sent(id).await
    }
}
