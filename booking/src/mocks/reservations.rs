//! Mock reservation ledger.

use super::lock;
use crate::providers::ReservationStore;
use async_trait::async_trait;
use campus_gsr_core::{Booking, BookingId, GsrError, Reservation, ReservationId, Result, UserId};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Ledger {
    reservations: HashMap<ReservationId, Reservation>,
    bookings: Vec<Booking>,
}

impl Ledger {
    fn assemble(&self, reservation: &Reservation) -> Reservation {
        let mut bookings: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|b| b.reservation == reservation.id)
            .cloned()
            .collect();
        bookings.sort_by_key(|b| b.start);
        Reservation {
            bookings,
            ..reservation.clone()
        }
    }

    fn check_unique(&self, booking: &Booking) -> Result<()> {
        if self.bookings.iter().any(|b| b.id == booking.id || b.upstream_id == booking.upstream_id) {
            return Err(GsrError::Conflict(format!("Booking {} already recorded", booking.upstream_id)));
        }
        Ok(())
    }
}

/// Mock reservation store.
///
/// Uses in-memory storage for testing. Writes can be made to fail with
/// [`InMemoryReservationStore::fail_writes`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryReservationStore {
    ledger: Arc<Mutex<Ledger>>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemoryReservationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent booking write fail with `Storage`.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Every reservation with its bookings (for testing).
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn reservations(&self) -> Result<Vec<Reservation>> {
        let ledger = lock(&self.ledger)?;
        Ok(ledger.reservations.values().map(|r| ledger.assemble(r)).collect())
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(GsrError::Storage("Write rejected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ReservationStore for InMemoryReservationStore {
    async fn create_reservation(&self, reservation: &Reservation, first: &Booking) -> Result<()> {
        self.check_writable()?;
        let mut ledger = lock(&self.ledger)?;
        if ledger.reservations.contains_key(&reservation.id) {
            return Err(GsrError::Conflict(format!("Reservation {} already exists", reservation.id)));
        }
        ledger.check_unique(first)?;
        ledger.reservations.insert(
            reservation.id,
            Reservation {
                bookings: Vec::new(),
                ..reservation.clone()
            },
        );
        ledger.bookings.push(first.clone());
        Ok(())
    }

    async fn append_booking(&self, booking: &Booking) -> Result<()> {
        self.check_writable()?;
        let mut ledger = lock(&self.ledger)?;
        if !ledger.reservations.contains_key(&booking.reservation) {
            return Err(GsrError::NotFound(format!("Reservation {} not found", booking.reservation)));
        }
        ledger.check_unique(booking)?;
        ledger.bookings.push(booking.clone());
        Ok(())
    }

    async fn booking(&self, id: BookingId) -> Result<Option<Booking>> {
        Ok(lock(&self.ledger)?.bookings.iter().find(|b| b.id == id).cloned())
    }

    async fn booking_by_upstream_id(&self, upstream_id: &str) -> Result<Option<Booking>> {
        Ok(lock(&self.ledger)?
            .bookings
            .iter()
            .find(|b| b.upstream_id == upstream_id)
            .cloned())
    }

    async fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        let ledger = lock(&self.ledger)?;
        Ok(ledger.reservations.get(&id).map(|r| ledger.assemble(r)))
    }

    async fn bookings_for_reservation(&self, id: ReservationId) -> Result<Vec<Booking>> {
        let ledger = lock(&self.ledger)?;
        Ok(ledger
            .reservations
            .get(&id)
            .map(|r| ledger.assemble(r).bookings)
            .unwrap_or_default())
    }

    async fn cancel_booking(&self, id: BookingId) -> Result<bool> {
        let mut ledger = lock(&self.ledger)?;
        let reservation_id = {
            let booking = ledger
                .bookings
                .iter_mut()
                .find(|b| b.id == id)
                .ok_or_else(|| GsrError::NotFound(format!("Booking {id} not found")))?;
            booking.cancelled = true;
            booking.reservation
        };
        let all_cancelled = ledger
            .bookings
            .iter()
            .filter(|b| b.reservation == reservation_id)
            .all(|b| b.cancelled);
        if all_cancelled {
            if let Some(reservation) = ledger.reservations.get_mut(&reservation_id) {
                reservation.cancelled = true;
            }
        }
        Ok(all_cancelled)
    }

    async fn active_bookings_for_user(&self, user: UserId, now: DateTime<Utc>) -> Result<Vec<Booking>> {
        Ok(lock(&self.ledger)?
            .bookings
            .iter()
            .filter(|b| b.user == user && !b.cancelled && b.end >= now)
            .cloned()
            .collect())
    }

    async fn bookings_for_user_between(
        &self,
        user: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Booking>> {
        Ok(lock(&self.ledger)?
            .bookings
            .iter()
            .filter(|b| b.user == user && !b.cancelled && b.intersects(from, to))
            .cloned()
            .collect())
    }

    async fn list_bookings(&self, user: UserId, include_created: bool, now: DateTime<Utc>) -> Result<Vec<Booking>> {
        let ledger = lock(&self.ledger)?;
        let created_by_user = |b: &Booking| {
            include_created
                && ledger
                    .reservations
                    .get(&b.reservation)
                    .is_some_and(|r| r.creator == user)
        };
        let mut bookings: Vec<Booking> = ledger
            .bookings
            .iter()
            .filter(|b| !b.cancelled && b.end >= now)
            .filter(|b| b.user == user || created_by_user(b))
            .cloned()
            .collect();
        bookings.sort_by_key(|b| b.start);
        Ok(bookings)
    }

    async fn due_reminders(&self, now: DateTime<Utc>, lead: TimeDelta) -> Result<Vec<Reservation>> {
        let ledger = lock(&self.ledger)?;
        let mut due: Vec<Reservation> = ledger
            .reservations
            .values()
            .filter(|r| !r.cancelled && !r.reminder_sent && r.start >= now && r.start < now + lead)
            .map(|r| ledger.assemble(r))
            .collect();
        due.sort_by_key(|r| r.start);
        Ok(due)
    }

    async fn mark_reminder_sent(&self, id: ReservationId) -> Result<()> {
        let mut ledger = lock(&self.ledger)?;
        let reservation = ledger
            .reservations
            .get_mut(&id)
            .ok_or_else(|| GsrError::NotFound(format!("Reservation {id} not found")))?;
        reservation.reminder_sent = true;
        Ok(())
    }
}
