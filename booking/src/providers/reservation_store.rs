//! Reservation ledger trait.

use async_trait::async_trait;
use campus_gsr_core::{Booking, BookingId, Reservation, ReservationId, Result, UserId};
use chrono::{DateTime, TimeDelta, Utc};

/// Owns Reservation aggregates and their Bookings.
///
/// A Reservation never exists without at least one Booking: the row is
/// created together with its first Booking.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Insert `reservation` (its `bookings` field is ignored) and `first` in
    /// one transaction.
    ///
    /// # Errors
    ///
    /// - `Conflict` if the reservation or upstream booking ID already exists
    /// - `Storage` on database failure
    async fn create_reservation(&self, reservation: &Reservation, first: &Booking) -> Result<()>;

    /// Append a Booking to an existing Reservation.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the parent Reservation does not exist
    /// - `Conflict` if the upstream booking ID already exists
    /// - `Storage` on database failure
    async fn append_booking(&self, booking: &Booking) -> Result<()>;

    /// Booking by local ID.
    ///
    /// # Errors
    ///
    /// `Storage` on database failure.
    async fn booking(&self, id: BookingId) -> Result<Option<Booking>>;

    /// Booking by upstream booking ID.
    ///
    /// # Errors
    ///
    /// `Storage` on database failure.
    async fn booking_by_upstream_id(&self, upstream_id: &str) -> Result<Option<Booking>>;

    /// Reservation with its Bookings in temporal order.
    ///
    /// # Errors
    ///
    /// `Storage` on database failure.
    async fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>>;

    /// Bookings of one Reservation in temporal order.
    ///
    /// # Errors
    ///
    /// `Storage` on database failure.
    async fn bookings_for_reservation(&self, id: ReservationId) -> Result<Vec<Booking>>;

    /// Mark a Booking cancelled, and its Reservation too once every sibling
    /// is cancelled. Returns whether the Reservation is now cancelled.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the Booking does not exist
    /// - `Storage` on database failure
    async fn cancel_booking(&self, id: BookingId) -> Result<bool>;

    /// Non-cancelled bookings acted by `user` with `end >= now`.
    ///
    /// # Errors
    ///
    /// `Storage` on database failure.
    async fn active_bookings_for_user(&self, user: UserId, now: DateTime<Utc>) -> Result<Vec<Booking>>;

    /// Non-cancelled bookings acted by `user` intersecting `[from, to)`.
    ///
    /// # Errors
    ///
    /// `Storage` on database failure.
    async fn bookings_for_user_between(
        &self,
        user: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Booking>>;

    /// Non-cancelled bookings with `end >= now` acted by `user`, plus those
    /// under reservations `user` created when `include_created` is set.
    /// Ordered by start.
    ///
    /// # Errors
    ///
    /// `Storage` on database failure.
    async fn list_bookings(&self, user: UserId, include_created: bool, now: DateTime<Utc>) -> Result<Vec<Booking>>;

    /// Non-cancelled reservations without a reminder whose start lies in
    /// `[now, now + lead)`.
    ///
    /// # Errors
    ///
    /// `Storage` on database failure.
    async fn due_reminders(&self, now: DateTime<Utc>, lead: TimeDelta) -> Result<Vec<Reservation>>;

    /// Flag a reservation's reminder as sent.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the Reservation does not exist
    /// - `Storage` on database failure
    async fn mark_reminder_sent(&self, id: ReservationId) -> Result<()>;
}
