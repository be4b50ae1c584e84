//! The capability set every upstream booking system exposes.

use async_trait::async_trait;
use campus_gsr_core::{Provider, Result, User};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One free interval of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Inclusive start.
    pub start_time: DateTime<Utc>,
    /// Exclusive end.
    pub end_time: DateTime<Utc>,
}

/// A bookable room and its free slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomAvailability {
    /// Upstream room name.
    pub room_name: String,
    /// Upstream room ID, passed back to `book`.
    pub id: i64,
    /// Free slots.
    pub availability: Vec<Slot>,
}

/// A reservation the upstream knows about for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamReservation {
    /// Upstream booking ID.
    pub booking_id: String,
    /// External location ID of the room.
    pub lid: String,
    /// Upstream room ID.
    pub room_id: i64,
    /// Upstream room name.
    pub room_name: String,
    /// Start.
    pub start: DateTime<Utc>,
    /// End.
    pub end: DateTime<Utc>,
}

/// Which rooms and days to query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityQuery {
    /// External location ID.
    pub lid: String,
    /// External group/category ID.
    pub gid: String,
    /// First day; today when absent.
    pub start: Option<NaiveDate>,
    /// Last day (inclusive); same as `start` when absent.
    pub end: Option<NaiveDate>,
}

/// Typed wrapper over one external reservation API.
///
/// All methods translate upstream error shapes into
/// [`GsrError`](campus_gsr_core::GsrError) and tag them with
/// [`UpstreamClient::provider`].
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Provider tag for errors and metrics.
    fn provider(&self) -> Provider;

    /// Free slots for the rooms of a location.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn availability(&self, query: &AvailabilityQuery, user: &User) -> Result<Vec<RoomAvailability>>;

    /// Book `[start, end)` in `room_id` under `user`'s identity. Returns the
    /// upstream booking ID.
    ///
    /// # Errors
    ///
    /// Upstream failures, or `Forbidden` when `user` may not use the room.
    async fn book(&self, room_id: i64, start: DateTime<Utc>, end: DateTime<Utc>, user: &User) -> Result<String>;

    /// Cancel an upstream booking.
    ///
    /// # Errors
    ///
    /// Upstream failures, including "unknown booking".
    async fn cancel(&self, booking_id: &str, user: &User) -> Result<()>;

    /// Upcoming reservations the upstream holds for `user`.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn reservations(&self, _user: &User) -> Result<Vec<UpstreamReservation>> {
        Ok(Vec::new())
    }

    /// Whether `user` is entitled to this provider's rooms.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn entitlement(&self, _user: &User) -> Result<bool> {
        Ok(false)
    }
}
