//! Scripted upstream client.

use super::lock;
use async_trait::async_trait;
use campus_gsr_core::{GsrError, Provider, Result, User};
use campus_gsr_upstream::{AvailabilityQuery, RoomAvailability, UpstreamClient, UpstreamReservation};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// A call observed by [`MockUpstream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamCall {
    /// `availability` for a location.
    Availability {
        /// Location.
        lid: String,
        /// Acting username.
        username: String,
    },
    /// `book`.
    Book {
        /// Upstream room.
        room_id: i64,
        /// Start.
        start: DateTime<Utc>,
        /// End.
        end: DateTime<Utc>,
        /// Acting username.
        username: String,
    },
    /// `cancel`.
    Cancel {
        /// Upstream booking ID.
        booking_id: String,
        /// Acting username.
        username: String,
    },
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<UpstreamCall>,
    issued: u64,
    book_failures: HashMap<String, GsrError>,
    live: HashSet<String>,
    cancelled: Vec<String>,
    entitled: HashSet<String>,
    entitlement_failures: HashSet<String>,
    rooms: Vec<RoomAvailability>,
    reservations: Vec<UpstreamReservation>,
}

/// Upstream client with scripted outcomes.
///
/// Bookings succeed with IDs `<provider>-<n>` unless a failure is scripted
/// for the acting username. Only IDs it issued (or was told about) can be
/// cancelled.
#[derive(Debug, Clone)]
pub struct MockUpstream {
    provider: Provider,
    state: Arc<Mutex<State>>,
}

impl MockUpstream {
    /// Create a mock for `provider`.
    #[must_use]
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Fail every `book` made as `username`.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn fail_book_for(&self, username: &str, message: &str) -> Result<()> {
        lock(&self.state)?
            .book_failures
            .insert(username.to_string(), GsrError::upstream(self.provider, message));
        Ok(())
    }

    /// Rooms returned by `availability`.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn set_rooms(&self, rooms: Vec<RoomAvailability>) -> Result<()> {
        lock(&self.state)?.rooms = rooms;
        Ok(())
    }

    /// Add a reservation only the upstream knows about.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn add_reservation(&self, reservation: UpstreamReservation) -> Result<()> {
        let mut state = lock(&self.state)?;
        state.live.insert(reservation.booking_id.clone());
        state.reservations.push(reservation);
        Ok(())
    }

    /// Report `username` as entitled.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn entitle(&self, username: &str) -> Result<()> {
        lock(&self.state)?.entitled.insert(username.to_string());
        Ok(())
    }

    /// Fail entitlement checks for `username`.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn fail_entitlement_for(&self, username: &str) -> Result<()> {
        lock(&self.state)?.entitlement_failures.insert(username.to_string());
        Ok(())
    }

    /// Calls in order.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn calls(&self) -> Result<Vec<UpstreamCall>> {
        Ok(lock(&self.state)?.calls.clone())
    }

    /// Number of `book` calls.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn book_count(&self) -> Result<usize> {
        Ok(lock(&self.state)?
            .calls
            .iter()
            .filter(|c| matches!(c, UpstreamCall::Book { .. }))
            .count())
    }

    /// Whether `booking_id` is held upstream.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn is_live(&self, booking_id: &str) -> Result<bool> {
        Ok(lock(&self.state)?.live.contains(booking_id))
    }

    /// IDs cancelled so far.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn cancelled(&self) -> Result<Vec<String>> {
        Ok(lock(&self.state)?.cancelled.clone())
    }
}

#[async_trait]
impl UpstreamClient for MockUpstream {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn availability(&self, query: &AvailabilityQuery, user: &User) -> Result<Vec<RoomAvailability>> {
        let mut state = lock(&self.state)?;
        state.calls.push(UpstreamCall::Availability {
            lid: query.lid.clone(),
            username: user.username.clone(),
        });
        Ok(state.rooms.clone())
    }

    async fn book(&self, room_id: i64, start: DateTime<Utc>, end: DateTime<Utc>, user: &User) -> Result<String> {
        let mut state = lock(&self.state)?;
        state.calls.push(UpstreamCall::Book {
            room_id,
            start,
            end,
            username: user.username.clone(),
        });
        if let Some(error) = state.book_failures.get(&user.username) {
            return Err(error.clone());
        }
        state.issued += 1;
        let id = format!("{}-{}", self.provider.as_str(), state.issued);
        state.live.insert(id.clone());
        Ok(id)
    }

    async fn cancel(&self, booking_id: &str, user: &User) -> Result<()> {
        let mut state = lock(&self.state)?;
        state.calls.push(UpstreamCall::Cancel {
            booking_id: booking_id.to_string(),
            username: user.username.clone(),
        });
        if !state.live.remove(booking_id) {
            return Err(GsrError::upstream(self.provider, "Unknown booking"));
        }
        state.cancelled.push(booking_id.to_string());
        state.reservations.retain(|r| r.booking_id != booking_id);
        Ok(())
    }

    async fn reservations(&self, _user: &User) -> Result<Vec<UpstreamReservation>> {
        Ok(lock(&self.state)?.reservations.clone())
    }

    async fn entitlement(&self, user: &User) -> Result<bool> {
        let state = lock(&self.state)?;
        if state.entitlement_failures.contains(&user.username) {
            return Err(GsrError::timeout(self.provider));
        }
        Ok(state.entitled.contains(&user.username))
    }
}
