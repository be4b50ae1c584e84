//! Public share codes for bookings.

use crate::catalog::RoomCatalog;
use crate::providers::{ReservationStore, ShareCodeStore};
use campus_gsr_core::environment::token_urlsafe;
use campus_gsr_core::{Booking, Clock, GsrError, RandomSource, Result, ShareCode, User};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Random bytes per code; six bytes encode to eight URL-safe characters.
const CODE_BYTES: usize = 6;

/// Attempts before giving up on a collision-free code.
const MAX_ATTEMPTS: usize = 5;

/// Whether a share code still grants access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareStatus {
    /// The booking is live.
    Active,
    /// The booking ended or was cancelled.
    Expired,
}

/// A share code as shown to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareCodeView {
    /// The code.
    pub code: String,
    /// Upstream booking ID it points to.
    pub booking_id: String,
    /// Issue time.
    pub created_at: DateTime<Utc>,
    /// End of the booking.
    pub expires_at: DateTime<Utc>,
    /// Derived from the booking at read time.
    pub status: ShareStatus,
}

/// Redacted booking details, visible to anyone holding the code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SharedBookingView {
    /// Upstream room name.
    pub room_name: String,
    /// Location display name.
    pub building: String,
    /// Start.
    pub start: DateTime<Utc>,
    /// End.
    pub end: DateTime<Utc>,
    /// Whether the booking is neither cancelled nor over.
    pub is_valid: bool,
}

/// Issues, resolves and revokes share codes.
pub struct ShareCodeRegistry {
    codes: Arc<dyn ShareCodeStore>,
    reservations: Arc<dyn ReservationStore>,
    catalog: Arc<RoomCatalog>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
}

impl ShareCodeRegistry {
    /// Create a registry.
    #[must_use]
    pub fn new(
        codes: Arc<dyn ShareCodeStore>,
        reservations: Arc<dyn ReservationStore>,
        catalog: Arc<RoomCatalog>,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        Self {
            codes,
            reservations,
            catalog,
            clock,
            random,
        }
    }

    fn is_valid(&self, booking: &Booking) -> bool {
        !booking.cancelled && booking.end > self.clock.now()
    }

    fn owner_view(&self, share: ShareCode, booking: &Booking) -> ShareCodeView {
        ShareCodeView {
            code: share.code,
            booking_id: booking.upstream_id.clone(),
            created_at: share.created_at,
            expires_at: booking.end,
            status: if self.is_valid(booking) {
                ShareStatus::Active
            } else {
                ShareStatus::Expired
            },
        }
    }

    /// Share the booking with upstream ID `upstream_id`.
    ///
    /// Returns the existing code if the booking is already shared.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown booking
    /// - `Forbidden` unless `requester` made the booking
    /// - `Conflict` if no free code was found
    #[tracing::instrument(skip(self, requester), fields(user_id = %requester.id))]
    pub async fn issue(&self, upstream_id: &str, requester: &User) -> Result<ShareCodeView> {
        let booking = self
            .reservations
            .booking_by_upstream_id(upstream_id)
            .await?
            .ok_or_else(|| GsrError::NotFound("Unknown booking id".to_string()))?;
        if booking.user != requester.id {
            return Err(GsrError::Forbidden("Only the booking owner can share it".to_string()));
        }
        if let Some(existing) = self.codes.by_booking(booking.id).await? {
            return Ok(self.owner_view(existing, &booking));
        }

        for attempt in 1..=MAX_ATTEMPTS {
            let share = ShareCode {
                code: token_urlsafe(self.random.as_ref(), CODE_BYTES),
                booking: booking.id,
                owner: requester.id,
                created_at: self.clock.now(),
            };
            match self.codes.insert(&share).await {
                Ok(()) => {
                    metrics::counter!("gsr.share_codes.issued").increment(1);
                    tracing::info!(booking_id = %booking.id, "Share code issued");
                    return Ok(self.owner_view(share, &booking));
                }
                Err(GsrError::Conflict(_)) => {
                    if let Some(existing) = self.codes.by_booking(booking.id).await? {
                        return Ok(self.owner_view(existing, &booking));
                    }
                    tracing::debug!(attempt, "Share code collision");
                }
                Err(e) => return Err(e),
            }
        }
        Err(GsrError::Conflict("Could not allocate a share code".to_string()))
    }

    /// Public details of a shared booking.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown code.
    pub async fn lookup(&self, code: &str) -> Result<SharedBookingView> {
        let not_found = || GsrError::NotFound("Share code not found".to_string());
        let share = self.codes.by_code(code).await?.ok_or_else(not_found)?;
        let booking = self.reservations.booking(share.booking).await?.ok_or_else(not_found)?;
        let building = self
            .catalog
            .by_id(booking.room)
            .map(|r| r.name.clone())
            .unwrap_or_default();

        Ok(SharedBookingView {
            is_valid: self.is_valid(&booking),
            room_name: booking.room_name,
            building,
            start: booking.start,
            end: booking.end,
        })
    }

    /// Like [`lookup`](Self::lookup), but only for live bookings.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown code, `Expired` once the booking is over or
    /// cancelled.
    pub async fn view(&self, code: &str) -> Result<SharedBookingView> {
        let shared = self.lookup(code).await?;
        if !shared.is_valid {
            return Err(GsrError::Expired("This share code has expired".to_string()));
        }
        Ok(shared)
    }

    /// Delete a code. Only its owner may; everyone else sees `NotFound`.
    ///
    /// # Errors
    ///
    /// `NotFound` unless `requester` owns an existing code.
    #[tracing::instrument(skip(self, requester), fields(user_id = %requester.id))]
    pub async fn revoke(&self, code: &str, requester: &User) -> Result<()> {
        match self.codes.by_code(code).await? {
            Some(share) if share.owner == requester.id => {
                self.codes.delete(code).await?;
                tracing::info!(booking_id = %share.booking, "Share code revoked");
                Ok(())
            }
            _ => Err(GsrError::NotFound("Share code not found".to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mocks::{InMemoryReservationStore, InMemoryShareCodeStore};
    use campus_gsr_core::{BookingId, Reservation, ReservationId, RoomId, RoomKind};
    use campus_gsr_testing::{ManualClock, PinnedRandom, fixtures};
    use chrono::TimeDelta;
    use std::collections::HashSet;

    struct Harness {
        registry: ShareCodeRegistry,
        codes: Arc<InMemoryShareCodeStore>,
        clock: Arc<ManualClock>,
        owner: User,
        end: DateTime<Utc>,
    }

    async fn harness(random: PinnedRandom) -> Harness {
        let reservations = Arc::new(InMemoryReservationStore::new());
        let codes = Arc::new(InMemoryShareCodeStore::new());
        let clock = Arc::new(ManualClock::new(fixtures::local(2025, 3, 10, 8, 0)));
        let catalog = Arc::new(RoomCatalog::new(
            vec![fixtures::room(2, RoomKind::LibCal, "1086", "1889")],
            &HashSet::new(),
        ));
        let owner = fixtures::user("alice", "alice@seas.upenn.edu");
        let (start, end) = (fixtures::local(2025, 3, 10, 10, 0), fixtures::local(2025, 3, 10, 11, 0));

        let reservation = Reservation {
            id: ReservationId::new(),
            start,
            end,
            creator: owner.id,
            group: None,
            cancelled: false,
            reminder_sent: false,
            bookings: Vec::new(),
        };
        let booking = Booking {
            id: BookingId::new(),
            reservation: reservation.id,
            user: owner.id,
            upstream_id: "lc-7".to_string(),
            room: RoomId(2),
            upstream_room_id: 94,
            room_name: "Weigle 101".to_string(),
            start,
            end,
            cancelled: false,
        };
        reservations.create_reservation(&reservation, &booking).await.unwrap();

        Harness {
            registry: ShareCodeRegistry::new(
                codes.clone(),
                reservations,
                catalog,
                clock.clone(),
                Arc::new(random),
            ),
            codes,
            clock,
            owner,
            end,
        }
    }

    #[tokio::test]
    async fn issue_is_idempotent_per_booking() {
        let h = harness(PinnedRandom::new()).await;
        let first = h.registry.issue("lc-7", &h.owner).await.unwrap();
        let second = h.registry.issue("lc-7", &h.owner).await.unwrap();

        assert_eq!(first.code.len(), 8);
        assert_eq!(first.code, second.code);
        assert_eq!(first.expires_at, h.end);
        assert_eq!(first.status, ShareStatus::Active);
        assert_eq!(h.codes.code_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn reissue_after_the_booking_ends_reports_expired() {
        let h = harness(PinnedRandom::new()).await;
        let first = h.registry.issue("lc-7", &h.owner).await.unwrap();

        h.clock.set(h.end);
        let again = h.registry.issue("lc-7", &h.owner).await.unwrap();
        assert_eq!(again.code, first.code);
        assert_eq!(again.status, ShareStatus::Expired);
        assert_eq!(serde_json::to_value(&again).unwrap()["status"], "expired");
    }

    #[tokio::test]
    async fn revoking_twice_leaves_the_code_gone() {
        let h = harness(PinnedRandom::new()).await;
        let code = h.registry.issue("lc-7", &h.owner).await.unwrap().code;

        h.registry.revoke(&code, &h.owner).await.unwrap();
        assert_eq!(h.codes.code_count().unwrap(), 0);

        let second = h.registry.revoke(&code, &h.owner).await.unwrap_err();
        assert_eq!(second, GsrError::NotFound("Share code not found".to_string()));
        assert_eq!(h.codes.code_count().unwrap(), 0);

        let reissued = h.registry.issue("lc-7", &h.owner).await.unwrap();
        assert_eq!(h.codes.code_count().unwrap(), 1);
        assert_eq!(reissued.status, ShareStatus::Active);
    }

    #[tokio::test]
    async fn only_the_booking_owner_can_issue() {
        let h = harness(PinnedRandom::new()).await;
        let mallory = fixtures::user("mallory", "mallory@upenn.edu");
        let err = h.registry.issue("lc-7", &mallory).await.unwrap_err();
        assert!(matches!(err, GsrError::Forbidden(_)));
    }

    #[tokio::test]
    async fn collisions_exhaust_attempts() {
        let h = harness(PinnedRandom::constant(7)).await;
        let taken = token_urlsafe(&PinnedRandom::constant(7), CODE_BYTES);
        h.codes
            .insert(&ShareCode {
                code: taken,
                booking: BookingId::new(),
                owner: h.owner.id,
                created_at: h.clock.now(),
            })
            .await
            .unwrap();

        let err = h.registry.issue("lc-7", &h.owner).await.unwrap_err();
        assert!(matches!(err, GsrError::Conflict(_)));
    }

    #[tokio::test]
    async fn lifecycle_follows_booking_end() {
        let h = harness(PinnedRandom::new()).await;
        let code = h.registry.issue("lc-7", &h.owner).await.unwrap().code;

        h.clock.set(h.end - TimeDelta::minutes(1));
        let shared = h.registry.lookup(&code).await.unwrap();
        assert!(shared.is_valid);
        assert_eq!(shared.building, "Location 1086");
        assert_eq!(shared.room_name, "Weigle 101");

        h.clock.set(h.end + TimeDelta::seconds(1));
        assert!(!h.registry.lookup(&code).await.unwrap().is_valid);
        assert!(matches!(h.registry.view(&code).await.unwrap_err(), GsrError::Expired(_)));

        let stranger = fixtures::user("bob", "bob@upenn.edu");
        assert!(matches!(
            h.registry.revoke(&code, &stranger).await.unwrap_err(),
            GsrError::NotFound(_)
        ));
        h.registry.revoke(&code, &h.owner).await.unwrap();
        assert!(matches!(h.registry.lookup(&code).await.unwrap_err(), GsrError::NotFound(_)));
        assert!(matches!(
            h.registry.revoke(&code, &h.owner).await.unwrap_err(),
            GsrError::NotFound(_)
        ));
    }
}
