//! Top-level booking operations: reserve, cancel, availability and listing.

use crate::catalog::RoomCatalog;
use crate::error::ReserveFailure;
use crate::providers::{DirectoryStore, ReservationStore};
use crate::quota::{MemberCredit, QuotaLedger};
use campus_gsr_core::config::PolicyConfig;
use campus_gsr_core::time::format_hhmm;
use campus_gsr_core::{
    Booking, BookingId, Clock, Credit, GroupId, GsrError, RandomSource, Reservation, ReservationId, Result,
    Room, RoomKind, User,
};
use campus_gsr_upstream::engineering::NOT_AUTHORIZED;
use campus_gsr_upstream::{AvailabilityQuery, RoomAvailability, UpstreamClient, Upstreams};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// A reservation request for one catalog location.
///
/// The location is identified by its external IDs, as returned from
/// availability. `lid` disambiguates locations sharing a `gid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveRequest {
    /// External group/category ID of the location.
    pub gid: String,
    /// External location ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lid: Option<String>,
    /// Upstream room within the location.
    pub room_id: i64,
    /// Upstream room name, recorded on each booking.
    pub room_name: String,
    /// Requested start.
    pub start: DateTime<Utc>,
    /// Requested end.
    pub end: DateTime<Utc>,
    /// Book on behalf of this group.
    pub group: Option<GroupId>,
}

/// Availability of one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityView {
    /// Location display name.
    pub name: String,
    /// External group ID.
    pub gid: String,
    /// Rooms with free slots.
    pub rooms: Vec<RoomAvailability>,
}

/// One upcoming booking as shown to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationView {
    /// Upstream booking ID.
    pub booking_id: String,
    /// Catalog location.
    pub gsr: Room,
    /// Upstream room ID.
    pub room_id: i64,
    /// Room name, prefixed with the owner in group context.
    pub room_name: String,
    /// Start.
    pub start: DateTime<Utc>,
    /// End.
    pub end: DateTime<Utc>,
}

/// Cancels an upstream booking if dropped while armed.
///
/// Armed between a successful upstream `book` and the commit of its local
/// row. If the reserve future is dropped in that window, or the write fails,
/// the booking is cancelled upstream (and locally, should the row have
/// landed after all).
struct PendingBooking {
    client: Option<Arc<dyn UpstreamClient>>,
    store: Arc<dyn ReservationStore>,
    upstream_id: String,
    user: User,
}

impl PendingBooking {
    fn new(client: Arc<dyn UpstreamClient>, store: Arc<dyn ReservationStore>, upstream_id: String, user: User) -> Self {
        Self {
            client: Some(client),
            store,
            upstream_id,
            user,
        }
    }

    fn disarm(mut self) {
        self.client = None;
    }
}

impl Drop for PendingBooking {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        let upstream_id = std::mem::take(&mut self.upstream_id);
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!(%upstream_id, "No runtime to compensate uncommitted booking");
            return;
        };
        tracing::warn!(%upstream_id, provider = %client.provider(), "Compensating uncommitted upstream booking");

        let store = Arc::clone(&self.store);
        let user = self.user.clone();
        runtime.spawn(async move {
            if let Err(e) = client.cancel(&upstream_id, &user).await {
                tracing::error!(%upstream_id, error = %e, "Compensating cancel failed");
                return;
            }
            if let Ok(Some(booking)) = store.booking_by_upstream_id(&upstream_id).await {
                if let Err(e) = store.cancel_booking(booking.id).await {
                    tracing::error!(%upstream_id, error = %e, "Compensated booking left active locally");
                }
            }
        });
    }
}

/// Append `suffix` to the message, keeping the kind and provider tag.
fn with_suffix(error: GsrError, suffix: &str) -> GsrError {
    match error {
        GsrError::Upstream { provider, message } => GsrError::Upstream {
            provider,
            message: format!("{message}{suffix}"),
        },
        GsrError::Forbidden(m) => GsrError::Forbidden(format!("{m}{suffix}")),
        GsrError::NotFound(m) => GsrError::NotFound(format!("{m}{suffix}")),
        GsrError::QuotaExceeded(m) => GsrError::QuotaExceeded(format!("{m}{suffix}")),
        GsrError::Conflict(m) => GsrError::Conflict(format!("{m}{suffix}")),
        GsrError::Invalid(m) => GsrError::Invalid(format!("{m}{suffix}")),
        GsrError::Expired(m) => GsrError::Expired(format!("{m}{suffix}")),
        GsrError::Storage(m) => GsrError::Storage(format!("{m}{suffix}")),
    }
}

/// Coordinates the catalog, ledger, upstream clients and stores.
pub struct BookingOrchestrator {
    catalog: Arc<RoomCatalog>,
    upstreams: Upstreams,
    reservations: Arc<dyn ReservationStore>,
    directory: Arc<dyn DirectoryStore>,
    ledger: QuotaLedger,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    timezone: Tz,
}

impl BookingOrchestrator {
    /// Wire an orchestrator.
    #[must_use]
    pub fn new(
        catalog: Arc<RoomCatalog>,
        upstreams: Upstreams,
        reservations: Arc<dyn ReservationStore>,
        directory: Arc<dyn DirectoryStore>,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
        policy: PolicyConfig,
    ) -> Self {
        let timezone = policy.timezone;
        let ledger = QuotaLedger::new(
            Arc::clone(&catalog),
            Arc::clone(&reservations),
            Arc::clone(&clock),
            Arc::clone(&random),
            policy,
        );
        Self {
            catalog,
            upstreams,
            reservations,
            directory,
            ledger,
            clock,
            random,
            timezone,
        }
    }

    /// The room catalog.
    #[must_use]
    pub fn catalog(&self) -> &RoomCatalog {
        &self.catalog
    }

    /// Book `[start, end)`, splitting it across group members' credit.
    ///
    /// Bookings are placed sequentially. The reservation row is written with
    /// the first successful booking; each later booking commits on its own.
    ///
    /// # Errors
    ///
    /// - `Invalid` if `start >= end`
    /// - `NotFound` for an unknown or inactive room, or unknown group
    /// - `Forbidden` if the requester is not an accepted member, or no member
    ///   is eligible for the room kind
    /// - `QuotaExceeded` if the request is not strictly below total credit
    /// - Upstream failures; after partial success the message carries the
    ///   cut-off time and `partial` holds the recorded reservation
    #[tracing::instrument(skip(self, request, requester), fields(gid = %request.gid, user_id = %requester.id))]
    pub async fn reserve(&self, request: ReserveRequest, requester: &User) -> std::result::Result<Reservation, ReserveFailure> {
        if request.start >= request.end {
            return Err(GsrError::Invalid("Start must be before end".to_string()).into());
        }
        let room = match &request.lid {
            Some(lid) => self.catalog.by_external_ids(lid, &request.gid),
            None => self.catalog.by_external_group_id(&request.gid),
        };
        let room = room
            .filter(|r| r.active)
            .cloned()
            .ok_or_else(|| GsrError::NotFound("Unknown room".to_string()))?;

        let members = match request.group {
            None => QuotaLedger::solo(requester),
            Some(group) => self.group_members(group, requester, room.kind).await?,
        };
        let total: Credit = members.iter().map(|m| m.credit).sum();
        if total.rejects(request.end - request.start) {
            tracing::info!(?total, "Group credit too low");
            return Err(GsrError::QuotaExceeded("Not enough credits".to_string()).into());
        }

        let client = Arc::clone(self.upstreams.for_kind(room.kind));
        let mut reservation = Reservation {
            id: ReservationId::new(),
            start: request.start,
            end: request.end,
            creator: requester.id,
            group: request.group,
            cancelled: false,
            reminder_sent: false,
            bookings: Vec::new(),
        };

        let mut cursor = request.start;
        for MemberCredit { user, credit } in &members {
            if cursor >= request.end {
                break;
            }
            let slice_end = cursor + credit.cap(request.end - cursor);

            let upstream_id = match client.book(request.room_id, cursor, slice_end, user).await {
                Ok(id) => id,
                Err(error) => return Err(self.cut_off(error, reservation, cursor)),
            };
            let pending = PendingBooking::new(
                Arc::clone(&client),
                Arc::clone(&self.reservations),
                upstream_id.clone(),
                user.clone(),
            );

            let booking = Booking {
                id: BookingId::new(),
                reservation: reservation.id,
                user: user.id,
                upstream_id,
                room: room.id,
                upstream_room_id: request.room_id,
                room_name: request.room_name.clone(),
                start: cursor,
                end: slice_end,
                cancelled: false,
            };
            let written = if reservation.bookings.is_empty() {
                self.reservations.create_reservation(&reservation, &booking).await
            } else {
                self.reservations.append_booking(&booking).await
            };
            if let Err(error) = written {
                tracing::error!(error = %error, upstream_id = %booking.upstream_id, "Failed to record booking");
                return Err(self.cut_off(error, reservation, cursor));
            }
            pending.disarm();

            metrics::counter!("gsr.bookings.created", "provider" => room.kind.provider().as_str()).increment(1);
            tracing::debug!(booking_id = %booking.id, upstream_id = %booking.upstream_id, "Booked slice");
            reservation.bookings.push(booking);
            cursor = slice_end;
        }

        metrics::counter!("gsr.reservations.created").increment(1);
        tracing::info!(reservation_id = %reservation.id, bookings = reservation.bookings.len(), "Reservation created");
        Ok(reservation)
    }

    fn cut_off(&self, error: GsrError, reservation: Reservation, cursor: DateTime<Utc>) -> ReserveFailure {
        if reservation.bookings.is_empty() {
            return ReserveFailure::nothing_booked(error);
        }
        let suffix = format!(
            ". Was only able to book {} – {}",
            format_hhmm(reservation.start, self.timezone),
            format_hhmm(cursor, self.timezone)
        );
        tracing::warn!(reservation_id = %reservation.id, error = %error, "Reservation partially booked");
        ReserveFailure::partial(with_suffix(error, &suffix), reservation)
    }

    async fn group_members(&self, group: GroupId, requester: &User, kind: RoomKind) -> Result<Vec<MemberCredit>> {
        self.directory
            .group(group)
            .await?
            .ok_or_else(|| GsrError::NotFound("Unknown group".to_string()))?;
        let members = self.directory.members(group).await?;

        if !members.iter().any(|m| m.user.id == requester.id && m.accepted) {
            return Err(GsrError::Forbidden("You are not a member of this group".to_string()));
        }
        if !members.iter().any(|m| QuotaLedger::eligible(m, kind)) {
            let message = match kind {
                RoomKind::Wharton => "No members of this group are eligible to book Wharton rooms",
                RoomKind::LibCal | RoomKind::EngineeringCombined => NOT_AUTHORIZED,
            };
            return Err(GsrError::Forbidden(message.to_string()));
        }
        self.ledger.group_credits(&members, kind).await
    }

    /// Cancel a booking by upstream ID.
    ///
    /// Bookings unknown locally are tried against every upstream in turn, so
    /// bookings made directly with a provider can still be cancelled.
    ///
    /// # Errors
    ///
    /// - `Forbidden` if the requester neither acted the booking nor created
    ///   its reservation
    /// - `NotFound` if no store or upstream knows the booking
    /// - Upstream failures for locally known bookings
    #[tracing::instrument(skip(self, requester), fields(user_id = %requester.id))]
    pub async fn cancel(&self, upstream_id: &str, requester: &User) -> Result<()> {
        let Some(booking) = self.reservations.booking_by_upstream_id(upstream_id).await? else {
            return self.cancel_unknown(upstream_id, requester).await;
        };

        let reservation = self
            .reservations
            .reservation(booking.reservation)
            .await?
            .ok_or_else(|| GsrError::Storage(format!("Booking {} has no reservation", booking.id)))?;
        if booking.user != requester.id && reservation.creator != requester.id {
            return Err(GsrError::Forbidden("You cannot cancel this booking".to_string()));
        }
        if booking.cancelled {
            return Ok(());
        }

        let kind = self
            .catalog
            .by_id(booking.room)
            .map(|r| r.kind)
            .ok_or_else(|| GsrError::NotFound("Unknown room".to_string()))?;
        let acting = match self.directory.user(booking.user).await? {
            Some(user) => user,
            None => requester.clone(),
        };

        self.upstreams.for_kind(kind).cancel(upstream_id, &acting).await?;
        let reservation_cancelled = self.reservations.cancel_booking(booking.id).await?;

        metrics::counter!("gsr.bookings.cancelled", "provider" => kind.provider().as_str()).increment(1);
        tracing::info!(booking_id = %booking.id, reservation_cancelled, "Booking cancelled");
        Ok(())
    }

    async fn cancel_unknown(&self, upstream_id: &str, requester: &User) -> Result<()> {
        for client in self.upstreams.cancel_order() {
            match client.cancel(upstream_id, requester).await {
                Ok(()) => {
                    metrics::counter!("gsr.bookings.cancelled", "provider" => client.provider().as_str()).increment(1);
                    tracing::info!(provider = %client.provider(), "Cancelled booking unknown locally");
                    return Ok(());
                }
                Err(e) => tracing::debug!(provider = %client.provider(), error = %e, "Upstream refused cancel"),
            }
        }
        Err(GsrError::NotFound("Unknown booking id".to_string()))
    }

    /// Free rooms at a location.
    ///
    /// For Wharton rooms in group context a random Wharton member acts, so
    /// the group sees rooms even when the requester is not entitled.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown or inactive location, or unknown group
    /// - `Forbidden` if the group has no Wharton member
    /// - Upstream failures
    #[tracing::instrument(skip(self, requester), fields(user_id = %requester.id))]
    pub async fn availability(
        &self,
        query: &AvailabilityQuery,
        requester: &User,
        group: Option<GroupId>,
    ) -> Result<AvailabilityView> {
        let room = self
            .catalog
            .by_external_ids(&query.lid, &query.gid)
            .filter(|r| r.active)
            .ok_or_else(|| GsrError::NotFound("Unknown location".to_string()))?;

        let acting = match (room.kind, group) {
            (RoomKind::Wharton, Some(group)) => self.random_wharton_member(group, requester).await?,
            _ => requester.clone(),
        };
        let rooms = self.upstreams.for_kind(room.kind).availability(query, &acting).await?;

        Ok(AvailabilityView {
            name: room.name.clone(),
            gid: room.gid.clone(),
            rooms,
        })
    }

    async fn random_wharton_member(&self, group: GroupId, requester: &User) -> Result<User> {
        self.directory
            .group(group)
            .await?
            .ok_or_else(|| GsrError::NotFound("Unknown group".to_string()))?;
        let members = self.directory.members(group).await?;
        if !members.iter().any(|m| m.user.id == requester.id && m.accepted) {
            return Err(GsrError::Forbidden("You are not a member of this group".to_string()));
        }
        let wharton: Vec<&User> = members
            .iter()
            .filter(|m| QuotaLedger::eligible(m, RoomKind::Wharton))
            .map(|m| &m.user)
            .collect();
        if wharton.is_empty() {
            return Err(GsrError::Forbidden(
                "No members of this group are eligible to book Wharton rooms".to_string(),
            ));
        }
        let pick = self.random.below(wharton.len());
        Ok(wharton
            .get(pick)
            .map_or_else(|| requester.clone(), |u| (*u).clone()))
    }

    /// Upcoming bookings for `user`, merged with Wharton's own record.
    ///
    /// With `group`, bookings under reservations the user created are
    /// included and room names are prefixed with `[Me]` or `[<group>]`.
    /// Wharton errors are logged and ignored.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown group; `Storage` on ledger failure.
    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn list_reservations(&self, user: &User, group: Option<GroupId>) -> Result<Vec<ReservationView>> {
        let now = self.clock.now();
        let group_name = match group {
            Some(id) => Some(
                self.directory
                    .group(id)
                    .await?
                    .ok_or_else(|| GsrError::NotFound("Unknown group".to_string()))?
                    .name,
            ),
            None => None,
        };

        let bookings = self.reservations.list_bookings(user.id, group.is_some(), now).await?;
        let mut seen: HashSet<String> = HashSet::new();
        let mut views = Vec::with_capacity(bookings.len());
        for booking in bookings {
            seen.insert(booking.upstream_id.clone());
            let Some(room) = self.catalog.by_id(booking.room) else {
                continue;
            };
            let room_name = match &group_name {
                Some(_) if booking.user == user.id => format!("[Me] {}", booking.room_name),
                Some(name) => format!("[{name}] {}", booking.room_name),
                None => booking.room_name.clone(),
            };
            views.push(ReservationView {
                booking_id: booking.upstream_id,
                gsr: room.clone(),
                room_id: booking.upstream_room_id,
                room_name,
                start: booking.start,
                end: booking.end,
            });
        }

        match self.upstreams.wharton.reservations(user).await {
            Ok(upstream) => {
                for reservation in upstream {
                    if seen.contains(&reservation.booking_id) {
                        continue;
                    }
                    let Some(room) = self.catalog.by_external_location_id(&reservation.lid) else {
                        continue;
                    };
                    views.push(ReservationView {
                        booking_id: reservation.booking_id,
                        gsr: room.clone(),
                        room_id: reservation.room_id,
                        room_name: reservation.room_name,
                        start: reservation.start,
                        end: reservation.end,
                    });
                }
            }
            Err(e) => tracing::warn!(error = %e, "Skipping Wharton reservations"),
        }

        views.sort_by_key(|v| v.start);
        Ok(views)
    }
}
