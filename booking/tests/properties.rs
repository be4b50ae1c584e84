//! Property tests for splitting and quota accounting.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use campus_gsr_booking::mocks::{InMemoryDirectory, InMemoryReservationStore, MockUpstream};
use campus_gsr_booking::{BookingOrchestrator, ReservationStore, ReserveRequest, RoomCatalog};
use campus_gsr_core::{
    Booking, BookingId, Credit, GsrConfig, GsrError, Provider, Reservation, ReservationId, RoomId, RoomKind, User, UserId,
};
use campus_gsr_testing::{FixedClock, PinnedRandom, fixtures, properties};
use campus_gsr_upstream::Upstreams;
use chrono::TimeDelta;
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const WEIGLE: &str = "1889";

async fn prior_booking(store: &InMemoryReservationStore, user: &User, used: TimeDelta) {
    let start = fixtures::local(2025, 3, 10, 0, 0);
    let reservation = Reservation {
        id: ReservationId::new(),
        start,
        end: start + used,
        creator: user.id,
        group: None,
        cancelled: false,
        reminder_sent: false,
        bookings: Vec::new(),
    };
    let booking = Booking {
        id: BookingId::new(),
        reservation: reservation.id,
        user: user.id,
        upstream_id: format!("prior-{}", user.username),
        room: RoomId(2),
        upstream_room_id: 1,
        room_name: "Earlier".to_string(),
        start,
        end: start + used,
        cancelled: false,
    };
    store.create_reservation(&reservation, &booking).await.unwrap();
}

/// Reserve `length` at 10:00 for a group whose members have already used
/// `usage` today. Returns the outcome and each member's credit beforehand.
async fn reserve_for_group(
    usage: &[i64],
    length: TimeDelta,
) -> (Result<Reservation, GsrError>, HashMap<UserId, TimeDelta>, Arc<InMemoryReservationStore>) {
    let store = Arc::new(InMemoryReservationStore::new());
    let directory = Arc::new(InMemoryDirectory::new());
    let group = directory.insert_group("Props").unwrap();
    let config = GsrConfig::default();
    let mut credits = HashMap::new();
    let mut requester = None;
    for (i, used) in usage.iter().enumerate() {
        let user = fixtures::user(&format!("m{i}"), &format!("m{i}@upenn.edu"));
        let used = TimeDelta::minutes(*used);
        if used > TimeDelta::zero() {
            prior_booking(&store, &user, used).await;
        }
        credits.insert(user.id, config.policy.libcal_credit - used);
        directory.add_member(fixtures::member(&user, group.id)).unwrap();
        requester.get_or_insert(user);
    }

    let upstreams = Upstreams {
        wharton: Arc::new(MockUpstream::new(Provider::Wharton)),
        libcal: Arc::new(MockUpstream::new(Provider::LibCal)),
        engineering: Arc::new(MockUpstream::new(Provider::Engineering)),
    };
    let orchestrator = BookingOrchestrator::new(
        Arc::new(RoomCatalog::new(
            vec![fixtures::room(2, RoomKind::LibCal, "1086", "1889")],
            &HashSet::new(),
        )),
        upstreams,
        store.clone(),
        directory,
        Arc::new(FixedClock::new(fixtures::local(2025, 3, 10, 8, 0))),
        Arc::new(PinnedRandom::new()),
        config.policy,
    );
    let start = fixtures::local(2025, 3, 10, 10, 0);
    let request = ReserveRequest {
        gid: WEIGLE.to_string(),
        lid: None,
        room_id: 94,
        room_name: "Room 94".to_string(),
        start,
        end: start + length,
        group: Some(group.id),
    };
    let outcome = orchestrator
        .reserve(request, requester.as_ref().unwrap())
        .await
        .map_err(|f| f.error);
    (outcome, credits, store)
}

proptest! {
    #[test]
    fn reservations_cover_the_request_or_nothing_is_written(
        usage in prop::collection::vec(0i64..=150, 1..=4),
        length in properties::request_length(),
    ) {
        let (outcome, credits, store) = tokio_test::block_on(reserve_for_group(&usage, length));
        let total: Credit = credits
            .values()
            .filter(|c| **c > TimeDelta::zero())
            .map(|c| Credit::Limited(*c))
            .sum();

        match outcome {
            Ok(reservation) => {
                prop_assert!(!total.rejects(length));
                prop_assert!(reservation.is_consistent());
                prop_assert_eq!(reservation.bookings.last().map(|b| b.end), Some(reservation.end));
                let distinct: HashSet<_> = reservation.bookings.iter().map(|b| b.user).collect();
                prop_assert_eq!(distinct.len(), reservation.bookings.len());
                for booking in &reservation.bookings {
                    prop_assert!(booking.duration() <= credits[&booking.user]);
                }
            }
            Err(GsrError::QuotaExceeded(_)) => {
                prop_assert!(total.rejects(length));
                prop_assert_eq!(store.reservations().unwrap().len(), usage.iter().filter(|u| **u > 0).count());
            }
            Err(other) => prop_assert!(false, "unexpected error {other}"),
        }
    }
}
