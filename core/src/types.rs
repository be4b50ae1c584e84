//! Domain model for GSR booking.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════

/// Local user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

/// Group identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub Uuid);

/// Reservation (aggregate root) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(pub Uuid);

/// Local booking identifier. Distinct from the upstream booking ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(pub Uuid);

/// Catalog room identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub i64);

macro_rules! uuid_id {
    ($($name:ident),*) => {
        $(
            impl $name {
                /// Generate a new random identifier.
                #[must_use]
                pub fn new() -> Self {
                    Self(Uuid::new_v4())
                }
            }

            impl Default for $name {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    self.0.fmt(f)
                }
            }
        )*
    };
}

uuid_id!(UserId, GroupId, ReservationId, BookingId);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Providers and rooms
// ═══════════════════════════════════════════════════════════════════════

/// Tag identifying an external system in errors, logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    /// Wharton reservation API.
    Wharton,
    /// General LibCal reservation API.
    LibCal,
    /// Engineering rooms: directory authorization plus a dedicated LibCal
    /// credential.
    Engineering,
    /// Directory/identity service.
    Directory,
}

impl Provider {
    /// Stable lowercase name used as a metrics label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wharton => "wharton",
            Self::LibCal => "libcal",
            Self::Engineering => "engineering",
            Self::Directory => "directory",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Wharton => "Wharton",
            Self::LibCal => "LibCal",
            Self::Engineering => "Engineering",
            Self::Directory => "Directory",
        };
        f.write_str(name)
    }
}

/// Which upstream client handles a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomKind {
    /// Booked through the Wharton API.
    Wharton,
    /// Booked through the general LibCal API.
    LibCal,
    /// Booked through the engineering LibCal API after directory
    /// authorization.
    EngineeringCombined,
}

impl RoomKind {
    /// Upstream provider serving this kind.
    #[must_use]
    pub const fn provider(self) -> Provider {
        match self {
            Self::Wharton => Provider::Wharton,
            Self::LibCal => Provider::LibCal,
            Self::EngineeringCombined => Provider::Engineering,
        }
    }

    /// Database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wharton => "wharton",
            Self::LibCal => "libcal",
            Self::EngineeringCombined => "engineering",
        }
    }

    /// Parse the database representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "wharton" => Some(Self::Wharton),
            "libcal" => Some(Self::LibCal),
            "engineering" => Some(Self::EngineeringCombined),
            _ => None,
        }
    }
}

/// A reservable GSR location from the room catalog.
///
/// `(kind, lid, gid)` determines which upstream client handles it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// Catalog identifier.
    pub id: RoomId,
    /// Display name (building or location name).
    pub name: String,
    /// Upstream kind.
    pub kind: RoomKind,
    /// External location ID (opaque, provider-specific).
    pub lid: String,
    /// External group/category ID (opaque, provider-specific).
    pub gid: String,
    /// Optional image shown by the client app.
    #[serde(default)]
    pub image_url: Option<String>,
    /// Inactive rooms are hidden and cannot be booked.
    #[serde(default = "default_active", alias = "in_use")]
    pub active: bool,
}

const fn default_active() -> bool {
    true
}

// ═══════════════════════════════════════════════════════════════════════
// Users and groups
// ═══════════════════════════════════════════════════════════════════════

/// Cached tri-state entitlement flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Entitlement {
    /// Never checked, or the last check failed.
    #[default]
    Unknown,
    /// Entitled.
    Yes,
    /// Not entitled.
    No,
}

impl Entitlement {
    /// `true` only for [`Entitlement::Yes`].
    #[must_use]
    pub const fn is_yes(self) -> bool {
        matches!(self, Self::Yes)
    }

    /// Database representation (`NULL` for unknown).
    #[must_use]
    pub const fn as_option(self) -> Option<bool> {
        match self {
            Self::Unknown => None,
            Self::Yes => Some(true),
            Self::No => Some(false),
        }
    }
}

impl From<Option<bool>> for Entitlement {
    fn from(value: Option<bool>) -> Self {
        match value {
            None => Self::Unknown,
            Some(true) => Self::Yes,
            Some(false) => Self::No,
        }
    }
}

impl From<bool> for Entitlement {
    fn from(value: bool) -> Self {
        Self::from(Some(value))
    }
}

/// A user as seen by the booking core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Local identifier.
    pub id: UserId,
    /// Stable username; the upstream principal for Wharton.
    pub username: String,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Email; the upstream principal for LibCal.
    pub email: String,
    /// Numeric directory identifier, when already known.
    pub directory_id: Option<u64>,
    /// Cached Wharton entitlement.
    pub is_wharton: Entitlement,
    /// Cached engineering entitlement.
    pub is_engineering: Entitlement,
}

/// A named group of users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Identifier.
    pub id: GroupId,
    /// Display name, used to prefix group bookings.
    pub name: String,
}

/// Membership of a user in a group. At most one per `(user, group)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    /// The member.
    pub user: User,
    /// The group.
    pub group: GroupId,
    /// Invitation accepted.
    pub accepted: bool,
    /// Member may act on behalf of the group.
    pub pennkey_allowed: bool,
    /// Cached Wharton entitlement for this membership.
    pub is_wharton: Entitlement,
    /// Cached engineering entitlement for this membership.
    pub is_engineering: Entitlement,
}

// ═══════════════════════════════════════════════════════════════════════
// Reservations
// ═══════════════════════════════════════════════════════════════════════

/// One upstream booking placed under one acting user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Local identifier.
    pub id: BookingId,
    /// Parent reservation.
    pub reservation: ReservationId,
    /// Identity the upstream booking was placed under.
    pub user: UserId,
    /// Opaque upstream booking ID.
    pub upstream_id: String,
    /// Catalog room.
    pub room: RoomId,
    /// Upstream room ID within the catalog room.
    pub upstream_room_id: i64,
    /// Room display name captured at booking time.
    pub room_name: String,
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Exclusive end.
    pub end: DateTime<Utc>,
    /// Cancelled locally and upstream.
    pub cancelled: bool,
}

impl Booking {
    /// Length of the booked interval.
    #[must_use]
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    /// Whether `[start, end)` intersects `[from, to)`.
    #[must_use]
    pub fn intersects(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        self.start < to && from < self.end
    }
}

/// Reservation aggregate: a requested interval split across bookings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Identifier.
    pub id: ReservationId,
    /// Requested start.
    pub start: DateTime<Utc>,
    /// Requested end.
    pub end: DateTime<Utc>,
    /// User who asked for the reservation.
    pub creator: UserId,
    /// Group the reservation was made for, if any.
    pub group: Option<GroupId>,
    /// `true` iff every booking is cancelled.
    pub cancelled: bool,
    /// Reminder notification already sent.
    pub reminder_sent: bool,
    /// Member bookings in temporal order.
    pub bookings: Vec<Booking>,
}

impl Reservation {
    /// Non-cancelled bookings, in stored order.
    pub fn active_bookings(&self) -> impl Iterator<Item = &Booking> {
        self.bookings.iter().filter(|b| !b.cancelled)
    }

    /// Check the split invariant: non-cancelled bookings are a contiguous,
    /// temporally ordered cover of a prefix of `[start, end)`, or there are
    /// none and the reservation is cancelled.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let active: Vec<&Booking> = self.active_bookings().collect();
        if active.is_empty() {
            return self.cancelled || self.bookings.is_empty();
        }
        if self.cancelled {
            return false;
        }

        let mut cursor = self.start;
        for booking in active {
            if booking.start != cursor || booking.start >= booking.end || booking.end > self.end {
                return false;
            }
            cursor = booking.end;
        }
        true
    }
}

/// Shareable 8-character code bound to one booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareCode {
    /// URL-safe code.
    pub code: String,
    /// Bound booking.
    pub booking: BookingId,
    /// Issuing user.
    pub owner: UserId,
    /// Issue time.
    pub created_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════
// Credit
// ═══════════════════════════════════════════════════════════════════════

/// Remaining bookable duration for one member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credit {
    /// Solo bookings: the upstream enforces its own quota.
    Unlimited,
    /// Remaining duration inside the provider's window.
    Limited(TimeDelta),
}

impl Credit {
    /// Whether any time remains.
    #[must_use]
    pub fn is_positive(self) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Limited(d) => d > TimeDelta::zero(),
        }
    }

    /// `min(self, remaining)`.
    #[must_use]
    pub fn cap(self, remaining: TimeDelta) -> TimeDelta {
        match self {
            Self::Unlimited => remaining,
            Self::Limited(d) => d.min(remaining),
        }
    }

    /// Pre-flight check: a request of `requested` is rejected when it is
    /// greater than or equal to the available credit.
    #[must_use]
    pub fn rejects(self, requested: TimeDelta) -> bool {
        match self {
            Self::Unlimited => false,
            Self::Limited(d) => requested >= d,
        }
    }
}

impl Add for Credit {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Self::Limited(a), Self::Limited(b)) => Self::Limited(a + b),
            _ => Self::Unlimited,
        }
    }
}

impl Sum for Credit {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::Limited(TimeDelta::zero()), Add::add)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, h, m, 0).unwrap()
    }

    fn booking(reservation: ReservationId, start: DateTime<Utc>, end: DateTime<Utc>) -> Booking {
        Booking {
            id: BookingId::new(),
            reservation,
            user: UserId::new(),
            upstream_id: "b".to_string(),
            room: RoomId(1),
            upstream_room_id: 94,
            room_name: "Room".to_string(),
            start,
            end,
            cancelled: false,
        }
    }

    fn reservation(bookings: Vec<(DateTime<Utc>, DateTime<Utc>)>) -> Reservation {
        let id = ReservationId::new();
        Reservation {
            id,
            start: at(9, 0),
            end: at(11, 30),
            creator: UserId::new(),
            group: None,
            cancelled: false,
            reminder_sent: false,
            bookings: bookings.into_iter().map(|(s, e)| booking(id, s, e)).collect(),
        }
    }

    #[test]
    fn contiguous_prefix_is_consistent() {
        let r = reservation(vec![(at(9, 0), at(10, 30)), (at(10, 30), at(11, 0))]);
        assert!(r.is_consistent());
    }

    #[test]
    fn gap_is_inconsistent() {
        let r = reservation(vec![(at(9, 0), at(10, 0)), (at(10, 30), at(11, 0))]);
        assert!(!r.is_consistent());
    }

    #[test]
    fn all_cancelled_requires_cancelled_flag() {
        let mut r = reservation(vec![(at(9, 0), at(10, 0))]);
        r.bookings[0].cancelled = true;
        assert!(!r.is_consistent());
        r.cancelled = true;
        assert!(r.is_consistent());
    }

    #[test]
    fn credit_check_is_strict() {
        let credit = Credit::Limited(TimeDelta::minutes(90)) + Credit::Limited(TimeDelta::minutes(90));
        assert!(credit.rejects(TimeDelta::minutes(180)));
        assert!(!credit.rejects(TimeDelta::minutes(150)));
        assert!(!Credit::Unlimited.rejects(TimeDelta::days(7)));
    }

    #[test]
    fn credit_sum_with_unlimited_is_unlimited() {
        let total: Credit = [Credit::Limited(TimeDelta::minutes(30)), Credit::Unlimited]
            .into_iter()
            .sum();
        assert_eq!(total, Credit::Unlimited);
    }

    #[test]
    fn credit_cap_takes_minimum() {
        assert_eq!(
            Credit::Limited(TimeDelta::minutes(90)).cap(TimeDelta::minutes(60)),
            TimeDelta::minutes(60)
        );
        assert_eq!(Credit::Unlimited.cap(TimeDelta::minutes(60)), TimeDelta::minutes(60));
    }

    #[test]
    fn entitlement_round_trips_through_option() {
        for e in [Entitlement::Unknown, Entitlement::Yes, Entitlement::No] {
            assert_eq!(Entitlement::from(e.as_option()), e);
        }
    }
}
