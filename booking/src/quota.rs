//! Per-member booking credit.
//!
//! Credit is derived from the local ledger, never stored:
//!
//! | Kind        | Budget   | Counted bookings                          |
//! |-------------|----------|-------------------------------------------|
//! | Wharton     | 90 min   | Wharton rooms, `end >= now`               |
//! | LibCal      | 2 h      | LibCal rooms intersecting today (local)   |
//! | Engineering | 2 h      | Engineering rooms intersecting today      |

use crate::catalog::RoomCatalog;
use crate::providers::ReservationStore;
use campus_gsr_core::config::PolicyConfig;
use campus_gsr_core::environment::shuffle;
use campus_gsr_core::time::local_day_window;
use campus_gsr_core::{Booking, Clock, Credit, GroupMember, RandomSource, Result, RoomKind, User, UserId};
use chrono::TimeDelta;
use std::sync::Arc;

/// A member and the credit they can contribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberCredit {
    /// The acting user.
    pub user: User,
    /// Remaining credit.
    pub credit: Credit,
}

/// Computes remaining credit from the reservation ledger.
pub struct QuotaLedger {
    catalog: Arc<RoomCatalog>,
    reservations: Arc<dyn ReservationStore>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    policy: PolicyConfig,
}

impl QuotaLedger {
    /// Create a ledger over `reservations`.
    #[must_use]
    pub fn new(
        catalog: Arc<RoomCatalog>,
        reservations: Arc<dyn ReservationStore>,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
        policy: PolicyConfig,
    ) -> Self {
        Self {
            catalog,
            reservations,
            clock,
            random,
            policy,
        }
    }

    /// A solo booking: one entry with unlimited credit. The upstream
    /// enforces its own per-user quota.
    #[must_use]
    pub fn solo(user: &User) -> Vec<MemberCredit> {
        vec![MemberCredit {
            user: user.clone(),
            credit: Credit::Unlimited,
        }]
    }

    /// Whether a membership may book rooms of `kind` for its group.
    #[must_use]
    pub const fn eligible(member: &GroupMember, kind: RoomKind) -> bool {
        member.accepted
            && match kind {
                RoomKind::Wharton => member.is_wharton.is_yes(),
                RoomKind::LibCal => true,
                RoomKind::EngineeringCombined => member.is_engineering.is_yes(),
            }
    }

    /// Eligible members with positive credit, in random order, capped.
    ///
    /// # Errors
    ///
    /// `Storage` if the ledger cannot be read.
    pub async fn group_credits(&self, members: &[GroupMember], kind: RoomKind) -> Result<Vec<MemberCredit>> {
        let mut eligible: Vec<&GroupMember> = members.iter().filter(|m| Self::eligible(m, kind)).collect();
        shuffle(self.random.as_ref(), &mut eligible);

        let mut credits = Vec::with_capacity(self.policy.member_cap.min(eligible.len()));
        for member in eligible {
            if credits.len() >= self.policy.member_cap {
                break;
            }
            let credit = self.credit(member.user.id, kind).await?;
            if credit.is_positive() {
                credits.push(MemberCredit {
                    user: member.user.clone(),
                    credit,
                });
            }
        }
        tracing::debug!(?kind, members = credits.len(), "Computed group credits");
        Ok(credits)
    }

    /// Remaining credit of one user for `kind`.
    ///
    /// # Errors
    ///
    /// `Storage` if the ledger cannot be read.
    pub async fn credit(&self, user: UserId, kind: RoomKind) -> Result<Credit> {
        let now = self.clock.now();
        let (budget, bookings) = match kind {
            RoomKind::Wharton => (
                self.policy.wharton_credit,
                self.reservations.active_bookings_for_user(user, now).await?,
            ),
            RoomKind::LibCal | RoomKind::EngineeringCombined => {
                let (from, to) = local_day_window(now, self.policy.timezone)?;
                (
                    self.policy.libcal_credit,
                    self.reservations.bookings_for_user_between(user, from, to).await?,
                )
            }
        };
        Ok(Credit::Limited(budget - self.used(&bookings, kind)))
    }

    fn used(&self, bookings: &[Booking], kind: RoomKind) -> TimeDelta {
        bookings
            .iter()
            .filter(|b| !b.cancelled)
            .filter(|b| self.catalog.by_id(b.room).is_some_and(|r| r.kind == kind))
            .map(Booking::duration)
            .fold(TimeDelta::zero(), |acc, d| acc + d)
    }
}
