//! # Campus GSR Testing
//!
//! Testing utilities for the GSR booking crates.
//!
//! This crate provides:
//! - Deterministic implementations of the environment traits
//!   ([`FixedClock`], [`ManualClock`], [`PinnedRandom`])
//! - Fixture builders for users, memberships and rooms
//! - proptest strategies for booking intervals and credits
//!
//! ## Example
//!
//! ```
//! use campus_gsr_testing::{fixtures, test_clock};
//! use campus_gsr_core::Clock;
//!
//! let clock = test_clock();
//! let alice = fixtures::user("alice", "alice@seas.upenn.edu");
//! assert_eq!(clock.now(), fixtures::local(2025, 3, 10, 8, 0));
//! assert_eq!(alice.username, "alice");
//! ```

use chrono::{DateTime, TimeDelta, Utc};
use campus_gsr_core::{Clock, RandomSource};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{PoisonError, RwLock};

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{AtomicU8, Clock, DateTime, Ordering, PoisonError, RandomSource, RwLock, TimeDelta, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    ///
    /// Used for expiry tests (tokens, directory cache, share codes).
    #[derive(Debug)]
    pub struct ManualClock {
        time: RwLock<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Start at `time`.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: RwLock::new(time),
            }
        }

        /// Move forward by `delta`.
        pub fn advance(&self, delta: TimeDelta) {
            let mut time = self.time.write().unwrap_or_else(PoisonError::into_inner);
            *time += delta;
        }

        /// Jump to `time`.
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.write().unwrap_or_else(PoisonError::into_inner) = time;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Randomness with pinned outcomes.
    ///
    /// `below(n)` always returns `n - 1`, which makes a Fisher–Yates shuffle
    /// the identity. Byte fills come from a counter advanced by `step` per
    /// call; a step of zero yields the same bytes every time.
    #[derive(Debug)]
    pub struct PinnedRandom {
        next: AtomicU8,
        step: u8,
    }

    impl PinnedRandom {
        /// Distinct bytes on every fill.
        #[must_use]
        pub const fn new() -> Self {
            Self {
                next: AtomicU8::new(0),
                step: 1,
            }
        }

        /// Identical bytes on every fill, to force code collisions.
        #[must_use]
        pub const fn constant(byte: u8) -> Self {
            Self {
                next: AtomicU8::new(byte),
                step: 0,
            }
        }
    }

    impl Default for PinnedRandom {
        fn default() -> Self {
            Self::new()
        }
    }

    impl RandomSource for PinnedRandom {
        fn below(&self, bound: usize) -> usize {
            bound.saturating_sub(1)
        }

        fn fill_bytes(&self, dest: &mut [u8]) {
            let byte = self.next.fetch_add(self.step, Ordering::SeqCst);
            dest.fill(byte);
        }
    }

    /// Default fixed clock for tests: 2025-03-10 08:00 in New York.
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(crate::fixtures::local(2025, 3, 10, 8, 0))
    }
}

/// Fixture builders for domain values.
pub mod fixtures {
    use campus_gsr_core::{Entitlement, GroupId, GroupMember, Room, RoomId, RoomKind, User, UserId};
    use chrono::{DateTime, TimeZone, Utc};
    use chrono_tz::America::New_York;

    /// Instant at a New York wall-clock time.
    ///
    /// # Panics
    ///
    /// Panics on a non-existent local time (only inside the DST gap).
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn local(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        New_York
            .with_ymd_and_hms(year, month, day, hour, minute, 0)
            .single()
            .expect("fixture times avoid the DST gap")
            .with_timezone(&Utc)
    }

    /// User with unknown entitlements.
    #[must_use]
    pub fn user(username: &str, email: &str) -> User {
        User {
            id: UserId::new(),
            username: username.to_string(),
            first_name: username.to_string(),
            last_name: "Quaker".to_string(),
            email: email.to_string(),
            directory_id: None,
            is_wharton: Entitlement::Unknown,
            is_engineering: Entitlement::Unknown,
        }
    }

    /// User entitled to Wharton rooms.
    #[must_use]
    pub fn wharton_user(username: &str) -> User {
        User {
            is_wharton: Entitlement::Yes,
            ..user(username, &format!("{username}@wharton.upenn.edu"))
        }
    }

    /// Accepted membership mirroring the user's entitlements.
    #[must_use]
    pub fn member(user: &User, group: GroupId) -> GroupMember {
        GroupMember {
            user: user.clone(),
            group,
            accepted: true,
            pennkey_allowed: true,
            is_wharton: user.is_wharton,
            is_engineering: user.is_engineering,
        }
    }

    /// Active catalog room.
    #[must_use]
    pub fn room(id: i64, kind: RoomKind, lid: &str, gid: &str) -> Room {
        Room {
            id: RoomId(id),
            name: format!("Location {lid}"),
            kind,
            lid: lid.to_string(),
            gid: gid.to_string(),
            image_url: None,
            active: true,
        }
    }
}

/// Property-based testing strategies.
pub mod properties {
    use chrono::TimeDelta;
    use proptest::prelude::*;

    /// Credit in whole minutes, up to three hours, possibly exhausted.
    pub fn credit_minutes() -> impl Strategy<Value = TimeDelta> {
        (-30i64..=180).prop_map(TimeDelta::minutes)
    }

    /// Requested reservation length in 30-minute slots, 30 min to 6 h.
    pub fn request_length() -> impl Strategy<Value = TimeDelta> {
        (1i64..=12).prop_map(|slots| TimeDelta::minutes(slots * 30))
    }
}

/// Install a test tracing subscriber once. Output goes to the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, PinnedRandom, test_clock};
