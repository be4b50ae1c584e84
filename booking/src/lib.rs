//! # Campus GSR Booking
//!
//! Reservation orchestration for group study rooms.
//!
//! ## Features
//!
//! - **Group splitting**: a long request is cut into consecutive bookings,
//!   each placed under a different member's upstream quota
//! - **Local ledger**: credit is derived from recorded bookings, never stored
//! - **Compensation**: an upstream booking whose local row never commits is
//!   cancelled again
//! - **Share codes**: short public links to a booking
//!
//! ## Architecture
//!
//! Services depend on storage traits in [`providers`] and on
//! [`UpstreamClient`](campus_gsr_upstream::UpstreamClient); production wires
//! the PostgreSQL stores, tests the in-memory [`mocks`].
//!
//! ```text
//! Reserve → QuotaLedger → [UpstreamClient.book → ReservationStore]* → Reservation
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod catalog;
pub mod entitlement;
pub mod error;
pub mod orchestrator;
pub mod providers;
pub mod quota;
pub mod reminder;
pub mod share;

#[cfg(feature = "test-utils")]
pub mod mocks;

pub use catalog::RoomCatalog;
pub use entitlement::{EntitlementRefresher, RefreshSummary};
pub use error::ReserveFailure;
pub use orchestrator::{AvailabilityView, BookingOrchestrator, ReservationView, ReserveRequest};
pub use providers::{DirectoryStore, ReservationStore, ShareCodeStore};
pub use quota::{MemberCredit, QuotaLedger};
pub use reminder::ReminderSweep;
pub use share::{ShareCodeRegistry, ShareCodeView, ShareStatus, SharedBookingView};
