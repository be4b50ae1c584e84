//! Storage providers.
//!
//! The booking services depend on these traits only. Production wires the
//! PostgreSQL implementations from `campus-gsr-postgres`; tests wire the
//! in-memory versions from [`crate::mocks`].
//!
//! ```text
//! BookingOrchestrator ──► ReservationStore   (reservations + bookings)
//!        │          └───► DirectoryStore     (users, groups, members)
//! ShareCodeRegistry ────► ShareCodeStore     (share codes)
//! ```
//!
//! Every method that writes more than one row does so in one transaction.

pub mod directory_store;
pub mod reservation_store;
pub mod share_code_store;

pub use directory_store::DirectoryStore;
pub use reservation_store::ReservationStore;
pub use share_code_store::ShareCodeStore;
