//! # Campus GSR Core
//!
//! Core types for the Group Study Room (GSR) booking subsystem of the campus
//! services backend.
//!
//! This crate provides:
//! - Identifier newtypes and the domain model (rooms, users, groups,
//!   reservations, bookings, share codes)
//! - The error taxonomy shared by every other crate ([`GsrError`])
//! - Injectable environment traits ([`Clock`], [`RandomSource`])
//! - Service configuration ([`GsrConfig`])
//! - Wire timestamp formats and local civil-day helpers ([`time`])
//!
//! ## Architecture
//!
//! ```text
//! web ──► booking ──► upstream ──► core
//!           │                       ▲
//!           └──► postgres ──────────┘
//! ```
//!
//! Nothing in this crate performs I/O. Time and randomness flow through the
//! [`Clock`] and [`RandomSource`] traits so that orchestration logic stays
//! deterministic under test.

#![forbid(unsafe_code)]

pub mod config;
pub mod environment;
pub mod error;
pub mod time;
pub mod types;

pub use config::GsrConfig;
pub use environment::{Clock, RandomSource, SystemClock, ThreadRandom};
pub use error::{ErrorKind, GsrError, Result};
pub use types::{
    Booking, BookingId, Credit, Entitlement, Group, GroupId, GroupMember, Provider, Reservation,
    ReservationId, Room, RoomId, RoomKind, ShareCode, User, UserId,
};
