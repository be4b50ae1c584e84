//! HTTP handlers.

pub mod gsr;
pub mod health;
pub mod share;
