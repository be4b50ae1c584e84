//! Share code registry trait.

use async_trait::async_trait;
use campus_gsr_core::{BookingId, Result, ShareCode};

/// Persistence for share codes. Codes are unique; at most one per booking.
#[async_trait]
pub trait ShareCodeStore: Send + Sync {
    /// Insert a new code.
    ///
    /// # Errors
    ///
    /// - `Conflict` if the code (or a code for the same booking) exists
    /// - `Storage` on database failure
    async fn insert(&self, code: &ShareCode) -> Result<()>;

    /// Look up by code.
    ///
    /// # Errors
    ///
    /// `Storage` on database failure.
    async fn by_code(&self, code: &str) -> Result<Option<ShareCode>>;

    /// Look up the code bound to a booking.
    ///
    /// # Errors
    ///
    /// `Storage` on database failure.
    async fn by_booking(&self, booking: BookingId) -> Result<Option<ShareCode>>;

    /// Delete a code. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// `Storage` on database failure.
    async fn delete(&self, code: &str) -> Result<bool>;
}
