//! Reserve outcome errors.

use campus_gsr_core::{GsrError, Reservation};
use thiserror::Error;

/// A failed `Reserve`, with whatever was booked before the failure.
///
/// `partial` is `Some` only when at least one booking succeeded and was
/// recorded; the caller sees both the cut-off message and the reservation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error}")]
pub struct ReserveFailure {
    /// What went wrong.
    pub error: GsrError,
    /// Reservation holding the bookings made before the failure.
    pub partial: Option<Reservation>,
}

impl ReserveFailure {
    /// Failure with nothing booked.
    #[must_use]
    pub const fn nothing_booked(error: GsrError) -> Self {
        Self { error, partial: None }
    }

    /// Failure after some bookings succeeded.
    #[must_use]
    pub const fn partial(error: GsrError, reservation: Reservation) -> Self {
        Self {
            error,
            partial: Some(reservation),
        }
    }
}

impl From<GsrError> for ReserveFailure {
    fn from(error: GsrError) -> Self {
        Self::nothing_booked(error)
    }
}
