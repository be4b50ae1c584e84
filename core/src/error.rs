//! Error taxonomy for GSR booking operations.

use crate::types::Provider;
use thiserror::Error;

/// Result type alias for GSR operations.
pub type Result<T> = std::result::Result<T, GsrError>;

/// Every failure a GSR operation can surface.
///
/// User-visible failure is always a single message plus a kind. Upstream
/// errors keep their provider tag so the caller sees which system refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GsrError {
    // ═══════════════════════════════════════════════════════════
    // Upstream
    // ═══════════════════════════════════════════════════════════

    /// An upstream returned a non-success status, timed out, or reported a
    /// semantic error field.
    #[error("{provider}: {message}")]
    Upstream {
        /// Which upstream refused.
        provider: Provider,
        /// Human-readable message, already stripped of markup.
        message: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Caller errors
    // ═══════════════════════════════════════════════════════════

    /// Caller is not permitted to perform this operation.
    #[error("{0}")]
    Forbidden(String),

    /// Booking, share code, room or user does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Pre-flight group credit check failed.
    #[error("{0}")]
    QuotaExceeded(String),

    /// Operation partially succeeded or collided with existing state.
    #[error("{0}")]
    Conflict(String),

    /// Malformed input (empty interval, unparseable timestamp).
    #[error("{0}")]
    Invalid(String),

    /// Share code exists but its booking has ended or was cancelled.
    #[error("{0}")]
    Expired(String),

    // ═══════════════════════════════════════════════════════════
    // System
    // ═══════════════════════════════════════════════════════════

    /// Local persistence failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Discriminant of [`GsrError`], used by the HTTP layer to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`GsrError::Upstream`].
    Upstream,
    /// See [`GsrError::Forbidden`].
    Forbidden,
    /// See [`GsrError::NotFound`].
    NotFound,
    /// See [`GsrError::QuotaExceeded`].
    QuotaExceeded,
    /// See [`GsrError::Conflict`].
    Conflict,
    /// See [`GsrError::Invalid`].
    Invalid,
    /// See [`GsrError::Expired`].
    Expired,
    /// See [`GsrError::Storage`].
    Storage,
}

impl GsrError {
    /// Build an upstream error for `provider`.
    #[must_use]
    pub fn upstream(provider: Provider, message: impl Into<String>) -> Self {
        Self::Upstream {
            provider,
            message: message.into(),
        }
    }

    /// Upstream error for a transport timeout.
    #[must_use]
    pub fn timeout(provider: Provider) -> Self {
        Self::upstream(provider, "Connection timeout")
    }

    /// Kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Upstream { .. } => ErrorKind::Upstream,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Invalid(_) => ErrorKind::Invalid,
            Self::Expired(_) => ErrorKind::Expired,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Message without the provider prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Upstream { message, .. }
            | Self::Forbidden(message)
            | Self::NotFound(message)
            | Self::QuotaExceeded(message)
            | Self::Conflict(message)
            | Self::Invalid(message)
            | Self::Expired(message)
            | Self::Storage(message) => message,
        }
    }
}
