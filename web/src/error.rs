//! Error types for web handlers.
//!
//! Bridges [`GsrError`] and [`ReserveFailure`] to HTTP responses. Every error
//! renders as `{code, message}`; a partial reservation adds `reservation`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use campus_gsr_booking::ReserveFailure;
use campus_gsr_core::{GsrError, Reservation};
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: &'static str,
    /// Bookings made before a reserve failed.
    reservation: Option<Box<Reservation>>,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>, code: &'static str) -> Self {
        Self {
            status,
            message: message.into(),
            code,
            reservation: None,
            source: None,
        }
    }

    /// Create a new error with a source error.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Create a 401 Unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message, "UNAUTHORIZED")
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message, "INTERNAL_SERVER_ERROR")
    }

    /// HTTP status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: &'static str,
    /// Human-readable error message.
    message: String,
    /// Partial reservation, if any bookings were made.
    #[serde(skip_serializing_if = "Option::is_none")]
    reservation: Option<Box<Reservation>>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    error = %source,
                    "Internal server error"
                );
            } else {
                tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    "Internal server error"
                );
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
            reservation: self.reservation,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<GsrError> for AppError {
    fn from(err: GsrError) -> Self {
        let (status, code) = match &err {
            GsrError::Upstream { .. } => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            GsrError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            GsrError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            GsrError::QuotaExceeded(_) => (StatusCode::BAD_REQUEST, "QUOTA_EXCEEDED"),
            GsrError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            GsrError::Invalid(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            GsrError::Expired(_) => (StatusCode::GONE, "EXPIRED"),
            GsrError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR"),
        };
        if status.is_server_error() {
            return Self::internal("An internal error occurred").with_source(anyhow::Error::new(err));
        }
        Self::new(status, err.to_string(), code)
    }
}

impl From<ReserveFailure> for AppError {
    fn from(failure: ReserveFailure) -> Self {
        match failure.partial {
            Some(reservation) => Self {
                reservation: Some(Box::new(reservation)),
                ..Self::new(StatusCode::CONFLICT, failure.error.to_string(), "PARTIAL_RESERVATION")
            },
            None => failure.error.into(),
        }
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}
