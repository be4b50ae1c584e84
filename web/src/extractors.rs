//! Custom Axum extractors.
//!
//! - `CorrelationId`: Extract or generate request correlation IDs
//! - `Requester`: The authenticated user, named by `X-User-Id`
//!
//! # Examples
//!
//! ```ignore
//! async fn handler(
//!     State(state): State<AppState>,
//!     correlation_id: CorrelationId,
//!     Requester(user): Requester,
//! ) -> Result<Json<Response>, AppError> {
//!     tracing::info!(correlation_id = %correlation_id.0, user_id = %user.id, "Processing request");
//!     Ok(Json(response))
//! }
//! ```

use crate::error::AppError;
use crate::middleware::CORRELATION_ID_HEADER;
use crate::state::AppState;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use campus_gsr_core::{User, UserId};
use uuid::Uuid;

/// Header carrying the authenticated user's ID, set by the auth proxy.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Correlation ID for request tracing.
///
/// Taken from the request extensions when the middleware ran, else from the
/// `X-Correlation-ID` header, else freshly generated.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = parts
            .extensions
            .get::<Uuid>()
            .copied()
            .or_else(|| {
                parts
                    .headers
                    .get(CORRELATION_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| Uuid::parse_str(s).ok())
            })
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(correlation_id))
    }
}

/// The authenticated user.
///
/// Rejects with 401 when the header is missing, malformed, or names an
/// unknown user.
#[derive(Debug, Clone)]
pub struct Requester(pub User);

#[async_trait]
impl FromRequestParts<AppState> for Requester {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .ok_or_else(|| AppError::unauthorized("Missing or invalid X-User-Id"))?;

        let user = state
            .directory
            .user(UserId(id))
            .await?
            .ok_or_else(|| AppError::unauthorized("Unknown user"))?;
        Ok(Self(user))
    }
}
