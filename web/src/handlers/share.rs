//! Share code endpoints. Lookups are public; issue and revoke are not.

use crate::error::AppError;
use crate::extractors::Requester;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use campus_gsr_booking::{ShareCodeView, SharedBookingView};
use serde::Deserialize;

/// Body of `POST /share`.
#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    /// Upstream booking ID.
    pub booking_id: String,
}

/// `POST /share`.
///
/// # Errors
///
/// Mapped from the registry.
pub async fn issue(
    State(state): State<AppState>,
    Requester(user): Requester,
    Json(request): Json<ShareRequest>,
) -> Result<(StatusCode, Json<ShareCodeView>), AppError> {
    let view = state.share_codes.issue(&request.booking_id, &user).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// `GET /share/{code}`.
///
/// # Errors
///
/// 404 for an unknown code.
pub async fn lookup(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<SharedBookingView>, AppError> {
    Ok(Json(state.share_codes.lookup(&code).await?))
}

/// `GET /share/{code}/view`.
///
/// # Errors
///
/// 404 for an unknown code, 410 once the booking is over.
pub async fn view(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<SharedBookingView>, AppError> {
    Ok(Json(state.share_codes.view(&code).await?))
}

/// `DELETE /share/{code}`.
///
/// # Errors
///
/// 404 unless the requester owns the code.
pub async fn revoke(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Requester(user): Requester,
) -> Result<StatusCode, AppError> {
    state.share_codes.revoke(&code, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}
