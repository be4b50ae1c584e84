//! Booking endpoints under `/api/gsr`.

use crate::error::AppError;
use crate::extractors::{CorrelationId, Requester};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use campus_gsr_booking::{AvailabilityView, ReservationView, ReserveRequest};
use campus_gsr_core::{GroupId, Reservation, Room};
use campus_gsr_upstream::AvailabilityQuery;
use chrono::NaiveDate;
use serde::Deserialize;

/// Query string of `GET /availability/{lid}/{gid}`.
#[derive(Debug, Deserialize)]
pub struct AvailabilityParams {
    /// First day.
    pub start: Option<NaiveDate>,
    /// Last day.
    pub end: Option<NaiveDate>,
    /// Group context.
    pub group: Option<GroupId>,
}

/// Optional group context.
#[derive(Debug, Deserialize)]
pub struct GroupParam {
    /// Group context.
    pub group: Option<GroupId>,
}

/// Body of `POST /cancel`.
#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    /// Upstream booking ID.
    pub booking_id: String,
}

/// `GET /locations`: active catalog rooms.
#[allow(clippy::unused_async)]
pub async fn locations(State(state): State<AppState>) -> Json<Vec<Room>> {
    Json(state.orchestrator.catalog().active().cloned().collect())
}

/// `GET /availability/{lid}/{gid}`.
///
/// # Errors
///
/// Mapped from the orchestrator.
pub async fn availability(
    State(state): State<AppState>,
    Path((lid, gid)): Path<(String, String)>,
    Query(params): Query<AvailabilityParams>,
    Requester(user): Requester,
) -> Result<Json<AvailabilityView>, AppError> {
    let query = AvailabilityQuery {
        lid,
        gid,
        start: params.start,
        end: params.end,
    };
    let view = state.orchestrator.availability(&query, &user, params.group).await?;
    Ok(Json(view))
}

/// `POST /book`: 201 with the reservation, or 409 with what was booked.
///
/// # Errors
///
/// Mapped from the orchestrator.
pub async fn book(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    Requester(user): Requester,
    Json(request): Json<ReserveRequest>,
) -> Result<(StatusCode, Json<Reservation>), AppError> {
    tracing::debug!(correlation_id = %correlation_id.0, gid = %request.gid, "Book requested");
    let reservation = state.orchestrator.reserve(request, &user).await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

/// `POST /cancel`.
///
/// # Errors
///
/// Mapped from the orchestrator.
pub async fn cancel(
    State(state): State<AppState>,
    Requester(user): Requester,
    Json(request): Json<CancelRequest>,
) -> Result<StatusCode, AppError> {
    state.orchestrator.cancel(&request.booking_id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /reservations`.
///
/// # Errors
///
/// Mapped from the orchestrator.
pub async fn reservations(
    State(state): State<AppState>,
    Query(params): Query<GroupParam>,
    Requester(user): Requester,
) -> Result<Json<Vec<ReservationView>>, AppError> {
    Ok(Json(state.orchestrator.list_reservations(&user, params.group).await?))
}
