//! Axum HTTP surface for the campus GSR booking service.
//!
//! # Routes
//!
//! ```text
//! GET    /health
//! GET    /api/gsr/locations
//! GET    /api/gsr/availability/{lid}/{gid}?start&end&group
//! POST   /api/gsr/book
//! POST   /api/gsr/cancel
//! GET    /api/gsr/reservations?group
//! POST   /api/gsr/share
//! GET    /api/gsr/share/{code}
//! GET    /api/gsr/share/{code}/view
//! DELETE /api/gsr/share/{code}
//! ```
//!
//! The caller is identified by `X-User-Id`, set by the authenticating proxy
//! in front of this service.

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod state;

pub use error::AppError;
pub use extractors::{CorrelationId, Requester, USER_ID_HEADER};
pub use middleware::{correlation_id_layer, CORRELATION_ID_HEADER};
pub use state::AppState;

use axum::{
    routing::{get, post},
    Router,
};
use handlers::{gsr, health, share};
use tower_http::trace::TraceLayer;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/locations", get(gsr::locations))
        .route("/availability/:lid/:gid", get(gsr::availability))
        .route("/book", post(gsr::book))
        .route("/cancel", post(gsr::cancel))
        .route("/reservations", get(gsr::reservations))
        .route("/share", post(share::issue))
        .route("/share/:code", get(share::lookup).delete(share::revoke))
        .route("/share/:code/view", get(share::view));

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/gsr", api)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
