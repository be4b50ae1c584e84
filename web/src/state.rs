//! Application state for Axum handlers.

use campus_gsr_booking::{BookingOrchestrator, DirectoryStore, ShareCodeRegistry};
use std::sync::Arc;

/// Services shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Reserve, cancel, availability and listing.
    pub orchestrator: Arc<BookingOrchestrator>,
    /// Share codes.
    pub share_codes: Arc<ShareCodeRegistry>,
    /// Resolves the authenticated principal.
    pub directory: Arc<dyn DirectoryStore>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        orchestrator: Arc<BookingOrchestrator>,
        share_codes: Arc<ShareCodeRegistry>,
        directory: Arc<dyn DirectoryStore>,
    ) -> Self {
        Self {
            orchestrator,
            share_codes,
            directory,
        }
    }
}
