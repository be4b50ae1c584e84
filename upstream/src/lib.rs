//! # Campus GSR Upstream
//!
//! Typed clients for the external systems behind GSR booking.
//!
//! - [`TokenCache`]: per-provider bearer tokens with single-flight refresh
//! - [`UpstreamClient`]: availability, book, cancel, reservations and
//!   entitlement, implemented by [`WhartonClient`], [`LibCalClient`] and
//!   [`EngineeringClient`]
//! - [`DirectoryResolver`]: directory IDs and authorized engineering rooms
//!
//! Every outbound call carries an explicit timeout and reports
//! `gsr.upstream.requests` with `provider`, `op` and `outcome` labels.

#![forbid(unsafe_code)]

pub mod client;
pub mod directory;
pub mod engineering;
mod http;
pub mod libcal;
pub mod token;
pub mod wharton;

pub use client::{AvailabilityQuery, RoomAvailability, Slot, UpstreamClient, UpstreamReservation};
pub use directory::{AuthorizedRooms, DirectoryGroup, DirectoryResolver, HttpIdentitySource, IdentitySource};
pub use engineering::EngineeringClient;
pub use libcal::LibCalClient;
pub use token::TokenCache;
pub use wharton::WhartonClient;

use campus_gsr_core::{Clock, GsrConfig, Provider, RoomKind};
use std::sync::Arc;

/// One client per room kind.
#[derive(Clone)]
pub struct Upstreams {
    /// Wharton rooms.
    pub wharton: Arc<dyn UpstreamClient>,
    /// General LibCal rooms.
    pub libcal: Arc<dyn UpstreamClient>,
    /// Engineering rooms.
    pub engineering: Arc<dyn UpstreamClient>,
}

impl Upstreams {
    /// Wire the production clients from configuration.
    #[must_use]
    pub fn from_config(config: &GsrConfig, clock: Arc<dyn Clock>) -> Self {
        let http = reqwest::Client::new();
        let tokens = Arc::new(
            TokenCache::new(
                http.clone(),
                Arc::clone(&clock),
                config.upstream.token_skew,
                config.upstream.timeout,
            )
            .with_static(Provider::Wharton, config.upstream.wharton_token.clone())
            .with_client_credentials(
                Provider::LibCal,
                libcal::token_endpoint(&config.upstream.libcal_url),
                config.upstream.libcal.clone(),
            )
            .with_client_credentials(
                Provider::Engineering,
                libcal::token_endpoint(&config.upstream.libcal_url),
                config.upstream.engineering.clone(),
            ),
        );
        let identity = Arc::new(HttpIdentitySource::new(http.clone(), config));
        let directory = Arc::new(DirectoryResolver::new(http.clone(), config, identity, Arc::clone(&clock)));

        Self {
            wharton: Arc::new(WhartonClient::new(http.clone(), config, Arc::clone(&tokens), Arc::clone(&clock))),
            libcal: Arc::new(LibCalClient::new(http.clone(), config, Arc::clone(&tokens), Arc::clone(&clock))),
            engineering: Arc::new(EngineeringClient::new(
                LibCalClient::engineering(http, config, tokens, clock),
                directory,
            )),
        }
    }

    /// Client responsible for `kind`.
    #[must_use]
    pub fn for_kind(&self, kind: RoomKind) -> &Arc<dyn UpstreamClient> {
        match kind {
            RoomKind::Wharton => &self.wharton,
            RoomKind::LibCal => &self.libcal,
            RoomKind::EngineeringCombined => &self.engineering,
        }
    }

    /// Clients in the order tried when cancelling a booking unknown locally.
    #[must_use]
    pub fn cancel_order(&self) -> [&Arc<dyn UpstreamClient>; 3] {
        [&self.wharton, &self.libcal, &self.engineering]
    }
}
