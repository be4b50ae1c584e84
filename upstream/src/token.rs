//! Bearer-token cache with single-flight refresh.
//!
//! Each provider owns one slot. A slot is guarded by its own async mutex:
//! the first caller to find the token stale refreshes it while holding the
//! lock, and everyone queued behind it re-checks and reuses the fresh token.

use crate::http::{self, transport_error};
use campus_gsr_core::config::ClientCredentials;
use campus_gsr_core::{Clock, GsrError, Provider, Result};
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Longest lifetime honoured from a token response.
const MAX_TOKEN_LIFETIME_SECS: i64 = 86_400;

/// Cached bearer token.
#[derive(Clone)]
struct TokenEntry {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Where a provider's token comes from.
#[derive(Clone)]
pub enum TokenSource {
    /// Long-lived credential, never refreshed.
    Static(String),
    /// OAuth client-credentials exchange.
    ClientCredentials {
        /// Token endpoint URL.
        endpoint: String,
        /// Client ID and secret.
        credentials: ClientCredentials,
    },
}

struct Slot {
    source: TokenSource,
    entry: Mutex<Option<TokenEntry>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Process-wide token holder, one slot per provider.
pub struct TokenCache {
    http: Client,
    clock: Arc<dyn Clock>,
    skew: TimeDelta,
    timeout: Duration,
    slots: HashMap<Provider, Slot>,
}

impl TokenCache {
    /// Empty cache. Register providers with the `with_*` methods.
    #[must_use]
    pub fn new(http: Client, clock: Arc<dyn Clock>, skew: TimeDelta, timeout: Duration) -> Self {
        Self {
            http,
            clock,
            skew,
            timeout,
            slots: HashMap::new(),
        }
    }

    /// Register a static token.
    #[must_use]
    pub fn with_static(mut self, provider: Provider, token: impl Into<String>) -> Self {
        self.slots.insert(
            provider,
            Slot {
                source: TokenSource::Static(token.into()),
                entry: Mutex::new(None),
            },
        );
        self
    }

    /// Register a client-credentials token endpoint.
    #[must_use]
    pub fn with_client_credentials(
        mut self,
        provider: Provider,
        endpoint: impl Into<String>,
        credentials: ClientCredentials,
    ) -> Self {
        self.slots.insert(
            provider,
            Slot {
                source: TokenSource::ClientCredentials {
                    endpoint: endpoint.into(),
                    credentials,
                },
                entry: Mutex::new(None),
            },
        );
        self
    }

    /// Return a token valid for at least the configured skew.
    ///
    /// # Errors
    ///
    /// Returns [`GsrError::Upstream`] tagged with `provider` when the refresh
    /// fails or no slot is registered. Failures are not cached.
    pub async fn acquire(&self, provider: Provider) -> Result<String> {
        let slot = self
            .slots
            .get(&provider)
            .ok_or_else(|| GsrError::upstream(provider, "No credentials configured"))?;

        let (endpoint, credentials) = match &slot.source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::ClientCredentials { endpoint, credentials } => (endpoint, credentials),
        };

        let mut entry = slot.entry.lock().await;
        if let Some(current) = entry.as_ref() {
            if self.clock.now() < current.expires_at - self.skew {
                return Ok(current.token.clone());
            }
        }

        let fresh = self.refresh(provider, endpoint, credentials).await;
        let outcome = if fresh.is_ok() { "ok" } else { "error" };
        metrics::counter!("gsr.token.refresh", "provider" => provider.as_str(), "outcome" => outcome)
            .increment(1);

        let fresh = fresh?;
        let token = fresh.token.clone();
        *entry = Some(fresh);
        Ok(token)
    }

    /// Drop the cached token so the next `acquire` refreshes.
    pub async fn invalidate(&self, provider: Provider) {
        if let Some(slot) = self.slots.get(&provider) {
            *slot.entry.lock().await = None;
        }
    }

    async fn refresh(
        &self,
        provider: Provider,
        endpoint: &str,
        credentials: &ClientCredentials,
    ) -> Result<TokenEntry> {
        tracing::debug!(provider = %provider, "Refreshing bearer token");

        let request = self
            .http
            .post(endpoint)
            .timeout(self.timeout)
            .form(&[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ]);
        let response = http::send(provider, "token", request).await?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(provider = %provider, status = status.as_u16(), "Token refresh rejected");
            return Err(GsrError::upstream(
                provider,
                format!("Token refresh failed with status {}", status.as_u16()),
            ));
        }
        let body: TokenResponse = response.json().await.map_err(|e| {
            if e.is_decode() {
                GsrError::upstream(provider, "Malformed token response")
            } else {
                transport_error(provider, &e)
            }
        })?;

        let expires_at = TimeDelta::try_seconds(body.expires_in.clamp(0, MAX_TOKEN_LIFETIME_SECS))
            .and_then(|lifetime| self.clock.now().checked_add_signed(lifetime))
            .ok_or_else(|| GsrError::upstream(provider, "Malformed token response"))?;

        Ok(TokenEntry {
            token: body.access_token,
            expires_at,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use campus_gsr_testing::{ManualClock, fixtures};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn creds() -> ClientCredentials {
        ClientCredentials {
            client_id: "gsr".to_string(),
            client_secret: "s3cret".to_string(),
        }
    }

    fn token_response(token: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": token,
            "expires_in": 3600,
        }))
    }

    fn cache(server: &MockServer, clock: Arc<ManualClock>) -> TokenCache {
        TokenCache::new(Client::new(), clock, TimeDelta::seconds(30), Duration::from_secs(5))
            .with_client_credentials(
                Provider::LibCal,
                format!("{}/1.1/oauth/token", server.uri()),
                creds(),
            )
            .with_static(Provider::Wharton, "static-token")
    }

    #[tokio::test]
    async fn static_tokens_never_hit_the_network() {
        let server = MockServer::start().await;
        let clock = Arc::new(ManualClock::new(fixtures::local(2025, 3, 10, 9, 0)));
        let cache = cache(&server, clock);

        assert_eq!(cache.acquire(Provider::Wharton).await.unwrap(), "static-token");
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn refreshes_once_and_reuses_until_skew() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1.1/oauth/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(token_response("t1"))
            .expect(1)
            .mount(&server)
            .await;

        let clock = Arc::new(ManualClock::new(fixtures::local(2025, 3, 10, 9, 0)));
        let cache = cache(&server, Arc::clone(&clock));

        assert_eq!(cache.acquire(Provider::LibCal).await.unwrap(), "t1");
        clock.advance(TimeDelta::seconds(3569));
        assert_eq!(cache.acquire(Provider::LibCal).await.unwrap(), "t1");
    }

    #[tokio::test]
    async fn token_inside_skew_is_refreshed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1.1/oauth/token"))
            .respond_with(token_response("t1"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/1.1/oauth/token"))
            .respond_with(token_response("t2"))
            .mount(&server)
            .await;

        let clock = Arc::new(ManualClock::new(fixtures::local(2025, 3, 10, 9, 0)));
        let cache = cache(&server, Arc::clone(&clock));

        assert_eq!(cache.acquire(Provider::LibCal).await.unwrap(), "t1");
        clock.advance(TimeDelta::seconds(3570));
        assert_eq!(cache.acquire(Provider::LibCal).await.unwrap(), "t2");
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1.1/oauth/token"))
            .respond_with(token_response("shared").set_delay(Duration::from_millis(50)))
            .expect(1)
            .mount(&server)
            .await;

        let clock = Arc::new(ManualClock::new(fixtures::local(2025, 3, 10, 9, 0)));
        let cache = Arc::new(cache(&server, clock));

        let calls = (0..16).map(|_| {
            let cache = Arc::clone(&cache);
            async move { cache.acquire(Provider::LibCal).await }
        });
        let tokens = futures::future::join_all(calls).await;

        assert!(tokens.iter().all(|t| t.as_deref() == Ok("shared")));
        server.verify().await;
    }

    #[tokio::test]
    async fn refresh_failure_is_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1.1/oauth/token"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/1.1/oauth/token"))
            .respond_with(token_response("recovered"))
            .mount(&server)
            .await;

        let clock = Arc::new(ManualClock::new(fixtures::local(2025, 3, 10, 9, 0)));
        let cache = cache(&server, clock);

        let err = cache.acquire(Provider::LibCal).await.unwrap_err();
        assert!(matches!(err, GsrError::Upstream { provider: Provider::LibCal, .. }));
        assert_eq!(cache.acquire(Provider::LibCal).await.unwrap(), "recovered");
    }

    #[tokio::test]
    async fn oversized_lifetime_is_capped_to_a_day() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1.1/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "long-lived",
                "expires_in": 9_000_000_000_000_000_i64,
            })))
            .expect(2)
            .mount(&server)
            .await;

        let clock = Arc::new(ManualClock::new(fixtures::local(2025, 3, 10, 9, 0)));
        let cache = cache(&server, Arc::clone(&clock));

        assert_eq!(cache.acquire(Provider::LibCal).await.unwrap(), "long-lived");
        clock.advance(TimeDelta::hours(23));
        assert_eq!(cache.acquire(Provider::LibCal).await.unwrap(), "long-lived");
        clock.advance(TimeDelta::hours(1));
        assert_eq!(cache.acquire(Provider::LibCal).await.unwrap(), "long-lived");
        server.verify().await;
    }

    #[tokio::test]
    async fn negative_lifetime_expires_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1.1/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "stale",
                "expires_in": -5,
            })))
            .expect(2)
            .mount(&server)
            .await;

        let clock = Arc::new(ManualClock::new(fixtures::local(2025, 3, 10, 9, 0)));
        let cache = cache(&server, clock);

        assert_eq!(cache.acquire(Provider::LibCal).await.unwrap(), "stale");
        assert_eq!(cache.acquire(Provider::LibCal).await.unwrap(), "stale");
        server.verify().await;
    }

    #[tokio::test]
    async fn unregistered_provider_is_an_upstream_error() {
        let server = MockServer::start().await;
        let clock = Arc::new(ManualClock::new(fixtures::local(2025, 3, 10, 9, 0)));
        let cache = cache(&server, clock);

        let err = cache.acquire(Provider::Engineering).await.unwrap_err();
        assert_eq!(err.to_string(), "Engineering: No credentials configured");
    }
}
