//! Directory resolution: numeric directory IDs and the engineering-room
//! groups a user belongs to.

use crate::http::{self, join, status_error};
use async_trait::async_trait;
use campus_gsr_core::config::DirectoryConfig;
use campus_gsr_core::{Clock, GsrConfig, GsrError, Provider, Result, User, UserId};
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

const PROVIDER: Provider = Provider::Directory;
const SUCCESS: &str = "SUCCESS";
const SUBJECT_NOT_FOUND: &str = "SUBJECT_NOT_FOUND";
const GSR_GROUP_MARKER: &str = "AGH:GSR";

/// A directory group granting access to one engineering room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryGroup {
    /// Fully qualified group name.
    pub name: String,
    /// Short name, e.g. `GroupStudyRoom_334`.
    pub extension: String,
    /// Human-readable name.
    #[serde(default, rename = "displayName")]
    pub display_name: Option<String>,
    /// Group UUID.
    #[serde(default)]
    pub uuid: Option<String>,
}

/// Authorized rooms keyed by group extension.
pub type AuthorizedRooms = HashMap<String, DirectoryGroup>;

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "WsGetGroupsLiteResult")]
    result: GroupsResult,
}

#[derive(Deserialize)]
struct GroupsResult {
    #[serde(rename = "resultMetadata")]
    metadata: ResultMetadata,
    #[serde(default, rename = "wsGroups")]
    groups: Vec<DirectoryGroup>,
}

#[derive(Deserialize)]
struct ResultMetadata {
    #[serde(rename = "resultCode")]
    code: String,
}

/// Resolves a username to a numeric directory identifier.
#[async_trait]
pub trait IdentitySource: Send + Sync {
    /// Numeric directory ID for `username`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the user has no directory entry, `Upstream` otherwise.
    async fn directory_id(&self, username: &str) -> Result<u64>;
}

/// Identity lookup over HTTP: `GET {identity}/{username}` → `{"penn_id": n}`.
pub struct HttpIdentitySource {
    http: Client,
    config: DirectoryConfig,
}

impl HttpIdentitySource {
    /// Build from configuration.
    #[must_use]
    pub fn new(http: Client, config: &GsrConfig) -> Self {
        Self {
            http,
            config: config.directory.clone(),
        }
    }
}

#[derive(Deserialize)]
struct IdentityRecord {
    penn_id: u64,
}

#[async_trait]
impl IdentitySource for HttpIdentitySource {
    async fn directory_id(&self, username: &str) -> Result<u64> {
        let request = self
            .http
            .get(join(&self.config.identity_url, username))
            .basic_auth(&self.config.username, Some(&self.config.password))
            .timeout(self.config.timeout);
        let response = http::send(PROVIDER, "identity", request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(GsrError::NotFound(format!("No directory entry for {username}")));
        }
        let record: IdentityRecord = http::typed_body(PROVIDER, response).await?;
        Ok(record.penn_id)
    }
}

struct CachedRooms {
    fetched_at: DateTime<Utc>,
    rooms: AuthorizedRooms,
}

/// Directory client with a short per-user cache of authorized rooms.
pub struct DirectoryResolver {
    http: Client,
    config: DirectoryConfig,
    identity: Arc<dyn IdentitySource>,
    clock: Arc<dyn Clock>,
    cache: Mutex<HashMap<UserId, CachedRooms>>,
}

impl DirectoryResolver {
    /// Build from configuration. The cache TTL is clamped to five minutes.
    #[must_use]
    pub fn new(http: Client, config: &GsrConfig, identity: Arc<dyn IdentitySource>, clock: Arc<dyn Clock>) -> Self {
        let mut config = config.directory.clone();
        config.cache_ttl = config.cache_ttl.min(TimeDelta::minutes(5));
        Self {
            http,
            config,
            identity,
            clock,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Numeric directory ID, from the user row when present.
    ///
    /// # Errors
    ///
    /// See [`IdentitySource::directory_id`].
    pub async fn user_directory_id(&self, user: &User) -> Result<u64> {
        match user.directory_id {
            Some(id) => Ok(id),
            None => self.identity.directory_id(&user.username).await,
        }
    }

    /// Engineering-room groups the user belongs to.
    ///
    /// # Errors
    ///
    /// `NotFound` when the user has no directory entry; `Upstream` tagged
    /// `Directory` on transport failure or an unexpected result code.
    #[tracing::instrument(skip(self, user), fields(user = %user.username))]
    pub async fn authorized_rooms(&self, user: &User) -> Result<AuthorizedRooms> {
        let now = self.clock.now();
        {
            let cache = self.cache.lock().await;
            if let Some(hit) = cache.get(&user.id) {
                if now - hit.fetched_at < self.config.cache_ttl {
                    return Ok(hit.rooms.clone());
                }
            }
        }

        let directory_id = self.user_directory_id(user).await?;
        let rooms = self.fetch_groups(directory_id).await?;
        let mut cache = self.cache.lock().await;
        let ttl = self.config.cache_ttl;
        cache.retain(|_, entry| now - entry.fetched_at < ttl);
        cache.insert(
            user.id,
            CachedRooms {
                fetched_at: now,
                rooms: rooms.clone(),
            },
        );
        Ok(rooms)
    }

    #[cfg(test)]
    async fn cached_users(&self) -> usize {
        self.cache.lock().await.len()
    }

    async fn fetch_groups(&self, directory_id: u64) -> Result<AuthorizedRooms> {
        let request = self
            .http
            .get(join(&self.config.url, &format!("{directory_id}/groups")))
            .basic_auth(&self.config.username, Some(&self.config.password))
            .timeout(self.config.timeout);
        let response = http::send(PROVIDER, "groups", request).await?;
        let (status, body) = http::json_body(PROVIDER, response).await?;

        let Ok(envelope) = serde_json::from_value::<Envelope>(body) else {
            return Err(if status.is_success() {
                GsrError::upstream(PROVIDER, "Malformed response")
            } else {
                status_error(PROVIDER, status)
            });
        };

        match envelope.result.metadata.code.as_str() {
            SUBJECT_NOT_FOUND => Ok(AuthorizedRooms::new()),
            SUCCESS => Ok(envelope
                .result
                .groups
                .into_iter()
                .filter(|g| g.name.contains(GSR_GROUP_MARKER))
                .map(|g| (g.extension.clone(), g))
                .collect()),
            other => {
                tracing::warn!(code = other, "Unexpected directory result code");
                Err(GsrError::upstream(PROVIDER, format!("Unexpected result code {other}")))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use campus_gsr_testing::{ManualClock, fixtures};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn groups_body(code: &str) -> serde_json::Value {
        json!({"WsGetGroupsLiteResult": {
            "resultMetadata": {"resultCode": code},
            "wsGroups": [
                {"name": "penn:SEAS:AGH:GSR:GroupStudyRoom_334", "extension": "GroupStudyRoom_334",
                 "displayName": "AGH 334", "uuid": "u-1"},
                {"name": "penn:SEAS:faculty", "extension": "faculty"}
            ]
        }})
    }

    fn resolver(server: &MockServer, clock: Arc<ManualClock>) -> DirectoryResolver {
        let config = GsrConfig::default().with_directory(
            format!("{}/groups", server.uri()),
            format!("{}/identity", server.uri()),
        );
        let identity = Arc::new(HttpIdentitySource::new(Client::new(), &config));
        DirectoryResolver::new(Client::new(), &config, identity, clock)
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(fixtures::local(2025, 3, 10, 9, 0)))
    }

    #[tokio::test]
    async fn success_keeps_only_gsr_groups() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/identity/dave"))
            .and(header_exists("Authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"penn_id": 12345})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/groups/12345/groups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(groups_body("SUCCESS")))
            .mount(&server)
            .await;

        let rooms = resolver(&server, clock())
            .authorized_rooms(&fixtures::user("dave", "dave@seas.upenn.edu"))
            .await
            .unwrap();
        assert_eq!(rooms.len(), 1);
        assert!(rooms.contains_key("GroupStudyRoom_334"));
    }

    #[tokio::test]
    async fn subject_not_found_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/groups/7/groups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(groups_body("SUBJECT_NOT_FOUND")))
            .mount(&server)
            .await;

        let mut user = fixtures::user("erin", "erin@sas.upenn.edu");
        user.directory_id = Some(7);
        let rooms = resolver(&server, clock()).authorized_rooms(&user).await.unwrap();
        assert!(rooms.is_empty());
    }

    #[tokio::test]
    async fn other_result_codes_are_upstream_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/groups/7/groups"))
            .respond_with(ResponseTemplate::new(500).set_body_json(groups_body("EXCEPTION")))
            .mount(&server)
            .await;

        let mut user = fixtures::user("erin", "erin@sas.upenn.edu");
        user.directory_id = Some(7);
        let err = resolver(&server, clock()).authorized_rooms(&user).await.unwrap_err();
        assert_eq!(err.to_string(), "Directory: Unexpected result code EXCEPTION");
    }

    #[tokio::test]
    async fn missing_identity_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/identity/ghost"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = resolver(&server, clock())
            .authorized_rooms(&fixtures::user("ghost", "ghost@upenn.edu"))
            .await
            .unwrap_err();
        assert!(matches!(err, GsrError::NotFound(_)));
    }

    #[tokio::test]
    async fn results_are_cached_until_ttl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/groups/7/groups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(groups_body("SUCCESS")))
            .expect(2)
            .mount(&server)
            .await;

        let clock = clock();
        let resolver = resolver(&server, Arc::clone(&clock));
        let mut user = fixtures::user("erin", "erin@seas.upenn.edu");
        user.directory_id = Some(7);

        resolver.authorized_rooms(&user).await.unwrap();
        clock.advance(TimeDelta::minutes(4));
        resolver.authorized_rooms(&user).await.unwrap();
        clock.advance(TimeDelta::minutes(2));
        resolver.authorized_rooms(&user).await.unwrap();
    }

    #[tokio::test]
    async fn stale_entries_are_dropped_on_refill() {
        let server = MockServer::start().await;
        for id in [7, 8] {
            Mock::given(method("GET"))
                .and(path(format!("/groups/{id}/groups")))
                .respond_with(ResponseTemplate::new(200).set_body_json(groups_body("SUCCESS")))
                .mount(&server)
                .await;
        }

        let clock = clock();
        let resolver = resolver(&server, Arc::clone(&clock));
        let mut erin = fixtures::user("erin", "erin@seas.upenn.edu");
        erin.directory_id = Some(7);
        let mut finn = fixtures::user("finn", "finn@seas.upenn.edu");
        finn.directory_id = Some(8);

        resolver.authorized_rooms(&erin).await.unwrap();
        resolver.authorized_rooms(&finn).await.unwrap();
        assert_eq!(resolver.cached_users().await, 2);

        clock.advance(TimeDelta::minutes(6));
        resolver.authorized_rooms(&finn).await.unwrap();
        assert_eq!(resolver.cached_users().await, 1);
    }

    #[tokio::test]
    async fn slow_directory_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/groups/7/groups"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(groups_body("SUCCESS"))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let mut config = GsrConfig::default().with_directory(
            format!("{}/groups", server.uri()),
            format!("{}/identity", server.uri()),
        );
        config.directory.timeout = Duration::from_millis(50);
        let identity = Arc::new(HttpIdentitySource::new(Client::new(), &config));
        let resolver = DirectoryResolver::new(Client::new(), &config, identity, clock());

        let mut user = fixtures::user("erin", "erin@seas.upenn.edu");
        user.directory_id = Some(7);
        let err = resolver.authorized_rooms(&user).await.unwrap_err();
        assert_eq!(err.to_string(), "Directory: Connection timeout");
    }
}
