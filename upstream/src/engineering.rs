//! Engineering rooms: directory authorization in front of a dedicated
//! LibCal credential.

use crate::client::{AvailabilityQuery, RoomAvailability, UpstreamClient};
use crate::directory::{AuthorizedRooms, DirectoryResolver};
use crate::libcal::LibCalClient;
use async_trait::async_trait;
use campus_gsr_core::{GsrError, Provider, Result, User};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::{Arc, LazyLock};

/// Message for users without an authorized extension.
pub const NOT_AUTHORIZED: &str = "AGH rooms are only available to SEAS students";

static ROOM_NUMBER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"AGH (\d+[A-Za-z]?)").ok());

/// Directory extension expected for a room display name, e.g.
/// `"AGH 334"` → `"GroupStudyRoom_334"`.
#[must_use]
pub fn room_extension(room_name: &str) -> Option<String> {
    let captures = ROOM_NUMBER.as_ref()?.captures(room_name)?;
    Some(format!("GroupStudyRoom_{}", captures.get(1)?.as_str()))
}

/// Client for engineering rooms.
pub struct EngineeringClient {
    libcal: LibCalClient,
    directory: Arc<DirectoryResolver>,
}

impl EngineeringClient {
    /// `libcal` should come from [`LibCalClient::engineering`].
    #[must_use]
    pub const fn new(libcal: LibCalClient, directory: Arc<DirectoryResolver>) -> Self {
        Self { libcal, directory }
    }

    /// A user without a directory entry has no authorized rooms.
    async fn authorized(&self, user: &User) -> Result<AuthorizedRooms> {
        match self.directory.authorized_rooms(user).await {
            Err(GsrError::NotFound(_)) => Ok(AuthorizedRooms::new()),
            other => other,
        }
    }
}

fn permits(authorized: &AuthorizedRooms, room_name: &str) -> bool {
    room_extension(room_name).is_some_and(|ext| authorized.contains_key(&ext))
}

#[async_trait]
impl UpstreamClient for EngineeringClient {
    fn provider(&self) -> Provider {
        Provider::Engineering
    }

    #[tracing::instrument(skip(self, user), fields(provider = "engineering", user = %user.username))]
    async fn availability(&self, query: &AvailabilityQuery, user: &User) -> Result<Vec<RoomAvailability>> {
        let authorized = match self.authorized(user).await {
            Ok(rooms) => rooms,
            Err(e) => {
                tracing::warn!(error = %e, "Directory unavailable, hiding engineering rooms");
                return Ok(Vec::new());
            }
        };
        if authorized.is_empty() {
            return Ok(Vec::new());
        }

        let rooms = self.libcal.rooms(query).await?;
        Ok(rooms
            .into_iter()
            .filter(|room| permits(&authorized, &room.room_name))
            .collect())
    }

    #[tracing::instrument(skip(self, user), fields(provider = "engineering", user = %user.username))]
    async fn book(&self, room_id: i64, start: DateTime<Utc>, end: DateTime<Utc>, user: &User) -> Result<String> {
        let authorized = self.authorized(user).await?;
        if authorized.is_empty() {
            return Err(GsrError::Forbidden(NOT_AUTHORIZED.to_string()));
        }
        let room_name = self.libcal.room_name(room_id).await?;
        if !permits(&authorized, &room_name) {
            tracing::info!(room_id, %room_name, "Engineering room outside user's groups");
            return Err(GsrError::Forbidden(NOT_AUTHORIZED.to_string()));
        }
        self.libcal.book(room_id, start, end, user).await
    }

    async fn cancel(&self, booking_id: &str, user: &User) -> Result<()> {
        self.libcal.cancel(booking_id, user).await
    }

    async fn entitlement(&self, user: &User) -> Result<bool> {
        Ok(!self.authorized(user).await?.is_empty())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::directory::HttpIdentitySource;
    use crate::libcal::token_endpoint;
    use crate::token::TokenCache;
    use campus_gsr_core::{Clock, GsrConfig};
    use campus_gsr_testing::{FixedClock, fixtures};
    use chrono::TimeDelta;
    use reqwest::Client;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn extension_comes_from_room_number() {
        assert_eq!(room_extension("AGH 334").as_deref(), Some("GroupStudyRoom_334"));
        assert_eq!(room_extension("AGH 106A (4 seats)").as_deref(), Some("GroupStudyRoom_106A"));
        assert_eq!(room_extension("Towne 101"), None);
    }

    async fn server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1.1/oauth/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "seas-token", "expires_in": 3600})),
            )
            .mount(&server)
            .await;
        server
    }

    async fn directory_returns(server: &MockServer, code: &str, extensions: &[&str]) {
        let groups: Vec<_> = extensions
            .iter()
            .map(|ext| json!({"name": format!("penn:SEAS:AGH:GSR:{ext}"), "extension": ext}))
            .collect();
        Mock::given(method("GET"))
            .and(path("/groups/99/groups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "WsGetGroupsLiteResult": {"resultMetadata": {"resultCode": code}, "wsGroups": groups}
            })))
            .mount(server)
            .await;
    }

    fn client(server: &MockServer) -> EngineeringClient {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(fixtures::local(2025, 3, 10, 8, 0)));
        let config = GsrConfig::default()
            .with_libcal_url(server.uri())
            .with_directory(format!("{}/groups", server.uri()), format!("{}/identity", server.uri()));
        let tokens = Arc::new(
            TokenCache::new(Client::new(), Arc::clone(&clock), TimeDelta::seconds(30), Duration::from_secs(5))
                .with_client_credentials(Provider::Engineering, token_endpoint(&server.uri()), Default::default()),
        );
        let identity = Arc::new(HttpIdentitySource::new(Client::new(), &config));
        let directory = Arc::new(DirectoryResolver::new(Client::new(), &config, identity, Arc::clone(&clock)));
        EngineeringClient::new(
            LibCalClient::engineering(Client::new(), &config, tokens, clock),
            directory,
        )
    }

    fn seas_user() -> User {
        let mut user = fixtures::user("dave", "dave@wharton.upenn.edu");
        user.directory_id = Some(99);
        user
    }

    #[tokio::test]
    async fn unauthorized_user_never_reaches_libcal() {
        let server = server().await;
        directory_returns(&server, "SUBJECT_NOT_FOUND", &[]).await;
        Mock::given(method("POST"))
            .and(path("/1.1/space/reserve"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"booking_id": "x"})))
            .expect(0)
            .mount(&server)
            .await;

        let err = client(&server)
            .book(
                334,
                fixtures::local(2025, 3, 10, 10, 0),
                fixtures::local(2025, 3, 10, 11, 0),
                &seas_user(),
            )
            .await
            .unwrap_err();
        assert_eq!(err, GsrError::Forbidden(NOT_AUTHORIZED.to_string()));
    }

    #[tokio::test]
    async fn authorized_booking_always_claims_seas() {
        let server = server().await;
        directory_returns(&server, "SUCCESS", &["GroupStudyRoom_334"]).await;
        Mock::given(method("GET"))
            .and(path("/1.1/space/item/5001"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 5001, "name": "AGH 334"}])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/1.1/space/reserve"))
            .and(body_partial_json(json!({"q3699": "SEAS"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"booking_id": "cs_9"})))
            .expect(1)
            .mount(&server)
            .await;

        let id = client(&server)
            .book(
                5001,
                fixtures::local(2025, 3, 10, 10, 0),
                fixtures::local(2025, 3, 10, 11, 0),
                &seas_user(),
            )
            .await
            .unwrap();
        assert_eq!(id, "cs_9");
    }

    #[tokio::test]
    async fn room_outside_groups_is_forbidden() {
        let server = server().await;
        directory_returns(&server, "SUCCESS", &["GroupStudyRoom_334"]).await;
        Mock::given(method("GET"))
            .and(path("/1.1/space/item/5002"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 5002, "name": "AGH 335"}])))
            .mount(&server)
            .await;

        let err = client(&server)
            .book(
                5002,
                fixtures::local(2025, 3, 10, 10, 0),
                fixtures::local(2025, 3, 10, 11, 0),
                &seas_user(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GsrError::Forbidden(_)));
    }

    #[tokio::test]
    async fn directory_failure_fails_booking_but_not_availability() {
        let server = server().await;
        Mock::given(method("GET"))
            .and(path("/groups/99/groups"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client(&server);
        let query = AvailabilityQuery {
            lid: "4370".to_string(),
            gid: "13489".to_string(),
            start: None,
            end: None,
        };
        assert!(client.availability(&query, &seas_user()).await.unwrap().is_empty());

        let err = client
            .book(
                5001,
                fixtures::local(2025, 3, 10, 10, 0),
                fixtures::local(2025, 3, 10, 11, 0),
                &seas_user(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GsrError::Upstream { provider: Provider::Directory, .. }));
    }

    #[tokio::test]
    async fn availability_filters_to_authorized_rooms() {
        let server = server().await;
        directory_returns(&server, "SUCCESS", &["GroupStudyRoom_334"]).await;
        Mock::given(method("GET"))
            .and(path("/1.1/space/category/13489"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"items": [{"id": 5001}, {"id": 5002}]}])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/1.1/space/item/5001,5002"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 5001, "name": "AGH 334", "availability": []},
                {"id": 5002, "name": "AGH 335", "availability": []}
            ])))
            .mount(&server)
            .await;

        let query = AvailabilityQuery {
            lid: "4370".to_string(),
            gid: "13489".to_string(),
            start: None,
            end: None,
        };
        let rooms = client(&server).availability(&query, &seas_user()).await.unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].id, 5001);
    }
}
