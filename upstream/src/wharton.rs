//! Wharton reservation API.

use crate::client::{AvailabilityQuery, RoomAvailability, Slot, UpstreamClient, UpstreamReservation};
use crate::http::{self, join, status_error};
use crate::token::TokenCache;
use async_trait::async_trait;
use campus_gsr_core::time::{
    DATE_FORMAT, WHARTON_FORMAT, format_in, local_date, parse_wire, start_of_day,
};
use campus_gsr_core::{Clock, GsrConfig, GsrError, Provider, Result, User};
use chrono::{DateTime, Days, Utc};
use chrono_tz::Tz;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

const PROVIDER: Provider = Provider::Wharton;
const ENTITLED_TYPES: [&str; 2] = ["whartonMBA", "whartonUGR"];

#[derive(Deserialize)]
struct WhartonRoom {
    id: i64,
    room_name: String,
    #[serde(default)]
    availability: Vec<WhartonSlot>,
}

#[derive(Deserialize)]
struct WhartonSlot {
    start_time: String,
    end_time: String,
    #[serde(default)]
    reserved: bool,
}

#[derive(Deserialize)]
struct WhartonBookings {
    #[serde(default)]
    bookings: Vec<WhartonBooking>,
}

#[derive(Deserialize)]
struct WhartonBooking {
    booking_id: Value,
    lid: Value,
    rid: i64,
    room: String,
    start: String,
    end: String,
}

/// Client for the Wharton GSR API. Authenticates with a static token.
pub struct WhartonClient {
    http: Client,
    base: String,
    tokens: Arc<TokenCache>,
    clock: Arc<dyn Clock>,
    tz: Tz,
    timeout: Duration,
}

impl WhartonClient {
    /// Build from configuration. `tokens` must hold a Wharton slot.
    #[must_use]
    pub fn new(http: Client, config: &GsrConfig, tokens: Arc<TokenCache>, clock: Arc<dyn Clock>) -> Self {
        Self {
            http,
            base: config.upstream.wharton_url.clone(),
            tokens,
            clock,
            tz: config.policy.timezone,
            timeout: config.upstream.timeout,
        }
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.tokens.acquire(PROVIDER).await?;
        Ok(request
            .header("Authorization", format!("Token {token}"))
            .timeout(self.timeout))
    }

    fn url(&self, user: &User, path: &str) -> String {
        join(&self.base, &format!("{}/{}", user.username, path))
    }

    fn wire(&self, dt: DateTime<Utc>) -> String {
        format_in(dt, self.tz, WHARTON_FORMAT)
    }
}

fn parse_upstream(s: &str) -> Result<DateTime<Utc>> {
    parse_wire(s).map_err(|_| GsrError::upstream(PROVIDER, format!("Malformed timestamp: {s}")))
}

fn field_message(body: &Value, key: &str) -> Option<String> {
    match body.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl UpstreamClient for WhartonClient {
    fn provider(&self) -> Provider {
        PROVIDER
    }

    #[tracing::instrument(skip(self, user), fields(provider = "wharton", user = %user.username))]
    async fn availability(&self, query: &AvailabilityQuery, user: &User) -> Result<Vec<RoomAvailability>> {
        let now = self.clock.now();
        let date = query.start.unwrap_or_else(|| local_date(now, self.tz));
        let last = query.end.unwrap_or(date);
        let next = last
            .checked_add_days(Days::new(1))
            .ok_or_else(|| GsrError::Invalid(format!("Date out of range: {last}")))?;
        let window_end = start_of_day(next, self.tz)?;

        let path = format!("availability/{}/{}", query.lid, date.format(DATE_FORMAT));
        let request = self.authorized(self.http.get(self.url(user, &path))).await?;
        let response = http::send(PROVIDER, "availability", request).await?;
        let (status, body) = http::json_body(PROVIDER, response).await?;

        if body.get("closed").and_then(Value::as_bool) == Some(true) {
            return Ok(Vec::new());
        }
        if let Some(message) = field_message(&body, "error").or_else(|| field_message(&body, "detail")) {
            return Err(GsrError::upstream(PROVIDER, message));
        }
        if !status.is_success() {
            return Err(status_error(PROVIDER, status));
        }

        let rooms: Vec<WhartonRoom> = serde_json::from_value(body)
            .map_err(|_| GsrError::upstream(PROVIDER, "Malformed response"))?;

        rooms
            .into_iter()
            .map(|room| {
                let mut availability = Vec::new();
                for slot in room.availability.into_iter().filter(|s| !s.reserved) {
                    let start_time = parse_upstream(&slot.start_time)?;
                    let end_time = parse_upstream(&slot.end_time)?;
                    if start_time >= now && end_time <= window_end {
                        availability.push(Slot { start_time, end_time });
                    }
                }
                Ok(RoomAvailability {
                    room_name: room.room_name,
                    id: room.id,
                    availability,
                })
            })
            .collect()
    }

    #[tracing::instrument(skip(self, user), fields(provider = "wharton", user = %user.username))]
    async fn book(&self, room_id: i64, start: DateTime<Utc>, end: DateTime<Utc>, user: &User) -> Result<String> {
        let payload = json!({
            "start": self.wire(start),
            "end": self.wire(end),
            "pennkey": user.username,
            "room": room_id,
        });
        let request = self
            .authorized(self.http.post(self.url(user, "student_reserve")).json(&payload))
            .await?;
        let response = http::send(PROVIDER, "book", request).await?;
        let (status, body) = http::json_body(PROVIDER, response).await?;

        if let Some(message) = field_message(&body, "error") {
            tracing::info!(room_id, %message, "Wharton refused booking");
            return Err(GsrError::upstream(PROVIDER, message));
        }
        if !status.is_success() {
            return Err(status_error(PROVIDER, status));
        }
        body.get("booking_id")
            .and_then(scalar_string)
            .ok_or_else(|| GsrError::upstream(PROVIDER, "Missing booking_id"))
    }

    #[tracing::instrument(skip(self, user), fields(provider = "wharton", user = %user.username))]
    async fn cancel(&self, booking_id: &str, user: &User) -> Result<()> {
        let path = format!("reservations/{booking_id}/cancel");
        let request = self.authorized(self.http.delete(self.url(user, &path))).await?;
        let response = http::send(PROVIDER, "cancel", request).await?;
        let (status, body) = http::json_body(PROVIDER, response).await?;

        if let Some(message) = field_message(&body, "detail") {
            return Err(GsrError::upstream(PROVIDER, message));
        }
        if !status.is_success() {
            return Err(status_error(PROVIDER, status));
        }
        Ok(())
    }

    async fn reservations(&self, user: &User) -> Result<Vec<UpstreamReservation>> {
        let request = self.authorized(self.http.get(self.url(user, "reservations"))).await?;
        let response = http::send(PROVIDER, "reservations", request).await?;
        let body: WhartonBookings = http::typed_body(PROVIDER, response).await?;
        let now = self.clock.now();

        let mut upcoming = Vec::new();
        for booking in body.bookings {
            let end = parse_upstream(&booking.end)?;
            if end < now {
                continue;
            }
            upcoming.push(UpstreamReservation {
                booking_id: scalar_string(&booking.booking_id)
                    .ok_or_else(|| GsrError::upstream(PROVIDER, "Malformed booking_id"))?,
                lid: scalar_string(&booking.lid).unwrap_or_default(),
                room_id: booking.rid,
                room_name: booking.room,
                start: parse_upstream(&booking.start)?,
                end,
            });
        }
        Ok(upcoming)
    }

    async fn entitlement(&self, user: &User) -> Result<bool> {
        let request = self.authorized(self.http.get(self.url(user, "privileges"))).await?;
        let response = http::send(PROVIDER, "privileges", request).await?;
        let (status, body) = http::json_body(PROVIDER, response).await?;

        if status.is_server_error() {
            return Err(status_error(PROVIDER, status));
        }
        Ok(body
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|t| ENTITLED_TYPES.contains(&t)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use campus_gsr_testing::{FixedClock, fixtures};
    use chrono::{NaiveDate, TimeDelta};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> WhartonClient {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(fixtures::local(2025, 3, 10, 8, 0)));
        let config = GsrConfig::default().with_wharton(format!("{}/gsr/api/v1/", server.uri()), "wh-token");
        let tokens = Arc::new(
            TokenCache::new(Client::new(), Arc::clone(&clock), TimeDelta::seconds(30), Duration::from_secs(5))
                .with_static(Provider::Wharton, "wh-token"),
        );
        WhartonClient::new(Client::new(), &config, tokens, clock)
    }

    fn query() -> AvailabilityQuery {
        AvailabilityQuery {
            lid: "1".to_string(),
            gid: "1".to_string(),
            start: NaiveDate::from_ymd_opt(2025, 3, 10),
            end: None,
        }
    }

    #[tokio::test]
    async fn closed_day_yields_no_rooms() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gsr/api/v1/alice/availability/1/2025-03-10"))
            .and(header("Authorization", "Token wh-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"closed": true})))
            .mount(&server)
            .await;

        let rooms = client(&server)
            .availability(&query(), &fixtures::wharton_user("alice"))
            .await
            .unwrap();
        assert!(rooms.is_empty());
    }

    #[tokio::test]
    async fn availability_drops_past_reserved_and_next_day_slots() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gsr/api/v1/alice/availability/1/2025-03-10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": 94,
                "room_name": "GSR 1",
                "availability": [
                    {"start_time": "2025-03-10T07:30:00-0400", "end_time": "2025-03-10T08:00:00-0400", "reserved": false},
                    {"start_time": "2025-03-10T09:00:00-0400", "end_time": "2025-03-10T09:30:00-0400", "reserved": false},
                    {"start_time": "2025-03-10T09:30:00-0400", "end_time": "2025-03-10T10:00:00-0400", "reserved": true},
                    {"start_time": "2025-03-11T09:00:00-0400", "end_time": "2025-03-11T09:30:00-0400", "reserved": false}
                ]
            }])))
            .mount(&server)
            .await;

        let rooms = client(&server)
            .availability(&query(), &fixtures::wharton_user("alice"))
            .await
            .unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].id, 94);
        assert_eq!(
            rooms[0].availability,
            vec![Slot {
                start_time: fixtures::local(2025, 3, 10, 9, 0),
                end_time: fixtures::local(2025, 3, 10, 9, 30),
            }]
        );
    }

    #[tokio::test]
    async fn book_sends_wharton_formatted_times() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gsr/api/v1/alice/student_reserve"))
            .and(body_json(json!({
                "start": "2025-03-10T09:00:00-0400",
                "end": "2025-03-10T10:30:00-0400",
                "pennkey": "alice",
                "room": 94,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"booking_id": 1234})))
            .mount(&server)
            .await;

        let id = client(&server)
            .book(
                94,
                fixtures::local(2025, 3, 10, 9, 0),
                fixtures::local(2025, 3, 10, 10, 30),
                &fixtures::wharton_user("alice"),
            )
            .await
            .unwrap();
        assert_eq!(id, "1234");
    }

    #[tokio::test]
    async fn book_error_field_is_surfaced_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gsr/api/v1/bob/student_reserve"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "Room taken"})))
            .mount(&server)
            .await;

        let err = client(&server)
            .book(
                94,
                fixtures::local(2025, 3, 10, 10, 30),
                fixtures::local(2025, 3, 10, 11, 30),
                &fixtures::wharton_user("bob"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Wharton: Room taken");
    }

    #[tokio::test]
    async fn cancel_detail_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/gsr/api/v1/alice/reservations/77/cancel"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Not found."})))
            .mount(&server)
            .await;

        let err = client(&server)
            .cancel("77", &fixtures::wharton_user("alice"))
            .await
            .unwrap_err();
        assert_eq!(err, GsrError::upstream(Provider::Wharton, "Not found."));
    }

    #[tokio::test]
    async fn reservations_keep_only_upcoming() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gsr/api/v1/alice/reservations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"bookings": [
                {"booking_id": 1, "lid": 1, "rid": 94, "room": "GSR 1",
                 "start": "2025-03-09T09:00:00-0400", "end": "2025-03-09T10:00:00-0400"},
                {"booking_id": "2", "lid": "1", "rid": 95, "room": "GSR 2",
                 "start": "2025-03-10T09:00:00-0400", "end": "2025-03-10T10:00:00-0400"}
            ]})))
            .mount(&server)
            .await;

        let upcoming = client(&server)
            .reservations(&fixtures::wharton_user("alice"))
            .await
            .unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].booking_id, "2");
        assert_eq!(upcoming[0].room_id, 95);
    }

    #[tokio::test]
    async fn entitlement_checks_privilege_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gsr/api/v1/alice/privileges"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"type": "whartonMBA"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gsr/api/v1/carol/privileges"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"type": "other"})))
            .mount(&server)
            .await;

        let client = client(&server);
        assert!(client.entitlement(&fixtures::wharton_user("alice")).await.unwrap());
        assert!(!client.entitlement(&fixtures::wharton_user("carol")).await.unwrap());
    }
}
