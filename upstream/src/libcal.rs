//! LibCal space-booking API.
//!
//! The same wire protocol serves two credential sets: general library rooms
//! and engineering rooms. [`LibCalClient::engineering`] builds the second
//! flavour, which [`EngineeringClient`](crate::EngineeringClient) wraps.

use crate::client::{AvailabilityQuery, RoomAvailability, Slot, UpstreamClient};
use crate::http::{self, join, status_error, strip_html};
use crate::token::TokenCache;
use async_trait::async_trait;
use campus_gsr_core::time::{DATE_FORMAT, LIBCAL_FORMAT, format_in, local_date, parse_wire, start_of_day};
use campus_gsr_core::{Clock, GsrConfig, GsrError, Provider, Result, User};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Token endpoint under a LibCal base URL.
#[must_use]
pub fn token_endpoint(base: &str) -> String {
    join(base, "1.1/oauth/token")
}

/// How the `q3699` affiliation answer is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affiliation {
    /// Inferred from the user's email address.
    FromEmail,
    /// Always the given school.
    Fixed(&'static str),
}

impl Affiliation {
    fn answer(self, email: &str) -> &'static str {
        match self {
            Self::Fixed(school) => school,
            Self::FromEmail if email.contains("wharton") => "Wharton",
            Self::FromEmail if email.contains("seas") => "SEAS",
            Self::FromEmail if email.contains("sas") => "SAS",
            Self::FromEmail => "Other",
        }
    }
}

#[derive(Deserialize)]
struct Category {
    #[serde(default)]
    items: Vec<CategoryItem>,
}

#[derive(Deserialize)]
struct CategoryItem {
    id: i64,
}

#[derive(Deserialize)]
pub(crate) struct Item {
    pub(crate) id: i64,
    pub(crate) name: String,
    #[serde(default)]
    availability: Vec<ItemSlot>,
}

#[derive(Deserialize)]
struct ItemSlot {
    from: String,
    to: String,
}

#[derive(Deserialize)]
struct CancelResult {
    #[serde(default)]
    error: Option<String>,
}

/// Client for one LibCal credential set.
pub struct LibCalClient {
    http: Client,
    base: String,
    tokens: Arc<TokenCache>,
    clock: Arc<dyn Clock>,
    provider: Provider,
    affiliation: Affiliation,
    tz: Tz,
    timeout: Duration,
    room_blacklist: HashSet<String>,
}

impl LibCalClient {
    /// General library rooms. `tokens` must hold a `LibCal` slot.
    #[must_use]
    pub fn new(http: Client, config: &GsrConfig, tokens: Arc<TokenCache>, clock: Arc<dyn Clock>) -> Self {
        Self {
            http,
            base: config.upstream.libcal_url.clone(),
            tokens,
            clock,
            provider: Provider::LibCal,
            affiliation: Affiliation::FromEmail,
            tz: config.policy.timezone,
            timeout: config.upstream.timeout,
            room_blacklist: config.policy.room_blacklist.clone(),
        }
    }

    /// Engineering rooms. `tokens` must hold an `Engineering` slot.
    #[must_use]
    pub fn engineering(http: Client, config: &GsrConfig, tokens: Arc<TokenCache>, clock: Arc<dyn Clock>) -> Self {
        Self {
            provider: Provider::Engineering,
            affiliation: Affiliation::Fixed("SEAS"),
            ..Self::new(http, config, tokens, clock)
        }
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.tokens.acquire(self.provider).await?;
        Ok(request.bearer_auth(token).timeout(self.timeout))
    }

    fn url(&self, path: &str) -> String {
        join(&self.base, path)
    }

    fn malformed(&self) -> GsrError {
        GsrError::upstream(self.provider, "Malformed response")
    }

    fn timestamp(&self, s: &str) -> Result<DateTime<Utc>> {
        parse_wire(s).map_err(|_| GsrError::upstream(self.provider, format!("Malformed timestamp: {s}")))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, op: &'static str, path: &str) -> Result<T> {
        let request = self.authorized(self.http.get(self.url(path))).await?;
        let response = http::send(self.provider, op, request).await?;
        http::typed_body(self.provider, response).await
    }

    /// Item IDs in a category.
    async fn category_items(&self, gid: &str) -> Result<Vec<i64>> {
        let categories: Vec<Category> = self
            .get_json("category", &format!("1.1/space/category/{gid}"))
            .await?;
        Ok(categories
            .into_iter()
            .flat_map(|c| c.items)
            .map(|i| i.id)
            .collect())
    }

    /// Rooms of a category with their free slots, blacklist applied.
    pub(crate) async fn rooms(&self, query: &AvailabilityQuery) -> Result<Vec<RoomAvailability>> {
        let ids: Vec<String> = self
            .category_items(&query.gid)
            .await?
            .into_iter()
            .map(|id| id.to_string())
            .filter(|id| !self.room_blacklist.contains(id))
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let availability = match (query.start, query.end) {
            (Some(start), Some(end)) => {
                format!("={},{}", start.format(DATE_FORMAT), end.format(DATE_FORMAT))
            }
            (Some(start), None) => format!("={}", start.format(DATE_FORMAT)),
            (None, _) => String::new(),
        };
        let path = format!("1.1/space/item/{}?availability{availability}", ids.join(","));
        let items: Vec<Item> = self.get_json("availability", &path).await?;

        let day = query
            .start
            .unwrap_or_else(|| local_date(self.clock.now(), self.tz));
        let day_start = start_of_day(day, self.tz)?;

        items
            .into_iter()
            .filter(|item| !self.room_blacklist.contains(&item.id.to_string()))
            .map(|item| {
                let mut slots = Vec::with_capacity(item.availability.len());
                for slot in &item.availability {
                    let start_time = self.timestamp(&slot.from)?;
                    if start_time >= day_start {
                        slots.push(Slot {
                            start_time,
                            end_time: self.timestamp(&slot.to)?,
                        });
                    }
                }
                Ok(RoomAvailability {
                    room_name: item.name,
                    id: item.id,
                    availability: slots,
                })
            })
            .collect()
    }

    /// Display name of one room.
    pub(crate) async fn room_name(&self, room_id: i64) -> Result<String> {
        let items: Vec<Item> = self
            .get_json("item", &format!("1.1/space/item/{room_id}"))
            .await?;
        items
            .into_iter()
            .next()
            .map(|item| item.name)
            .ok_or_else(|| GsrError::upstream(self.provider, format!("Unknown room {room_id}")))
    }

    fn reserve_payload(&self, room_id: i64, start: DateTime<Utc>, end: DateTime<Utc>, user: &User) -> Value {
        let label = format!("{} GSR Booking", user.username);
        json!({
            "start": format_in(start, self.tz, LIBCAL_FORMAT),
            "fname": user.first_name,
            "lname": user.last_name,
            "email": user.email,
            "nickname": label,
            "q43": label,
            "bookings": [{"id": room_id, "to": format_in(end, self.tz, LIBCAL_FORMAT)}],
            "test": false,
            "q2555": "4-5",
            "q2537": "4-5",
            "q3699": self.affiliation.answer(&user.email),
            "q2533": "000-000-0000",
            "q16801": "4",
            "q16802": "5",
            "q16805": "Yes",
            "q16804": "Yes",
        })
    }
}

/// Collapse a LibCal `errors` field (array or string) into one plain-text
/// message.
fn collapse_errors(errors: &Value) -> Option<String> {
    let joined = match errors {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|e| e.as_str().map_or_else(|| e.to_string(), ToString::to_string))
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    };
    let message = strip_html(&joined);
    (!message.is_empty()).then_some(message)
}

#[async_trait]
impl UpstreamClient for LibCalClient {
    fn provider(&self) -> Provider {
        self.provider
    }

    #[tracing::instrument(skip(self, _user), fields(provider = %self.provider))]
    async fn availability(&self, query: &AvailabilityQuery, _user: &User) -> Result<Vec<RoomAvailability>> {
        self.rooms(query).await
    }

    #[tracing::instrument(skip(self, user), fields(provider = %self.provider, user = %user.email))]
    async fn book(&self, room_id: i64, start: DateTime<Utc>, end: DateTime<Utc>, user: &User) -> Result<String> {
        let payload = self.reserve_payload(room_id, start, end, user);
        let request = self
            .authorized(self.http.post(self.url("1.1/space/reserve")).json(&payload))
            .await?;
        let response = http::send(self.provider, "book", request).await?;
        let (status, body) = http::json_body(self.provider, response).await?;

        if let Some(message) = body.get("errors").and_then(collapse_errors) {
            tracing::info!(room_id, %message, "LibCal refused booking");
            return Err(GsrError::upstream(self.provider, message));
        }
        if let Some(message) = body.get("error").and_then(Value::as_str) {
            return Err(GsrError::upstream(self.provider, strip_html(message)));
        }
        if !status.is_success() {
            return Err(status_error(self.provider, status));
        }
        match body.get("booking_id") {
            Some(Value::String(id)) => Ok(id.clone()),
            Some(Value::Number(id)) => Ok(id.to_string()),
            _ => Err(GsrError::upstream(self.provider, "Missing booking_id")),
        }
    }

    #[tracing::instrument(skip(self, _user), fields(provider = %self.provider))]
    async fn cancel(&self, booking_id: &str, _user: &User) -> Result<()> {
        let request = self
            .authorized(self.http.post(self.url(&format!("1.1/space/cancel/{booking_id}"))))
            .await?;
        let response = http::send(self.provider, "cancel", request).await?;
        let (status, body) = http::json_body(self.provider, response).await?;
        if !status.is_success() {
            return Err(status_error(self.provider, status));
        }

        let results: Vec<CancelResult> = serde_json::from_value(body).map_err(|_| self.malformed())?;
        match results.first() {
            None => Err(self.malformed()),
            Some(CancelResult { error: Some(error) }) if !error.trim().is_empty() => {
                Err(GsrError::upstream(self.provider, strip_html(error)))
            }
            Some(_) => Ok(()),
        }
    }
}
