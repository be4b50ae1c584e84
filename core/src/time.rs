//! Wire timestamp formats and local civil-day helpers.

use crate::error::{GsrError, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

/// Wharton request/response bodies: `YYYY-MM-DDTHH:MM:SS±HHMM`.
pub const WHARTON_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// LibCal bodies: ISO-8601 with a colon in the offset.
pub const LIBCAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// Path and query dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse an upstream timestamp. Accepts RFC 3339 (with or without
/// fractional seconds) and the colon-less Wharton offset.
///
/// # Errors
///
/// Returns [`GsrError::Invalid`] when no format matches.
pub fn parse_wire(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in [WHARTON_FORMAT, "%Y-%m-%dT%H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Ok(dt.with_timezone(&Utc));
        }
    }
    Err(GsrError::Invalid(format!("Unparseable timestamp: {s}")))
}

/// Parse a `YYYY-MM-DD` date.
///
/// # Errors
///
/// Returns [`GsrError::Invalid`] on malformed input.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|_| GsrError::Invalid(format!("Unparseable date: {s}")))
}

/// Format `dt` in `tz` with `fmt`.
#[must_use]
pub fn format_in(dt: DateTime<Utc>, tz: Tz, fmt: &str) -> String {
    dt.with_timezone(&tz).format(fmt).to_string()
}

/// `HH:MM` in local time.
#[must_use]
pub fn format_hhmm(dt: DateTime<Utc>, tz: Tz) -> String {
    format_in(dt, tz, "%H:%M")
}

/// Local midnight starting `date`.
///
/// # Errors
///
/// Returns [`GsrError::Invalid`] if midnight does not exist in `tz`.
pub fn start_of_day(date: NaiveDate, tz: Tz) -> Result<DateTime<Utc>> {
    tz.from_local_datetime(&date.and_time(NaiveTime::MIN))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| GsrError::Invalid(format!("No local midnight on {date}")))
}

/// `[startOfToday, startOfToday + 24h)` for the local civil day containing
/// `now`.
///
/// # Errors
///
/// See [`start_of_day`].
pub fn local_day_window(now: DateTime<Utc>, tz: Tz) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let start = start_of_day(now.with_timezone(&tz).date_naive(), tz)?;
    Ok((start, start + TimeDelta::hours(24)))
}

/// Local calendar date of `dt`.
#[must_use]
pub fn local_date(dt: DateTime<Utc>, tz: Tz) -> NaiveDate {
    dt.with_timezone(&tz).date_naive()
}
