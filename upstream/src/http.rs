//! Shared request plumbing: transport error mapping, metrics, body parsing.

use campus_gsr_core::{GsrError, Provider, Result};
use regex::Regex;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::sync::LazyLock;

/// Send `request`, recording `gsr.upstream.requests` and mapping transport
/// failures into the error taxonomy.
pub(crate) async fn send(provider: Provider, op: &'static str, request: RequestBuilder) -> Result<Response> {
    match request.send().await {
        Ok(response) => {
            let outcome = if response.status().is_success() { "ok" } else { "status" };
            metrics::counter!(
                "gsr.upstream.requests",
                "provider" => provider.as_str(),
                "op" => op,
                "outcome" => outcome
            )
            .increment(1);
            Ok(response)
        }
        Err(e) => {
            metrics::counter!(
                "gsr.upstream.requests",
                "provider" => provider.as_str(),
                "op" => op,
                "outcome" => "transport"
            )
            .increment(1);
            tracing::warn!(provider = %provider, op, error = %e, "Upstream request failed");
            Err(transport_error(provider, &e))
        }
    }
}

/// Timeouts and refused connections read as "Connection timeout"; anything
/// else keeps the transport's message.
pub(crate) fn transport_error(provider: Provider, e: &reqwest::Error) -> GsrError {
    if e.is_timeout() || e.is_connect() {
        GsrError::timeout(provider)
    } else {
        GsrError::upstream(provider, e.to_string())
    }
}

/// Read the body as JSON. An empty body is `Value::Null`.
pub(crate) async fn json_body(provider: Provider, response: Response) -> Result<(StatusCode, Value)> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| transport_error(provider, &e))?;
    if text.trim().is_empty() {
        return Ok((status, Value::Null));
    }
    let value = serde_json::from_str(&text).map_err(|_| {
        if status.is_success() {
            GsrError::upstream(provider, "Malformed response")
        } else {
            status_error(provider, status)
        }
    })?;
    Ok((status, value))
}

/// Deserialize a successful body into `T`, or fail with the status.
pub(crate) async fn typed_body<T: serde::de::DeserializeOwned>(
    provider: Provider,
    response: Response,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(status_error(provider, status));
    }
    response
        .json::<T>()
        .await
        .map_err(|_| GsrError::upstream(provider, "Malformed response"))
}

pub(crate) fn status_error(provider: Provider, status: StatusCode) -> GsrError {
    GsrError::upstream(provider, format!("Unexpected status {}", status.as_u16()))
}

/// Join a base URL and a path with exactly one slash.
pub(crate) fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

static TAGS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<[^>]*>").ok());

/// Strip HTML tags and collapse whitespace.
pub(crate) fn strip_html(s: &str) -> String {
    let text = match TAGS.as_ref() {
        Some(re) => re.replace_all(s, "").into_owned(),
        None => s.to_string(),
    };
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markup_and_newlines() {
        assert_eq!(
            strip_html("<p>Sorry,\nthis <b>slot</b> is taken.</p>"),
            "Sorry, this slot is taken."
        );
    }

    #[test]
    fn joins_without_double_slash() {
        assert_eq!(join("https://a/b/", "/c"), "https://a/b/c");
        assert_eq!(join("https://a/b", "c"), "https://a/b/c");
    }
}
