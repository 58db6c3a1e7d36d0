//! Response classification shared by the HTTP channels.
//!
//! Every HTTP adapter funnels its failures through here so that the retry
//! engine sees one consistent taxonomy regardless of the backend.

use std::time::Duration;

use fanout::ChannelError;
use reqwest::{Response, header::HeaderMap};
use serde_json::Value;

/// Longest response body excerpt carried in an error message.
const BODY_EXCERPT_LIMIT: usize = 256;

/// Service messages that indicate throttling.
const RATE_LIMIT_MARKERS: &[&str] = &[
    "too many",
    "too fast",
    "rate limit",
    "frequency",
    "频繁",
    "频率",
];

/// Service messages that indicate a temporary condition worth retrying.
const TRANSIENT_MARKERS: &[&str] = &[
    "busy",
    "try again",
    "timeout",
    "timed out",
    "temporarily",
    "unavailable",
    "internal error",
    "繁忙",
    "稍后",
    "超时",
];

/// Classify a `reqwest` failure that happened before a status was received.
pub fn transport_error(service: &str, error: reqwest::Error) -> ChannelError {
    // Request URLs often embed tokens; never echo them.
    let error = error.without_url();
    if error.is_builder() {
        return ChannelError::validation(format!("{service}: could not build request: {error}"));
    }
    if error.is_connect() || error.is_timeout() || error.is_request() || error.is_body() {
        return ChannelError::transport(format!("{service}: {error}"));
    }
    if error.is_decode() {
        return ChannelError::server(format!("{service}: malformed response: {error}"));
    }
    ChannelError::transport(format!("{service}: {error}"))
}

/// Parse a `Retry-After`-style hint from response headers.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    ["Retry-After", "X-RateLimit-Reset-After"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.trim().parse::<f64>().ok())
        .find_map(|secs| Duration::try_from_secs_f64(secs).ok())
}

/// Turn a non-2xx response into a classified error; pass 2xx through.
pub async fn check_status(service: &str, response: Response) -> Result<Response, ChannelError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = parse_retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    let mut error = ChannelError::from_status(
        status.as_u16(),
        format!("{service} returned {status}: {}", excerpt(&body)),
    );

    if let Some(retry_after) = retry_after.or_else(|| retry_after_from_body(&body)) {
        error = error.with_retry_after(retry_after);
    }
    Err(error)
}

/// Check the status and decode a JSON body.
pub async fn read_json(service: &str, response: Response) -> Result<Value, ChannelError> {
    let response = check_status(service, response).await?;
    let text = response
        .text()
        .await
        .map_err(|e| transport_error(service, e))?;
    serde_json::from_str(&text).map_err(|e| {
        ChannelError::server(format!(
            "{service} returned an unreadable body ({e}): {}",
            excerpt(&text)
        ))
    })
}

/// Classify a failure reported inside an otherwise successful response.
pub fn service_error(service: &str, code: impl std::fmt::Display, message: &str) -> ChannelError {
    let text = format!("{service} rejected the message (code {code}): {message}");
    let lower = message.to_lowercase();

    if RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m)) {
        ChannelError::rate_limited(text, None)
    } else if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
        ChannelError::server(text)
    } else {
        ChannelError::invalid_request(text)
    }
}

/// Read a string field from a JSON object, falling back to `default`.
pub fn str_field<'a>(body: &'a Value, key: &str, default: &'a str) -> &'a str {
    body.get(key).and_then(Value::as_str).unwrap_or(default)
}

/// Read an integer field that some services send as a number and others as a string.
pub fn int_field(body: &Value, key: &str) -> Option<i64> {
    match body.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Telegram and Discord also put the hint in the JSON body.
fn retry_after_from_body(body: &str) -> Option<Duration> {
    let value: Value = serde_json::from_str(body).ok()?;
    let secs = value
        .get("parameters")
        .and_then(|p| p.get("retry_after"))
        .or_else(|| value.get("retry_after"))
        .and_then(Value::as_f64)?;
    Duration::try_from_secs_f64(secs).ok()
}

fn excerpt(body: &str) -> String {
    let body = body.trim();
    if body.chars().count() <= BODY_EXCERPT_LIMIT {
        return body.to_string();
    }
    let truncated: String = body.chars().take(BODY_EXCERPT_LIMIT).collect();
    format!("{truncated}...")
}
