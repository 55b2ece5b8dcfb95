//! Server retry hints.
//!
//! `retry-after-ms` carries milliseconds. `retry-after` carries either
//! delta-seconds or an HTTP-date. Anything unparseable, in the past, or
//! non-positive counts as no hint.

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use std::time::Duration;

pub const RETRY_AFTER_MS: &str = "retry-after-ms";
pub const RETRY_AFTER: &str = "retry-after";

/// Extract the server-suggested delay from response headers.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    parse_retry_after_at(headers, Utc::now())
}

/// Same as [`parse_retry_after`] with an explicit clock for HTTP-date hints.
pub fn parse_retry_after_at(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if let Some(ms) = header(RETRY_AFTER_MS).and_then(parse_millis) {
        return Some(ms);
    }
    header(RETRY_AFTER).and_then(|value| parse_retry_after_value(value, now))
}

fn parse_millis(value: &str) -> Option<Duration> {
    let ms: f64 = value.trim().parse().ok()?;
    positive(ms / 1000.0)
}

/// Parse one `retry-after` value (delta-seconds or HTTP-date).
pub fn parse_retry_after_value(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(secs) = value.parse::<f64>() {
        return positive(secs);
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    (at - now).to_std().ok().filter(|d| !d.is_zero())
}

fn positive(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}
