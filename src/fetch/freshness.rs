//! Server-supplied timing signals: freshness and retry directives

use crate::ConfigError;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, CACHE_CONTROL, EXPIRES, LAST_MODIFIED, RETRY_AFTER};
use reqwest::StatusCode;
use std::time::Duration;

/// Longest `max-age` honoured; anything larger is capped here before the
/// cache window clamps it further
const MAX_FRESHNESS_SECS: i64 = u32::MAX as i64;

/// Statuses that signal throttling or transient unavailability
pub fn is_retryable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS | StatusCode::FORBIDDEN | StatusCode::SERVICE_UNAVAILABLE
    )
}

/// Parses an HTTP date (`Wed, 21 Oct 2015 07:28:00 GMT`)
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

fn header_str<'a>(headers: &'a HeaderMap, name: reqwest::header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// How long to wait before retrying, as directed by the server
///
/// Only retryable statuses produce an offset, and only when a `Retry-After`
/// header is present. A date already in the past yields a zero offset.
pub fn retry_after_offset(
    status: StatusCode,
    headers: &HeaderMap,
    now: DateTime<Utc>,
) -> Option<Duration> {
    if !is_retryable(status) {
        return None;
    }

    let value = header_str(headers, RETRY_AFTER)?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let at = parse_http_date(value)?;
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

/// Instant until which the response may be served from cache
///
/// `Cache-Control: no-store` or `no-cache` rule caching out. `max-age`
/// takes precedence over `Expires`.
pub fn freshness_instant(headers: &HeaderMap, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Some(cache_control) = header_str(headers, CACHE_CONTROL) {
        let mut max_age = None;
        for directive in cache_control.split(',') {
            let directive = directive.trim().to_ascii_lowercase();
            if directive == "no-store" || directive == "no-cache" {
                return None;
            }
            if let Some(seconds) = directive.strip_prefix("max-age=") {
                max_age = seconds.trim_matches('"').parse::<i64>().ok();
            }
        }

        if let Some(seconds) = max_age {
            let seconds = seconds.clamp(0, MAX_FRESHNESS_SECS);
            return chrono::Duration::try_seconds(seconds)
                .and_then(|age| now.checked_add_signed(age));
        }
    }

    header_str(headers, EXPIRES).and_then(parse_http_date)
}

/// `Last-Modified` as an instant
pub fn last_modified(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    header_str(headers, LAST_MODIFIED).and_then(parse_http_date)
}

/// Clamps the time left until `expiry` into `[min, max]`
///
/// Returns `None` (do not cache) when there is no expiry or it has passed.
pub fn clamp_cache_duration(
    expiry: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    min: Duration,
    max: Duration,
) -> Result<Option<Duration>, ConfigError> {
    if min > max {
        return Err(ConfigError::InvalidWindow { min, max });
    }

    let Some(expiry) = expiry else {
        return Ok(None);
    };
    if expiry <= now {
        return Ok(None);
    }

    let remaining = (expiry - now).to_std().unwrap_or(Duration::ZERO);
    Ok(Some(remaining.clamp(min, max)))
}
