//! Rate-limit reset resolution for upstream 429 responses.

mod parser;


pub use parser::{parse_duration_string, parse_retry_time_from_body};

use chrono::{DateTime, Duration, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};

/// Where a reset time came from, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetSource {
    RetryAfter,
    RatelimitHeaders,
    Body,
    Default,
}

/// Work out when a rate-limited account may be used again.
///
/// Order: `retry-after` (delta seconds or HTTP date), the latest
/// `anthropic-ratelimit-*-reset` header, a delay parsed from the error body,
/// and finally `default_secs` from now.
pub fn resolve_reset_at(
    headers: &HeaderMap,
    body: &str,
    now: DateTime<Utc>,
    default_secs: u64,
) -> (DateTime<Utc>, ResetSource) {
    if let Some(reset) = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_retry_after(v, now))
    {
        return (reset, ResetSource::RetryAfter);
    }

    if let Some(reset) = latest_ratelimit_reset(headers) {
        return (reset.max(now), ResetSource::RatelimitHeaders);
    }

    if let Some(secs) = parse_retry_time_from_body(body) {
        return (after(now, secs), ResetSource::Body);
    }

    (after(now, default_secs), ResetSource::Default)
}

/// `Retry-After` is either delta-seconds or an HTTP date.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(after(now, secs));
    }
    DateTime::parse_from_rfc2822(value).ok().map(|dt| dt.with_timezone(&Utc).max(now))
}

fn latest_ratelimit_reset(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    headers
        .iter()
        .filter(|(name, _)| {
            let name = name.as_str();
            name.starts_with("anthropic-ratelimit-") && name.ends_with("-reset")
        })
        .filter_map(|(_, value)| value.to_str().ok())
        .filter_map(|v| DateTime::parse_from_rfc3339(v.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .max()
}

/// `now + secs`, saturating at the latest representable instant.
fn after(now: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
