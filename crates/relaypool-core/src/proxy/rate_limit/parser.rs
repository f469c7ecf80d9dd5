use regex::Regex;
use std::sync::OnceLock;

static DURATION_REGEX: OnceLock<Regex> = OnceLock::new();
static RETRY_M_S_REGEX: OnceLock<Regex> = OnceLock::new();
static RETRY_S_REGEX: OnceLock<Regex> = OnceLock::new();
static RETRY_AFTER_REGEX: OnceLock<Regex> = OnceLock::new();
static WAIT_PAREN_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_duration_regex() -> &'static Regex {
    DURATION_REGEX.get_or_init(|| {
        Regex::new(r"^\s*(?:(\d+)\s*h)?\s*(?:(\d+)\s*m)?\s*(?:(\d+(?:\.\d+)?)\s*s)?\s*(?:(\d+(?:\.\d+)?)\s*ms)?\s*$")
            .expect("Duration regex is valid")
    })
}

fn get_retry_m_s_regex() -> &'static Regex {
    RETRY_M_S_REGEX.get_or_init(|| {
        Regex::new(r"(?i)try again in (\d+)m\s*(\d+)s").expect("Retry m s regex is valid")
    })
}

fn get_retry_s_regex() -> &'static Regex {
    RETRY_S_REGEX.get_or_init(|| {
        Regex::new(r"(?i)(?:try again in|backoff for|wait)\s*(\d+)\s*(?:s\b|sec)")
            .expect("Retry s regex is valid")
    })
}

fn get_retry_after_regex() -> &'static Regex {
    RETRY_AFTER_REGEX.get_or_init(|| {
        Regex::new(r"(?i)retry after (\d+) second").expect("Retry after regex is valid")
    })
}

fn get_wait_paren_regex() -> &'static Regex {
    WAIT_PAREN_REGEX
        .get_or_init(|| Regex::new(r"\(wait (\d+)s\)").expect("Wait paren regex is valid"))
}

/// Parse compact durations such as `1h30m`, `42s` or `250ms` into whole
/// seconds, rounding up.
pub fn parse_duration_string(s: &str) -> Option<u64> {
    let caps = get_duration_regex().captures(s)?;

    let any_matched = (1..=4).any(|i| caps.get(i).is_some());
    if !any_matched {
        tracing::debug!("[timeparse] no duration components in '{}'", s);
        return None;
    }

    let hours = caps.get(1).map_or(0, |m| m.as_str().parse::<u64>().unwrap_or(u64::MAX));
    let minutes = caps.get(2).map_or(0, |m| m.as_str().parse::<u64>().unwrap_or(u64::MAX));
    let seconds = caps.get(3).and_then(|m| m.as_str().parse::<f64>().ok()).unwrap_or(0.0);
    let milliseconds = caps.get(4).and_then(|m| m.as_str().parse::<f64>().ok()).unwrap_or(0.0);

    // float-to-int casts saturate
    let total = hours
        .saturating_mul(3600)
        .saturating_add(minutes.saturating_mul(60))
        .saturating_add(seconds.ceil() as u64)
        .saturating_add((milliseconds / 1000.0).ceil() as u64);

    tracing::debug!("[timeparse] '{}' => {}s", s, total);
    Some(total)
}

/// Dig a retry delay (seconds) out of an upstream 429 body.
///
/// Structured fields are tried first, then the free-text phrasings upstreams
/// use in `error.message`.
pub fn parse_retry_time_from_body(body: &str) -> Option<u64> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.starts_with('{') {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
            let error = json.get("error");

            if let Some(retry) = error.and_then(|e| e.get("retry_after")).and_then(|v| v.as_u64())
            {
                return Some(retry);
            }

            if let Some(delay) = error
                .and_then(|e| e.get("details"))
                .and_then(|d| d.as_array())
                .and_then(|a| a.iter().find_map(|o| o.get("metadata")?.get("quotaResetDelay")))
                .and_then(|v| v.as_str())
                .and_then(parse_duration_string)
            {
                return Some(delay);
            }

            if let Some(message) = error.and_then(|e| e.get("message")).and_then(|v| v.as_str()) {
                if let Some(secs) = parse_retry_time_from_text(message) {
                    return Some(secs);
                }
            }
        }
    }

    parse_retry_time_from_text(body)
}

fn parse_retry_time_from_text(text: &str) -> Option<u64> {
    if let Some(caps) = get_retry_m_s_regex().captures(text) {
        if let (Ok(m), Ok(s)) = (caps[1].parse::<u64>(), caps[2].parse::<u64>()) {
            return Some(m.saturating_mul(60).saturating_add(s));
        }
    }

    [get_retry_s_regex(), get_retry_after_regex(), get_wait_paren_regex()]
        .into_iter()
        .find_map(|re| re.captures(text).and_then(|caps| caps[1].parse::<u64>().ok()))
}
