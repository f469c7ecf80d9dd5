//! Header filtering and credential injection.

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue};
use relaypool_types::AuthScheme;
use std::collections::HashSet;

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

static X_API_KEY: HeaderName = HeaderName::from_static("x-api-key");

/// Headers named in `Connection`, lowercased.
fn connection_tokens(headers: &HeaderMap) -> HashSet<String> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// True for hop-by-hop headers, including anything listed in `Connection`.
fn is_hop_by_hop(name: &HeaderName, connection: &HashSet<String>) -> bool {
    HOP_BY_HOP.contains(&name.as_str()) || connection.contains(name.as_str())
}

/// Copy of `headers` without hop-by-hop fields. Used for both directions.
pub fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let connection = connection_tokens(headers);
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !is_hop_by_hop(name, &connection) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Outbound headers for one attempt: inbound minus hop-by-hop, `host` and
/// any client credentials, plus the account credential.
pub fn build_upstream_headers(
    inbound: &HeaderMap,
    auth_scheme: AuthScheme,
    credential: &str,
) -> Result<HeaderMap, InvalidHeaderValue> {
    let mut headers = strip_hop_by_hop(inbound);
    headers.remove(header::HOST);
    headers.remove(header::AUTHORIZATION);
    headers.remove(&X_API_KEY);

    match auth_scheme {
        AuthScheme::Bearer => {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", credential))?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        },
        AuthScheme::XApiKey => {
            let mut value = HeaderValue::from_str(credential)?;
            value.set_sensitive(true);
            headers.insert(X_API_KEY.clone(), value);
        },
    }

    Ok(headers)
}

/// Whether the response is a server-sent event stream.
pub fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim_start().to_ascii_lowercase().starts_with("text/event-stream"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbound() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::HOST, HeaderValue::from_static("relay.local:8045"));
        h.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer client-token"));
        h.insert("x-api-key", HeaderValue::from_static("client-key"));
        h.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, X-Trace-Hop"));
        h.insert("x-trace-hop", HeaderValue::from_static("1"));
        h.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        h.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        h.insert(header::CONTENT_LENGTH, HeaderValue::from_static("42"));
        h.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        h.append("anthropic-beta", HeaderValue::from_static("a"));
        h.append("anthropic-beta", HeaderValue::from_static("b"));
        h
    }

    #[test]
    fn test_bearer_injection_replaces_client_credentials() {
        let out = build_upstream_headers(&inbound(), AuthScheme::Bearer, "sk-account").unwrap();

        assert_eq!(out.get(header::AUTHORIZATION).unwrap(), "Bearer sk-account");
        assert!(out.get("x-api-key").is_none());
        assert!(out.get(header::HOST).is_none());
    }

    #[test]
    fn test_api_key_injection() {
        let out = build_upstream_headers(&inbound(), AuthScheme::XApiKey, "sk-account").unwrap();

        assert_eq!(out.get("x-api-key").unwrap(), "sk-account");
        assert!(out.get(header::AUTHORIZATION).is_none());
        assert!(out.get("x-api-key").unwrap().is_sensitive());
    }

    #[test]
    fn test_hop_by_hop_and_connection_listed_removed() {
        let out = build_upstream_headers(&inbound(), AuthScheme::Bearer, "k").unwrap();

        assert!(out.get(header::CONNECTION).is_none());
        assert!(out.get(header::TRANSFER_ENCODING).is_none());
        assert!(out.get("x-trace-hop").is_none());
    }

    #[test]
    fn test_end_to_end_headers_preserved() {
        let out = build_upstream_headers(&inbound(), AuthScheme::Bearer, "k").unwrap();

        assert_eq!(out.get(header::CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(out.get(header::CONTENT_LENGTH).unwrap(), "42");
        assert_eq!(out.get("anthropic-version").unwrap(), "2023-06-01");
        assert_eq!(out.get_all("anthropic-beta").iter().count(), 2);
    }

    #[test]
    fn test_invalid_credential_rejected() {
        assert!(build_upstream_headers(&HeaderMap::new(), AuthScheme::Bearer, "bad\nvalue").is_err());
    }

    #[test]
    fn test_event_stream_detection() {
        let mut h = HeaderMap::new();
        assert!(!is_event_stream(&h));
        h.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream; charset=utf-8"));
        assert!(is_event_stream(&h));
    }
}
