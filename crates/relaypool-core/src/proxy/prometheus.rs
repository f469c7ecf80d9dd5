//! Prometheus metrics for relaypool.
//!
//! - `relaypool_requests_total{status}` - Counter of relayed requests by final status class
//! - `relaypool_request_duration_seconds` - Histogram of time to response headers
//! - `relaypool_attempts_total{account,outcome}` - Counter of forward attempts
//! - `relaypool_failovers_total{reason}` - Counter of attempts moved to another account
//! - `relaypool_exhausted_total` - Counter of requests answered 503
//! - `relaypool_stream_truncated_total{account}` - Counter of mid-stream upstream failures
//! - `relaypool_client_disconnects_total` - Counter of clients gone before the stream ended
//! - `relaypool_in_flight{account}` - Gauge of in-flight requests per account
//! - `relaypool_accounts_total` / `relaypool_accounts_available` - Account gauges
//! - `relaypool_uptime_seconds` - Gauge of server uptime

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

static METRICS_START_TIME: OnceLock<Instant> = OnceLock::new();

/// Time to first byte of upstream headers. Model APIs answer in anything from
/// 100ms to well over a minute.
const HEADER_LATENCY_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Install the global Prometheus recorder.
///
/// Idempotent: later calls return the handle installed by the first.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let _ = METRICS_START_TIME.get_or_init(Instant::now);

    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle =
        PrometheusBuilder::new().set_buckets(HEADER_LATENCY_BUCKETS)?.install_recorder()?;

    describe_counter!("relaypool_requests_total", "Relayed requests by final status class");
    describe_histogram!(
        "relaypool_request_duration_seconds",
        "Seconds from request accept to response headers"
    );
    describe_counter!("relaypool_attempts_total", "Forward attempts by account and outcome");
    describe_counter!("relaypool_failovers_total", "Attempts retried on another account");
    describe_counter!("relaypool_exhausted_total", "Requests rejected with all accounts exhausted");
    describe_counter!(
        "relaypool_stream_truncated_total",
        "Responses cut short by an upstream failure mid-stream"
    );
    describe_counter!(
        "relaypool_client_disconnects_total",
        "Clients that went away before the response finished"
    );
    describe_gauge!("relaypool_in_flight", "In-flight requests per account");
    describe_gauge!("relaypool_accounts_total", "Configured accounts");
    describe_gauge!("relaypool_accounts_available", "Accounts currently eligible for selection");
    describe_gauge!("relaypool_uptime_seconds", "Server uptime in seconds");

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

pub fn get_prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Record a request that got its final response headers.
pub fn record_request(status: u16, duration_secs: f64) {
    let labels = [("status", status_category(status).to_string())];
    counter!("relaypool_requests_total", &labels).increment(1);
    histogram!("relaypool_request_duration_seconds").record(duration_secs);
}

pub fn record_attempt(account_id: &str, outcome: &'static str) {
    counter!("relaypool_attempts_total", "account" => account_id.to_string(), "outcome" => outcome)
        .increment(1);
}

pub fn record_failover(reason: &'static str) {
    counter!("relaypool_failovers_total", "reason" => reason).increment(1);
}

pub fn record_exhausted() {
    counter!("relaypool_exhausted_total").increment(1);
}

pub fn record_stream_truncated(account_id: &str) {
    counter!("relaypool_stream_truncated_total", "account" => account_id.to_string()).increment(1);
}

pub fn record_client_disconnect() {
    counter!("relaypool_client_disconnects_total").increment(1);
}

pub fn set_in_flight(account_id: &str, in_flight: u32) {
    gauge!("relaypool_in_flight", "account" => account_id.to_string()).set(f64::from(in_flight));
}

pub fn update_account_gauges(total: usize, available: usize) {
    gauge!("relaypool_accounts_total").set(total as f64);
    gauge!("relaypool_accounts_available").set(available as f64);
}

fn update_uptime_gauge() {
    if let Some(start) = METRICS_START_TIME.get() {
        gauge!("relaypool_uptime_seconds").set(start.elapsed().as_secs_f64());
    }
}

/// Render all metrics in Prometheus text format.
pub fn render_metrics() -> String {
    update_uptime_gauge();

    if let Some(handle) = get_prometheus_handle() {
        handle.render()
    } else {
        String::from("# Metrics not initialized\n")
    }
}

/// Convert HTTP status code to category for metrics labels.
pub fn status_category(status: u16) -> &'static str {
    match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_category() {
        assert_eq!(status_category(200), "2xx");
        assert_eq!(status_category(404), "4xx");
        assert_eq!(status_category(503), "5xx");
        assert_eq!(status_category(301), "3xx");
        assert_eq!(status_category(99), "other");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_attempt("a", "success");
        set_in_flight("a", 3);
        record_client_disconnect();
    }
}
