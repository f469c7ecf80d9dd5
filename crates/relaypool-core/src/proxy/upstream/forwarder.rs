//! Upstream Forwarder: one outbound call per attempt.

use axum::http::{HeaderMap, StatusCode};
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use relaypool_types::{ForwardError, RelayConfig};
use std::time::Duration;
use tokio::time::Instant;

use super::headers::build_upstream_headers;
use crate::proxy::rate_limit::resolve_reset_at;
use crate::proxy::registry::AccountEntry;
use crate::proxy::request_context::RequestContext;

/// Error bodies kept for passthrough are cut off here.
const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

/// An upstream error response, kept so it can be passed through when no
/// other account can be tried.
#[derive(Debug, Clone)]
pub struct RejectedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Why an attempt produced no usable response.
#[derive(Debug)]
pub enum AttemptError {
    /// The account failed before any response byte reached the client.
    Upstream { error: ForwardError, rejected: Option<RejectedResponse> },
    /// Reading the client body failed: the client is gone.
    ClientAborted,
    /// The request body outgrew the replay buffer and was already sent once.
    NotReplayable,
}

pub struct Forwarder {
    client: reqwest::Client,
    idle_timeout: Duration,
    default_rate_limit_secs: u64,
}

impl Forwarder {
    pub fn new(client: reqwest::Client, idle_timeout: Duration, default_rate_limit_secs: u64) -> Self {
        Self { client, idle_timeout, default_rate_limit_secs }
    }

    pub fn from_config(client: reqwest::Client, config: &RelayConfig) -> Self {
        Self::new(
            client,
            Duration::from_secs(config.idle_timeout_secs),
            config.default_rate_limit_secs,
        )
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Send `ctx` to `account`.
    ///
    /// Returns the live upstream response for any status other than 429 and
    /// 401/403; its body has not been read.
    pub async fn forward(
        &self,
        ctx: &RequestContext,
        account: &AccountEntry,
    ) -> Result<reqwest::Response, AttemptError> {
        let url = format!("{}{}", account.base_url().trim_end_matches('/'), ctx.path_and_query());

        let headers = build_upstream_headers(&ctx.headers, account.auth_scheme(), account.credential())
            .map_err(|_| {
                tracing::error!(
                    "[{}] Credential of account {} is not a valid header value",
                    ctx.request_id,
                    account.id()
                );
                AttemptError::Upstream {
                    error: ForwardError::Unauthorized {
                        account_id: account.id().to_string(),
                        status: StatusCode::UNAUTHORIZED.as_u16(),
                    },
                    rejected: None,
                }
            })?;

        let mut request = self.client.request(ctx.method.clone(), &url).headers(headers);
        if !ctx.body.is_empty() {
            let body = ctx.body.attempt().ok_or(AttemptError::NotReplayable)?;
            request = request.body(reqwest::Body::wrap_stream(body));
        }

        tracing::debug!(
            "[{}] -> {} {} via account {} (key {})",
            ctx.request_id,
            ctx.method,
            url,
            account.id(),
            account.fingerprint()
        );

        let response = match self.send_watching_progress(ctx, request).await {
            Some(Ok(response)) => response,
            Some(Err(e)) => {
                if ctx.body.client_aborted() {
                    return Err(AttemptError::ClientAborted);
                }
                return Err(network_error(account, describe_reqwest_error(&e)));
            },
            None => {
                if ctx.body.client_aborted() {
                    return Err(AttemptError::ClientAborted);
                }
                return Err(network_error(
                    account,
                    format!("upstream idle for more than {}s", self.idle_timeout.as_secs()),
                ));
            },
        };

        let status = response.status();
        match status.as_u16() {
            429 => {
                let rejected = self.read_rejected(response).await;
                let body_text = String::from_utf8_lossy(&rejected.body);
                let (reset_at, source) = resolve_reset_at(
                    &rejected.headers,
                    &body_text,
                    Utc::now(),
                    self.default_rate_limit_secs,
                );
                tracing::warn!(
                    "[{}] Account {} rate limited until {} ({:?})",
                    ctx.request_id,
                    account.id(),
                    reset_at.to_rfc3339(),
                    source
                );
                Err(AttemptError::Upstream {
                    error: ForwardError::RateLimited { account_id: account.id().to_string(), reset_at },
                    rejected: Some(rejected),
                })
            },
            401 | 403 => {
                tracing::warn!(
                    "[{}] Account {} rejected by upstream (HTTP {})",
                    ctx.request_id,
                    account.id(),
                    status.as_u16()
                );
                let rejected = self.read_rejected(response).await;
                Err(AttemptError::Upstream {
                    error: ForwardError::Unauthorized {
                        account_id: account.id().to_string(),
                        status: status.as_u16(),
                    },
                    rejected: Some(rejected),
                })
            },
            _ => Ok(response),
        }
    }

    /// Send and wait for response headers. `None` when the upstream went
    /// quiet for longer than the idle timeout.
    ///
    /// The clock restarts whenever a body chunk is handed upstream, and
    /// stops while the upload is waiting on the client, so a slow but
    /// steady upload is never blamed on the account.
    async fn send_watching_progress(
        &self,
        ctx: &RequestContext,
        request: reqwest::RequestBuilder,
    ) -> Option<reqwest::Result<reqwest::Response>> {
        let started = Instant::now();
        let send = request.send();
        tokio::pin!(send);

        loop {
            let upload = ctx.body.upload_status();
            let wake = if upload.awaiting_client {
                Instant::now() + self.idle_timeout
            } else {
                let quiet_since = upload.last_progress.map_or(started, |at| at.max(started));
                let deadline = quiet_since + self.idle_timeout;
                if deadline <= Instant::now() {
                    return None;
                }
                deadline
            };

            tokio::select! {
                result = &mut send => return Some(result),
                () = tokio::time::sleep_until(wake) => {},
            }
        }
    }

    /// Read up to [`MAX_ERROR_BODY_BYTES`] of an error body, bounded by the
    /// idle timeout. Whatever arrived in time is kept.
    async fn read_rejected(&self, mut response: reqwest::Response) -> RejectedResponse {
        let status = response.status();
        let headers = response.headers().clone();
        let mut buf = BytesMut::new();

        let read = async {
            while let Ok(Some(chunk)) = response.chunk().await {
                let room = MAX_ERROR_BODY_BYTES - buf.len();
                buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
                if buf.len() >= MAX_ERROR_BODY_BYTES {
                    break;
                }
            }
        };
        if tokio::time::timeout(self.idle_timeout, read).await.is_err() {
            tracing::debug!("Timed out reading upstream error body; keeping {} bytes", buf.len());
        }

        RejectedResponse { status, headers, body: buf.freeze() }
    }
}

fn network_error(account: &AccountEntry, message: String) -> AttemptError {
    AttemptError::Upstream {
        error: ForwardError::Network { account_id: account.id().to_string(), message },
        rejected: None,
    }
}

fn describe_reqwest_error(e: &reqwest::Error) -> String {
    if e.is_connect() {
        format!("connect failed: {}", e)
    } else if e.is_timeout() {
        format!("timed out: {}", e)
    } else {
        e.to_string()
    }
}
