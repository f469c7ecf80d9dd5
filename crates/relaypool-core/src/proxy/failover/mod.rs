//! Failover Controller: bounded retry of one request across accounts.
//!
//! Only failures that happen before any response byte is sent are retried:
//! 429, 401/403, and connection problems before headers. Once the response
//! starts streaming, the account is committed.

use axum::body::Body;
use axum::http::header::CONTENT_LENGTH;
use axum::http::{HeaderMap, StatusCode};
use chrono::Utc;
use relaypool_types::RelayError;
use std::sync::Arc;

use crate::proxy::prometheus;
use crate::proxy::registry::{AccountOutcome, AccountRegistry};
use crate::proxy::request_context::{RequestContext, RequestPhase};
use crate::proxy::selection::{select, SelectionDecision};
use crate::proxy::upstream::{
    is_event_stream, strip_hop_by_hop, AttemptError, Forwarder, RejectedResponse, RelayBody,
};

/// Response handed back to the frontend.
#[derive(Debug)]
pub struct RelayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
    /// Account that produced the response.
    pub account_id: String,
}

impl RelayResponse {
    fn passthrough(rejected: RejectedResponse, account_id: String) -> Self {
        let mut headers = strip_hop_by_hop(&rejected.headers);
        // the kept body may be truncated
        headers.remove(CONTENT_LENGTH);
        Self {
            status: rejected.status,
            headers,
            body: Body::from(rejected.body),
            account_id,
        }
    }
}

pub struct FailoverController {
    registry: Arc<AccountRegistry>,
    forwarder: Arc<Forwarder>,
    max_attempts: Option<u32>,
}

impl FailoverController {
    pub fn new(
        registry: Arc<AccountRegistry>,
        forwarder: Arc<Forwarder>,
        max_attempts: Option<u32>,
    ) -> Self {
        Self { registry, forwarder, max_attempts }
    }

    /// Attempts allowed for one request: the account count, optionally capped.
    pub fn attempt_ceiling(&self) -> u32 {
        let accounts = u32::try_from(self.registry.len()).unwrap_or(u32::MAX);
        self.max_attempts.map_or(accounts, |max| max.min(accounts))
    }

    /// Run the request against accounts until one answers or none are left.
    pub async fn attempt(&self, ctx: &mut RequestContext) -> Result<RelayResponse, RelayError> {
        let ceiling = self.attempt_ceiling();

        while ctx.attempt < ceiling {
            let snapshot = self.registry.list();
            let decision = select(&snapshot, &ctx.tried, ctx.attempt, Utc::now());
            let SelectionDecision::Selected { account_id, reason } = decision else {
                tracing::debug!(
                    "[{}] No eligible account left after {} attempt(s)",
                    ctx.request_id,
                    ctx.attempt
                );
                break;
            };

            ctx.tried.insert(account_id.clone());
            let guard = match self.registry.mark_in_flight(&account_id) {
                Ok(guard) => guard,
                Err(e) => {
                    // removed by a reload since the snapshot
                    tracing::debug!("[{}] Skipping account {}: {}", ctx.request_id, account_id, e);
                    continue;
                },
            };

            ctx.attempt += 1;
            ctx.set_phase(RequestPhase::Forwarding(ctx.attempt));
            tracing::info!(
                "[{}] Attempt {}/{} on account {} ({})",
                ctx.request_id,
                ctx.attempt,
                ceiling,
                account_id,
                reason
            );

            match self.forwarder.forward(ctx, guard.entry()).await {
                Ok(response) => {
                    guard.record_outcome(AccountOutcome::Success);
                    prometheus::record_attempt(&account_id, "success");

                    let status = response.status();
                    let headers = strip_hop_by_hop(response.headers());
                    let is_sse = is_event_stream(&headers);
                    tracing::info!(
                        "[{}] Account {} answered HTTP {}{}",
                        ctx.request_id,
                        account_id,
                        status.as_u16(),
                        if is_sse { " (event stream)" } else { "" }
                    );

                    let relay = RelayBody::new(
                        response.bytes_stream(),
                        guard,
                        ctx.request_id.clone(),
                        self.forwarder.idle_timeout(),
                        is_sse,
                    );
                    ctx.set_phase(RequestPhase::StreamingResponse);
                    return Ok(RelayResponse {
                        status,
                        headers,
                        body: Body::from_stream(relay),
                        account_id,
                    });
                },
                Err(AttemptError::ClientAborted) => {
                    tracing::debug!(
                        "[{}] Client went away while sending the request body",
                        ctx.request_id
                    );
                    return Err(RelayError::ClientDisconnected);
                },
                Err(AttemptError::NotReplayable) => {
                    tracing::warn!(
                        "[{}] Request body exceeded the replay buffer; cannot retry",
                        ctx.request_id
                    );
                    return Err(RelayError::BodyNotReplayable);
                },
                Err(AttemptError::Upstream { error, rejected }) => {
                    guard.record_outcome(AccountOutcome::from(&error));
                    prometheus::record_attempt(&account_id, error.kind());
                    guard.release();

                    if !ctx.body.is_replayable() {
                        tracing::warn!(
                            "[{}] {} but the request body is too large to replay",
                            ctx.request_id,
                            error
                        );
                        return match rejected {
                            Some(rejected) => Ok(RelayResponse::passthrough(rejected, account_id)),
                            None => Err(RelayError::BodyNotReplayable),
                        };
                    }

                    tracing::warn!("[{}] {}; failing over", ctx.request_id, error);
                    prometheus::record_failover(error.kind());
                },
            }
        }

        let retry_after_secs = self.registry.retry_after_secs(Utc::now());
        prometheus::record_exhausted();
        tracing::error!(
            "[{}] All accounts exhausted after {} attempt(s){}",
            ctx.request_id,
            ctx.attempt,
            retry_after_secs.map(|s| format!(", soonest reset in {}s", s)).unwrap_or_default()
        );
        Err(RelayError::AllAccountsExhausted { attempts: ctx.attempt, retry_after_secs })
    }
}
