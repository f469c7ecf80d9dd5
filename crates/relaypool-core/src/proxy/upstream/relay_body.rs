//! Response relay stream: upstream chunks out to the client, one at a time.

use bytes::Bytes;
use futures::Stream;
use pin_project::{pin_project, pinned_drop};
use std::fmt::Display;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Instant, Sleep};

use crate::proxy::in_flight_guard::InFlightGuard;
use crate::proxy::prometheus;
use crate::proxy::registry::AccountOutcome;
use crate::proxy::request_context::RequestPhase;

#[derive(Debug, Clone, PartialEq, Eq)]
enum RelayState {
    Streaming,
    /// SSE error frame sent; the terminating error is still owed.
    ErrorPending(String),
    Failed,
    Done,
}

/// Wraps an upstream body stream.
///
/// Holds the account's in-flight slot until the stream finishes or is
/// dropped. Every wait for the next chunk is bounded by the idle timeout.
#[pin_project(PinnedDrop)]
pub struct RelayBody<S> {
    #[pin]
    inner: S,
    #[pin]
    idle: Sleep,
    idle_timeout: Duration,
    guard: Option<InFlightGuard>,
    request_id: String,
    is_sse: bool,
    state: RelayState,
    bytes_relayed: u64,
}

impl<S> RelayBody<S> {
    pub fn new(
        inner: S,
        guard: InFlightGuard,
        request_id: String,
        idle_timeout: Duration,
        is_sse: bool,
    ) -> Self {
        Self {
            inner,
            idle: tokio::time::sleep(idle_timeout),
            idle_timeout,
            guard: Some(guard),
            request_id,
            is_sse,
            state: RelayState::Streaming,
            bytes_relayed: 0,
        }
    }
}

/// Out-of-band error event for `text/event-stream` clients, in the same
/// shape the upstream uses for its own stream errors.
pub fn sse_error_frame(message: &str) -> Bytes {
    let payload = serde_json::json!({
        "type": "error",
        "error": { "type": "upstream_stream_error", "message": message }
    });
    Bytes::from(format!("event: error\ndata: {}\n\n", payload))
}

impl<S, E> Stream for RelayBody<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    type Item = Result<Bytes, io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        match &mut *this.state {
            RelayState::Done | RelayState::Failed => return Poll::Ready(None),
            RelayState::ErrorPending(message) => {
                let err = io::Error::other(std::mem::take(message));
                *this.state = RelayState::Failed;
                return Poll::Ready(Some(Err(err)));
            },
            RelayState::Streaming => {},
        }

        let failure = match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                let deadline = Instant::now() + *this.idle_timeout;
                this.idle.as_mut().reset(deadline);
                *this.bytes_relayed += chunk.len() as u64;
                return Poll::Ready(Some(Ok(chunk)));
            },
            Poll::Ready(None) => {
                *this.state = RelayState::Done;
                if let Some(guard) = this.guard.take() {
                    tracing::debug!(
                        "[{}] Stream from account {} complete ({} bytes)",
                        this.request_id,
                        guard.account_id(),
                        this.bytes_relayed
                    );
                    guard.release();
                }
                return Poll::Ready(None);
            },
            Poll::Ready(Some(Err(e))) => format!("upstream read failed: {}", e),
            Poll::Pending => match this.idle.as_mut().poll(cx) {
                Poll::Ready(()) => {
                    format!("upstream idle for more than {}s", this.idle_timeout.as_secs())
                },
                Poll::Pending => return Poll::Pending,
            },
        };

        // Mid-stream: headers are already out, so this cannot be retried.
        if let Some(guard) = this.guard.take() {
            let account_id = guard.account_id().to_string();
            tracing::warn!(
                "[{}] Account {} failed mid-stream after {} bytes: {}",
                this.request_id,
                account_id,
                this.bytes_relayed,
                failure
            );
            guard.record_outcome(AccountOutcome::NetworkError);
            prometheus::record_stream_truncated(&account_id);
            prometheus::record_attempt(&account_id, "stream_error");
            guard.release();
        }

        if *this.is_sse {
            let frame = sse_error_frame(&failure);
            *this.state = RelayState::ErrorPending(failure);
            Poll::Ready(Some(Ok(frame)))
        } else {
            *this.state = RelayState::Failed;
            Poll::Ready(Some(Err(io::Error::other(failure))))
        }
    }
}

#[pinned_drop]
impl<S> PinnedDrop for RelayBody<S> {
    fn drop(self: Pin<&mut Self>) {
        let this = self.project();
        if *this.state == RelayState::Streaming {
            // Client went away. Not an account problem.
            tracing::debug!(
                "[{}] Client disconnected after {} bytes; closing upstream",
                this.request_id,
                this.bytes_relayed
            );
            prometheus::record_client_disconnect();
        }
        if let Some(guard) = this.guard.take() {
            guard.release();
        }
        tracing::trace!(
            "[{}] {} -> {}",
            this.request_id,
            RequestPhase::StreamingResponse,
            RequestPhase::Closed
        );
    }
}
