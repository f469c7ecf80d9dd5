//! Bounded tee of the client request body.
//!
//! The body is pulled lazily from the client. Every chunk is captured until
//! the capture would exceed the configured limit, so a failed attempt can be
//! replayed to the next account without buffering the whole body up front.

use axum::body::{Body, HttpBody};
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::time::Instant;

struct ReplayState {
    source: BoxStream<'static, Result<Bytes, axum::Error>>,
    captured: Vec<Bytes>,
    captured_len: usize,
    limit: usize,
    overflowed: bool,
    source_done: bool,
    client_aborted: bool,
    epoch: u64,
    /// Last time the current attempt handed a chunk (or end of body) upstream.
    last_progress: Option<Instant>,
    /// The current attempt is blocked on the client, not on the upstream.
    awaiting_client: bool,
}

/// How the upload of the current attempt is going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadStatus {
    pub last_progress: Option<Instant>,
    pub awaiting_client: bool,
}

/// Client request body that can be streamed more than once, within a limit.
#[derive(Clone)]
pub struct ReplayableBody {
    shared: Arc<Mutex<ReplayState>>,
    empty: bool,
}

impl ReplayableBody {
    pub fn new(body: Body, limit: usize) -> Self {
        let empty = body.is_end_stream();
        let state = ReplayState {
            source: body.into_data_stream().boxed(),
            captured: Vec::new(),
            captured_len: 0,
            limit,
            overflowed: false,
            source_done: empty,
            client_aborted: false,
            epoch: 0,
            last_progress: None,
            awaiting_client: false,
        };
        Self { shared: Arc::new(Mutex::new(state)), empty }
    }

    pub fn from_bytes(bytes: impl Into<Bytes>, limit: usize) -> Self {
        Self::new(Body::from(bytes.into()), limit)
    }

    /// Whether the client sent no body at all.
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// False once the capture outgrew the limit.
    pub fn is_replayable(&self) -> bool {
        !self.shared.lock().overflowed
    }

    /// Reading the client body failed, so the client is gone.
    pub fn client_aborted(&self) -> bool {
        self.shared.lock().client_aborted
    }

    pub fn upload_status(&self) -> UploadStatus {
        let state = self.shared.lock();
        UploadStatus { last_progress: state.last_progress, awaiting_client: state.awaiting_client }
    }

    pub fn captured_len(&self) -> usize {
        self.shared.lock().captured_len
    }

    /// Start a new pass over the body.
    ///
    /// Earlier passes are invalidated and fail on their next poll, so two
    /// upstream requests never pull from the client at the same time.
    /// Returns `None` once the body is no longer replayable.
    pub fn attempt(&self) -> Option<AttemptBody> {
        let mut state = self.shared.lock();
        if state.overflowed {
            return None;
        }
        state.epoch += 1;
        state.last_progress = Some(Instant::now());
        state.awaiting_client = false;
        Some(AttemptBody { shared: Arc::clone(&self.shared), epoch: state.epoch, pos: 0 })
    }
}

impl std::fmt::Debug for ReplayableBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("ReplayableBody")
            .field("captured_len", &state.captured_len)
            .field("limit", &state.limit)
            .field("overflowed", &state.overflowed)
            .field("source_done", &state.source_done)
            .finish_non_exhaustive()
    }
}

/// One pass over a [`ReplayableBody`]: captured prefix first, then the client.
pub struct AttemptBody {
    shared: Arc<Mutex<ReplayState>>,
    epoch: u64,
    pos: usize,
}

impl Stream for AttemptBody {
    type Item = Result<Bytes, io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let shared = Arc::clone(&this.shared);
        let mut state = shared.lock();

        if state.epoch != this.epoch {
            return Poll::Ready(Some(Err(io::Error::other("request body superseded by a newer attempt"))));
        }

        let polled = this.poll_locked(&mut state, cx);
        state.awaiting_client = polled.is_pending();
        if polled.is_ready() {
            state.last_progress = Some(Instant::now());
        }
        polled
    }
}

impl AttemptBody {
    fn poll_locked(
        &mut self,
        state: &mut ReplayState,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Bytes, io::Error>>> {
        if !state.overflowed {
            if let Some(chunk) = state.captured.get(self.pos) {
                let chunk = chunk.clone();
                self.pos += 1;
                return Poll::Ready(Some(Ok(chunk)));
            }
        }

        if state.source_done {
            return Poll::Ready(None);
        }

        match state.source.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if !state.overflowed && state.captured_len + chunk.len() <= state.limit {
                    state.captured_len += chunk.len();
                    state.captured.push(chunk.clone());
                    self.pos += 1;
                } else if !state.overflowed {
                    tracing::debug!(
                        "Request body passed replay limit of {} bytes; failover disabled",
                        state.limit
                    );
                    state.overflowed = true;
                    state.captured.clear();
                }
                Poll::Ready(Some(Ok(chunk)))
            },
            Poll::Ready(Some(Err(e))) => {
                state.client_aborted = true;
                state.source_done = true;
                Poll::Ready(Some(Err(io::Error::other(e))))
            },
            Poll::Ready(None) => {
                state.source_done = true;
                Poll::Ready(None)
            },
            Poll::Pending => Poll::Pending,
        }
    }
}
