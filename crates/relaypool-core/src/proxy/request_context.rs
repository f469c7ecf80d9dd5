//! Per-request state carried through selection, forwarding and failover.

use axum::http::{HeaderMap, Method, Uri};
use std::collections::HashSet;
use std::fmt;
use std::time::Instant;

use crate::proxy::upstream::ReplayableBody;

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Accepted,
    HeadersParsed,
    /// Forward attempt number (1-based).
    Forwarding(u32),
    StreamingResponse,
    Closed,
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::HeadersParsed => write!(f, "headers-parsed"),
            Self::Forwarding(n) => write!(f, "forwarding#{}", n),
            Self::StreamingResponse => write!(f, "streaming-response"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

pub struct RequestContext {
    pub request_id: String,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: ReplayableBody,
    /// Attempts started so far.
    pub attempt: u32,
    /// Accounts already tried; never selected again for this request.
    pub tried: HashSet<String>,
    phase: RequestPhase,
    started: Instant,
}

impl RequestContext {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: ReplayableBody) -> Self {
        let request_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!("[{}] {} {} accepted", request_id, method, uri);
        let mut ctx = Self {
            request_id,
            method,
            uri,
            headers,
            body,
            attempt: 0,
            tried: HashSet::new(),
            phase: RequestPhase::Accepted,
            started: Instant::now(),
        };
        ctx.set_phase(RequestPhase::HeadersParsed);
        ctx
    }

    pub fn set_phase(&mut self, phase: RequestPhase) {
        tracing::trace!("[{}] {} -> {}", self.request_id, self.phase, phase);
        self.phase = phase;
    }

    /// Path plus query, as sent to the upstream.
    pub fn path_and_query(&self) -> &str {
        self.uri.path_and_query().map_or("/", |pq| pq.as_str())
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("attempt", &self.attempt)
            .field("tried", &self.tried)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}
