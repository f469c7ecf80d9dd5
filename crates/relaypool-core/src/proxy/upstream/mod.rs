//! Upstream side: outbound client, forwarding, request replay and response relay.

mod client_builder;
mod forwarder;
mod headers;
mod relay_body;
mod replay_body;


pub use client_builder::build_http_client;
pub use forwarder::{AttemptError, Forwarder, RejectedResponse};
pub use headers::{build_upstream_headers, is_event_stream, strip_hop_by_hop};
pub use relay_body::{sse_error_frame, RelayBody};
pub use replay_body::{AttemptBody, ReplayableBody, UploadStatus};
