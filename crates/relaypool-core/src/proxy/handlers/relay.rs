//! Catch-all relay handler.

use axum::extract::{Request, State};
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use relaypool_types::RelayError;
use serde_json::json;

use crate::proxy::prometheus;
use crate::proxy::request_context::{RequestContext, RequestPhase};
use crate::proxy::server::AppState;
use crate::proxy::upstream::ReplayableBody;

pub const REQUEST_ID_HEADER: &str = "x-relay-request-id";

pub async fn handle_relay(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = ReplayableBody::new(body, state.replay_buffer_bytes);
    let mut ctx = RequestContext::new(parts.method, parts.uri, parts.headers, body);

    let mut response = match state.failover.attempt(&mut ctx).await {
        Ok(relay) => {
            let mut response = Response::new(relay.body);
            *response.status_mut() = relay.status;
            *response.headers_mut() = relay.headers;
            response
        },
        Err(err) => {
            ctx.set_phase(RequestPhase::Closed);
            error_response(&err, &ctx.request_id)
        },
    };

    if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
        response.headers_mut().insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    prometheus::record_request(response.status().as_u16(), ctx.elapsed_secs());
    response
}

/// Map a terminal relay error to the client-facing response.
pub fn error_response(err: &RelayError, request_id: &str) -> Response {
    if matches!(err, RelayError::ClientDisconnected) {
        // Nobody is listening; keep it out of the error logs.
        tracing::debug!("[{}] Client disconnected before a response was sent", request_id);
    }

    let status =
        StatusCode::from_u16(err.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = Json(json!({
        "type": "error",
        "error": {
            "type": err.error_type(),
            "message": err.to_string(),
            "request_id": request_id,
        }
    }));

    let mut response = (status, body).into_response();
    if let RelayError::AllAccountsExhausted { retry_after_secs: Some(secs), .. } = err {
        if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn test_exhausted_maps_to_503_with_retry_after() {
        let err = RelayError::AllAccountsExhausted { attempts: 2, retry_after_secs: Some(17) };
        let response = error_response(&err, "req-1");

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "17");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["error"]["type"], "all_accounts_exhausted");
        assert_eq!(json["error"]["request_id"], "req-1");
    }

    #[test]
    fn test_exhausted_without_reset_has_no_retry_after() {
        let err = RelayError::AllAccountsExhausted { attempts: 3, retry_after_secs: None };
        let response = error_response(&err, "req-2");
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }

    #[test]
    fn test_body_not_replayable_is_502() {
        let response = error_response(&RelayError::BodyNotReplayable, "req-3");
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
