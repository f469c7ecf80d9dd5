use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Json};
use chrono::Utc;
use serde_json::json;

use crate::proxy::prometheus;
use crate::proxy::server::AppState;

/// Liveness: answers as long as the process serves HTTP.
pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let now = Utc::now();
    let accounts = state.registry.list();
    let available = accounts.iter().filter(|a| a.is_eligible(now)).count();

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "accounts": {
            "total": accounts.len(),
            "available": available,
        },
    }))
}

pub async fn handle_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        prometheus::render_metrics(),
    )
}
