use axum::{routing::get, Router};
use relaypool_types::{ConfigError, RelayConfig};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::error::AppResult;
use crate::proxy::failover::FailoverController;
use crate::proxy::handlers;
use crate::proxy::health::HealthReconciler;
use crate::proxy::registry::AccountRegistry;
use crate::proxy::upstream::{build_http_client, Forwarder};

/// Axum application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<AccountRegistry>,
    pub failover: Arc<FailoverController>,
    pub replay_buffer_bytes: usize,
    pub started_at: Instant,
}

impl AppState {
    /// Wire registry, forwarder and failover from a validated config.
    pub fn from_config(config: &RelayConfig) -> AppResult<Self> {
        let client = build_http_client(config.upstream_proxy.as_deref(), config.connect_timeout_secs)
            .map_err(|message| ConfigError::ValidationError {
                field: "upstream_proxy".to_string(),
                message,
            })?;

        let registry = Arc::new(AccountRegistry::from_config(config)?);
        let forwarder = Arc::new(Forwarder::from_config(client, config));
        let failover =
            Arc::new(FailoverController::new(Arc::clone(&registry), forwarder, config.max_attempts));

        Ok(Self {
            registry,
            failover,
            replay_buffer_bytes: config.replay_buffer_bytes,
            started_at: Instant::now(),
        })
    }
}

/// Liveness and metrics routes; every other path is relayed upstream.
pub fn build_router(state: AppState) -> Router<()> {
    Router::new()
        .route("/healthz", get(handlers::health::handle_health))
        .route("/health", get(handlers::health::handle_health))
        .route("/metrics", get(handlers::health::handle_metrics))
        .fallback(handlers::relay::handle_relay)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Applies a re-read configuration to a running server.
#[derive(Clone)]
pub struct ReloadHandle {
    registry: Arc<AccountRegistry>,
    reconciler: Arc<HealthReconciler>,
}

impl ReloadHandle {
    /// Replace the account set and health settings.
    ///
    /// Listener address, timeouts and the egress proxy need a restart.
    pub fn apply(&self, config: &RelayConfig) -> AppResult<usize> {
        let count = self.registry.replace_all(config.enabled_accounts())?;
        self.reconciler.update_config(config.health);
        Ok(count)
    }
}

/// Axum server instance
pub struct AxumServer {
    state: AppState,
    reconciler: Arc<HealthReconciler>,
}

impl AxumServer {
    pub fn new(config: &RelayConfig) -> AppResult<Self> {
        let state = AppState::from_config(config)?;
        let reconciler = Arc::new(HealthReconciler::new(Arc::clone(&state.registry), config.health));
        Ok(Self { state, reconciler })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn reload_handle(&self) -> ReloadHandle {
        ReloadHandle {
            registry: Arc::clone(&self.state.registry),
            reconciler: Arc::clone(&self.reconciler),
        }
    }

    pub fn router(&self) -> Router<()> {
        build_router(self.state.clone())
    }

    /// Serve until `shutdown` resolves, then stop the health reconciler.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(
                "Relaying on http://{} across {} account(s)",
                addr,
                self.state.registry.len()
            );
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let reconcile_task = self.reconciler.start(shutdown_rx);

        let result = axum::serve(listener, self.router()).with_graceful_shutdown(shutdown).await;

        let _ = shutdown_tx.send(true);
        if let Err(e) = reconcile_task.await {
            tracing::warn!("Health reconciler ended abnormally: {}", e);
        }
        tracing::info!("Server stopped");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use relaypool_types::AccountConfig;
    use tower::ServiceExt;

    fn config() -> RelayConfig {
        RelayConfig {
            accounts: vec![
                AccountConfig::new("a", "sk-a", "http://127.0.0.1:9"),
                AccountConfig::new("b", "sk-b", "http://127.0.0.1:9"),
            ],
            ..RelayConfig::default()
        }
    }

    #[tokio::test]
    async fn test_healthz_reports_accounts() {
        let server = AxumServer::new(&config()).unwrap();
        let response = server
            .router()
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["accounts"]["total"], 2);
        assert_eq!(json["accounts"]["available"], 2);
    }

    #[tokio::test]
    async fn test_metrics_route_is_local() {
        let server = AxumServer::new(&config()).unwrap();
        let response = server
            .router()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[axum::http::header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
    }

    #[test]
    fn test_reload_keeps_unchanged_entries() {
        let server = AxumServer::new(&config()).unwrap();
        let before = server.state().registry.get("a").unwrap();

        let mut next = config();
        next.accounts.truncate(1);
        next.health.unauthorized_cooldown_secs = Some(600);
        assert_eq!(server.reload_handle().apply(&next).unwrap(), 1);

        let after = server.state().registry.get("a").unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert!(server.state().registry.get("b").is_none());
        assert_eq!(server.reconciler.config().unauthorized_cooldown_secs, Some(600));
    }

    #[test]
    fn test_bad_upstream_proxy_is_config_error() {
        let mut cfg = config();
        cfg.upstream_proxy = Some("::not a proxy::".to_string());
        assert!(AxumServer::new(&cfg).is_err());
    }
}
