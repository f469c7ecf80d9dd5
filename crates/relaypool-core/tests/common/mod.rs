#![allow(dead_code, reason = "each integration test binary uses a subset of the helpers")]

use relaypool_core::proxy::{build_router, AppState};
use relaypool_types::{AccountConfig, RelayConfig};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

pub fn account(id: &str, base_url: &str) -> AccountConfig {
    AccountConfig::new(id, format!("sk-{id}"), base_url)
}

pub fn config(accounts: Vec<AccountConfig>) -> RelayConfig {
    RelayConfig { accounts, idle_timeout_secs: 30, ..RelayConfig::default() }
}

/// Serve the relay on an ephemeral port.
pub async fn spawn_relay(config: RelayConfig) -> (String, AppState) {
    let state = AppState::from_config(&config).expect("relay state");
    let app = build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind relay");
    let addr = listener.local_addr().expect("relay addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), state)
}

/// Serve an arbitrary axum app as a fake upstream.
pub async fn spawn_upstream(app: axum::Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind upstream");
    let addr = listener.local_addr().expect("upstream addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

/// An address nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr: SocketAddr = listener.local_addr().expect("addr");
    drop(listener);
    format!("http://{addr}")
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().timeout(Duration::from_secs(20)).build().expect("client")
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..40 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}
