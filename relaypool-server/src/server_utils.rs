use anyhow::Result;
use listenfd::ListenFd;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use tokio::signal;
use tracing::info;

pub async fn create_listener(bind: &str, port: u16) -> Result<tokio::net::TcpListener> {
    let mut listenfd = ListenFd::from_env();

    if let Some(listener) = listenfd.take_tcp_listener(0)? {
        info!("Using systemd socket activation (fd=3)");
        listener.set_nonblocking(true)?;
        return Ok(tokio::net::TcpListener::from_std(listener)?);
    }

    let ip: std::net::IpAddr = bind
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address '{}': {}", bind, e))?;
    let addr = SocketAddr::new(ip, port);
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(4096)?;

    if !ip.is_loopback() {
        tracing::warn!("Binding to non-loopback {}; terminate TLS in front of the relay", addr);
    }
    info!("Binding with SO_REUSEPORT to {}", addr);

    Ok(tokio::net::TcpListener::from_std(socket.into())?)
}

#[allow(
    clippy::expect_used,
    reason = "Signal handlers are critical infrastructure, panic is appropriate on failure"
)]
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use relaypool_core::proxy::AxumServer;
    use relaypool_types::{AccountConfig, RelayConfig};

    #[tokio::test]
    async fn test_invalid_bind_address() {
        let err = create_listener("not-an-ip", 0).await.unwrap_err();
        assert!(err.to_string().contains("Invalid bind address"));
    }

    #[tokio::test]
    async fn test_serves_until_shutdown() {
        let listener = create_listener("127.0.0.1", 0).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let config = RelayConfig {
            accounts: vec![AccountConfig::new("a", "sk-a", "http://127.0.0.1:9")],
            ..RelayConfig::default()
        };
        let server = AxumServer::new(&config).unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let serving = tokio::spawn(server.run(listener, async {
            let _ = stop_rx.await;
        }));

        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let health: serde_json::Value = client
            .get(format!("http://{addr}/healthz"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");

        stop_tx.send(()).unwrap();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), serving).await;
        assert!(result.unwrap().unwrap().is_ok());
    }
}
