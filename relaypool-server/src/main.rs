//! relaypool server - headless daemon
//!
//! Listens on a local address and relays every request to one of the
//! configured upstream accounts, failing over on rate limits, auth failures
//! and connection errors. `/healthz` and `/metrics` are served locally.
//!
//! Put a TLS-terminating proxy in front; the relay itself speaks plain HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

mod cli;
mod reload;
mod server_utils;

use cli::Cli;
use relaypool_core::modules::{config, logger};
use relaypool_core::proxy::{prometheus, AxumServer};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = logger::init_logger(&cli.log_level, cli.log_dir.as_deref());

    info!("relaypool {} (built {}) starting", env!("GIT_VERSION"), env!("BUILD_TIME"));

    let config_path = config::resolve_config_path(cli.config.as_deref());
    let mut relay_config = config::load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    cli.apply_overrides(&mut relay_config);
    info!(
        "Loaded {} ({} enabled account(s))",
        config_path.display(),
        relay_config.enabled_accounts().len()
    );

    if let Err(e) = prometheus::init_metrics() {
        tracing::warn!("Metrics recorder unavailable: {}", e);
    }

    let server = AxumServer::new(&relay_config).context("Failed to build relay")?;
    let listener =
        server_utils::create_listener(&relay_config.bind, relay_config.port).await?;
    let reload_task = reload::spawn_reload_listener(config_path, server.reload_handle())?;

    server.run(listener, server_utils::shutdown_signal()).await?;

    reload_task.abort();
    Ok(())
}
