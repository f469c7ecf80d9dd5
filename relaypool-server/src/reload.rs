//! SIGHUP: re-read the config file and swap the account set in place.

use anyhow::{Context, Result};
use relaypool_core::modules::config::load_config;
use relaypool_core::proxy::ReloadHandle;
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;

/// Apply the file at `path` to the running server.
///
/// A file that fails to load or validate leaves the current set untouched.
pub fn reload_from(path: &Path, handle: &ReloadHandle) -> Result<usize> {
    let config = load_config(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    let count = handle.apply(&config).context("Failed to apply reloaded config")?;
    Ok(count)
}

#[cfg(unix)]
pub fn spawn_reload_listener(path: PathBuf, handle: ReloadHandle) -> Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("failed to install SIGHUP handler")?;
    Ok(tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            tracing::info!("SIGHUP received, reloading {}", path.display());
            match reload_from(&path, &handle) {
                Ok(count) => tracing::info!("Reload complete: {} account(s) active", count),
                Err(e) => tracing::error!("Reload rejected, keeping current accounts: {:#}", e),
            }
        }
    }))
}

#[cfg(not(unix))]
pub fn spawn_reload_listener(path: PathBuf, _handle: ReloadHandle) -> Result<JoinHandle<()>> {
    tracing::info!("Config reload is not supported on this platform ({})", path.display());
    Ok(tokio::spawn(async {}))
}
