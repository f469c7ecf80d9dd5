use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use relaypool_types::HealthConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::proxy::prometheus;
use crate::proxy::registry::AccountRegistry;

pub struct HealthReconciler {
    registry: Arc<AccountRegistry>,
    config: RwLock<HealthConfig>,
}

impl HealthReconciler {
    pub fn new(registry: Arc<AccountRegistry>, config: HealthConfig) -> Self {
        Self { registry, config: RwLock::new(config) }
    }

    pub fn config(&self) -> HealthConfig {
        *self.config.read()
    }

    /// Swap cooldowns and interval (configuration reload).
    pub fn update_config(&self, config: HealthConfig) {
        *self.config.write() = config;
    }

    /// One reconciliation pass. Returns the number of recovered accounts.
    pub fn run_once(&self, now: DateTime<Utc>) -> usize {
        let config = self.config();
        let recovered = self.registry.reconcile(now, &config);

        let snapshot = self.registry.list();
        let available = snapshot.iter().filter(|a| a.is_eligible(now)).count();
        prometheus::update_account_gauges(snapshot.len(), available);

        if recovered > 0 {
            tracing::info!(
                "Health reconcile: {} account(s) recovered, {}/{} available",
                recovered,
                available,
                snapshot.len()
            );
        }
        recovered
    }

    /// Spawn the periodic loop. It exits when `shutdown_rx` changes or its
    /// sender is dropped.
    pub fn start(
        self: &Arc<Self>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let reconciler = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                let interval = Duration::from_secs(reconciler.config().reconcile_interval_secs.max(1));

                tokio::select! {
                    () = tokio::time::sleep(interval) => {
                        reconciler.run_once(Utc::now());
                    }
                    _ = shutdown_rx.changed() => {
                        tracing::info!("Health reconciler shutting down");
                        break;
                    }
                }
            }
        })
    }
}
