//! Relay configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::{Validate, ValidationError};

use super::account::AccountConfig;

/// Full relay configuration, loaded from `relaypool.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct RelayConfig {
    /// Address to bind; keep it local and put the TLS proxy in front
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Port to listen on
    #[validate(range(min = 1_u16))]
    #[serde(default = "default_port")]
    pub port: u16,
    /// Abort a forward that sends no bytes for this long (seconds)
    #[validate(range(min = 1_u64, max = 86400_u64))]
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// TCP/TLS connect timeout for upstream calls (seconds)
    #[validate(range(min = 1_u64, max = 300_u64))]
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Lockout applied to a 429 that carries no reset hint (seconds)
    #[validate(range(min = 1_u64))]
    #[serde(default = "default_rate_limit_secs")]
    pub default_rate_limit_secs: u64,
    /// Bytes of request body kept for replay on failover
    #[serde(default = "default_replay_buffer_bytes")]
    pub replay_buffer_bytes: usize,
    /// Extra ceiling on attempts per request; the account count always applies
    #[validate(range(min = 1_u32))]
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Optional egress proxy for upstream calls (http/https/socks5 URL)
    #[serde(default)]
    pub upstream_proxy: Option<String>,
    /// Health reconciler settings
    #[serde(default)]
    #[validate(nested)]
    pub health: HealthConfig,
    /// Ordered upstream accounts
    #[validate(nested, custom(function = "validate_unique_ids"))]
    pub accounts: Vec<AccountConfig>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            idle_timeout_secs: default_idle_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            default_rate_limit_secs: default_rate_limit_secs(),
            replay_buffer_bytes: default_replay_buffer_bytes(),
            max_attempts: None,
            upstream_proxy: None,
            health: HealthConfig::default(),
            accounts: Vec::new(),
        }
    }
}

impl RelayConfig {
    /// Full bind socket address.
    pub fn get_socket_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// Accounts that take part in load balancing.
    pub fn enabled_accounts(&self) -> Vec<AccountConfig> {
        self.accounts.iter().filter(|a| a.enabled).cloned().collect()
    }
}

/// Periodic health reconciliation settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct HealthConfig {
    /// How often the reconciler runs (seconds)
    #[validate(range(min = 1_u64))]
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,
    /// Unreachable accounts return to rotation after this long (seconds)
    #[serde(default = "default_unreachable_cooldown")]
    pub unreachable_cooldown_secs: u64,
    /// Unauthorized accounts return after this long; `None` keeps them out until reload
    #[serde(default)]
    pub unauthorized_cooldown_secs: Option<u64>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: default_reconcile_interval(),
            unreachable_cooldown_secs: default_unreachable_cooldown(),
            unauthorized_cooldown_secs: None,
        }
    }
}

#[allow(clippy::ptr_arg, reason = "validator passes the field by reference")]
fn validate_unique_ids(accounts: &Vec<AccountConfig>) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for account in accounts {
        if !seen.insert(account.id.as_str()) {
            let mut err = ValidationError::new("duplicate_id");
            err.message = Some(format!("duplicate account id '{}'", account.id).into());
            return Err(err);
        }
    }
    Ok(())
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

pub const fn default_port() -> u16 {
    8045
}

pub const fn default_idle_timeout() -> u64 {
    120
}

pub const fn default_connect_timeout() -> u64 {
    10
}

pub const fn default_rate_limit_secs() -> u64 {
    60
}

pub const fn default_replay_buffer_bytes() -> usize {
    8 * 1024 * 1024
}

const fn default_reconcile_interval() -> u64 {
    15
}

const fn default_unreachable_cooldown() -> u64 {
    30
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let json = r#"{"accounts":[{"id":"a","credential":"k","base_url":"https://x.test"}]}"#;
        let config: RelayConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.bind, "127.0.0.1");
        assert_eq!(config.port, 8045);
        assert_eq!(config.idle_timeout_secs, 120);
        assert_eq!(config.health.unauthorized_cooldown_secs, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let config = RelayConfig {
            accounts: vec![
                AccountConfig::new("a", "k1", "https://x.test"),
                AccountConfig::new("a", "k2", "https://y.test"),
            ],
            ..RelayConfig::default()
        };

        let errors = config.validate().unwrap_err();
        assert!(errors.to_string().contains("duplicate"));
    }

    #[test]
    fn test_disabled_accounts_filtered() {
        let mut disabled = AccountConfig::new("b", "k2", "https://y.test");
        disabled.enabled = false;
        let config = RelayConfig {
            accounts: vec![AccountConfig::new("a", "k1", "https://x.test"), disabled],
            ..RelayConfig::default()
        };

        let enabled = config.enabled_accounts();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id, "a");
    }
}
