//! Relay configuration loading.
//!
//! The configuration is a JSON file; lookup order is the explicit path,
//! `RELAYPOOL_CONFIG`, `./relaypool.json`, then the per-user config dir.

use std::fs;
use std::path::{Path, PathBuf};

use relaypool_types::{ConfigError, RelayConfig};
use validator::Validate;

const CONFIG_FILE: &str = "relaypool.json";
const CONFIG_ENV: &str = "RELAYPOOL_CONFIG";

/// Resolve which config file to read.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(raw) = std::env::var(CONFIG_ENV) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
        tracing::warn!("{} is empty, falling back to default lookup", CONFIG_ENV);
    }

    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return local;
    }

    dirs::config_dir()
        .map(|dir| dir.join("relaypool").join(CONFIG_FILE))
        .filter(|p| p.exists())
        .unwrap_or(local)
}

/// Load and validate the relay configuration from `path`.
pub fn load_config(path: &Path) -> Result<RelayConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound { path: path.display().to_string() });
    }

    let content = fs::read_to_string(path).map_err(|e| ConfigError::from_io_error(&e))?;
    parse_config(&content)
}

/// Parse and validate a configuration document.
pub fn parse_config(content: &str) -> Result<RelayConfig, ConfigError> {
    let config: RelayConfig =
        serde_json::from_str(content).map_err(|e| ConfigError::from_json_error(&e))?;

    config.validate().map_err(|e| ConfigError::from_validation_errors(&e))?;

    if config.enabled_accounts().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "accounts".to_string(),
            message: "at least one enabled account is required".to_string(),
        });
    }

    if let Some(proxy) = config.upstream_proxy.as_deref() {
        url::Url::parse(proxy).map_err(|e| ConfigError::ValidationError {
            field: "upstream_proxy".to_string(),
            message: e.to_string(),
        })?;
    }

    tracing::debug!(
        "Parsed config: {} account(s), bind {}",
        config.accounts.len(),
        config.get_socket_addr()
    );

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const VALID: &str = r#"{
        "port": 9100,
        "accounts": [
            {"id": "primary", "credential": "sk-1", "base_url": "https://api.example.com"},
            {"id": "backup", "credential": "sk-2", "base_url": "https://api.example.com", "enabled": false}
        ]
    }"#;

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(VALID.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.accounts.len(), 2);
        assert_eq!(config.enabled_accounts().len(), 1);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn test_no_enabled_accounts_rejected() {
        let err = parse_config(
            r#"{"accounts":[{"id":"a","credential":"k","base_url":"https://x.test","enabled":false}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { ref field, .. } if field == "accounts"));
    }

    #[test]
    fn test_bad_json_is_parse_error() {
        let err = parse_config("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_explicit_path_wins() {
        let explicit = PathBuf::from("/tmp/custom-relaypool.json");
        assert_eq!(resolve_config_path(Some(&explicit)), explicit);
    }
}
