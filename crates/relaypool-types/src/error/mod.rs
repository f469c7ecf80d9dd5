//! Typed error definitions for relaypool.
//!
//! All errors are:
//!
//! - **Serializable** for error bodies via serde
//! - **Displayable** for logging via Display trait
//! - **Matchable** for failover decisions via enum variants

mod config;
mod relay;

pub use config::ConfigError;
pub use relay::{ForwardError, RelayError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type that wraps all domain-specific errors.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "domain", content = "error")]
pub enum TypedError {
    /// Wraps a relay (selection/forwarding/failover) error
    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    /// Wraps a configuration error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Standard Result type using TypedError.
pub type Result<T> = std::result::Result<T, TypedError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let err = TypedError::Relay(RelayError::AllAccountsExhausted {
            attempts: 3,
            retry_after_secs: None,
        });

        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("Relay"));
        assert!(json.contains("AllAccountsExhausted"));

        let deserialized: TypedError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, deserialized);
    }

    #[test]
    fn test_error_display() {
        let err = TypedError::Config(ConfigError::ValidationError {
            field: "accounts".to_string(),
            message: "duplicate id 'a'".to_string(),
        });

        let msg = format!("{}", err);
        assert!(msg.contains("accounts"));
        assert!(msg.contains("duplicate"));
    }
}
