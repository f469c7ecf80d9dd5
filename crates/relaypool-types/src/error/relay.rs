//! Relay errors: selection, forwarding and failover outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-attempt upstream failure, raised before any response byte reached the client.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum ForwardError {
    /// Upstream answered 429; the account may not be used before `reset_at`.
    #[error("Rate limited by account {account_id} until {reset_at}")]
    RateLimited { account_id: String, reset_at: DateTime<Utc> },

    /// Upstream rejected the credential (401/403).
    #[error("Account {account_id} unauthorized (HTTP {status})")]
    Unauthorized { account_id: String, status: u16 },

    /// Connection refused/reset, timeout, or silence past the idle timeout.
    #[error("Network error on account {account_id}: {message}")]
    Network { account_id: String, message: String },
}

impl ForwardError {
    /// Account the failed attempt was sent to.
    pub fn account_id(&self) -> &str {
        match self {
            Self::RateLimited { account_id, .. }
            | Self::Unauthorized { account_id, .. }
            | Self::Network { account_id, .. } => account_id,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Network { .. } => "network_error",
        }
    }
}

/// Errors surfaced by the relay pipeline.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum RelayError {
    /// No eligible account at selection time.
    #[error("No account available")]
    NoneAvailable,

    /// A single forward attempt failed.
    #[error(transparent)]
    Forward(#[from] ForwardError),

    /// Every eligible account was tried (or the retry ceiling was hit).
    #[error("All accounts exhausted after {attempts} attempt(s)")]
    AllAccountsExhausted {
        attempts: u32,
        /// Seconds until the soonest rate-limit reset, when every account is rate limited.
        retry_after_secs: Option<u64>,
    },

    /// The client went away; a cancellation signal, not a system failure.
    #[error("Client disconnected")]
    ClientDisconnected,

    /// The request body outgrew the replay buffer, so it cannot be sent again.
    #[error("Request body exceeded the replay buffer and cannot be retried")]
    BodyNotReplayable,
}

impl RelayError {
    /// Machine-readable error type used in error bodies.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::NoneAvailable => "no_account_available",
            Self::Forward(e) => e.kind(),
            Self::AllAccountsExhausted { .. } => "all_accounts_exhausted",
            Self::ClientDisconnected => "client_disconnected",
            Self::BodyNotReplayable => "body_not_replayable",
        }
    }

    /// HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::NoneAvailable | Self::AllAccountsExhausted { .. } => 503,
            Self::Forward(ForwardError::RateLimited { .. }) => 429,
            Self::Forward(ForwardError::Unauthorized { .. }) => 502,
            Self::Forward(ForwardError::Network { .. }) | Self::BodyNotReplayable => 502,
            // nginx convention for "client closed request"; never actually written
            Self::ClientDisconnected => 499,
        }
    }

    /// Whether this error says something about an account's health.
    pub fn is_account_signal(&self) -> bool {
        matches!(self, Self::Forward(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_codes() {
        assert_eq!(
            RelayError::AllAccountsExhausted { attempts: 2, retry_after_secs: None }
                .http_status_code(),
            503
        );
        assert_eq!(RelayError::NoneAvailable.http_status_code(), 503);
        assert_eq!(RelayError::BodyNotReplayable.http_status_code(), 502);
    }

    #[test]
    fn test_client_disconnect_is_not_account_signal() {
        let network = RelayError::Forward(ForwardError::Network {
            account_id: "a".to_string(),
            message: "connection reset".to_string(),
        });

        assert!(network.is_account_signal());
        assert!(!RelayError::ClientDisconnected.is_account_signal());
        assert_eq!(network.error_type(), "network_error");
    }
}
