//! Account health states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The registry's belief about whether an account can currently serve requests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// Eligible for selection.
    #[default]
    Healthy,
    /// Upstream returned 429; eligible again once the reset timestamp elapses.
    RateLimited,
    /// Upstream rejected the credential.
    Unauthorized,
    /// Connection failed or went silent.
    Unreachable,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Healthy => write!(f, "healthy"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::Unreachable => write!(f, "unreachable"),
        }
    }
}
