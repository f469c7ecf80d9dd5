//! Core domain models for relaypool.

mod account;
mod config;
mod health;

pub use account::{AccountConfig, AuthScheme};
pub use config::{HealthConfig, RelayConfig};
pub use health::HealthState;
