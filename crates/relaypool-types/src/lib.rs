//! # relaypool types
//!
//! Configuration models and error definitions shared by the relaypool crates.
//!
//! - **`error`** - Typed error hierarchy for relaying and configuration
//! - **`models`** - Account and relay configuration, account health states
//!
//! ## Architecture Role
//!
//! `relaypool-types` sits at the bottom of the dependency graph:
//!
//! ```text
//!   relaypool-types (this crate)
//!          │
//!          ▼
//!   relaypool-core
//!          │
//!          ▼
//!   relaypool-server
//! ```

pub mod error;
pub mod models;

// Re-export error types for convenience
pub use error::{ConfigError, ForwardError, RelayError, Result, TypedError};

// Re-export core model types
pub use models::{AccountConfig, AuthScheme, HealthConfig, HealthState, RelayConfig};
