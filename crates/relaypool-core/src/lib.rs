//! # relaypool core
//!
//! Load-balancing reverse proxy across several upstream API accounts.
//!
//! ## Architecture
//!
//! ```text
//! relaypool-core/src/
//! ├── modules/               # config loading, logging
//! └── proxy/
//!     ├── registry/          # accounts + live health / in-flight state
//!     ├── selection/         # least-loaded, staleness-preferring pick
//!     ├── upstream/          # forwarder, replayable request body, relay body
//!     ├── rate_limit/        # 429 reset-time resolution
//!     ├── failover/          # bounded retry loop across accounts
//!     ├── health/            # periodic health reconciler
//!     ├── handlers/          # axum relay + liveness handlers
//!     ├── prometheus.rs      # metrics
//!     └── server.rs          # router + AxumServer
//! ```

#![allow(
    clippy::significant_drop_tightening,
    reason = "Lock guards in poll functions are scoped by hand"
)]
#![allow(clippy::module_name_repetitions, reason = "Types are re-exported at the crate root")]
// Test-only lints: allow panic!, println!, etc. in test code
#![cfg_attr(
    test,
    allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::print_stdout,
        clippy::assertions_on_result_states
    )
)]

pub mod error;
pub mod modules;
pub mod proxy;

// Re-export commonly used types
pub use error::{AppError, AppResult};
pub use relaypool_types::{AccountConfig, AuthScheme, HealthState, RelayConfig};
