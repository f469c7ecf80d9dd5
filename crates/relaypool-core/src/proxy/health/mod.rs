//! Health Reconciler
//!
//! Background task that returns penalized accounts to rotation:
//! - `rate_limited` once the reset timestamp has passed
//! - `unreachable` after the unreachable cooldown
//! - `unauthorized` after the unauthorized cooldown, if one is configured
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │  HealthReconciler                                 │
//! │  ├── registry: Arc<AccountRegistry>               │
//! │  ├── config: HealthConfig (swapped on reload)     │
//! │  └── task: interval loop, stops on shutdown watch │
//! └───────────────────────────────────────────────────┘
//! ```

mod monitor;


pub use monitor::HealthReconciler;
