//! Proxy module - multi-account reverse proxy
//!
//! Request path:
//! - `handlers::relay` builds a [`RequestContext`] around the inbound request
//! - `failover` selects an account (`selection`), reserves a slot (`registry`)
//!   and forwards (`upstream`), retrying on pre-flight account failures
//! - the upstream body is relayed through `upstream::RelayBody`

pub mod failover;
pub mod handlers;
pub mod health;
pub mod in_flight_guard;
pub mod prometheus;
pub mod rate_limit;
pub mod registry;
pub mod request_context;
pub mod selection;
pub mod server;
pub mod upstream;

pub use failover::{FailoverController, RelayResponse};
pub use health::HealthReconciler;
pub use in_flight_guard::InFlightGuard;
pub use registry::{AccountEntry, AccountOutcome, AccountRegistry, AccountSnapshot};
pub use request_context::{RequestContext, RequestPhase};
pub use selection::{select, SelectionDecision, SelectionReason};
pub use server::{build_router, AppState, AxumServer, ReloadHandle};
