//! HTTP handlers: the catch-all relay plus liveness and metrics.

pub mod health;
pub mod relay;
