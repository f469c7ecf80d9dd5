//! Unified error types for relaypool core.

use relaypool_types::ConfigError;
use thiserror::Error;

/// Error type for core operations outside the per-request relay path.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AppError {
    /// Configuration loading or validation failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Account lookup failed.
    #[error("Account error: {0}")]
    Account(String),
}

/// Result type alias for core operations.
pub type AppResult<T> = Result<T, AppError>;
