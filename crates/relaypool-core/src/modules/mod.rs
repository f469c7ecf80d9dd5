//! Process-level support modules: configuration loading and logging.

pub mod config;
pub mod logger;
