//! Shared library for the mal-fetcher workspace.
//!
//! This crate provides common functionality used by the fetcher crate and
//! its CLI:
//! - Configuration management
//! - File path utilities
//! - Logging infrastructure

pub mod config;
pub mod logging;
pub mod paths;

// Re-export commonly used types
pub use config::Config;
pub use logging::LogConfig;
pub use paths::DataPaths;

/// Common result type using anyhow::Error
pub type Result<T> = anyhow::Result<T>;
