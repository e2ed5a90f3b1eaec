//! Error handling for the dividend snapshot builder
//!
//! Defines the domain error types and a unified Result type using anyhow
//! for context chaining and error propagation.

use thiserror::Error;

/// Core error types for snapshot operations
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("quote error: {0}")]
    QuoteError(String),

    #[error("discovery error: {0}")]
    DiscoveryError(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("scrape error: {0}")]
    ScrapeError(String),
}

/// Result type alias for snapshot operations
pub type Result<T> = anyhow::Result<T>;
