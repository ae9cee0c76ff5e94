//! CLI error types and conversions

use crate::fetcher::FetcherError;
use crate::pagination::{ConfigError, FetchError};

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Fetch error
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Fetcher error
    #[error("fetcher error: {0}")]
    FetcherError(#[from] FetcherError),

    /// Config file or value error
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Output error
    #[error("output error: {0}")]
    OutputError(String),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}
