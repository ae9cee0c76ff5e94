//! Fetch configuration
//!
//! Defaults live in the constants below. A [`DataFetchConfig`] can be built in code,
//! loaded from a TOML file, and is finally overridden by CLI flags in the binary.

use crate::fetcher::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Records requested per page, first page included.
pub const DEFAULT_BASE_PAGE_SIZE: usize = 10;

/// Shard requests allowed in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Retries per page after the initial attempt.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Fixed pause between attempts in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Upper bound for `concurrency`.
pub const MAX_CONCURRENCY: usize = 32;

/// How shard data is ordered in the final result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResultOrder {
    /// Sort shard responses by page number before concatenating
    #[default]
    ShardIndex,
    /// Concatenate shard responses in the order they completed
    Completion,
}

impl std::fmt::Display for ResultOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResultOrder::ShardIndex => "shard-index",
            ResultOrder::Completion => "completion",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ResultOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "shard-index" | "shard_index" | "index" => Ok(ResultOrder::ShardIndex),
            "completion" => Ok(ResultOrder::Completion),
            _ => Err(format!(
                "Invalid result order: {s}. Valid options: shard-index, completion"
            )),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// File that was read
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values are out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Per-fetcher configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataFetchConfig {
    /// Records per page
    pub base_page_size: usize,
    /// Maximum shard requests in flight
    pub concurrency: usize,
    /// Retries per page after the initial attempt
    pub retry_attempts: u32,
    /// Fixed pause between attempts
    #[serde(rename = "retry_delay_ms", with = "duration_millis")]
    pub retry_delay: Duration,
    /// Ordering of shard data in the result
    pub result_order: ResultOrder,
}

impl Default for DataFetchConfig {
    fn default() -> Self {
        Self {
            base_page_size: DEFAULT_BASE_PAGE_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            result_order: ResultOrder::default(),
        }
    }
}

impl DataFetchConfig {
    /// Create a config from explicit values
    pub fn new(
        base_page_size: usize,
        concurrency: usize,
        retry_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            base_page_size,
            concurrency,
            retry_attempts,
            retry_delay,
            result_order: ResultOrder::default(),
        }
    }

    /// Set records per page
    pub fn with_base_page_size(mut self, base_page_size: usize) -> Self {
        self.base_page_size = base_page_size;
        self
    }

    /// Set the concurrency window
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set retries per page
    pub fn with_retry_attempts(mut self, retry_attempts: u32) -> Self {
        self.retry_attempts = retry_attempts;
        self
    }

    /// Set the pause between attempts
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Set result ordering
    pub fn with_result_order(mut self, result_order: ResultOrder) -> Self {
        self.result_order = result_order;
        self
    }

    /// Retry policy derived from this config
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, self.retry_delay)
    }

    /// Validate config values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_page_size == 0 {
            return Err(ConfigError::Invalid(
                "base_page_size must be at least 1".to_string(),
            ));
        }

        if self.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "concurrency must be at least 1".to_string(),
            ));
        }

        if self.concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::Invalid(format!(
                "concurrency {} exceeds maximum of {MAX_CONCURRENCY}",
                self.concurrency
            )));
        }

        Ok(())
    }

    /// Parse and validate a TOML document; missing keys take their defaults
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
