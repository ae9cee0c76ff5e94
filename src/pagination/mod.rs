//! Shard planning and fetch orchestration
//!
//! This module turns a single-page fetch into a complete, concurrent pull of a
//! paginated source.
//!
//! # Overview
//!
//! 1. **Configuration**: Page size, concurrency window and retry policy live in
//!    [`config::DataFetchConfig`]
//! 2. **First Page**: Fetched on its own to learn the total record count
//! 3. **Shard Planning**: [`shard::calculate_shards`] splits the remainder into pages
//! 4. **Fan-Out**: [`orchestrator::PaginationFetcher`] drives the shards through a
//!    bounded concurrency window, retrying each with a fixed delay
//! 5. **Observation**: [`status::FetchStatus`] transitions and
//!    [`status::FetchProgress`] snapshots are broadcast to subscribers
//!
//! # Error Handling
//!
//! Individual pages never abort a fetch. A page that exhausts its retries is
//! recorded as a failure-flagged placeholder and reported through
//! [`FetchOutcome::pages`]. Only structural misuse, cancellation and fatal
//! pipeline faults surface as [`FetchError`].

pub mod config;
pub mod orchestrator;
pub mod shard;
pub mod status;

pub use config::{ConfigError, DataFetchConfig, ResultOrder};
pub use orchestrator::PaginationFetcher;
pub use shard::{calculate_shards, DataShard};
pub use status::{FetchProgress, FetchStatus, StatusSubscription};

use serde::{Deserialize, Serialize};

/// Orchestrator errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// Another fetch on the same instance is running
    #[error("fetch already in progress")]
    AlreadyInProgress,

    /// The previous fetch ended and the fetcher was not reset
    #[error("fetcher is {0}, reset it before fetching again")]
    NotIdle(FetchStatus),

    /// The fetch was cancelled
    #[error("fetch cancelled")]
    Cancelled,

    /// A fatal fault in the fetch pipeline itself
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// The configuration was rejected
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<ConfigError> for FetchError {
    fn from(err: ConfigError) -> Self {
        FetchError::InvalidConfig(err.to_string())
    }
}

/// Result of one page within a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageOutcome {
    /// 1-based page number
    pub page_index: usize,
    /// Records the page contributed
    pub records: usize,
    /// Whether the page was retrieved
    pub success: bool,
}

/// What a completed fetch resolves to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchOutcome<T> {
    /// Page 1 data followed by shard data in the configured order
    pub data: Vec<T>,
    /// One entry per page, page 1 included, ordered by page number
    pub pages: Vec<PageOutcome>,
    /// Total records reported by page 1 (0 when page 1 failed)
    pub total: usize,
}

impl<T> FetchOutcome<T> {
    /// Page numbers that could not be retrieved
    pub fn failed_pages(&self) -> Vec<usize> {
        self.pages
            .iter()
            .filter(|page| !page.success)
            .map(|page| page.page_index)
            .collect()
    }

    /// Whether every page was retrieved
    pub fn is_complete(&self) -> bool {
        self.pages.iter().all(|page| page.success)
    }

    /// Take the records
    pub fn into_data(self) -> Vec<T> {
        self.data
    }
}
