//! # Paginated Fetcher Library
//!
//! A library for pulling every record out of a paginated remote source as fast as
//! the source allows without letting one bad page sink the whole batch.
//!
//! ## Features
//!
//! - **Shard Planning**: The first page reports the total record count; the rest
//!   of the range is split into page-sized shards
//! - **Bounded Concurrency**: At most `concurrency` shard requests are in flight
//! - **Fixed-Delay Retry**: Every page request is retried a bounded number of times
//! - **Partial Failure Resilience**: Shards that exhaust their retries are recorded
//!   as failure-flagged placeholders instead of aborting the fetch
//! - **Observability**: Status and progress streams for any number of observers
//!
//! ## Quick Start
//!
//! ```no_run
//! use paginated_fetcher::fetcher::simulated::{SampleRecord, SimulatedPageSource};
//! use paginated_fetcher::pagination::{DataFetchConfig, PaginationFetcher};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = SimulatedPageSource::new(100);
//! let fetcher: PaginationFetcher<SampleRecord> =
//!     PaginationFetcher::new(source, DataFetchConfig::default())?;
//!
//! let outcome = fetcher.fetch_all_data().await?;
//! println!("fetched {} records, {} pages failed", outcome.data.len(), outcome.failed_pages().len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`fetcher`] - Page sources (the injected single-page fetch), retry decorator
//! - [`pagination`] - Shard planner, orchestrator, status and progress channels
//! - [`metrics`] - Counters and histograms for page requests and fetch runs
//! - [`shutdown`] - Cooperative cancellation shared across tasks
//! - [`cli`] - Command line front end

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// CLI command implementations
pub mod cli;

/// Page sources and per-request retry
pub mod fetcher;

/// Observability metrics
pub mod metrics;

/// Shard planning and fetch orchestration
pub mod pagination;

/// Cooperative cancellation shared across tasks
pub mod shutdown;

pub use pagination::{DataFetchConfig, FetchOutcome, FetchProgress, FetchStatus, PaginationFetcher};

/// Which remote library a page request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RequestKind {
    /// The user's own fixture library
    #[default]
    #[serde(rename = "user")]
    UserLibrary,
    /// The shared GDTF fixture library
    #[serde(rename = "gdtf")]
    FixtureLibrary,
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RequestKind::UserLibrary => "user",
            RequestKind::FixtureLibrary => "gdtf",
        };
        write!(f, "{s}")
    }
}

impl FromStr for RequestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(RequestKind::UserLibrary),
            "gdtf" => Ok(RequestKind::FixtureLibrary),
            _ => Err(format!("Invalid request kind: {s}. Valid options: user, gdtf")),
        }
    }
}

/// One page of a paginated query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Library being queried
    pub kind: RequestKind,
    /// Only records updated after this time (Unix millis, 0 = everything)
    pub update_time: i64,
    /// 1-based page number
    pub start_index: usize,
    /// Records per page
    pub page_size: usize,
    /// 0-based offset of the first record on this page
    pub offset: usize,
}

impl PageRequest {
    /// Create a page request
    pub fn new(
        kind: RequestKind,
        update_time: i64,
        start_index: usize,
        page_size: usize,
        offset: usize,
    ) -> Self {
        Self {
            kind,
            update_time,
            start_index,
            page_size,
            offset,
        }
    }

    /// Request for page 1
    pub fn first_page(kind: RequestKind, update_time: i64, page_size: usize) -> Self {
        Self::new(kind, update_time, 1, page_size, 0)
    }

    /// Request covering one planned shard
    pub fn for_shard(kind: RequestKind, update_time: i64, shard: &pagination::DataShard) -> Self {
        Self::new(
            kind,
            update_time,
            shard.shard_index,
            shard.page_size,
            shard.start_index,
        )
    }

    /// Update timestamp as a UTC datetime, `None` for 0 or out-of-range values
    pub fn updated_after(&self) -> Option<DateTime<Utc>> {
        if self.update_time == 0 {
            return None;
        }
        DateTime::<Utc>::from_timestamp_millis(self.update_time)
    }

    /// Validate request parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.start_index == 0 {
            return Err("Start index is 1-based and cannot be 0".to_string());
        }

        if self.page_size == 0 {
            return Err("Page size must be at least 1".to_string());
        }

        if self.update_time < 0 {
            return Err(format!(
                "Update time must be non-negative, got {}",
                self.update_time
            ));
        }

        Ok(())
    }
}

/// Result envelope for one page
///
/// A response with `success == false` carries no data, and its `total` and
/// `remaining` fields are not authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    /// Records on this page
    pub data: Vec<T>,
    /// Total records across all pages
    pub total: usize,
    /// Page number this response answers
    pub current_index: usize,
    /// Records left after this page
    pub remaining: usize,
    /// Whether the page was actually retrieved
    pub success: bool,
}

impl<T> PageResponse<T> {
    /// Successful page
    pub fn new(data: Vec<T>, total: usize, current_index: usize, remaining: usize) -> Self {
        Self {
            data,
            total,
            current_index,
            remaining,
            success: true,
        }
    }

    /// Failure-flagged placeholder standing in for a page that could not be fetched
    pub fn failed(total: usize, current_index: usize, remaining: usize) -> Self {
        Self {
            data: Vec::new(),
            total,
            current_index,
            remaining,
            success: false,
        }
    }

    /// Number of records on this page
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the page holds no records
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Validate response integrity
    pub fn validate(&self) -> Result<(), String> {
        if !self.success && !self.data.is_empty() {
            return Err(format!(
                "Failed page {} must not carry data, got {} records",
                self.current_index,
                self.data.len()
            ));
        }

        if self.success && self.data.len() > self.total {
            return Err(format!(
                "Page {} holds {} records but total is {}",
                self.current_index,
                self.data.len(),
                self.total
            ));
        }

        Ok(())
    }
}
