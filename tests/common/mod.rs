//! Shared helpers for fetch tests

#![allow(dead_code)]

use paginated_fetcher::fetcher::simulated::{SampleRecord, SimulatedPageSource};
use paginated_fetcher::pagination::{DataFetchConfig, PaginationFetcher};
use std::sync::Arc;
use std::time::Duration;

/// Defaults with a short retry delay
pub fn fast_config() -> DataFetchConfig {
    DataFetchConfig::default().with_retry_delay(Duration::from_millis(10))
}

/// Fetcher over a shared simulated source so tests can read its counters
pub fn fetcher_over(
    source: &Arc<SimulatedPageSource>,
    config: DataFetchConfig,
) -> PaginationFetcher<SampleRecord> {
    PaginationFetcher::from_shared(source.clone(), config).expect("valid config")
}

/// Record ids in result order
pub fn ids(records: &[SampleRecord]) -> Vec<usize> {
    records.iter().map(|record| record.id).collect()
}
