//! In-memory paged API used by the demo command, tests and benches.
//!
//! Serves `total` numbered [`SampleRecord`]s. Each request sleeps for a random
//! latency and fails with a configurable probability, which is enough to exercise
//! the retry and placeholder paths of the orchestrator.

use crate::fetcher::{FetcherError, FetcherResult, PageSource};
use crate::{PageRequest, PageResponse};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Default number of records served
pub const DEFAULT_TOTAL_RECORDS: usize = 100;

/// Default latency range
pub const DEFAULT_MIN_LATENCY: Duration = Duration::from_millis(500);
/// Default latency range upper bound
pub const DEFAULT_MAX_LATENCY: Duration = Duration::from_millis(2000);

/// Default probability that a request fails
pub const DEFAULT_FAILURE_RATE: f64 = 0.2;

/// Record served by [`SimulatedPageSource`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRecord {
    /// 0-based record offset
    pub id: usize,
    /// Display text
    pub content: String,
}

impl SampleRecord {
    /// Record at `id`
    pub fn new(id: usize) -> Self {
        Self {
            id,
            content: format!("Item {id}"),
        }
    }
}

/// Simulated paged API
pub struct SimulatedPageSource {
    total: usize,
    min_latency: Duration,
    max_latency: Duration,
    failure_rate: f64,
    failing_pages: HashSet<usize>,
    rng: Mutex<StdRng>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SimulatedPageSource {
    /// Source with default latency and failure rate
    pub fn new(total: usize) -> Self {
        Self {
            total,
            min_latency: DEFAULT_MIN_LATENCY,
            max_latency: DEFAULT_MAX_LATENCY,
            failure_rate: DEFAULT_FAILURE_RATE,
            failing_pages: HashSet::new(),
            rng: Mutex::new(StdRng::from_entropy()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Source that answers immediately and never fails on its own
    pub fn instant(total: usize) -> Self {
        Self::new(total)
            .with_latency(Duration::ZERO, Duration::ZERO)
            .with_failure_rate(0.0)
    }

    /// Set the latency range; `max` is raised to `min` when smaller
    pub fn with_latency(mut self, min: Duration, max: Duration) -> Self {
        self.min_latency = min;
        self.max_latency = max.max(min);
        self
    }

    /// Set the failure probability, clamped to `[0, 1]`
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = if rate.is_finite() {
            rate.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// Seed the random generator for reproducible runs
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Pages (1-based) that fail on every attempt
    pub fn with_failing_pages<I: IntoIterator<Item = usize>>(mut self, pages: I) -> Self {
        self.failing_pages = pages.into_iter().collect();
        self
    }

    /// Total records served
    pub fn total(&self) -> usize {
        self.total
    }

    /// Requests received so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of requests that were in flight at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn roll(&self) -> (Duration, bool) {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let min = self.min_latency.as_millis() as u64;
        let max = self.max_latency.as_millis() as u64;
        let latency = Duration::from_millis(rng.gen_range(min..=max));
        let fail = rng.gen_bool(self.failure_rate);
        (latency, fail)
    }

    fn page(&self, request: &PageRequest) -> PageResponse<SampleRecord> {
        let start = request.offset.min(self.total);
        let end = (start + request.page_size).min(self.total);
        let data = (start..end).map(SampleRecord::new).collect();
        PageResponse::new(data, self.total, request.start_index, self.total - end)
    }
}

/// Decrements the in-flight counter even if the request future is dropped
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PageSource<SampleRecord> for SimulatedPageSource {
    async fn fetch_page(&self, request: PageRequest) -> FetcherResult<PageResponse<SampleRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        let (latency, random_failure) = self.roll();
        debug!(
            page = request.start_index,
            latency_ms = latency.as_millis(),
            "Simulated page request"
        );
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if self.failing_pages.contains(&request.start_index) || random_failure {
            return Err(FetcherError::NetworkError(format!(
                "simulated failure for page {}",
                request.start_index
            )));
        }

        Ok(self.page(&request))
    }
}
