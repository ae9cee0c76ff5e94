//! Observability metrics for fetch runs
//!
//! Counters and histograms for page requests, retries, placeholder substitutions
//! and whole fetch runs.
//!
//! ## Architecture
//!
//! - Uses `metrics` crate for low-overhead metric collection
//! - Optional Prometheus exporter for a scraping endpoint
//! - Without an installed recorder every call is a no-op

use crate::RequestKind;
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent: later calls return `Ok(())` without rebinding.
///
/// # Arguments
/// * `addr` - Socket address to bind Prometheus scrape endpoint (e.g., "0.0.0.0:9090")
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "page_requests_total",
        Unit::Count,
        "Total number of single-page requests issued to the source"
    );

    describe_counter!(
        "page_retries_total",
        Unit::Count,
        "Total number of page retry attempts"
    );

    describe_histogram!(
        "page_retry_delay_seconds",
        Unit::Seconds,
        "Delay applied before each page retry"
    );

    describe_counter!(
        "shard_failures_total",
        Unit::Count,
        "Shards replaced by a failure-flagged placeholder after exhausting retries"
    );

    describe_counter!(
        "fetches_completed_total",
        Unit::Count,
        "Fetch runs that reached the completed status"
    );

    describe_counter!(
        "fetches_cancelled_total",
        Unit::Count,
        "Fetch runs that were cancelled"
    );

    describe_counter!(
        "fetches_failed_total",
        Unit::Count,
        "Fetch runs that hit a fatal pipeline error"
    );

    describe_histogram!(
        "fetch_duration_seconds",
        Unit::Seconds,
        "Wall-clock duration of a fetch run"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Record one page request attempt and whether it succeeded
pub fn record_page_request(kind: RequestKind, success: bool) {
    counter!(
        "page_requests_total",
        "kind" => kind.to_string(),
        "outcome" => if success { "success" } else { "error" },
    )
    .increment(1);
}

/// Record a retry and the delay applied before it
pub fn record_retry(delay: Duration, attempt: u32) {
    counter!(
        "page_retries_total",
        "attempt" => attempt.to_string(),
    )
    .increment(1);

    histogram!("page_retry_delay_seconds").record(delay.as_secs_f64());

    debug!(
        attempt = attempt,
        delay_ms = delay.as_millis(),
        "Retry delay recorded"
    );
}

/// Record a shard replaced by a placeholder
pub fn record_shard_failure(shard_index: usize) {
    counter!("shard_failures_total").increment(1);
    debug!(shard_index = shard_index, "Shard failure recorded");
}

/// Metrics for one fetch run
pub struct FetchMetrics {
    kind: RequestKind,
    start_time: Instant,
}

impl FetchMetrics {
    /// Start tracking a fetch run
    pub fn start(kind: RequestKind) -> Self {
        debug!(kind = %kind, "Fetch metrics started");
        Self {
            kind,
            start_time: Instant::now(),
        }
    }

    /// Record a run that reached the completed status
    pub fn record_completed(&self, records: usize, failed_pages: usize) {
        let duration = self.start_time.elapsed();

        counter!(
            "fetches_completed_total",
            "kind" => self.kind.to_string(),
        )
        .increment(1);
        histogram!("fetch_duration_seconds").record(duration.as_secs_f64());

        info!(
            kind = %self.kind,
            records = records,
            failed_pages = failed_pages,
            duration_ms = duration.as_millis(),
            "Fetch completed"
        );
    }

    /// Record a cancelled run
    pub fn record_cancelled(&self) {
        counter!(
            "fetches_cancelled_total",
            "kind" => self.kind.to_string(),
        )
        .increment(1);

        info!(
            kind = %self.kind,
            duration_ms = self.start_time.elapsed().as_millis(),
            "Fetch cancelled"
        );
    }

    /// Record a run that hit a fatal pipeline error
    pub fn record_failed(&self, error: &str) {
        counter!(
            "fetches_failed_total",
            "kind" => self.kind.to_string(),
        )
        .increment(1);

        warn!(
            kind = %self.kind,
            error = %error,
            duration_ms = self.start_time.elapsed().as_millis(),
            "Fetch failed"
        );
    }
}

/// Check if metrics system is initialized
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}
