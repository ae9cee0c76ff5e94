//! Fetch commands: simulated demo and HTTP fetch

use crate::fetcher::http::HttpPageSource;
use crate::fetcher::simulated::{SampleRecord, SimulatedPageSource};
use crate::pagination::config::MAX_CONCURRENCY;
use crate::pagination::{
    DataFetchConfig, FetchError, FetchOutcome, FetchStatus, PaginationFetcher, ResultOrder,
    StatusSubscription,
};
use crate::shutdown::SharedCancel;
use crate::RequestKind;
use chrono::{DateTime, NaiveDate};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::shards::ShardsArgs;
use super::CliError;

/// Try to parse a datetime in RFC3339 format
///
/// Handles both inputs with and without timezone designators:
/// - "2024-01-01T00:00:00Z" - explicit UTC
/// - "2024-01-01T00:00:00+01:00" - explicit offset
/// - "2024-01-01T00:00:00" - no timezone, assumed UTC
///
/// Returns timestamp in milliseconds, or None if parsing fails.
fn try_parse_datetime_rfc3339(input: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.timestamp_millis());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&format!("{input}Z")) {
        return Some(dt.timestamp_millis());
    }

    None
}

/// Parse an update time given as Unix millis, RFC3339 or YYYY-MM-DD (start of day, UTC)
pub fn parse_update_time(input: &str) -> Result<i64, CliError> {
    let input = input.trim();

    if let Ok(millis) = input.parse::<i64>() {
        if millis < 0 {
            return Err(CliError::InvalidArgument(format!(
                "Update time must be non-negative, got {millis}"
            )));
        }
        return Ok(millis);
    }

    if let Some(ts) = try_parse_datetime_rfc3339(input) {
        return Ok(ts);
    }

    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|e| CliError::InvalidArgument(format!("Invalid update time '{input}': {e}")))?;
    let datetime = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| CliError::InvalidArgument("Invalid update time".to_string()))?;
    Ok(datetime.and_utc().timestamp_millis())
}

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Parse a failure probability in `[0, 1]`
fn parse_failure_rate(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("failure rate {value} must be between 0 and 1"));
    }
    Ok(value)
}

/// Paginated fetcher CLI
#[derive(Parser, Debug)]
#[command(name = "paginated-fetcher")]
#[command(about = "Fetch every page of a paginated source concurrently", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// TOML config file; flags below override its values
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Records per page (default: 10)
    #[arg(long, global = true)]
    pub page_size: Option<usize>,

    /// Maximum shard requests in flight (default: 3, max: 32)
    #[arg(long, global = true, value_parser = parse_concurrency)]
    pub concurrency: Option<usize>,

    /// Retries per page after the initial attempt (default: 3)
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(0..=20))]
    pub max_retries: Option<u32>,

    /// Pause between attempts in milliseconds (default: 1000)
    #[arg(long, global = true)]
    pub retry_delay_ms: Option<u64>,

    /// Result ordering: shard-index or completion
    #[arg(long, global = true)]
    pub order: Option<ResultOrder>,

    /// Serve Prometheus metrics on this address (e.g., 127.0.0.1:9090)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// Build the fetch config: file (or defaults), then flag overrides
    pub fn fetch_config(&self) -> Result<DataFetchConfig, CliError> {
        let mut config = match &self.config {
            Some(path) => DataFetchConfig::load(path)?,
            None => DataFetchConfig::default(),
        };

        if let Some(page_size) = self.page_size {
            config = config.with_base_page_size(page_size);
        }
        if let Some(concurrency) = self.concurrency {
            config = config.with_concurrency(concurrency);
        }
        if let Some(retries) = self.max_retries {
            config = config.with_retry_attempts(retries);
        }
        if let Some(delay) = self.retry_delay_ms {
            config = config.with_retry_delay(Duration::from_millis(delay));
        }
        if let Some(order) = self.order {
            config = config.with_result_order(order);
        }

        config.validate()?;
        Ok(config)
    }

    /// Start the Prometheus exporter when `--metrics-addr` is set
    pub async fn init_metrics(&self) -> Result<(), CliError> {
        if let Some(addr) = self.metrics_addr {
            crate::metrics::init_metrics(addr)
                .await
                .map_err(|e| CliError::ConfigurationError(e.to_string()))?;
        }
        Ok(())
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch from the built-in simulated API
    Demo(DemoArgs),

    /// Fetch from a JSON HTTP endpoint
    Fetch(FetchArgs),

    /// Print the shard plan for a record count
    Shards(ShardsArgs),
}

/// Arguments for the simulated demo
#[derive(Parser, Debug)]
pub struct DemoArgs {
    /// Records served by the simulated API
    #[arg(long, default_value = "100")]
    pub total: usize,

    /// Probability that a single request fails (0-1)
    #[arg(long, default_value = "0.2", value_parser = parse_failure_rate)]
    pub failure_rate: f64,

    /// Lower bound of the simulated latency in milliseconds
    #[arg(long, default_value = "500")]
    pub min_latency_ms: u64,

    /// Upper bound of the simulated latency in milliseconds
    #[arg(long, default_value = "2000")]
    pub max_latency_ms: u64,

    /// Seed for reproducible latency and failures
    #[arg(long)]
    pub seed: Option<u64>,

    /// Write fetched records to this file as JSON
    #[arg(long)]
    pub output: Option<PathBuf>,
}

/// Arguments for fetching from an HTTP endpoint
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Scheme and host (e.g., https://api.example.com)
    #[arg(long)]
    pub base_url: String,

    /// Path of the paged resource (e.g., /v1/fixtures)
    #[arg(long)]
    pub endpoint: String,

    /// Library to query: user or gdtf
    #[arg(long, default_value = "user")]
    pub kind: RequestKind,

    /// Only records updated after this time (Unix millis, RFC3339 or YYYY-MM-DD)
    #[arg(long)]
    pub update_time: Option<String>,

    /// Write fetched records to this file as JSON
    #[arg(long)]
    pub output: Option<PathBuf>,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

// ─── Execute implementations ─────────────────────────────────────────────────

impl DemoArgs {
    /// Run a fetch against the simulated API
    pub async fn execute(&self, cli: &Cli, shutdown: SharedCancel) -> Result<(), CliError> {
        let config = cli.fetch_config()?;

        let mut source = SimulatedPageSource::new(self.total)
            .with_latency(
                Duration::from_millis(self.min_latency_ms),
                Duration::from_millis(self.max_latency_ms),
            )
            .with_failure_rate(self.failure_rate);
        if let Some(seed) = self.seed {
            source = source.with_seed(seed);
        }

        info!(
            total = self.total,
            failure_rate = self.failure_rate,
            "Starting demo fetch against simulated API"
        );

        let fetcher: PaginationFetcher<SampleRecord> =
            PaginationFetcher::new(source, config)?.with_shutdown(shutdown);
        run_fetch(fetcher, "simulated", cli.output_format, self.output.as_deref()).await
    }
}

impl FetchArgs {
    /// Run a fetch against the HTTP endpoint
    pub async fn execute(&self, cli: &Cli, shutdown: SharedCancel) -> Result<(), CliError> {
        let config = cli.fetch_config()?;
        let update_time = match &self.update_time {
            Some(input) => parse_update_time(input)?,
            None => 0,
        };

        let source: HttpPageSource<serde_json::Value> =
            HttpPageSource::with_default_client(&self.base_url, &self.endpoint)?;
        let url = source.url();

        info!(url = %url, kind = %self.kind, update_time = update_time, "Starting HTTP fetch");

        let fetcher: PaginationFetcher<serde_json::Value> = PaginationFetcher::new(source, config)?
            .with_request_kind(self.kind)
            .with_update_time(update_time)
            .with_shutdown(shutdown);
        run_fetch(fetcher, &url, cli.output_format, self.output.as_deref()).await
    }
}

// ─── Shared fetch driver ─────────────────────────────────────────────────────

/// Summary printed after a fetch
#[derive(Debug, Serialize)]
struct FetchSummary<'a> {
    success: bool,
    source: &'a str,
    status: String,
    records: usize,
    total: usize,
    pages: usize,
    failed_pages: Vec<usize>,
    duration_ms: u128,
    error: Option<String>,
}

async fn run_fetch<T>(
    fetcher: PaginationFetcher<T>,
    source_label: &str,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<(), CliError>
where
    T: Serialize + Send + 'static,
{
    let progress_bar = create_progress_bar();
    let watchers = spawn_watchers(&fetcher, progress_bar.clone());

    let started = Instant::now();
    let result = fetcher.fetch_all_data().await;
    let duration = started.elapsed();

    watchers.shutdown().await;
    progress_bar.finish_and_clear();

    let summary = summarize(source_label, &fetcher.status(), &result, duration);
    match format {
        OutputFormat::Json => output_json(&summary)?,
        OutputFormat::Human => output_human(&summary),
    }

    let outcome = result?;
    if let Some(path) = output {
        write_records(path, &outcome)?;
    }
    Ok(())
}

/// Time the status log gets to catch up with the final transition
const STATUS_DRAIN_TIMEOUT: Duration = Duration::from_millis(200);

/// Tasks feeding the progress bar and the status log while a fetch runs
struct Watchers {
    progress: JoinHandle<()>,
    status: JoinHandle<Option<FetchStatus>>,
}

impl Watchers {
    /// Stop the progress feed and wait for the status log to reach a terminal status
    ///
    /// Returns the last status logged, or `None` if it did not arrive in time.
    async fn shutdown(mut self) -> Option<FetchStatus> {
        self.progress.abort();
        match tokio::time::timeout(STATUS_DRAIN_TIMEOUT, &mut self.status).await {
            Ok(last) => last.ok().flatten(),
            Err(_) => {
                self.status.abort();
                None
            }
        }
    }
}

/// Feed the progress bar and log status transitions while the fetch runs
fn spawn_watchers<T>(fetcher: &PaginationFetcher<T>, progress_bar: ProgressBar) -> Watchers
where
    T: Send + 'static,
{
    let mut progress_rx = fetcher.subscribe_progress();
    let progress = tokio::spawn(async move {
        while let Ok(progress) = progress_rx.recv().await {
            progress_bar.set_length(progress.total as u64);
            progress_bar.set_position(progress.processed as u64);
            progress_bar.set_message(format!(
                "{}/{} shards",
                progress.completed_shards, progress.total_shards
            ));
        }
    });

    let status = tokio::spawn(log_status(fetcher.subscribe_status()));

    Watchers { progress, status }
}

/// Log every status transition until a terminal one
async fn log_status(mut subscription: StatusSubscription) -> Option<FetchStatus> {
    while let Some(status) = subscription.recv().await {
        info!(status = %status, "Fetch status changed");
        if status.is_terminal() {
            return Some(status);
        }
    }
    None
}

fn summarize<'a, T>(
    source: &'a str,
    status: &FetchStatus,
    result: &Result<FetchOutcome<T>, FetchError>,
    duration: Duration,
) -> FetchSummary<'a> {
    let (records, total, pages, failed_pages, error) = match result {
        Ok(outcome) => (
            outcome.data.len(),
            outcome.total,
            outcome.pages.len(),
            outcome.failed_pages(),
            None,
        ),
        Err(e) => (0, 0, 0, Vec::new(), Some(e.to_string())),
    };

    FetchSummary {
        success: result.is_ok(),
        source,
        status: status.to_string(),
        records,
        total,
        pages,
        failed_pages,
        duration_ms: duration.as_millis(),
        error,
    }
}

/// Output summary as JSON
fn output_json(summary: &FetchSummary<'_>) -> Result<(), CliError> {
    let json = serde_json::to_string(summary)
        .map_err(|e| CliError::OutputError(format!("Failed to serialize summary: {e}")))?;
    println!("{json}");
    Ok(())
}

/// Output summary in human-readable format
fn output_human(summary: &FetchSummary<'_>) {
    if let Some(err) = &summary.error {
        eprintln!("\nFetch failed!");
        eprintln!("Error: {err}");
        error!("Fetch failed: {}", err);
        return;
    }

    println!("\nFetch {}!", summary.status);
    println!("Source: {}", summary.source);
    println!("Records fetched: {}/{}", summary.records, summary.total);
    println!("Pages: {}", summary.pages);
    if !summary.failed_pages.is_empty() {
        println!("Failed pages: {:?}", summary.failed_pages);
    }
    println!("Duration: {:.2}s", summary.duration_ms as f64 / 1000.0);
}

fn write_records<T: Serialize>(path: &Path, outcome: &FetchOutcome<T>) -> Result<(), CliError> {
    let json = serde_json::to_vec_pretty(&outcome.data)
        .map_err(|e| CliError::OutputError(format!("Failed to serialize records: {e}")))?;
    std::fs::write(path, json).map_err(|e| {
        CliError::OutputError(format!("Failed to write {}: {e}", path.display()))
    })?;
    info!(path = %path.display(), records = outcome.data.len(), "Records written");
    Ok(())
}

// ─── Progress bar ────────────────────────────────────────────────────────────

/// Create progress bar with style; length is set from the first progress event
fn create_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message("Fetching first page");
    pb
}
