//! Example: fetch a simulated paginated API while watching status and progress
//!
//! Run with:
//! ```bash
//! cargo run --example fetch_demo
//! ```
//!
//! Set `METRICS_ADDR=127.0.0.1:9090` to also serve Prometheus metrics.

use std::net::SocketAddr;
use std::time::Duration;

use paginated_fetcher::fetcher::simulated::{SampleRecord, SimulatedPageSource};
use paginated_fetcher::metrics;
use paginated_fetcher::pagination::{DataFetchConfig, PaginationFetcher};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("paginated_fetcher=info")
        .init();

    if let Ok(addr) = std::env::var("METRICS_ADDR") {
        let addr: SocketAddr = addr.parse()?;
        metrics::init_metrics(addr).await?;
        println!("Metrics at http://{addr}/metrics");
    }

    let source = SimulatedPageSource::new(95)
        .with_latency(Duration::from_millis(200), Duration::from_millis(800))
        .with_failure_rate(0.2);
    let config = DataFetchConfig::default()
        .with_concurrency(4)
        .with_retry_delay(Duration::from_millis(300));
    let fetcher: PaginationFetcher<SampleRecord> = PaginationFetcher::new(source, config)?;

    let mut status = fetcher.subscribe_status();
    let status_task = tokio::spawn(async move {
        while let Some(status) = status.recv().await {
            println!("[STATUS] {status}");
            if status.is_terminal() {
                break;
            }
        }
    });

    let mut progress = fetcher.subscribe_progress();
    let progress_task = tokio::spawn(async move {
        while let Ok(progress) = progress.recv().await {
            println!("{}", progress.format_progress());
            if progress.is_complete() {
                break;
            }
        }
    });

    let outcome = fetcher.fetch_all_data().await?;
    let _ = status_task.await;
    progress_task.abort();

    println!("\n=== Fetch finished ===");
    println!("Records: {}/{}", outcome.data.len(), outcome.total);
    for page in &outcome.pages {
        let mark = if page.success { "ok" } else { "FAILED" };
        println!("  page {:>3}: {:>3} records [{mark}]", page.page_index, page.records);
    }
    if let Some(first) = outcome.data.first() {
        println!("First record: {}", first.content);
    }

    Ok(())
}
