//! Main entry point for the paginated-fetcher CLI

use clap::Parser;
use paginated_fetcher::cli::{Cli, CliError, Commands};
use paginated_fetcher::shutdown::{self, CancelSignal, SharedCancel};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    // Check if JSON output is requested via environment variable
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("paginated_fetcher=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Dispatch the parsed command
async fn run(cli: &Cli, shutdown: SharedCancel) -> Result<(), CliError> {
    cli.init_metrics().await?;
    match &cli.command {
        Commands::Demo(args) => args.execute(cli, shutdown).await,
        Commands::Fetch(args) => args.execute(cli, shutdown).await,
        Commands::Shards(args) => args.execute(cli),
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    // Install global shutdown signal and Ctrl+C handler
    let shutdown = CancelSignal::shared();
    shutdown::set_global_shutdown(shutdown.clone());
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl+C received - cancelling fetch...");
                shutdown.cancel();
            }
        }
    });

    let result = run(&cli, shutdown).await.map_err(|e| anyhow::anyhow!(e));

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
}
