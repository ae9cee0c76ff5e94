//! CLI command for previewing the shard plan

use crate::pagination::{calculate_shards, DataShard};
use clap::Args;
use serde_json::json;

use super::fetch::{Cli, OutputFormat};
use super::CliError;

/// Shards subcommand
#[derive(Debug, Args)]
pub struct ShardsArgs {
    /// Total records reported by the first page
    #[arg(long)]
    pub total: usize,

    /// Records the first page returned (default: min(page size, total))
    #[arg(long)]
    pub first_page: Option<usize>,
}

impl ShardsArgs {
    /// Print the shards that would be fetched after page 1
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let page_size = cli.fetch_config()?.base_page_size;
        let first_page = self.first_page.unwrap_or(page_size.min(self.total));
        if first_page > page_size {
            return Err(CliError::InvalidArgument(format!(
                "first page holds {first_page} records but the page size is {page_size}"
            )));
        }

        let shards = calculate_shards(first_page, self.total, page_size);

        match cli.output_format {
            OutputFormat::Json => {
                let output = json!({
                    "total": self.total,
                    "first_page": first_page,
                    "page_size": page_size,
                    "shards": shards,
                });
                let rendered = serde_json::to_string_pretty(&output)
                    .map_err(|e| CliError::OutputError(format!("Failed to serialize shards: {e}")))?;
                println!("{rendered}");
            }
            OutputFormat::Human => print_human(self.total, first_page, page_size, &shards),
        }

        Ok(())
    }
}

fn print_human(total: usize, first_page: usize, page_size: usize, shards: &[DataShard]) {
    println!(
        "Page 1 covers {first_page}/{total} records; {} shard(s) of up to {page_size} remain:\n",
        shards.len()
    );
    for shard in shards {
        println!(
            "page {:>4} | offset {:>8} | size {:>4} | end {:>8}",
            shard.shard_index,
            shard.start_index,
            shard.page_size,
            shard.end()
        );
    }
}
