//! CLI command implementations

pub mod error;
pub mod fetch;
pub mod shards;

pub use error::CliError;
pub use fetch::{Cli, Commands, DemoArgs, FetchArgs};
pub use shards::ShardsArgs;
