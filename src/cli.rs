use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "spider",
    version,
    about = "Concurrent EVM block crawler with reorg resolution"
)]
pub struct Cli {
    /// Specify the config file path (default: ./config.yaml)
    #[arg(long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Override logging.level from the config file (e.g. "debug", "rs_block_spider=trace")
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Start the crawler (default)
    Run,
    /// Print the persisted crawler state and exit
    State,
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.unwrap_or(Commands::Run)
    }
}
