//! CLI argument definitions using clap
//!
//! Commands:
//! - shardrepl init --config <path>
//! - shardrepl serve --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Shard binlog replication server
#[derive(Parser, Debug)]
#[command(name = "shardrepl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the data directory layout
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./shardrepl.json")]
        config: PathBuf,
    },

    /// Open the stores and serve replication commands from stdin
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./shardrepl.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
