//! CLI argument definitions using clap
//!
//! Commands:
//! - aerolink epk [--version N] [--multi-hash] <key>
//! - aerolink route --ranges <path> [--version N] [--multi-hash] <key>
//! - aerolink session-merge <token> <token>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// AeroLink - partition routing and session tools
#[derive(Parser, Debug)]
#[command(name = "aerolink")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the effective partition key of a JSON key
    Epk {
        /// Hash version (1 or 2)
        #[arg(long, default_value_t = 2)]
        version: u8,

        /// Hierarchical key: one hashed component per array element
        #[arg(long)]
        multi_hash: bool,

        /// JSON scalar or array, e.g. '"tenant-1"' or '["a", 1]'
        key: String,
    },

    /// Print the id of the range owning a key
    Route {
        /// JSON file with the partition key ranges
        #[arg(long)]
        ranges: PathBuf,

        /// Hash version (1 or 2)
        #[arg(long, default_value_t = 2)]
        version: u8,

        #[arg(long)]
        multi_hash: bool,

        key: String,
    },

    /// Merge two vector session tokens
    SessionMerge {
        first: String,
        second: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
