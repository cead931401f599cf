//! CLI module for AeroLink
//!
//! Offline helpers around the routing and session primitives:
//! - epk: effective partition key of a JSON key
//! - route: owning range of a key within a saved range list
//! - session-merge: merge two vector session tokens

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{epk, route, run_command, session_merge};
pub use errors::{CliError, CliErrorCode, CliResult};

use crate::observability::init_logging;

/// Parse arguments, run one command and print its output.
pub fn run() -> CliResult<()> {
    init_logging("info");
    let cli = Cli::parse_args();
    let output = run_command(cli.command)?;
    println!("{}", output);
    Ok(())
}
