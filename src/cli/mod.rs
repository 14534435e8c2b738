//! Command-line entry point
//!
//! - init: create the data directory layout
//! - serve: open the stores and execute JSON requests from stdin

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{init, open_stores, run, run_command, serve, serve_loop, Config};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{
    read_lines, write_error, write_failure, write_reply, write_response, ReplyFormat, Request,
};
