//! shardrepl entry point
//!
//! Parses arguments and delegates to the CLI module. Errors are printed to
//! stderr and the process exits non-zero.

use shardrepl::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
