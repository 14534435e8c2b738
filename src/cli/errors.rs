//! Startup and serve loop failures
//!
//! A failure either stops the process or is written back on the request
//! line that caused it:
//! - `Config`, `DataDirExists`, `DataDirMissing`: raised before the loop
//!   starts; the process exits non-zero
//! - `BadRequest`: one line could not be turned into a command; the loop
//!   answers it and reads the next line
//! - `Stream`: stdin or stdout failed; the loop stops
//!
//! Command failures never surface here. They carry their own codes and are
//! answered inline by the loop.

use std::fmt;
use std::io;
use std::path::Path;

use thiserror::Error;

/// Failure classes of the entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliErrorCode {
    Config,
    DataDirExists,
    DataDirMissing,
    BadRequest,
    Stream,
}

impl CliErrorCode {
    /// Wire code written in error responses
    pub fn code(self) -> &'static str {
        match self {
            Self::Config => "SHARDREPL_CONFIG",
            Self::DataDirExists => "SHARDREPL_DATA_DIR_EXISTS",
            Self::DataDirMissing => "SHARDREPL_DATA_DIR_MISSING",
            Self::BadRequest => "SHARDREPL_BAD_REQUEST",
            Self::Stream => "SHARDREPL_STREAM",
        }
    }

    /// True if the serve loop answers the line and keeps reading
    pub fn is_per_request(self) -> bool {
        matches!(self, Self::BadRequest)
    }
}

impl fmt::Display for CliErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Config file unreadable or invalid
    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::Config, msg)
    }

    /// `init` found a store layout already in place
    pub fn data_dir_exists(dir: &Path) -> Self {
        Self::new(
            CliErrorCode::DataDirExists,
            format!("{} already holds a store layout", dir.display()),
        )
    }

    /// `serve` found no store layout; `shardrepl init` creates it
    pub fn data_dir_missing(dir: &Path) -> Self {
        Self::new(
            CliErrorCode::DataDirMissing,
            format!("{} has no store layout, run 'shardrepl init'", dir.display()),
        )
    }

    /// Request line that is not a command
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::BadRequest, msg)
    }

    /// Input or output stream failure
    pub fn stream(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::Stream, msg)
    }

    pub fn code(&self) -> CliErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::stream(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::stream(format!("response encoding failed: {}", e))
    }
}

pub type CliResult<T> = Result<T, CliError>;
