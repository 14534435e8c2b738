//! Binlog codec error types
//!
//! Decode failures are parse errors reported to the caller. `Exhausted` is
//! the end-of-sequence sentinel returned by binlog cursors; it is consumed
//! by cursor readers and never reaches a command reply.

use thiserror::Error;

/// Result type for binlog codec operations
pub type BinlogResult<T> = Result<T, BinlogError>;

/// Binlog codec errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BinlogError {
    #[error("binlog {part} truncated: need {needed} bytes, have {available}")]
    Truncated {
        part: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("binlog {part} has {count} trailing bytes")]
    TrailingBytes { part: &'static str, count: usize },

    #[error("invalid replop: {0}")]
    InvalidOp(u8),

    #[error("invalid repl flag bits: {0:#06x}")]
    InvalidFlag(u16),

    #[error("binlog cursor exhausted")]
    Exhausted,

    #[error("binlog read failed: {0}")]
    Read(String),
}

impl BinlogError {
    /// Whether this is the end-of-sequence sentinel rather than a failure.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, BinlogError::Exhausted)
    }
}
