//! Binlog record codec
//!
//! Each shard keeps a monotonically increasing log of committed mutations.
//! This module defines one physical record of that log and its two-blob
//! wire form. It is a pure structural (de)serialization boundary.
//!
//! # Invariants
//!
//! - `decode(encode(r)) == r` for every record
//! - Within a run of records sharing a txn id, the first carries
//!   `GROUP_START` and the last carries `GROUP_END`
//! - Decode failures are parse errors, never panics

mod errors;
mod record;

pub use errors::{BinlogError, BinlogResult};
pub use record::{ReplFlag, ReplLog, ReplLogKey, ReplLogValue, ReplOp, REPL_LOG_KEY_LEN};

/// Sentinel meaning "no txn id observed yet"; never assigned to a record.
pub const TXNID_UNINITED: u64 = u64::MAX;
