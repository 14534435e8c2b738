//! Master-side binlog pull
//!
//! Reads a bounded batch from a transaction's binlog cursor. The batch cap
//! is soft: once reached, reading continues until the txn id changes, so a
//! batch never ends in the middle of a group.

use crate::binlog::{ReplLog, TXNID_UNINITED};
use crate::storage::Transaction;

use super::errors::ReplicationResult;

/// Default number of records after which a pull stops at the next group
/// boundary
pub const DEFAULT_PULL_BATCH_SIZE: usize = 1000;

/// One pull response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullBatch {
    /// Where the puller should resume
    pub next_binlog_id: u64,
    /// Records in cursor order
    pub logs: Vec<ReplLog>,
}

impl PullBatch {
    /// True when nothing was read and the position is unchanged
    pub fn is_caught_up(&self) -> bool {
        self.logs.is_empty()
    }
}

/// Read binlogs from `txn` starting at `start`.
///
/// An empty read returns `start` as the next position. Otherwise the next
/// position is one past the last record's txn id.
pub fn pull_binlogs(
    txn: &dyn Transaction,
    start: u64,
    batch_size: usize,
) -> ReplicationResult<PullBatch> {
    let mut cursor = txn.create_binlog_cursor(start);
    let mut logs: Vec<ReplLog> = Vec::new();
    let mut current = TXNID_UNINITED;

    loop {
        let log = match cursor.next() {
            Ok(log) => log,
            Err(e) if e.is_exhausted() => break,
            Err(e) => return Err(e.into()),
        };

        let txn_id = log.txn_id();
        if current == TXNID_UNINITED {
            current = txn_id;
        }
        if logs.len() >= batch_size && txn_id != current {
            break;
        }
        logs.push(log);
        current = txn_id;
    }

    let next_binlog_id = match logs.last() {
        Some(last) => last.txn_id() + 1,
        None => start,
    };
    Ok(PullBatch {
        next_binlog_id,
        logs,
    })
}
