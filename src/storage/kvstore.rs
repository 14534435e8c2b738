//! Store capability consumed by the replication layer
//!
//! The engine behind a shard is external. Command handlers only need to
//! check whether a store is open, run a transaction against it, read its
//! binlog through a cursor, and take a backup.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::StorageResult;
use crate::binlog::{BinlogResult, ReplLog};

/// How a backup is taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupMode {
    /// Full copy of the store's files into the target directory
    Copy,
    /// Engine-native checkpoint (hard links where supported)
    Checkpoint,
}

/// Result of a completed store backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupInfo {
    /// Unique id of this backup
    pub backup_id: Uuid,
    /// Store the backup was taken from
    pub store_id: u32,
    /// Next binlog id at the time of the backup
    pub binlog_pos: u64,
    /// Files written, relative to the backup directory
    pub files: Vec<PathBuf>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Forward-only, non-restartable reader over a store's binlog.
///
/// Yields records in ascending txn id order. End of data is reported as
/// `BinlogError::Exhausted`; any other error is a read failure.
pub trait BinlogCursor {
    /// Next record, or `Exhausted`
    fn next(&mut self) -> BinlogResult<ReplLog>;
}

/// Atomic unit of reads and writes against one store.
///
/// Dropping a transaction without calling `commit` abandons it.
pub trait Transaction: Send {
    /// Buffer a write of `key` with logical `timestamp`
    fn set_kv(&mut self, key: &[u8], value: &[u8], timestamp: u32) -> StorageResult<()>;

    /// Buffer a delete of `key` with logical `timestamp`
    fn del_kv(&mut self, key: &[u8], timestamp: u32) -> StorageResult<()>;

    /// Make all buffered writes durable; returns the commit id
    fn commit(self: Box<Self>) -> StorageResult<u64>;

    /// Open a cursor over the binlog visible to this transaction, positioned
    /// at the first record whose txn id is `>= start`
    fn create_binlog_cursor(&self, start: u64) -> Box<dyn BinlogCursor>;
}

/// One shard's storage engine
pub trait KvStore: Send + Sync {
    /// Shard index
    fn store_id(&self) -> u32;

    /// Whether the store currently accepts operations
    fn is_open(&self) -> bool;

    /// Begin a transaction
    fn create_transaction(&self) -> StorageResult<Box<dyn Transaction>>;

    /// Snapshot the store into `dir`
    fn backup(&self, dir: &Path, mode: BackupMode) -> StorageResult<BackupInfo>;

    /// Txn id the next commit will receive
    fn next_binlog_id(&self) -> u64;
}
