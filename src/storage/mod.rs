//! Storage capability for shards
//!
//! The storage engine proper is external to the replication layer. This
//! module defines what the replication layer consumes from it:
//!
//! - `KvStore`: open/closed lifecycle, transactions, backup
//! - `Transaction`: buffered `set_kv`/`del_kv`, single `commit`
//! - `BinlogCursor`: ordered read of the shard's binlog
//! - `RecordKey`/`RecordValue`: the fixed on-disk record codec used to parse
//!   the opaque key/value carried by binlog records
//!
//! `MemoryKvStore` is an in-process engine implementing the capability.
//!
//! # Invariants Enforced
//!
//! - One commit per transaction; abandoned transactions leave no effects
//! - Binlog txn ids are strictly increasing and gap-free per store
//! - Record values are checksum-verified on decode

mod checksum;
mod errors;
mod kvstore;
mod memory;
mod record;

pub use checksum::{compute_checksum, verify_checksum};
pub use errors::{Severity, StorageError, StorageErrorCode, StorageResult};
pub use kvstore::{BackupInfo, BackupMode, BinlogCursor, KvStore, Transaction};
pub use memory::MemoryKvStore;
pub use record::{RecordKey, RecordType, RecordValue};
