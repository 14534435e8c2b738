//! Shard access gate
//!
//! Every command reaches a store through `SegmentManager::get_db`, which
//! validates the store index, takes the per-shard lock in the requested
//! mode, and hands back a scoped handle.
//!
//! Mode selection is part of the protocol:
//! - read-only / inspection: IS
//! - single-shard mutation (binlog apply, restore): IX
//! - replication source rebinding: X

mod lock;
mod manager;

pub use lock::{LockMode, ShardLock, ShardLockGuard};
pub use manager::{DbWithLock, SegmentError, SegmentManager};
