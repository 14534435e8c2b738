//! shardrepl - binlog replication layer for a sharded transactional
//! key-value store
//!
//! - `binlog`: log record codec
//! - `storage`: store capability and an in-memory engine
//! - `segment`: per-shard locks and the shard access gate
//! - `replication`: pull, grouped apply, restore, source topology
//! - `commands`: the replication command surface
//! - `observability`: structured logs and counters
//! - `cli`: config and the stdin/stdout serve loop

pub mod binlog;
pub mod cli;
pub mod commands;
pub mod observability;
pub mod replication;
pub mod segment;
pub mod storage;
