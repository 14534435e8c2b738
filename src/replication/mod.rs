//! Binlog replication
//!
//! Master side: `pull_binlogs` hands out bounded, group-aligned batches.
//!
//! Replica side: `group_binlogs` rebuilds logical transactions from a flat
//! batch, `validate_groups` checks their boundary markers, and
//! `ReplManager::apply_binlogs` commits them one transaction per group.
//!
//! Out of band: `restore_binlogs` replays a single captured transaction
//! without touching replication bookkeeping.
//!
//! # Invariants
//!
//! - A pulled batch never ends inside a group
//! - No group is committed partially
//! - A corrupt group boundary is never applied; it breaks the link until
//!   the source is rebound

mod errors;
mod grouping;
mod manager;
mod pull;
mod restore;

pub use errors::{ReplicationError, ReplicationErrorKind, ReplicationResult};
pub use grouping::{group_binlogs, validate_groups, BinlogGroup, BinlogGroups};
pub use manager::{ApplyOutcome, ReplInfo, ReplManager, ReplSource};
pub use pull::{pull_binlogs, PullBatch, DEFAULT_PULL_BATCH_SIZE};
pub use restore::{replay_log, restore_binlogs, uniform_txn_id};
