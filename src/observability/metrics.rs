//! Replication metrics registry
//!
//! - Counters only
//! - Monotonic increase
//! - Reset only on process start
//! - Thread-safe but lock-minimal

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters for the replication command surface
///
/// All counters use Relaxed atomics; values are exact once the writing
/// threads have been joined.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Binlog records handed out by `pullbinlogs`
    binlogs_pulled: AtomicU64,
    /// `pullbinlogs` calls served
    pull_batches: AtomicU64,
    /// Binlog records accepted by `applybinlogs`
    binlogs_applied: AtomicU64,
    /// Transaction groups committed by `applybinlogs`
    groups_applied: AtomicU64,
    /// Groups skipped as already applied
    groups_skipped: AtomicU64,
    /// Transactions reinstated by `restorebinlog`
    restores_performed: AtomicU64,
    /// Stores backed up
    backups_created: AtomicU64,
    /// Replication source rebinds and clears
    source_changes: AtomicU64,
    /// Batches rejected for broken framing or grouping
    integrity_failures: AtomicU64,
    /// Commands answered with an error
    commands_rejected: AtomicU64,
    /// Sessions torn down by a fatal error
    sessions_terminated: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one served pull of `records` binlog records
    pub fn record_pull(&self, records: u64) {
        self.pull_batches.fetch_add(1, Ordering::Relaxed);
        self.binlogs_pulled.fetch_add(records, Ordering::Relaxed);
    }

    /// Record one applied batch
    pub fn record_apply(&self, records: u64, groups_applied: u64, groups_skipped: u64) {
        self.binlogs_applied.fetch_add(records, Ordering::Relaxed);
        self.groups_applied.fetch_add(groups_applied, Ordering::Relaxed);
        self.groups_skipped.fetch_add(groups_skipped, Ordering::Relaxed);
    }

    /// Increment restores performed
    pub fn increment_restores(&self) {
        self.restores_performed.fetch_add(1, Ordering::Relaxed);
    }

    /// Add stores backed up
    pub fn add_backups(&self, stores: u64) {
        self.backups_created.fetch_add(stores, Ordering::Relaxed);
    }

    /// Add replication source changes
    pub fn add_source_changes(&self, stores: u64) {
        self.source_changes.fetch_add(stores, Ordering::Relaxed);
    }

    /// Increment integrity failures
    pub fn increment_integrity_failures(&self) {
        self.integrity_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment rejected commands
    pub fn increment_commands_rejected(&self) {
        self.commands_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment terminated sessions
    pub fn increment_sessions_terminated(&self) {
        self.sessions_terminated.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current snapshot of all metrics as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            binlogs_pulled: self.binlogs_pulled.load(Ordering::Relaxed),
            pull_batches: self.pull_batches.load(Ordering::Relaxed),
            binlogs_applied: self.binlogs_applied.load(Ordering::Relaxed),
            groups_applied: self.groups_applied.load(Ordering::Relaxed),
            groups_skipped: self.groups_skipped.load(Ordering::Relaxed),
            restores: self.restores_performed.load(Ordering::Relaxed),
            backups: self.backups_created.load(Ordering::Relaxed),
            source_changes: self.source_changes.load(Ordering::Relaxed),
            integrity_failures: self.integrity_failures.load(Ordering::Relaxed),
            commands_rejected: self.commands_rejected.load(Ordering::Relaxed),
            sessions_terminated: self.sessions_terminated.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub binlogs_pulled: u64,
    pub pull_batches: u64,
    pub binlogs_applied: u64,
    pub groups_applied: u64,
    pub groups_skipped: u64,
    pub restores: u64,
    pub backups: u64,
    pub source_changes: u64,
    pub integrity_failures: u64,
    pub commands_rejected: u64,
    pub sessions_terminated: u64,
}
