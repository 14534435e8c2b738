//! Server-wide state shared by every session

use std::sync::Arc;

use crate::observability::MetricsRegistry;
use crate::replication::{ReplManager, DEFAULT_PULL_BATCH_SIZE};
use crate::segment::SegmentManager;
use crate::storage::KvStore;

/// Tunables the command handlers read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerOptions {
    /// Soft record cap of one `pullbinlogs` reply
    pub pull_batch_size: usize,
    /// Initial incremental-sync pause state
    pub incr_sync_paused: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            pull_batch_size: DEFAULT_PULL_BATCH_SIZE,
            incr_sync_paused: false,
        }
    }
}

/// Stores, their locks, the replication coordinator and metrics
pub struct ServerEntry {
    segment_mgr: SegmentManager,
    repl_mgr: ReplManager,
    metrics: MetricsRegistry,
    options: ServerOptions,
}

impl ServerEntry {
    /// Build a server over `stores`; store `i` must report `store_id() == i`.
    pub fn new(stores: Vec<Arc<dyn KvStore>>, options: ServerOptions) -> Self {
        let count = stores.len() as u32;
        Self {
            segment_mgr: SegmentManager::new(stores),
            repl_mgr: ReplManager::new(count, options.incr_sync_paused),
            metrics: MetricsRegistry::new(),
            options,
        }
    }

    pub fn segment_mgr(&self) -> &SegmentManager {
        &self.segment_mgr
    }

    pub fn repl_mgr(&self) -> &ReplManager {
        &self.repl_mgr
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Number of stores, open or closed
    pub fn kv_store_count(&self) -> u32 {
        self.segment_mgr.store_count()
    }
}
