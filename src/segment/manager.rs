//! Shard access gate
//!
//! Resolves `(session, store id, lock mode)` to a locked store handle. The
//! handle owns the lock guard, so the lock lives exactly as long as the
//! handle and is never carried across a network round-trip.

use std::sync::Arc;

use thiserror::Error;

use super::lock::{LockMode, ShardLock, ShardLockGuard};
use crate::observability::Logger;
use crate::storage::KvStore;

/// Shard lookup failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SegmentError {
    #[error("invalid storeId {store_id}: server has {store_count} stores")]
    InvalidStoreId { store_id: u64, store_count: u32 },

    #[error("store {0} is not open")]
    StoreNotOpen(u32),
}

/// A store together with the lock that guards it
pub struct DbWithLock<'a> {
    /// The locked store
    pub store: Arc<dyn KvStore>,
    guard: ShardLockGuard<'a>,
}

impl DbWithLock<'_> {
    /// Mode the store is held in
    pub fn mode(&self) -> LockMode {
        self.guard.mode()
    }
}

/// Owner of all stores hosted by this server and their locks
pub struct SegmentManager {
    stores: Vec<Arc<dyn KvStore>>,
    locks: Vec<ShardLock>,
}

impl SegmentManager {
    /// Build a manager over `stores`; store `i` must report `store_id() == i`.
    pub fn new(stores: Vec<Arc<dyn KvStore>>) -> Self {
        let locks = stores.iter().map(|_| ShardLock::new()).collect();
        Self { stores, locks }
    }

    /// Number of stores, open or closed
    pub fn store_count(&self) -> u32 {
        self.stores.len() as u32
    }

    /// Validate a client-supplied store index
    pub fn check_store_id(&self, store_id: u64) -> Result<u32, SegmentError> {
        if store_id >= u64::from(self.store_count()) {
            return Err(SegmentError::InvalidStoreId {
                store_id,
                store_count: self.store_count(),
            });
        }
        Ok(store_id as u32)
    }

    /// Lock store `store_id` in `mode` on behalf of `session_id`.
    ///
    /// Blocks until the mode is compatible. A closed store is reported as
    /// `StoreNotOpen` unless `allow_closed` is set, in which case the caller
    /// receives the handle and decides to skip it.
    pub fn get_db(
        &self,
        session_id: u64,
        store_id: u64,
        mode: LockMode,
        allow_closed: bool,
    ) -> Result<DbWithLock<'_>, SegmentError> {
        let index = self.check_store_id(store_id)? as usize;
        let guard = self.locks[index].lock(mode);
        let store = Arc::clone(&self.stores[index]);

        if !allow_closed && !store.is_open() {
            return Err(SegmentError::StoreNotOpen(index as u32));
        }

        Logger::trace(
            "STORE_LOCKED",
            &[
                ("mode", mode.as_str()),
                ("session", &session_id.to_string()),
                ("store_id", &index.to_string()),
            ],
        );

        Ok(DbWithLock { store, guard })
    }

    /// Current holder count for diagnostics and tests
    pub fn holder_count(&self, store_id: u32, mode: LockMode) -> usize {
        self.locks
            .get(store_id as usize)
            .map(|lock| lock.holder_count(mode))
            .unwrap_or(0)
    }
}
