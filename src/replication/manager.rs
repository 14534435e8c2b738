//! Replication coordinator
//!
//! Owns per-store replication state: the bound source, the session a
//! store's stream is pinned to, the last applied source txn id, and the
//! broken-link mark. Command handlers never mutate this state directly;
//! they hand validated groups to `apply_binlogs` while holding the store
//! in IX.
//!
//! The incremental-sync pause flag lives here too. It is set at
//! construction and changed only through `toggle_pause_state`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use crate::observability::{log_event_with_fields, Event, Logger};
use crate::storage::KvStore;

use super::errors::{ReplicationError, ReplicationResult};
use super::grouping::BinlogGroups;
use super::restore::replay_log;

/// Upstream peer a store replicates from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplSource {
    pub host: String,
    pub port: u16,
    /// Store index on the peer; may differ from the local index
    pub source_store_id: u32,
}

#[derive(Debug, Default)]
struct StoreReplState {
    source: Option<ReplSource>,
    session_id: Option<u64>,
    applied_binlog_id: Option<u64>,
    broken: Option<String>,
}

/// Inspection snapshot of one store's replication state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplInfo {
    pub store_id: u32,
    pub source: Option<ReplSource>,
    pub session_id: Option<u64>,
    pub applied_binlog_id: Option<u64>,
    pub broken_reason: Option<String>,
    pub incr_paused: bool,
}

/// Result of one `apply_binlogs` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApplyOutcome {
    /// Groups committed
    pub applied: usize,
    /// Groups at or below the applied position, skipped
    pub skipped: usize,
}

/// Replication coordinator for all stores of one server
#[derive(Debug)]
pub struct ReplManager {
    stores: Vec<Mutex<StoreReplState>>,
    incr_paused: AtomicBool,
}

impl ReplManager {
    /// Coordinator for `store_count` standalone stores
    pub fn new(store_count: u32, incr_paused: bool) -> Self {
        Self {
            stores: (0..store_count)
                .map(|_| Mutex::new(StoreReplState::default()))
                .collect(),
            incr_paused: AtomicBool::new(incr_paused),
        }
    }

    /// Number of stores tracked
    pub fn store_count(&self) -> u32 {
        self.stores.len() as u32
    }

    fn state(&self, store_id: u32) -> ReplicationResult<MutexGuard<'_, StoreReplState>> {
        let slot = self.stores.get(store_id as usize).ok_or_else(|| {
            ReplicationError::invalid_argument(format!("invalid storeId {}", store_id))
        })?;
        Ok(slot.lock().unwrap_or_else(|p| p.into_inner()))
    }

    /// Bind, rebind, or sever (`host == ""` or `port == 0`) a store's source.
    ///
    /// Clears the broken-link mark and the session pin. The applied position
    /// survives only if the new source is the one already bound.
    pub fn change_repl_source(
        &self,
        store_id: u32,
        host: &str,
        port: u16,
        source_store_id: u32,
    ) -> ReplicationResult<()> {
        let source = if host.is_empty() || port == 0 {
            None
        } else {
            Some(ReplSource {
                host: host.to_string(),
                port,
                source_store_id,
            })
        };

        let mut state = self.state(store_id)?;
        if state.source != source {
            state.applied_binlog_id = None;
        }
        state.source = source;
        state.session_id = None;
        state.broken = None;

        let target = match &state.source {
            Some(src) => format!("{}:{}/{}", src.host, src.port, src.source_store_id),
            None => "none".to_string(),
        };
        log_event_with_fields(
            Event::ReplSourceChanged,
            &[("source", &target), ("store_id", &store_id.to_string())],
        );
        Ok(())
    }

    /// Apply validated `groups` to `store`, one transaction per group.
    ///
    /// The first session to apply a non-empty batch to a store pins it;
    /// batches from any other session are rejected until the source is
    /// rebound or the pinning session ends. Groups whose txn id
    /// is not beyond the applied position are skipped. Groups before a
    /// failing one stay committed.
    pub fn apply_binlogs(
        &self,
        store: &dyn KvStore,
        session_id: u64,
        groups: &BinlogGroups,
    ) -> ReplicationResult<ApplyOutcome> {
        let store_id = store.store_id();
        let mut state = self.state(store_id)?;

        if let Some(reason) = &state.broken {
            return Err(ReplicationError::link_broken(format!(
                "store {} replication link broken: {}",
                store_id, reason
            )));
        }
        match state.session_id {
            Some(pinned) if pinned != session_id => {
                return Err(ReplicationError::session_mismatch(format!(
                    "store {} is pinned to session {}, got {}",
                    store_id, pinned, session_id
                )));
            }
            Some(_) => {}
            None if groups.is_empty() => {}
            None => state.session_id = Some(session_id),
        }

        let mut outcome = ApplyOutcome::default();
        for group in groups {
            if state
                .applied_binlog_id
                .is_some_and(|applied| group.txn_id() <= applied)
            {
                outcome.skipped += 1;
                log_event_with_fields(
                    Event::BinlogGroupSkipped,
                    &[
                        ("store_id", &store_id.to_string()),
                        ("txn_id", &group.txn_id().to_string()),
                    ],
                );
                continue;
            }

            let mut txn = store.create_transaction()?;
            for log in group.logs() {
                replay_log(txn.as_mut(), log, log.repl_log_key().timestamp())?;
            }
            txn.commit()?;

            state.applied_binlog_id = Some(group.txn_id());
            outcome.applied += 1;
        }

        Logger::trace(
            "BINLOG_APPLY_POSITION",
            &[
                (
                    "applied_binlog_id",
                    &state
                        .applied_binlog_id
                        .map(|id| id.to_string())
                        .unwrap_or_default(),
                ),
                ("store_id", &store_id.to_string()),
            ],
        );
        Ok(outcome)
    }

    /// Record a framing violation sent by `session_id` on `store_id`.
    ///
    /// The link is marked broken, and further applies refused until the
    /// source is rebound, only when the sender owns the store's stream or
    /// the store is unpinned. Returns whether the link was broken.
    pub fn report_integrity_failure(
        &self,
        store_id: u32,
        session_id: u64,
        reason: &str,
    ) -> ReplicationResult<bool> {
        let mut state = self.state(store_id)?;
        if let Some(pinned) = state.session_id.filter(|&pinned| pinned != session_id) {
            Logger::warn(
                "REPL_FOREIGN_INTEGRITY_FAILURE",
                &[
                    ("pinned_session", &pinned.to_string()),
                    ("reason", reason),
                    ("session", &session_id.to_string()),
                    ("store_id", &store_id.to_string()),
                ],
            );
            return Ok(false);
        }

        state.broken = Some(reason.to_string());
        state.session_id = None;
        Logger::error(
            "REPL_LINK_BROKEN",
            &[
                ("reason", reason),
                ("session", &session_id.to_string()),
                ("store_id", &store_id.to_string()),
            ],
        );
        Ok(true)
    }

    /// Drop every store pin held by `session_id`; returns how many.
    pub fn release_session(&self, session_id: u64) -> usize {
        let mut released = 0;
        for (store_id, slot) in self.stores.iter().enumerate() {
            let mut state = slot.lock().unwrap_or_else(|p| p.into_inner());
            if state.session_id == Some(session_id) {
                state.session_id = None;
                released += 1;
                Logger::info(
                    "REPL_SESSION_RELEASED",
                    &[
                        ("session", &session_id.to_string()),
                        ("store_id", &store_id.to_string()),
                    ],
                );
            }
        }
        released
    }

    /// Pause (`true`) or resume (`false`) incremental sync.
    pub fn toggle_pause_state(&self, paused: bool) {
        self.incr_paused.store(paused, Ordering::SeqCst);
        log_event_with_fields(
            Event::IncrSyncToggled,
            &[("paused", if paused { "true" } else { "false" })],
        );
    }

    /// Read by the incremental-sync loop at each poll.
    pub fn is_incr_paused(&self) -> bool {
        self.incr_paused.load(Ordering::SeqCst)
    }

    pub fn repl_info(&self, store_id: u32) -> ReplicationResult<ReplInfo> {
        let state = self.state(store_id)?;
        Ok(ReplInfo {
            store_id,
            source: state.source.clone(),
            session_id: state.session_id,
            applied_binlog_id: state.applied_binlog_id,
            broken_reason: state.broken.clone(),
            incr_paused: self.is_incr_paused(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binlog::{ReplFlag, ReplLog, ReplLogKey, ReplLogValue};
    use crate::replication::errors::ReplicationErrorKind;
    use crate::replication::grouping::group_binlogs;
    use crate::storage::{MemoryKvStore, RecordKey, RecordType, RecordValue};

    fn set_log(txn_id: u64, local_id: u16, flag: ReplFlag, pk: &str) -> ReplLog {
        ReplLog::new(
            ReplLogKey::new(txn_id, local_id, flag, 1_700_000_000),
            ReplLogValue::set(
                RecordKey::new(0, RecordType::Kv, pk.as_bytes().to_vec(), Vec::new()).encode(),
                RecordValue::new("v", 0).encode(),
            ),
        )
    }

    fn single(txn_id: u64, pk: &str) -> ReplLog {
        set_log(txn_id, 0, ReplFlag::GROUP_START | ReplFlag::GROUP_END, pk)
    }

    #[test]
    fn test_change_source_and_sever() {
        let mgr = ReplManager::new(4, false);
        mgr.change_repl_source(2, "10.0.0.1", 6400, 5).unwrap();
        let info = mgr.repl_info(2).unwrap();
        assert_eq!(
            info.source,
            Some(ReplSource {
                host: "10.0.0.1".into(),
                port: 6400,
                source_store_id: 5
            })
        );

        mgr.change_repl_source(2, "", 0, 0).unwrap();
        assert_eq!(mgr.repl_info(2).unwrap().source, None);
    }

    #[test]
    fn test_invalid_store_rejected() {
        let mgr = ReplManager::new(2, false);
        let err = mgr.change_repl_source(2, "h", 1, 0).unwrap_err();
        assert_eq!(err.kind, ReplicationErrorKind::InvalidArgument);
    }

    #[test]
    fn test_apply_commits_one_txn_per_group() {
        let mgr = ReplManager::new(1, false);
        let store = MemoryKvStore::new(0);
        let groups = group_binlogs(vec![
            set_log(10, 0, ReplFlag::GROUP_START, "a"),
            set_log(10, 1, ReplFlag::GROUP_END, "b"),
            single(11, "c"),
        ]);

        let outcome = mgr.apply_binlogs(&store, 7, &groups).unwrap();
        assert_eq!(outcome, ApplyOutcome { applied: 2, skipped: 0 });
        assert_eq!(store.len().unwrap(), 3);
        assert_eq!(store.next_binlog_id(), 3);

        let info = mgr.repl_info(0).unwrap();
        assert_eq!(info.applied_binlog_id, Some(11));
        assert_eq!(info.session_id, Some(7));
    }

    #[test]
    fn test_duplicate_groups_are_skipped() {
        let mgr = ReplManager::new(1, false);
        let store = MemoryKvStore::new(0);
        mgr.apply_binlogs(&store, 1, &group_binlogs(vec![single(5, "a")]))
            .unwrap();

        let outcome = mgr
            .apply_binlogs(&store, 1, &group_binlogs(vec![single(5, "a"), single(6, "b")]))
            .unwrap();
        assert_eq!(outcome, ApplyOutcome { applied: 1, skipped: 1 });
        assert_eq!(store.binlog_len().unwrap(), 2);
    }

    #[test]
    fn test_other_session_rejected_until_rebind() {
        let mgr = ReplManager::new(1, false);
        let store = MemoryKvStore::new(0);
        mgr.apply_binlogs(&store, 1, &group_binlogs(vec![single(1, "a")]))
            .unwrap();

        let err = mgr
            .apply_binlogs(&store, 2, &group_binlogs(vec![single(2, "b")]))
            .unwrap_err();
        assert_eq!(err.kind, ReplicationErrorKind::SessionMismatch);

        mgr.change_repl_source(0, "h", 1, 0).unwrap();
        assert!(mgr
            .apply_binlogs(&store, 2, &group_binlogs(vec![single(2, "b")]))
            .is_ok());
    }

    #[test]
    fn test_broken_link_refuses_apply() {
        let mgr = ReplManager::new(1, false);
        let store = MemoryKvStore::new(0);
        assert!(mgr
            .report_integrity_failure(0, 1, "txnId:3 first record not marked begin")
            .unwrap());

        let err = mgr
            .apply_binlogs(&store, 1, &group_binlogs(vec![single(4, "a")]))
            .unwrap_err();
        assert_eq!(err.kind, ReplicationErrorKind::LinkBroken);
        assert!(store.is_empty().unwrap());

        mgr.change_repl_source(0, "", 0, 0).unwrap();
        assert!(mgr.repl_info(0).unwrap().broken_reason.is_none());
    }

    #[test]
    fn test_foreign_integrity_failure_keeps_link() {
        let mgr = ReplManager::new(1, false);
        let store = MemoryKvStore::new(0);
        mgr.apply_binlogs(&store, 1, &group_binlogs(vec![single(1, "a")]))
            .unwrap();

        assert!(!mgr
            .report_integrity_failure(0, 99, "txnId:5 first record not marked begin")
            .unwrap());
        let info = mgr.repl_info(0).unwrap();
        assert_eq!(info.broken_reason, None);
        assert_eq!(info.session_id, Some(1));

        assert!(mgr
            .report_integrity_failure(0, 1, "txnId:2 last record not marked end")
            .unwrap());
        let info = mgr.repl_info(0).unwrap();
        assert!(info.broken_reason.is_some());
        assert_eq!(info.session_id, None);
    }

    #[test]
    fn test_release_session_unpins_its_stores_only() {
        let mgr = ReplManager::new(3, false);
        let stores: Vec<MemoryKvStore> = (0..3).map(MemoryKvStore::new).collect();
        mgr.apply_binlogs(&stores[0], 1, &group_binlogs(vec![single(1, "a")]))
            .unwrap();
        mgr.apply_binlogs(&stores[1], 2, &group_binlogs(vec![single(1, "a")]))
            .unwrap();
        mgr.apply_binlogs(&stores[2], 1, &group_binlogs(vec![single(1, "a")]))
            .unwrap();

        assert_eq!(mgr.release_session(1), 2);
        assert_eq!(mgr.repl_info(0).unwrap().session_id, None);
        assert_eq!(mgr.repl_info(1).unwrap().session_id, Some(2));
        assert_eq!(mgr.repl_info(2).unwrap().session_id, None);
        assert_eq!(mgr.release_session(1), 0);
    }

    #[test]
    fn test_empty_batch_does_not_pin() {
        let mgr = ReplManager::new(1, false);
        let store = MemoryKvStore::new(0);
        let outcome = mgr.apply_binlogs(&store, 1, &BinlogGroups::new()).unwrap();
        assert_eq!(outcome, ApplyOutcome::default());
        assert_eq!(mgr.repl_info(0).unwrap().session_id, None);

        mgr.apply_binlogs(&store, 2, &group_binlogs(vec![single(1, "a")]))
            .unwrap();
        assert_eq!(mgr.repl_info(0).unwrap().session_id, Some(2));
    }

    #[test]
    fn test_rebinding_same_source_keeps_position() {
        let mgr = ReplManager::new(1, false);
        let store = MemoryKvStore::new(0);
        mgr.change_repl_source(0, "h", 1, 0).unwrap();
        mgr.apply_binlogs(&store, 1, &group_binlogs(vec![single(9, "a")]))
            .unwrap();

        mgr.change_repl_source(0, "h", 1, 0).unwrap();
        assert_eq!(mgr.repl_info(0).unwrap().applied_binlog_id, Some(9));

        mgr.change_repl_source(0, "other", 1, 0).unwrap();
        assert_eq!(mgr.repl_info(0).unwrap().applied_binlog_id, None);
    }

    #[test]
    fn test_pause_flag_is_per_coordinator() {
        let paused = ReplManager::new(1, true);
        let running = ReplManager::new(1, false);
        assert!(paused.is_incr_paused());
        assert!(!running.is_incr_paused());

        paused.toggle_pause_state(false);
        assert!(!paused.is_incr_paused());
        assert!(!paused.repl_info(0).unwrap().incr_paused);
    }
}
