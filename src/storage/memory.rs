//! In-process reference engine
//!
//! `MemoryKvStore` implements the store capability on top of a `BTreeMap`.
//! Every commit receives the next txn id and appends one binlog record per
//! buffered mutation, flagged GROUP_START on the first and GROUP_END on the
//! last. Transactions see the binlog as it was when they were created.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::errors::{StorageError, StorageResult};
use super::kvstore::{BackupInfo, BackupMode, BinlogCursor, KvStore, Transaction};
use crate::binlog::{BinlogError, BinlogResult, ReplFlag, ReplLog, ReplLogKey, ReplLogValue};

#[derive(Debug)]
struct MemoryInner {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    binlog: Vec<ReplLog>,
    next_txn_id: u64,
}

/// In-memory store with a real binlog
#[derive(Debug)]
pub struct MemoryKvStore {
    store_id: u32,
    open: Arc<AtomicBool>,
    fail_commits: Arc<AtomicBool>,
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryKvStore {
    /// Create an open, empty store whose first commit gets txn id 1
    pub fn new(store_id: u32) -> Self {
        Self::starting_at(store_id, 1)
    }

    /// Create an open, empty store whose first commit gets `first_txn_id`
    pub fn starting_at(store_id: u32, first_txn_id: u64) -> Self {
        Self {
            store_id,
            open: Arc::new(AtomicBool::new(true)),
            fail_commits: Arc::new(AtomicBool::new(false)),
            inner: Arc::new(RwLock::new(MemoryInner {
                data: BTreeMap::new(),
                binlog: Vec::new(),
                next_txn_id: first_txn_id,
            })),
        }
    }

    /// Close the store; subsequent operations fail
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// Reopen a closed store
    pub fn reopen(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    /// Make every subsequent commit fail until cleared
    pub fn inject_commit_failure(&self, enabled: bool) {
        self.fail_commits.store(enabled, Ordering::SeqCst);
    }

    /// Read a committed value
    pub fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(read_inner(&self.inner)?.data.get(key).cloned())
    }

    /// Number of committed keys
    pub fn len(&self) -> StorageResult<usize> {
        Ok(read_inner(&self.inner)?.data.len())
    }

    /// True if no keys are committed
    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Number of binlog records written so far
    pub fn binlog_len(&self) -> StorageResult<usize> {
        Ok(read_inner(&self.inner)?.binlog.len())
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if !self.is_open() {
            return Err(StorageError::store_closed(self.store_id));
        }
        Ok(())
    }
}

fn read_inner(inner: &RwLock<MemoryInner>) -> StorageResult<RwLockReadGuard<'_, MemoryInner>> {
    inner
        .read()
        .map_err(|_| StorageError::data_corruption("store state lock poisoned"))
}

fn write_inner(inner: &RwLock<MemoryInner>) -> StorageResult<RwLockWriteGuard<'_, MemoryInner>> {
    inner
        .write()
        .map_err(|_| StorageError::data_corruption("store state lock poisoned"))
}

#[derive(Serialize)]
struct BackupImage {
    store_id: u32,
    binlog_pos: u64,
    entries: Vec<(String, String)>,
}

#[derive(Serialize)]
struct BackupManifest<'a> {
    info: &'a BackupInfo,
    mode: BackupMode,
    entry_count: usize,
}

fn write_synced(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let mut file = File::create(path).map_err(|e| {
        StorageError::io_error(format!("failed to create {}", path.display()), e)
    })?;
    file.write_all(bytes)
        .map_err(|e| StorageError::io_error(format!("failed to write {}", path.display()), e))?;
    file.sync_all()
        .map_err(|e| StorageError::io_error(format!("failed to fsync {}", path.display()), e))
}

impl KvStore for MemoryKvStore {
    fn store_id(&self) -> u32 {
        self.store_id
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn create_transaction(&self) -> StorageResult<Box<dyn Transaction>> {
        self.ensure_open()?;
        let snapshot_end = read_inner(&self.inner)?.binlog.len();
        Ok(Box::new(MemoryTransaction {
            store_id: self.store_id,
            open: Arc::clone(&self.open),
            fail_commits: Arc::clone(&self.fail_commits),
            inner: Arc::clone(&self.inner),
            snapshot_end,
            writes: Vec::new(),
        }))
    }

    fn backup(&self, dir: &Path, mode: BackupMode) -> StorageResult<BackupInfo> {
        self.ensure_open()?;

        let store_dir = PathBuf::from(format!("store-{}", self.store_id));
        let target = dir.join(&store_dir);
        fs::create_dir_all(&target).map_err(|e| {
            StorageError::io_error(format!("failed to create {}", target.display()), e)
        })?;

        // Consistent image: hold the read lock while copying out.
        let image = {
            let inner = read_inner(&self.inner)?;
            BackupImage {
                store_id: self.store_id,
                binlog_pos: inner.next_txn_id,
                entries: inner
                    .data
                    .iter()
                    .map(|(k, v)| (STANDARD.encode(k), STANDARD.encode(v)))
                    .collect(),
            }
        };

        let data_rel = store_dir.join("data.json");
        let manifest_rel = store_dir.join("manifest.json");
        let data = serde_json::to_vec(&image)
            .map_err(|e| StorageError::commit_failed(format!("backup encode failed: {}", e)))?;
        write_synced(&dir.join(&data_rel), &data)?;

        let info = BackupInfo {
            backup_id: Uuid::new_v4(),
            store_id: self.store_id,
            binlog_pos: image.binlog_pos,
            files: vec![data_rel, manifest_rel.clone()],
            created_at: Utc::now(),
        };
        let manifest = serde_json::to_vec_pretty(&BackupManifest {
            info: &info,
            mode,
            entry_count: image.entries.len(),
        })
        .map_err(|e| StorageError::commit_failed(format!("manifest encode failed: {}", e)))?;
        write_synced(&dir.join(&manifest_rel), &manifest)?;

        Ok(info)
    }

    fn next_binlog_id(&self) -> u64 {
        self.inner
            .read()
            .map(|inner| inner.next_txn_id)
            .unwrap_or_else(|poisoned| poisoned.into_inner().next_txn_id)
    }
}

#[derive(Debug)]
enum PendingWrite {
    Set {
        key: Vec<u8>,
        value: Vec<u8>,
        timestamp: u32,
    },
    Del {
        key: Vec<u8>,
        timestamp: u32,
    },
}

struct MemoryTransaction {
    store_id: u32,
    open: Arc<AtomicBool>,
    fail_commits: Arc<AtomicBool>,
    inner: Arc<RwLock<MemoryInner>>,
    snapshot_end: usize,
    writes: Vec<PendingWrite>,
}

impl Transaction for MemoryTransaction {
    fn set_kv(&mut self, key: &[u8], value: &[u8], timestamp: u32) -> StorageResult<()> {
        self.writes.push(PendingWrite::Set {
            key: key.to_vec(),
            value: value.to_vec(),
            timestamp,
        });
        Ok(())
    }

    fn del_kv(&mut self, key: &[u8], timestamp: u32) -> StorageResult<()> {
        self.writes.push(PendingWrite::Del {
            key: key.to_vec(),
            timestamp,
        });
        Ok(())
    }

    fn commit(self: Box<Self>) -> StorageResult<u64> {
        let MemoryTransaction {
            store_id,
            open,
            fail_commits,
            inner: shared,
            writes,
            ..
        } = *self;

        if !open.load(Ordering::SeqCst) {
            return Err(StorageError::store_closed(store_id));
        }
        if fail_commits.load(Ordering::SeqCst) {
            return Err(StorageError::commit_failed("injected commit failure")
                .with_details(format!("store_id: {}", store_id)));
        }

        let mut inner = write_inner(&shared)?;
        if writes.is_empty() {
            return Ok(inner.next_txn_id.saturating_sub(1));
        }

        let count = writes.len();
        let last_local = u16::try_from(count - 1).map_err(|_| {
            StorageError::commit_failed(format!(
                "transaction has {} writes, at most {} fit in one group",
                count,
                usize::from(u16::MAX) + 1
            ))
            .with_details(format!("store_id: {}", store_id))
        })?;

        let txn_id = inner.next_txn_id;
        inner.next_txn_id += 1;
        let now = Utc::now().timestamp() as u32;

        for (local_id, write) in (0..=last_local).zip(writes) {
            let flag = ReplFlag::for_position(usize::from(local_id), count);
            let (timestamp, value) = match write {
                PendingWrite::Set {
                    key,
                    value,
                    timestamp,
                } => {
                    inner.data.insert(key.clone(), value.clone());
                    (timestamp, ReplLogValue::set(key, value))
                }
                PendingWrite::Del { key, timestamp } => {
                    inner.data.remove(&key);
                    (timestamp, ReplLogValue::del(key))
                }
            };
            let timestamp = if timestamp == 0 { now } else { timestamp };
            let key = ReplLogKey::new(txn_id, local_id, flag, timestamp);
            inner.binlog.push(ReplLog::new(key, value));
        }

        Ok(txn_id)
    }

    fn create_binlog_cursor(&self, start: u64) -> Box<dyn BinlogCursor> {
        let pos = self
            .inner
            .read()
            .map(|inner| inner.binlog[..self.snapshot_end].partition_point(|l| l.txn_id() < start))
            .unwrap_or(self.snapshot_end);
        Box::new(MemoryBinlogCursor {
            inner: Arc::clone(&self.inner),
            pos,
            end: self.snapshot_end,
        })
    }
}

struct MemoryBinlogCursor {
    inner: Arc<RwLock<MemoryInner>>,
    pos: usize,
    end: usize,
}

impl BinlogCursor for MemoryBinlogCursor {
    fn next(&mut self) -> BinlogResult<ReplLog> {
        if self.pos >= self.end {
            return Err(BinlogError::Exhausted);
        }
        let inner = self
            .inner
            .read()
            .map_err(|_| BinlogError::Read("store state lock poisoned".to_string()))?;
        let log = inner
            .binlog
            .get(self.pos)
            .cloned()
            .ok_or_else(|| BinlogError::Read(format!("binlog index {} missing", self.pos)))?;
        self.pos += 1;
        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit_sets(store: &MemoryKvStore, keys: &[&str]) -> u64 {
        let mut txn = store.create_transaction().unwrap();
        for key in keys {
            txn.set_kv(key.as_bytes(), b"v", 0).unwrap();
        }
        txn.commit().unwrap()
    }

    fn drain(cursor: &mut dyn BinlogCursor) -> Vec<ReplLog> {
        let mut out = Vec::new();
        loop {
            match cursor.next() {
                Ok(log) => out.push(log),
                Err(e) => {
                    assert!(e.is_exhausted());
                    return out;
                }
            }
        }
    }

    #[test]
    fn test_commit_emits_flagged_group() {
        let store = MemoryKvStore::starting_at(0, 5);
        assert_eq!(commit_sets(&store, &["a", "b", "c"]), 5);

        let txn = store.create_transaction().unwrap();
        let logs = drain(txn.create_binlog_cursor(0).as_mut());
        assert_eq!(logs.len(), 3);
        assert!(logs.iter().all(|l| l.txn_id() == 5));
        assert_eq!(logs[0].repl_log_key().flag(), ReplFlag::GROUP_START);
        assert_eq!(logs[1].repl_log_key().flag(), ReplFlag::GROUP_MID);
        assert_eq!(logs[2].repl_log_key().flag(), ReplFlag::GROUP_END);
        assert_eq!(logs[2].repl_log_key().local_id(), 2);
    }

    #[test]
    fn test_cursor_starts_at_first_id_at_or_after_start() {
        let store = MemoryKvStore::new(0);
        commit_sets(&store, &["a"]);
        commit_sets(&store, &["b"]);
        commit_sets(&store, &["c"]);

        let txn = store.create_transaction().unwrap();
        let logs = drain(txn.create_binlog_cursor(2).as_mut());
        let ids: Vec<u64> = logs.iter().map(ReplLog::txn_id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_cursor_sees_snapshot_only() {
        let store = MemoryKvStore::new(0);
        commit_sets(&store, &["a"]);
        let reader = store.create_transaction().unwrap();
        commit_sets(&store, &["b"]);

        let logs = drain(reader.create_binlog_cursor(0).as_mut());
        assert_eq!(logs.len(), 1);
    }

    #[test]
    fn test_abandoned_transaction_leaves_no_trace() {
        let store = MemoryKvStore::new(0);
        {
            let mut txn = store.create_transaction().unwrap();
            txn.set_kv(b"k", b"v", 0).unwrap();
        }
        assert!(store.is_empty().unwrap());
        assert_eq!(store.binlog_len().unwrap(), 0);
        assert_eq!(store.next_binlog_id(), 1);
    }

    #[test]
    fn test_delete_removes_key() {
        let store = MemoryKvStore::new(0);
        commit_sets(&store, &["k"]);
        let mut txn = store.create_transaction().unwrap();
        txn.del_kv(b"k", 7).unwrap();
        txn.commit().unwrap();
        assert_eq!(store.get(b"k").unwrap(), None);
    }

    #[test]
    fn test_closed_store_rejects_transactions() {
        let store = MemoryKvStore::new(4);
        store.close();
        assert!(store.create_transaction().is_err());
        store.reopen();
        assert!(store.create_transaction().is_ok());
    }

    #[test]
    fn test_injected_commit_failure() {
        let store = MemoryKvStore::new(0);
        store.inject_commit_failure(true);
        let mut txn = store.create_transaction().unwrap();
        txn.set_kv(b"k", b"v", 0).unwrap();
        assert!(txn.commit().is_err());
        assert!(store.is_empty().unwrap());
    }

    /// One group holds at most 65,536 records; a larger commit writes nothing.
    #[test]
    fn test_oversized_commit_fails_before_writing() {
        let store = MemoryKvStore::starting_at(0, 3);
        let mut txn = store.create_transaction().unwrap();
        for i in 0..=u32::from(u16::MAX) + 1 {
            txn.set_kv(&i.to_be_bytes(), b"v", 0).unwrap();
        }

        let err = txn.commit().unwrap_err();
        assert_eq!(err.code(), crate::storage::StorageErrorCode::CommitFailed);
        assert!(store.is_empty().unwrap());
        assert_eq!(store.next_binlog_id(), 3);

        let mut txn = store.create_transaction().unwrap();
        for i in 0..=u32::from(u16::MAX) {
            txn.set_kv(&i.to_be_bytes(), b"v", 0).unwrap();
        }
        assert_eq!(txn.commit().unwrap(), 3);
        let txn = store.create_transaction().unwrap();
        let logs = drain(txn.create_binlog_cursor(0).as_mut());
        assert_eq!(logs.len(), 65_536);
        assert_eq!(logs.last().unwrap().repl_log_key().local_id(), u16::MAX);
    }

    #[test]
    fn test_backup_writes_data_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryKvStore::new(2);
        commit_sets(&store, &["a", "b"]);

        let info = store.backup(dir.path(), BackupMode::Copy).unwrap();
        assert_eq!(info.store_id, 2);
        assert_eq!(info.binlog_pos, 2);
        for file in &info.files {
            assert!(dir.path().join(file).exists());
        }

        let raw = fs::read(dir.path().join("store-2").join("data.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(parsed["entries"].as_array().unwrap().len(), 2);
    }
}
