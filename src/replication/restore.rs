//! Replay of decoded binlog records into a transaction
//!
//! `restore_binlogs` is the out-of-band path: one logical transaction per
//! call, replayed with timestamp 0 and committed once. It does not touch
//! the coordinator's applied-position bookkeeping.

use crate::binlog::{ReplLog, ReplOp};
use crate::storage::{RecordKey, RecordValue, Transaction};

use super::errors::{ReplicationError, ReplicationResult};

/// Replay one record into `txn`, re-encoding key and value through the
/// record codec so malformed payloads are rejected before they are written.
pub fn replay_log(txn: &mut dyn Transaction, log: &ReplLog, timestamp: u32) -> ReplicationResult<()> {
    let value = log.repl_log_value();
    let record_key = RecordKey::decode(value.op_key())
        .map_err(|e| ReplicationError::decode(e.message().to_string()))?;

    match value.op() {
        ReplOp::Set => {
            let record_value = RecordValue::decode(value.op_value())
                .map_err(|e| ReplicationError::decode(e.message().to_string()))?;
            txn.set_kv(&record_key.encode(), &record_value.encode(), timestamp)?;
        }
        ReplOp::Del => {
            txn.del_kv(&record_key.encode(), timestamp)?;
        }
    }
    Ok(())
}

/// The txn id shared by every record, or an error if ids are mixed.
pub fn uniform_txn_id(logs: &[ReplLog]) -> ReplicationResult<u64> {
    let first = logs
        .first()
        .ok_or_else(|| ReplicationError::invalid_argument("no binlog to restore"))?
        .txn_id();
    if logs.iter().any(|log| log.txn_id() != first) {
        return Err(ReplicationError::invalid_argument("txn id not all the same"));
    }
    Ok(first)
}

/// Replay `logs` into `txn` in order and commit once.
///
/// Any replay failure drops `txn` uncommitted. Returns the commit id.
pub fn restore_binlogs(mut txn: Box<dyn Transaction>, logs: &[ReplLog]) -> ReplicationResult<u64> {
    uniform_txn_id(logs)?;
    for log in logs {
        replay_log(txn.as_mut(), log, 0)?;
    }
    Ok(txn.commit()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binlog::{ReplFlag, ReplLogKey, ReplLogValue};
    use crate::replication::errors::ReplicationErrorKind;
    use crate::storage::{KvStore, MemoryKvStore, RecordType};

    fn record_key(pk: &str) -> Vec<u8> {
        RecordKey::new(0, RecordType::Kv, pk.as_bytes().to_vec(), Vec::new()).encode()
    }

    fn set(txn_id: u64, local_id: u16, pk: &str, value: &str) -> ReplLog {
        ReplLog::new(
            ReplLogKey::new(txn_id, local_id, ReplFlag::GROUP_MID, 1_700_000_000),
            ReplLogValue::set(record_key(pk), RecordValue::new(value, 0).encode()),
        )
    }

    fn del(txn_id: u64, local_id: u16, pk: &str) -> ReplLog {
        ReplLog::new(
            ReplLogKey::new(txn_id, local_id, ReplFlag::GROUP_MID, 1_700_000_000),
            ReplLogValue::del(record_key(pk)),
        )
    }

    #[test]
    fn test_restore_replays_and_commits_once() {
        let store = MemoryKvStore::new(0);
        let logs = vec![set(40, 0, "a", "1"), set(40, 1, "b", "2"), del(40, 2, "a")];

        let txn = store.create_transaction().unwrap();
        restore_binlogs(txn, &logs).unwrap();

        assert_eq!(store.get(&record_key("a")).unwrap(), None);
        let stored = store.get(&record_key("b")).unwrap().unwrap();
        assert_eq!(RecordValue::decode(&stored).unwrap().value(), b"2");
        assert_eq!(store.next_binlog_id(), 2);
    }

    #[test]
    fn test_mixed_txn_ids_write_nothing() {
        let store = MemoryKvStore::new(0);
        let logs = vec![set(1, 0, "a", "1"), set(2, 0, "b", "2")];

        let txn = store.create_transaction().unwrap();
        let err = restore_binlogs(txn, &logs).unwrap_err();
        assert_eq!(err.kind, ReplicationErrorKind::InvalidArgument);
        assert!(store.is_empty().unwrap());
        assert_eq!(store.binlog_len().unwrap(), 0);
    }

    #[test]
    fn test_bad_record_value_aborts_without_commit() {
        let store = MemoryKvStore::new(0);
        let bad = ReplLog::new(
            ReplLogKey::new(3, 1, ReplFlag::GROUP_END, 0),
            ReplLogValue::set(record_key("b"), b"garbage".to_vec()),
        );
        let logs = vec![set(3, 0, "a", "1"), bad];

        let txn = store.create_transaction().unwrap();
        let err = restore_binlogs(txn, &logs).unwrap_err();
        assert_eq!(err.kind, ReplicationErrorKind::Decode);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_commit_failure_surfaces_as_storage_error() {
        let store = MemoryKvStore::new(0);
        store.inject_commit_failure(true);

        let txn = store.create_transaction().unwrap();
        let err = restore_binlogs(txn, &[set(1, 0, "a", "1")]).unwrap_err();
        assert_eq!(err.kind, ReplicationErrorKind::Storage);
    }
}
