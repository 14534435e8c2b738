//! Replication commands
//!
//! ```text
//! backup dir
//! fullsync ...                                (placeholder, fatal)
//! toggleincrsync state
//! incrsync storeId dstStoreId binlogId        (placeholder, fatal)
//! pullbinlogs storeId startBinlogId
//! restorebinlog storeId k1 v1 [k2 v2 ...]
//! applybinlogs storeId [k0 v0 k1 v1 ...]
//! slaveof no one [storeId]
//! slaveof ip port [storeId sourceStoreId]
//! ```

use std::path::Path;
use std::sync::Arc;

use crate::binlog::ReplLog;
use crate::observability::{log_event_with_fields, Event, Logger, ObservationScope};
use crate::replication::{
    group_binlogs, pull_binlogs, restore_binlogs, uniform_txn_id, validate_groups,
};
use crate::segment::LockMode;
use crate::storage::BackupMode;

use super::errors::{CommandError, CommandResult};
use super::reply::Reply;
use super::server::ServerEntry;
use super::session::Session;
use super::Command;

fn decode_pairs(args: &[Vec<u8>]) -> CommandResult<Vec<ReplLog>> {
    args.chunks_exact(2)
        .map(|kv| ReplLog::decode(&kv[0], &kv[1]).map_err(CommandError::from))
        .collect()
}

fn store_index(server: &ServerEntry, store_id: u64) -> Option<u32> {
    if store_id < u64::from(server.kv_store_count()) {
        Some(store_id as u32)
    } else {
        None
    }
}

fn to_integer(value: u64) -> CommandResult<i64> {
    i64::try_from(value)
        .map_err(|_| CommandError::internal(format!("binlog id {} out of range", value)))
}

/// `backup dir`: copy-mode backup of every open store into `dir`
pub struct BackupCommand;

impl Command for BackupCommand {
    fn name(&self) -> &'static str {
        "backup"
    }

    fn arity(&self) -> i32 {
        2
    }

    fn run(&self, sess: &mut Session) -> CommandResult<Reply> {
        let dir = sess.arg_str(1)?.to_string();
        let server = Arc::clone(sess.server());
        let scope = ObservationScope::with_fields("BACKUP", vec![("dir", dir.clone())]);

        let mut backed_up = 0u64;
        for store_id in 0..server.kv_store_count() {
            let db = match server.segment_mgr().get_db(
                sess.id(),
                u64::from(store_id),
                LockMode::IntentShared,
                true,
            ) {
                Ok(db) => db,
                Err(e) => {
                    scope.fail(&e.to_string());
                    return Err(e.into());
                }
            };
            if !db.store.is_open() {
                continue;
            }
            if let Err(e) = db.store.backup(Path::new(&dir), BackupMode::Copy) {
                scope.fail(&e.to_string());
                return Err(e.into());
            }
            backed_up += 1;
        }

        server.metrics().add_backups(backed_up);
        scope.complete_with_fields(&[("stores", &backed_up.to_string())]);
        Ok(Reply::Ok)
    }
}

/// Full sync is driven by the session lifecycle, never by a request
pub struct FullSyncCommand;

impl Command for FullSyncCommand {
    fn name(&self) -> &'static str {
        "fullsync"
    }

    fn arity(&self) -> i32 {
        2
    }

    fn run(&self, _sess: &mut Session) -> CommandResult<Reply> {
        Err(CommandError::unreachable_command(self.name()))
    }
}

/// `toggleincrsync state`: 0 pauses incremental sync, anything else resumes
pub struct ToggleIncrSyncCommand;

impl Command for ToggleIncrSyncCommand {
    fn name(&self) -> &'static str {
        "toggleincrsync"
    }

    fn arity(&self) -> i32 {
        2
    }

    fn run(&self, sess: &mut Session) -> CommandResult<Reply> {
        let state = sess.arg_u64(1)?;
        sess.server().repl_mgr().toggle_pause_state(state == 0);
        Ok(Reply::Ok)
    }
}

/// Incremental sync is driven by the session lifecycle, never by a request
pub struct IncrSyncCommand;

impl Command for IncrSyncCommand {
    fn name(&self) -> &'static str {
        "incrsync"
    }

    fn arity(&self) -> i32 {
        4
    }

    fn run(&self, _sess: &mut Session) -> CommandResult<Reply> {
        Err(CommandError::unreachable_command(self.name()))
    }
}

/// `pullbinlogs storeId startBinlogId` -> `[nextBinlogId, [k0, v0, ...]]`
pub struct PullBinlogsCommand;

impl Command for PullBinlogsCommand {
    fn name(&self) -> &'static str {
        "pullbinlogs"
    }

    fn arity(&self) -> i32 {
        3
    }

    fn run(&self, sess: &mut Session) -> CommandResult<Reply> {
        let store_id = sess.arg_u64(1)?;
        let start = sess.arg_u64(2)?;
        let server = Arc::clone(sess.server());
        let store_id = store_index(&server, store_id)
            .ok_or_else(|| CommandError::parse_opt("invalid storeId"))?;
        // Replies carry binlog ids as signed integers.
        if i64::try_from(start).is_err() {
            return Err(CommandError::parse_opt(format!("binlog id {} out of range", start)));
        }

        let db = server.segment_mgr().get_db(
            sess.id(),
            u64::from(store_id),
            LockMode::IntentShared,
            false,
        )?;
        let txn = db.store.create_transaction()?;
        let batch = pull_binlogs(txn.as_ref(), start, server.options().pull_batch_size)?;

        server.metrics().record_pull(batch.logs.len() as u64);
        Logger::trace(
            Event::BinlogsPulled.as_str(),
            &[
                ("count", &batch.logs.len().to_string()),
                ("next_binlog_id", &batch.next_binlog_id.to_string()),
                ("start", &start.to_string()),
                ("store_id", &store_id.to_string()),
            ],
        );

        let mut payload = Vec::with_capacity(batch.logs.len() * 2);
        for log in &batch.logs {
            let (key, value) = log.encode();
            payload.push(Reply::Bulk(key));
            payload.push(Reply::Bulk(value));
        }
        Ok(Reply::Array(vec![
            Reply::Integer(to_integer(batch.next_binlog_id)?),
            Reply::Array(payload),
        ]))
    }
}

/// `restorebinlog storeId k1 v1 ...`: replay one captured transaction
pub struct RestoreBinlogCommand;

impl Command for RestoreBinlogCommand {
    fn name(&self) -> &'static str {
        "restorebinlog"
    }

    fn arity(&self) -> i32 {
        -4
    }

    fn run(&self, sess: &mut Session) -> CommandResult<Reply> {
        if sess.args().len() % 2 != 0 {
            return Err(CommandError::parse_opt("invalid param len"));
        }
        let store_id = sess.arg_u64(1)?;
        let server = Arc::clone(sess.server());
        let store_id = store_index(&server, store_id)
            .ok_or_else(|| CommandError::parse_opt("invalid storeid"))?;

        let logs = decode_pairs(&sess.args()[2..])?;
        let txn_id = uniform_txn_id(&logs)?;

        let db = server.segment_mgr().get_db(
            sess.id(),
            u64::from(store_id),
            LockMode::IntentExclusive,
            false,
        )?;
        let txn = db.store.create_transaction()?;
        let commit_id = restore_binlogs(txn, &logs)?;

        server.metrics().increment_restores();
        log_event_with_fields(
            Event::BinlogRestored,
            &[
                ("commit_id", &commit_id.to_string()),
                ("records", &logs.len().to_string()),
                ("store_id", &store_id.to_string()),
                ("txn_id", &txn_id.to_string()),
            ],
        );
        Ok(Reply::Ok)
    }
}

/// `applybinlogs storeId k0 v0 ...`: validated, grouped apply through the
/// replication coordinator
pub struct ApplyBinlogsCommand;

impl Command for ApplyBinlogsCommand {
    fn name(&self) -> &'static str {
        "applybinlogs"
    }

    fn arity(&self) -> i32 {
        -2
    }

    fn run(&self, sess: &mut Session) -> CommandResult<Reply> {
        let store_id = sess.arg_u64(1)?;
        let server = Arc::clone(sess.server());
        let store_id = store_index(&server, store_id)
            .ok_or_else(|| CommandError::parse_opt("invalid storeId"))?;
        if sess.args().len() % 2 != 0 {
            return Err(CommandError::parse_opt("invalid param len"));
        }

        let logs = decode_pairs(&sess.args()[2..])?;
        let record_count = logs.len();
        let groups = group_binlogs(logs);

        if let Err(e) = validate_groups(&groups) {
            server.metrics().increment_integrity_failures();
            log_event_with_fields(
                Event::ProtocolIntegrityViolation,
                &[
                    ("reason", &e.message),
                    ("session", &sess.id().to_string()),
                    ("store_id", &store_id.to_string()),
                ],
            );
            let _db = server.segment_mgr().get_db(
                sess.id(),
                u64::from(store_id),
                LockMode::IntentExclusive,
                true,
            )?;
            server
                .repl_mgr()
                .report_integrity_failure(store_id, sess.id(), &e.message)?;
            return Err(e.into());
        }

        let db = server.segment_mgr().get_db(
            sess.id(),
            u64::from(store_id),
            LockMode::IntentExclusive,
            false,
        )?;
        let outcome = server
            .repl_mgr()
            .apply_binlogs(db.store.as_ref(), sess.id(), &groups)?;

        server.metrics().record_apply(
            record_count as u64,
            outcome.applied as u64,
            outcome.skipped as u64,
        );
        log_event_with_fields(
            Event::BinlogsApplied,
            &[
                ("groups_applied", &outcome.applied.to_string()),
                ("groups_skipped", &outcome.skipped.to_string()),
                ("records", &record_count.to_string()),
                ("session", &sess.id().to_string()),
                ("store_id", &store_id.to_string()),
            ],
        );
        Ok(Reply::Ok)
    }
}

/// `slaveof`: bind, rebind or sever replication sources
pub struct SlaveofCommand;

impl SlaveofCommand {
    /// Apply `host:port` to every open store, mapping each to the same index
    /// on the peer. Stops at the first failing store.
    fn fan_out(sess: &Session, host: &str, port: u16) -> CommandResult<Reply> {
        let server = Arc::clone(sess.server());
        let mut changed = 0u64;
        for store_id in 0..server.kv_store_count() {
            let db = server.segment_mgr().get_db(
                sess.id(),
                u64::from(store_id),
                LockMode::Exclusive,
                true,
            )?;
            if !db.store.is_open() {
                continue;
            }
            server
                .repl_mgr()
                .change_repl_source(store_id, host, port, store_id)?;
            changed += 1;
        }
        server.metrics().add_source_changes(changed);
        Ok(Reply::Ok)
    }

    fn single(
        sess: &Session,
        store_id: u32,
        host: &str,
        port: u16,
        source_store_id: u32,
    ) -> CommandResult<Reply> {
        let server = Arc::clone(sess.server());
        let _db = server.segment_mgr().get_db(
            sess.id(),
            u64::from(store_id),
            LockMode::Exclusive,
            false,
        )?;
        server
            .repl_mgr()
            .change_repl_source(store_id, host, port, source_store_id)?;
        server.metrics().add_source_changes(1);
        Ok(Reply::Ok)
    }

    fn parse_pkt_u64(sess: &Session, index: usize) -> CommandResult<u64> {
        sess.arg_u64(index)
            .map_err(|e| CommandError::parse_pkt(e.message().to_string()))
    }

    fn parse_store(sess: &Session, index: usize) -> CommandResult<u32> {
        let store_id = Self::parse_pkt_u64(sess, index)?;
        store_index(sess.server(), store_id).ok_or_else(|| CommandError::parse_pkt("invalid storeId"))
    }

    fn run_no_one(sess: &Session) -> CommandResult<Reply> {
        match sess.args().len() {
            3 => Self::fan_out(sess, "", 0),
            4 => {
                let store_id = Self::parse_store(sess, 3)?;
                Self::single(sess, store_id, "", 0, 0)
            }
            _ => Err(CommandError::parse_pkt("bad argument num")),
        }
    }

    fn run_some_one(sess: &Session) -> CommandResult<Reply> {
        let host = sess.arg_str(1)?.to_string();
        let port = Self::parse_pkt_u64(sess, 2)?;
        let port = u16::try_from(port)
            .map_err(|_| CommandError::parse_pkt(format!("invalid port {}", port)))?;

        match sess.args().len() {
            3 => Self::fan_out(sess, &host, port),
            5 => {
                let store_id = Self::parse_store(sess, 3)?;
                let source_store_id = Self::parse_store(sess, 4)?;
                Self::single(sess, store_id, &host, port, source_store_id)
            }
            _ => Err(CommandError::parse_pkt("bad argument num")),
        }
    }
}

impl Command for SlaveofCommand {
    fn name(&self) -> &'static str {
        "slaveof"
    }

    fn arity(&self) -> i32 {
        -3
    }

    fn run(&self, sess: &mut Session) -> CommandResult<Reply> {
        let is_no_one = sess.arg_str(1)?.eq_ignore_ascii_case("no")
            && sess.arg_str(2)?.eq_ignore_ascii_case("one");
        if is_no_one {
            Self::run_no_one(sess)
        } else {
            Self::run_some_one(sess)
        }
    }
}
