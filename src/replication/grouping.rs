//! Replica-side reconstruction of logical transactions
//!
//! A flat batch of records is partitioned by txn id. Groups keep the order
//! in which their txn id was first seen, and records keep arrival order
//! inside a group. Nothing is sorted.

use std::collections::HashMap;

use crate::binlog::{ReplFlag, ReplLog};

use super::errors::{ReplicationError, ReplicationResult};

/// Records of one logical transaction, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinlogGroup {
    txn_id: u64,
    logs: Vec<ReplLog>,
}

impl BinlogGroup {
    /// Shared txn id of every record in the group
    pub fn txn_id(&self) -> u64 {
        self.txn_id
    }

    /// Records in arrival order; never empty
    pub fn logs(&self) -> &[ReplLog] {
        &self.logs
    }

    /// Number of physical records
    pub fn len(&self) -> usize {
        self.logs.len()
    }

    /// Always false for a group produced by `BinlogGroups`
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    fn check_boundaries(&self) -> ReplicationResult<()> {
        let (first, last) = match (self.logs.first(), self.logs.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Err(ReplicationError::protocol_integrity(format!(
                    "txnId:{} group is empty",
                    self.txn_id
                )))
            }
        };
        if !first.repl_log_key().flag().contains(ReplFlag::GROUP_START) {
            return Err(ReplicationError::protocol_integrity(format!(
                "txnId:{} first record not marked begin",
                self.txn_id
            )));
        }
        if !last.repl_log_key().flag().contains(ReplFlag::GROUP_END) {
            return Err(ReplicationError::protocol_integrity(format!(
                "txnId:{} last record not marked end",
                self.txn_id
            )));
        }
        Ok(())
    }
}

/// Order-preserving map from txn id to its group
#[derive(Debug, Clone, Default)]
pub struct BinlogGroups {
    groups: Vec<BinlogGroup>,
    index: HashMap<u64, usize>,
}

impl BinlogGroups {
    /// Empty grouping
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `log` to its txn's group, opening the group on first sight
    pub fn push(&mut self, log: ReplLog) {
        let txn_id = log.txn_id();
        match self.index.get(&txn_id) {
            Some(&slot) => self.groups[slot].logs.push(log),
            None => {
                self.index.insert(txn_id, self.groups.len());
                self.groups.push(BinlogGroup {
                    txn_id,
                    logs: vec![log],
                });
            }
        }
    }

    /// Number of groups
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total records across all groups
    pub fn record_count(&self) -> usize {
        self.groups.iter().map(BinlogGroup::len).sum()
    }

    /// Group for `txn_id`, if present
    pub fn get(&self, txn_id: u64) -> Option<&BinlogGroup> {
        self.index.get(&txn_id).map(|&slot| &self.groups[slot])
    }

    /// Groups in first-seen order
    pub fn iter(&self) -> std::slice::Iter<'_, BinlogGroup> {
        self.groups.iter()
    }

    /// Txn ids in first-seen order
    pub fn txn_ids(&self) -> Vec<u64> {
        self.groups.iter().map(BinlogGroup::txn_id).collect()
    }
}

impl<'a> IntoIterator for &'a BinlogGroups {
    type Item = &'a BinlogGroup;
    type IntoIter = std::slice::Iter<'a, BinlogGroup>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.iter()
    }
}

impl FromIterator<ReplLog> for BinlogGroups {
    fn from_iter<I: IntoIterator<Item = ReplLog>>(iter: I) -> Self {
        let mut groups = BinlogGroups::new();
        for log in iter {
            groups.push(log);
        }
        groups
    }
}

/// Partition `logs` by txn id, stable in both dimensions.
pub fn group_binlogs(logs: impl IntoIterator<Item = ReplLog>) -> BinlogGroups {
    logs.into_iter().collect()
}

/// Check every group's first record for GROUP_START and last for GROUP_END.
///
/// Returns the first violation found, in group order.
pub fn validate_groups(groups: &BinlogGroups) -> ReplicationResult<()> {
    groups.iter().try_for_each(BinlogGroup::check_boundaries)
}
