//! Replication log record types and their wire encoding
//!
//! A record travels as exactly two opaque byte strings.
//!
//! Key bytes (16, big-endian so that byte order is `(txn_id, local_id)` order):
//! - Txn Id (u64)
//! - Local Id (u16): position of the record inside its group
//! - Flag (u16): GROUP_START / GROUP_END bits
//! - Timestamp (u32): commit time of the originating transaction
//!
//! Value bytes:
//! - Op (u8): SET / DEL
//! - Op Key Length (u32 LE) + Op Key
//! - Op Value Length (u32 LE) + Op Value (empty for DEL)
//!
//! No compression or versioning happens at this layer.

use std::fmt;
use std::ops::BitOr;

use super::errors::{BinlogError, BinlogResult};

/// Encoded length of a [`ReplLogKey`].
pub const REPL_LOG_KEY_LEN: usize = 8 + 2 + 2 + 4;

/// Group boundary flags carried by every record.
///
/// All records of one logical transaction share a txn id; the first carries
/// `GROUP_START`, the last `GROUP_END`. A single-record transaction carries both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ReplFlag(u16);

impl ReplFlag {
    /// Record inside a group, neither first nor last
    pub const GROUP_MID: ReplFlag = ReplFlag(0);
    /// First record of a group
    pub const GROUP_START: ReplFlag = ReplFlag(1);
    /// Last record of a group
    pub const GROUP_END: ReplFlag = ReplFlag(1 << 1);

    const ALL: u16 = Self::GROUP_START.0 | Self::GROUP_END.0;

    /// Build from raw bits, rejecting undefined bits.
    pub fn from_bits(bits: u16) -> BinlogResult<Self> {
        if bits & !Self::ALL != 0 {
            return Err(BinlogError::InvalidFlag(bits));
        }
        Ok(ReplFlag(bits))
    }

    /// Raw bit representation
    pub fn bits(self) -> u16 {
        self.0
    }

    /// True if every bit of `other` is set in `self`
    pub fn contains(self, other: ReplFlag) -> bool {
        self.0 & other.0 == other.0
    }

    /// Flag for the record at `index` of a group of `len` records.
    pub fn for_position(index: usize, len: usize) -> Self {
        let mut flag = Self::GROUP_MID;
        if index == 0 {
            flag = flag | Self::GROUP_START;
        }
        if index + 1 == len {
            flag = flag | Self::GROUP_END;
        }
        flag
    }
}

impl BitOr for ReplFlag {
    type Output = ReplFlag;

    fn bitor(self, rhs: ReplFlag) -> ReplFlag {
        ReplFlag(self.0 | rhs.0)
    }
}

/// Mutation carried by a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReplOp {
    /// Write `op_key` = `op_value`
    Set = 1,
    /// Delete `op_key`
    Del = 2,
}

impl ReplOp {
    /// Convert from u8
    pub fn from_u8(value: u8) -> BinlogResult<Self> {
        match value {
            1 => Ok(ReplOp::Set),
            2 => Ok(ReplOp::Del),
            other => Err(BinlogError::InvalidOp(other)),
        }
    }

    /// Convert to u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ReplOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplOp::Set => write!(f, "SET"),
            ReplOp::Del => write!(f, "DEL"),
        }
    }
}

/// Key half of a replication record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReplLogKey {
    txn_id: u64,
    local_id: u16,
    flag: ReplFlag,
    timestamp: u32,
}

impl ReplLogKey {
    /// Create a new key
    pub fn new(txn_id: u64, local_id: u16, flag: ReplFlag, timestamp: u32) -> Self {
        Self {
            txn_id,
            local_id,
            flag,
            timestamp,
        }
    }

    /// Shard-relative transaction sequence id
    pub fn txn_id(&self) -> u64 {
        self.txn_id
    }

    /// Position inside the group
    pub fn local_id(&self) -> u16 {
        self.local_id
    }

    /// Group boundary flags
    pub fn flag(&self) -> ReplFlag {
        self.flag
    }

    /// Commit timestamp of the originating transaction
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Serialize to the fixed 16-byte layout
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(REPL_LOG_KEY_LEN);
        buf.extend_from_slice(&self.txn_id.to_be_bytes());
        buf.extend_from_slice(&self.local_id.to_be_bytes());
        buf.extend_from_slice(&self.flag.bits().to_be_bytes());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf
    }

    /// Deserialize from key bytes
    pub fn decode(data: &[u8]) -> BinlogResult<Self> {
        if data.len() < REPL_LOG_KEY_LEN {
            return Err(BinlogError::Truncated {
                part: "key",
                needed: REPL_LOG_KEY_LEN,
                available: data.len(),
            });
        }
        if data.len() > REPL_LOG_KEY_LEN {
            return Err(BinlogError::TrailingBytes {
                part: "key",
                count: data.len() - REPL_LOG_KEY_LEN,
            });
        }

        let mut txn = [0u8; 8];
        txn.copy_from_slice(&data[0..8]);
        let local_id = u16::from_be_bytes([data[8], data[9]]);
        let flag = ReplFlag::from_bits(u16::from_be_bytes([data[10], data[11]]))?;
        let timestamp = u32::from_be_bytes([data[12], data[13], data[14], data[15]]);

        Ok(Self {
            txn_id: u64::from_be_bytes(txn),
            local_id,
            flag,
            timestamp,
        })
    }
}

/// Value half of a replication record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplLogValue {
    op: ReplOp,
    op_key: Vec<u8>,
    op_value: Vec<u8>,
}

impl ReplLogValue {
    /// A SET of `op_key` to `op_value`
    pub fn set(op_key: Vec<u8>, op_value: Vec<u8>) -> Self {
        Self {
            op: ReplOp::Set,
            op_key,
            op_value,
        }
    }

    /// A DEL of `op_key`
    pub fn del(op_key: Vec<u8>) -> Self {
        Self {
            op: ReplOp::Del,
            op_key,
            op_value: Vec::new(),
        }
    }

    /// Operation tag
    pub fn op(&self) -> ReplOp {
        self.op
    }

    /// Encoded storage key targeted by the operation
    pub fn op_key(&self) -> &[u8] {
        &self.op_key
    }

    /// Encoded storage value (empty for DEL)
    pub fn op_value(&self) -> &[u8] {
        &self.op_value
    }

    /// Serialize to value bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + 4 + self.op_key.len() + 4 + self.op_value.len());
        buf.push(self.op.as_u8());
        buf.extend_from_slice(&(self.op_key.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.op_key);
        buf.extend_from_slice(&(self.op_value.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.op_value);
        buf
    }

    /// Deserialize from value bytes
    pub fn decode(data: &[u8]) -> BinlogResult<Self> {
        let mut reader = SliceReader::new(data);
        let op = ReplOp::from_u8(reader.read_u8()?)?;
        let op_key = reader.read_len_prefixed()?;
        let op_value = reader.read_len_prefixed()?;
        reader.finish()?;

        Ok(Self {
            op,
            op_key,
            op_value,
        })
    }
}

/// One physical replication record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplLog {
    key: ReplLogKey,
    value: ReplLogValue,
}

impl ReplLog {
    /// Pair a key with a value
    pub fn new(key: ReplLogKey, value: ReplLogValue) -> Self {
        Self { key, value }
    }

    /// Key half
    pub fn repl_log_key(&self) -> &ReplLogKey {
        &self.key
    }

    /// Value half
    pub fn repl_log_value(&self) -> &ReplLogValue {
        &self.value
    }

    /// Shortcut for `repl_log_key().txn_id()`
    pub fn txn_id(&self) -> u64 {
        self.key.txn_id
    }

    /// Encode into `(key_bytes, value_bytes)`
    pub fn encode(&self) -> (Vec<u8>, Vec<u8>) {
        (self.key.encode(), self.value.encode())
    }

    /// Decode from the two wire blobs
    pub fn decode(key: &[u8], value: &[u8]) -> BinlogResult<Self> {
        Ok(Self {
            key: ReplLogKey::decode(key)?,
            value: ReplLogValue::decode(value)?,
        })
    }
}

struct SliceReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> BinlogResult<&'a [u8]> {
        let available = self.data.len() - self.pos;
        if available < len {
            return Err(BinlogError::Truncated {
                part: "value",
                needed: len,
                available,
            });
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn read_u8(&mut self) -> BinlogResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_len_prefixed(&mut self) -> BinlogResult<Vec<u8>> {
        let len_bytes = self.take(4)?;
        let len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]);
        Ok(self.take(len as usize)?.to_vec())
    }

    fn finish(self) -> BinlogResult<()> {
        if self.pos != self.data.len() {
            return Err(BinlogError::TrailingBytes {
                part: "value",
                count: self.data.len() - self.pos,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(txn_id: u64, flag: ReplFlag) -> ReplLog {
        ReplLog::new(
            ReplLogKey::new(txn_id, 0, flag, 1_700_000_000),
            ReplLogValue::set(b"k".to_vec(), b"v".to_vec()),
        )
    }

    #[test]
    fn test_round_trip_set_and_del() {
        let set = sample(42, ReplFlag::GROUP_START | ReplFlag::GROUP_END);
        let (k, v) = set.encode();
        assert_eq!(ReplLog::decode(&k, &v).unwrap(), set);

        let del = ReplLog::new(
            ReplLogKey::new(43, 3, ReplFlag::GROUP_MID, 0),
            ReplLogValue::del(b"gone".to_vec()),
        );
        let (k, v) = del.encode();
        let decoded = ReplLog::decode(&k, &v).unwrap();
        assert_eq!(decoded.repl_log_value().op(), ReplOp::Del);
        assert!(decoded.repl_log_value().op_value().is_empty());
    }

    #[test]
    fn test_key_bytes_sort_by_txn_id() {
        let a = ReplLogKey::new(255, 0, ReplFlag::GROUP_START, 9).encode();
        let b = ReplLogKey::new(256, 0, ReplFlag::GROUP_START, 1).encode();
        assert!(a < b);
    }

    #[test]
    fn test_flag_for_position() {
        let single = ReplFlag::for_position(0, 1);
        assert!(single.contains(ReplFlag::GROUP_START));
        assert!(single.contains(ReplFlag::GROUP_END));

        assert_eq!(ReplFlag::for_position(0, 3), ReplFlag::GROUP_START);
        assert_eq!(ReplFlag::for_position(1, 3), ReplFlag::GROUP_MID);
        assert_eq!(ReplFlag::for_position(2, 3), ReplFlag::GROUP_END);
    }

    #[test]
    fn test_undefined_flag_bits_rejected() {
        let mut key = ReplLogKey::new(1, 0, ReplFlag::GROUP_START, 0).encode();
        key[11] = 0x80;
        assert_eq!(
            ReplLogKey::decode(&key),
            Err(BinlogError::InvalidFlag(0x80))
        );
    }

    #[test]
    fn test_short_key_is_truncated() {
        let err = ReplLogKey::decode(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, BinlogError::Truncated { part: "key", .. }));
    }

    #[test]
    fn test_invalid_op_rejected() {
        let mut value = ReplLogValue::del(b"x".to_vec()).encode();
        value[0] = 9;
        assert_eq!(ReplLogValue::decode(&value), Err(BinlogError::InvalidOp(9)));
    }

    #[test]
    fn test_value_trailing_bytes_rejected() {
        let mut value = ReplLogValue::set(b"k".to_vec(), b"v".to_vec()).encode();
        value.push(0);
        assert!(matches!(
            ReplLogValue::decode(&value),
            Err(BinlogError::TrailingBytes { part: "value", count: 1 })
        ));
    }

    #[test]
    fn test_value_length_overrun_is_truncated() {
        let mut value = ReplLogValue::set(b"k".to_vec(), b"v".to_vec()).encode();
        value.truncate(value.len() - 1);
        assert!(matches!(
            ReplLogValue::decode(&value),
            Err(BinlogError::Truncated { .. })
        ));
    }
}
