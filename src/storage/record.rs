//! On-disk record key/value format
//!
//! Binlog records carry storage keys and values as opaque bytes. Before a
//! replayed mutation reaches the engine, both are parsed with this codec so
//! that a malformed record surfaces as a decode error rather than garbage
//! in the keyspace.
//!
//! ```text
//! RecordKey:   db_id (u32 BE) | type (u8) | pk_len (u32 BE) | pk | sk
//! RecordValue: ttl (u64 LE) | value_len (u32 LE) | value | crc32 (u32 LE)
//! ```
//!
//! The value checksum covers every byte before it.

use super::checksum::compute_checksum;
use super::errors::{StorageError, StorageResult};

/// Kind of keyspace entry a record key addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum RecordType {
    /// Plain string value
    Kv = 1,
    /// Hash metadata
    HashMeta = 2,
    /// Hash field
    HashElement = 3,
    /// List metadata
    ListMeta = 4,
    /// List element
    ListElement = 5,
    /// Set metadata
    SetMeta = 6,
    /// Set member
    SetElement = 7,
}

impl RecordType {
    /// Convert from u8, returns None for unknown tags
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(RecordType::Kv),
            2 => Some(RecordType::HashMeta),
            3 => Some(RecordType::HashElement),
            4 => Some(RecordType::ListMeta),
            5 => Some(RecordType::ListElement),
            6 => Some(RecordType::SetMeta),
            7 => Some(RecordType::SetElement),
            _ => None,
        }
    }
}

/// Storage key of one keyspace entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    db_id: u32,
    record_type: RecordType,
    primary_key: Vec<u8>,
    secondary_key: Vec<u8>,
}

impl RecordKey {
    /// Create a new record key
    pub fn new(
        db_id: u32,
        record_type: RecordType,
        primary_key: impl Into<Vec<u8>>,
        secondary_key: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            db_id,
            record_type,
            primary_key: primary_key.into(),
            secondary_key: secondary_key.into(),
        }
    }

    /// Logical database index
    pub fn db_id(&self) -> u32 {
        self.db_id
    }

    /// Entry kind
    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    /// User-visible key
    pub fn primary_key(&self) -> &[u8] {
        &self.primary_key
    }

    /// Sub-key for element records (empty for metadata)
    pub fn secondary_key(&self) -> &[u8] {
        &self.secondary_key
    }

    /// Serialize to storage key bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut buf =
            Vec::with_capacity(4 + 1 + 4 + self.primary_key.len() + self.secondary_key.len());
        buf.extend_from_slice(&self.db_id.to_be_bytes());
        buf.push(self.record_type as u8);
        buf.extend_from_slice(&(self.primary_key.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.primary_key);
        buf.extend_from_slice(&self.secondary_key);
        buf
    }

    /// Deserialize from storage key bytes
    pub fn decode(data: &[u8]) -> StorageResult<Self> {
        const HEADER: usize = 4 + 1 + 4;
        if data.len() < HEADER {
            return Err(StorageError::record_decode(format!(
                "record key too short: {} bytes",
                data.len()
            )));
        }

        let db_id = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let record_type = RecordType::from_u8(data[4]).ok_or_else(|| {
            StorageError::record_decode(format!("invalid record type: {}", data[4]))
        })?;
        let pk_len = u32::from_be_bytes([data[5], data[6], data[7], data[8]]) as usize;
        if data.len() - HEADER < pk_len {
            return Err(StorageError::record_decode(format!(
                "record key primary key overruns buffer: pk_len {}, remaining {}",
                pk_len,
                data.len() - HEADER
            )));
        }

        Ok(Self {
            db_id,
            record_type,
            primary_key: data[HEADER..HEADER + pk_len].to_vec(),
            secondary_key: data[HEADER + pk_len..].to_vec(),
        })
    }
}

/// Storage value of one keyspace entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordValue {
    ttl: u64,
    value: Vec<u8>,
}

impl RecordValue {
    /// Create a new record value; `ttl` of 0 means no expiry
    pub fn new(value: impl Into<Vec<u8>>, ttl: u64) -> Self {
        Self {
            ttl,
            value: value.into(),
        }
    }

    /// Expiry in unix millis, 0 for none
    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    /// Payload bytes
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Serialize with trailing checksum
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + 4 + self.value.len() + 4);
        buf.extend_from_slice(&self.ttl.to_le_bytes());
        buf.extend_from_slice(&(self.value.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.value);
        let checksum = compute_checksum(&buf);
        buf.extend_from_slice(&checksum.to_le_bytes());
        buf
    }

    /// Deserialize, verifying the checksum
    pub fn decode(data: &[u8]) -> StorageResult<Self> {
        const MIN_LEN: usize = 8 + 4 + 4;
        if data.len() < MIN_LEN {
            return Err(StorageError::record_decode(format!(
                "record value too short: {} bytes",
                data.len()
            )));
        }

        let value_len = u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize;
        if data.len() != MIN_LEN + value_len {
            return Err(StorageError::record_decode(format!(
                "record value length mismatch: declared {}, buffer {}",
                value_len,
                data.len()
            )));
        }

        let checksum_offset = data.len() - 4;
        let stored = u32::from_le_bytes([
            data[checksum_offset],
            data[checksum_offset + 1],
            data[checksum_offset + 2],
            data[checksum_offset + 3],
        ]);
        let computed = compute_checksum(&data[..checksum_offset]);
        if computed != stored {
            return Err(StorageError::data_corruption(format!(
                "record value checksum mismatch: computed {:08x}, stored {:08x}",
                computed, stored
            )));
        }

        let mut ttl = [0u8; 8];
        ttl.copy_from_slice(&data[0..8]);

        Ok(Self {
            ttl: u64::from_le_bytes(ttl),
            value: data[12..checksum_offset].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageErrorCode;

    #[test]
    fn test_record_key_round_trip_with_secondary() {
        let key = RecordKey::new(3, RecordType::HashElement, b"user:1".to_vec(), b"name".to_vec());
        let decoded = RecordKey::decode(&key.encode()).unwrap();
        assert_eq!(decoded, key);
        assert_eq!(decoded.secondary_key(), b"name");
    }

    #[test]
    fn test_record_key_rejects_unknown_type() {
        let mut bytes = RecordKey::new(0, RecordType::Kv, b"a".to_vec(), Vec::new()).encode();
        bytes[4] = 200;
        let err = RecordKey::decode(&bytes).unwrap_err();
        assert_eq!(err.code(), StorageErrorCode::RecordDecodeFailed);
    }

    #[test]
    fn test_record_key_rejects_pk_overrun() {
        let mut bytes = RecordKey::new(0, RecordType::Kv, b"abc".to_vec(), Vec::new()).encode();
        bytes.truncate(bytes.len() - 1);
        assert!(RecordKey::decode(&bytes).is_err());
    }

    #[test]
    fn test_record_value_round_trip() {
        let value = RecordValue::new(b"payload".to_vec(), 1234);
        let decoded = RecordValue::decode(&value.encode()).unwrap();
        assert_eq!(decoded.ttl(), 1234);
        assert_eq!(decoded.value(), b"payload");
    }

    #[test]
    fn test_record_value_checksum_mismatch_is_corruption() {
        let mut bytes = RecordValue::new(b"payload".to_vec(), 0).encode();
        bytes[13] ^= 0xff;
        let err = RecordValue::decode(&bytes).unwrap_err();
        assert_eq!(err.code(), StorageErrorCode::DataCorruption);
    }

    #[test]
    fn test_record_value_rejects_garbage() {
        assert!(RecordValue::decode(b"nope").is_err());
    }
}
