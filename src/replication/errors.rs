//! Replication error types
//!
//! - A broken group boundary in a peer stream is a protocol-integrity
//!   failure: fatal for the session that delivered it
//! - No automatic healing: a broken link stays broken until the source is
//!   rebound
//! - Everything else is an ordinary, recoverable command failure

use std::fmt;

use crate::binlog::BinlogError;
use crate::storage::StorageError;

/// Replication error type
#[derive(Debug, Clone)]
pub struct ReplicationError {
    /// Error kind
    pub kind: ReplicationErrorKind,
    /// Error message
    pub message: String,
}

/// Replication error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationErrorKind {
    /// Group missing its GROUP_START or GROUP_END marker
    ProtocolIntegrity,

    /// Store link marked broken; needs operator intervention
    LinkBroken,

    /// Batch arrived on a session the store is not pinned to
    SessionMismatch,

    /// Caller supplied an unusable argument (store index, mixed txn ids)
    InvalidArgument,

    /// Binlog or record payload failed to decode
    Decode,

    /// Storage engine failure (transaction, commit, cursor read)
    Storage,
}

impl ReplicationError {
    /// Create a new replication error.
    pub fn new(kind: ReplicationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a protocol-integrity error.
    pub fn protocol_integrity(message: impl Into<String>) -> Self {
        Self::new(ReplicationErrorKind::ProtocolIntegrity, message)
    }

    /// Create a broken-link error.
    pub fn link_broken(message: impl Into<String>) -> Self {
        Self::new(ReplicationErrorKind::LinkBroken, message)
    }

    /// Create a session mismatch error.
    pub fn session_mismatch(message: impl Into<String>) -> Self {
        Self::new(ReplicationErrorKind::SessionMismatch, message)
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ReplicationErrorKind::InvalidArgument, message)
    }

    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ReplicationErrorKind::Decode, message)
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ReplicationErrorKind::Storage, message)
    }

    /// Check if this error must terminate the delivering session.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, ReplicationErrorKind::ProtocolIntegrity)
    }
}

impl fmt::Display for ReplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReplicationError({:?}): {}", self.kind, self.message)
    }
}

impl std::error::Error for ReplicationError {}

impl From<StorageError> for ReplicationError {
    fn from(err: StorageError) -> Self {
        Self::storage(err.to_string())
    }
}

impl From<BinlogError> for ReplicationError {
    fn from(err: BinlogError) -> Self {
        match err {
            BinlogError::Read(msg) => Self::storage(msg),
            other => Self::decode(other.to_string()),
        }
    }
}

/// Result type for replication operations
pub type ReplicationResult<T> = Result<T, ReplicationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_integrity_failures_are_fatal() {
        assert!(ReplicationError::protocol_integrity("x").is_fatal());
        assert!(!ReplicationError::link_broken("x").is_fatal());
        assert!(!ReplicationError::session_mismatch("x").is_fatal());
        assert!(!ReplicationError::storage("x").is_fatal());
    }

    #[test]
    fn test_binlog_errors_map_by_cause() {
        let decode: ReplicationError = BinlogError::InvalidOp(9).into();
        assert_eq!(decode.kind, ReplicationErrorKind::Decode);
        assert!(decode.message.contains("invalid replop"));

        let read: ReplicationError = BinlogError::Read("io".into()).into();
        assert_eq!(read.kind, ReplicationErrorKind::Storage);
    }

    #[test]
    fn test_display_names_kind() {
        let err = ReplicationError::link_broken("store 3");
        assert_eq!(err.to_string(), "ReplicationError(LinkBroken): store 3");
    }
}
