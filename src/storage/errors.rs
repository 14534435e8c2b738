//! Storage error types
//!
//! Error codes:
//! - SHARD_STORAGE_IO_ERROR (ERROR severity)
//! - SHARD_STORAGE_COMMIT_FAILED (ERROR severity)
//! - SHARD_STORAGE_CLOSED (ERROR severity)
//! - SHARD_RECORD_DECODE_FAILED (ERROR severity)
//! - SHARD_DATA_CORRUPTION (FATAL severity)

use std::fmt;
use std::io;

/// Severity levels for storage errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, server continues
    Error,
    /// The store can no longer be trusted
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Storage-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorCode {
    /// Disk I/O failure (backup)
    StorageIoError,
    /// Transaction commit rejected
    CommitFailed,
    /// Store is closed
    StoreClosed,
    /// Encoded record key/value could not be parsed
    RecordDecodeFailed,
    /// Stored bytes fail integrity checks
    DataCorruption,
}

impl StorageErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            StorageErrorCode::StorageIoError => "SHARD_STORAGE_IO_ERROR",
            StorageErrorCode::CommitFailed => "SHARD_STORAGE_COMMIT_FAILED",
            StorageErrorCode::StoreClosed => "SHARD_STORAGE_CLOSED",
            StorageErrorCode::RecordDecodeFailed => "SHARD_RECORD_DECODE_FAILED",
            StorageErrorCode::DataCorruption => "SHARD_DATA_CORRUPTION",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            StorageErrorCode::DataCorruption => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for StorageErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Storage error with code, message and optional context
#[derive(Debug)]
pub struct StorageError {
    code: StorageErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl StorageError {
    fn new(code: StorageErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Disk I/O failure
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            source: Some(source),
            ..Self::new(StorageErrorCode::StorageIoError, message)
        }
    }

    /// Commit rejected by the engine
    pub fn commit_failed(message: impl Into<String>) -> Self {
        Self::new(StorageErrorCode::CommitFailed, message)
    }

    /// Operation on a closed store
    pub fn store_closed(store_id: u32) -> Self {
        Self {
            details: Some(format!("store_id: {}", store_id)),
            ..Self::new(StorageErrorCode::StoreClosed, "store is not open")
        }
    }

    /// Malformed encoded record
    pub fn record_decode(message: impl Into<String>) -> Self {
        Self::new(StorageErrorCode::RecordDecodeFailed, message)
    }

    /// Integrity failure on stored bytes
    pub fn data_corruption(message: impl Into<String>) -> Self {
        Self::new(StorageErrorCode::DataCorruption, message)
    }

    /// Attach context details
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Returns the error code
    pub fn code(&self) -> StorageErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether this error is fatal
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
