//! Command error types
//!
//! Error codes:
//! - PARSE_OPT, PARSE_PKT, INVALID_ARGUMENT, WRONG_ARITY, UNKNOWN_COMMAND:
//!   malformed requests, no state change (ERROR)
//! - STORE_NOT_OPEN, DECODE, INTERNAL: lookup, payload and storage failures,
//!   no partial commit (ERROR)
//! - PROTOCOL_INTEGRITY, UNREACHABLE_COMMAND: the session that sent the
//!   request is terminated (FATAL)

use std::fmt;

use crate::binlog::BinlogError;
use crate::replication::{ReplicationError, ReplicationErrorKind};
use crate::segment::SegmentError;
use crate::storage::{StorageError, StorageErrorCode};

/// Severity levels for command errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Request fails, session continues
    Error,
    /// Session is torn down
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

/// Command error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandErrorCode {
    /// Option or argument value could not be parsed
    ParseOpt,
    /// Argument shape rejected while parsing a packet
    ParsePkt,
    /// Argument parsed but unusable
    InvalidArgument,
    /// Target store is closed
    StoreNotOpen,
    /// Binlog or record payload failed to decode
    Decode,
    /// Storage or coordinator failure
    Internal,
    /// Peer stream broke its group framing
    ProtocolIntegrity,
    /// Placeholder command invoked as a request
    UnreachableCommand,
    /// No command with that name
    UnknownCommand,
    /// Argument count does not match the command's arity
    WrongArity,
}

impl CommandErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            CommandErrorCode::ParseOpt => "PARSE_OPT",
            CommandErrorCode::ParsePkt => "PARSE_PKT",
            CommandErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            CommandErrorCode::StoreNotOpen => "STORE_NOT_OPEN",
            CommandErrorCode::Decode => "DECODE",
            CommandErrorCode::Internal => "INTERNAL",
            CommandErrorCode::ProtocolIntegrity => "PROTOCOL_INTEGRITY",
            CommandErrorCode::UnreachableCommand => "UNREACHABLE_COMMAND",
            CommandErrorCode::UnknownCommand => "UNKNOWN_COMMAND",
            CommandErrorCode::WrongArity => "WRONG_ARITY",
        }
    }

    /// Returns the severity level for this code
    pub fn severity(&self) -> Severity {
        match self {
            CommandErrorCode::ProtocolIntegrity | CommandErrorCode::UnreachableCommand => {
                Severity::Fatal
            }
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for CommandErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Error returned to the client for a failed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandError {
    code: CommandErrorCode,
    message: String,
}

impl CommandError {
    /// Create an error with an explicit code
    pub fn new(code: CommandErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn parse_opt(message: impl Into<String>) -> Self {
        Self::new(CommandErrorCode::ParseOpt, message)
    }

    pub fn parse_pkt(message: impl Into<String>) -> Self {
        Self::new(CommandErrorCode::ParsePkt, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(CommandErrorCode::InvalidArgument, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(CommandErrorCode::Internal, message)
    }

    pub fn protocol_integrity(message: impl Into<String>) -> Self {
        Self::new(CommandErrorCode::ProtocolIntegrity, message)
    }

    /// Placeholder command reached through request dispatch
    pub fn unreachable_command(name: &str) -> Self {
        Self::new(
            CommandErrorCode::UnreachableCommand,
            format!("{} should not be called", name),
        )
    }

    pub fn unknown_command(name: &str) -> Self {
        Self::new(
            CommandErrorCode::UnknownCommand,
            format!("unknown command '{}'", name),
        )
    }

    pub fn wrong_arity(name: &str) -> Self {
        Self::new(
            CommandErrorCode::WrongArity,
            format!("wrong number of arguments for '{}' command", name),
        )
    }

    /// Returns the error code
    pub fn code(&self) -> CommandErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Whether the session that received this error must be terminated
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )
    }
}

impl std::error::Error for CommandError {}

impl From<SegmentError> for CommandError {
    fn from(err: SegmentError) -> Self {
        match err {
            SegmentError::InvalidStoreId { .. } => Self::invalid_argument(err.to_string()),
            SegmentError::StoreNotOpen(_) => {
                Self::new(CommandErrorCode::StoreNotOpen, err.to_string())
            }
        }
    }
}

impl From<StorageError> for CommandError {
    fn from(err: StorageError) -> Self {
        let code = match err.code() {
            StorageErrorCode::StoreClosed => CommandErrorCode::StoreNotOpen,
            StorageErrorCode::RecordDecodeFailed | StorageErrorCode::DataCorruption => {
                CommandErrorCode::Decode
            }
            StorageErrorCode::StorageIoError | StorageErrorCode::CommitFailed => {
                CommandErrorCode::Internal
            }
        };
        Self::new(code, err.to_string())
    }
}

impl From<BinlogError> for CommandError {
    fn from(err: BinlogError) -> Self {
        match err {
            BinlogError::Read(_) | BinlogError::Exhausted => Self::internal(err.to_string()),
            _ => Self::new(CommandErrorCode::Decode, err.to_string()),
        }
    }
}

impl From<ReplicationError> for CommandError {
    fn from(err: ReplicationError) -> Self {
        let code = match err.kind {
            ReplicationErrorKind::ProtocolIntegrity => CommandErrorCode::ProtocolIntegrity,
            ReplicationErrorKind::InvalidArgument => CommandErrorCode::ParseOpt,
            ReplicationErrorKind::Decode => CommandErrorCode::Decode,
            ReplicationErrorKind::LinkBroken
            | ReplicationErrorKind::SessionMismatch
            | ReplicationErrorKind::Storage => CommandErrorCode::Internal,
        };
        Self::new(code, err.message)
    }
}

/// Result type for command execution
pub type CommandResult<T> = Result<T, CommandError>;
