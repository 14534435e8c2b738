//! Observable replication events
//!
//! Events are explicit and typed; the string form is what appears in the
//! `event` field of a log line.

use std::fmt;

/// Observable events in the replication layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Server startup begins
    BootStart,
    /// Stores opened, ready to serve
    BootComplete,
    /// Configuration loaded
    ConfigLoaded,
    /// Serving sessions
    Serving,
    /// Input closed, shutting down
    ShutdownComplete,

    // Source side
    /// A batch of binlogs handed to a replica
    BinlogsPulled,

    // Replica side
    /// Transaction groups committed from a replica link
    BinlogsApplied,
    /// Group duplicated an already-applied transaction and was skipped
    BinlogGroupSkipped,
    /// A single transaction reinstated from an external binlog
    BinlogRestored,
    /// Replication source rebound or cleared
    ReplSourceChanged,
    /// Incremental sync paused or resumed
    IncrSyncToggled,

    // Commands
    /// Command rejected with a non-fatal error
    CommandRejected,
    /// A replication batch broke its framing or grouping rules (FATAL)
    ProtocolIntegrityViolation,
    /// Session torn down after a fatal error (FATAL)
    SessionTerminated,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::BootStart => "SHARDREPL_STARTUP_BEGIN",
            Event::BootComplete => "SHARDREPL_STARTUP_COMPLETE",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::Serving => "SHARDREPL_SERVING",
            Event::ShutdownComplete => "SHUTDOWN_COMPLETE",

            Event::BinlogsPulled => "BINLOG_PULL",

            Event::BinlogsApplied => "BINLOG_APPLY",
            Event::BinlogGroupSkipped => "BINLOG_GROUP_SKIPPED",
            Event::BinlogRestored => "BINLOG_RESTORE",
            Event::ReplSourceChanged => "REPL_SOURCE_CHANGED",
            Event::IncrSyncToggled => "INCR_SYNC_TOGGLED",

            Event::CommandRejected => "COMMAND_REJECTED",
            Event::ProtocolIntegrityViolation => "PROTOCOL_INTEGRITY_VIOLATION",
            Event::SessionTerminated => "SESSION_TERMINATED",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Event::ProtocolIntegrityViolation | Event::SessionTerminated
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_events() {
        assert!(Event::ProtocolIntegrityViolation.is_fatal());
        assert!(Event::SessionTerminated.is_fatal());
        assert!(!Event::BinlogsApplied.is_fatal());
        assert!(!Event::CommandRejected.is_fatal());
    }

    #[test]
    fn test_event_names() {
        assert_eq!(Event::BinlogsPulled.as_str(), "BINLOG_PULL");
        assert_eq!(Event::ReplSourceChanged.to_string(), "REPL_SOURCE_CHANGED");
    }
}
