//! Observability for the replication layer
//!
//! - Structured logging (JSON lines on stderr)
//! - Counter metrics
//! - Typed lifecycle events
//!
//! Observability is read-only: nothing here influences a command's outcome,
//! and a failed log write is dropped rather than reported.
//!
//! ```ignore
//! use shardrepl::observability::{log_event_with_fields, Event, Logger};
//!
//! Logger::info("BINLOG_PULL", &[("store_id", "3")]);
//! log_event_with_fields(Event::ReplSourceChanged, &[("store_id", "3")]);
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::{ObservationScope, Timer};

fn severity_of(event: Event) -> Severity {
    if event.is_fatal() {
        Severity::Fatal
    } else {
        Severity::Info
    }
}

/// Log a lifecycle event
pub fn log_event(event: Event) {
    Logger::log(severity_of(event), event.as_str(), &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(severity_of(event), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_events_log_at_fatal() {
        assert_eq!(severity_of(Event::SessionTerminated), Severity::Fatal);
        assert_eq!(severity_of(Event::BinlogsPulled), Severity::Info);
    }

    #[test]
    fn test_log_event_with_fields() {
        log_event(Event::BootStart);
        log_event_with_fields(Event::ConfigLoaded, &[("data_dir", "/tmp/test")]);
    }
}
