//! Begin/complete logging around a multi-step operation
//!
//! `{name}_BEGIN` is logged on creation, `{name}_COMPLETE` or
//! `{name}_FAILED` when the operation settles, and `{name}_INCOMPLETE` if
//! the scope is dropped without either (an early `?` return).

use std::time::Instant;

use super::logger::{Logger, Severity};

/// Scope carrying the identifying fields of one operation
pub struct ObservationScope {
    name: &'static str,
    fields: Vec<(&'static str, String)>,
    settled: bool,
    timer: Timer,
}

impl ObservationScope {
    /// Open a scope and log `{name}_BEGIN`
    pub fn new(name: &'static str) -> Self {
        Self::with_fields(name, Vec::new())
    }

    /// Open a scope whose fields are repeated on every line it logs
    pub fn with_fields(name: &'static str, fields: Vec<(&'static str, String)>) -> Self {
        let scope = Self {
            name,
            fields,
            settled: false,
            timer: Timer::new(),
        };
        scope.emit(Severity::Info, "BEGIN", &[]);
        scope
    }

    fn emit(&self, severity: Severity, suffix: &str, extra: &[(&str, &str)]) {
        let event = format!("{}_{}", self.name, suffix);
        let mut all: Vec<(&str, &str)> = self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        all.extend_from_slice(extra);
        Logger::log(severity, &event, &all);
    }

    /// Log `{name}_COMPLETE` with elapsed time
    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    /// Log `{name}_COMPLETE` with elapsed time and extra fields
    pub fn complete_with_fields(mut self, extra: &[(&str, &str)]) {
        self.settled = true;
        let elapsed = self.timer.elapsed_ms();
        let mut all = vec![("elapsed_ms", elapsed.as_str())];
        all.extend_from_slice(extra);
        self.emit(Severity::Info, "COMPLETE", &all);
    }

    /// Log `{name}_FAILED` at ERROR
    pub fn fail(mut self, reason: &str) {
        self.settled = true;
        self.emit(Severity::Error, "FAILED", &[("reason", reason)]);
    }

    /// Whether `complete` or `fail` has been called
    pub fn is_settled(&self) -> bool {
        self.settled
    }
}

impl Drop for ObservationScope {
    fn drop(&mut self) {
        if !self.settled {
            self.emit(
                Severity::Warn,
                "INCOMPLETE",
                &[("reason", "scope dropped without completion")],
            );
        }
    }
}

/// Wall-clock duration timer for log fields
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start timing now
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed milliseconds as a string
    pub fn elapsed_ms(&self) -> String {
        self.start.elapsed().as_millis().to_string()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
