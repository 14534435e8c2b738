//! Client session
//!
//! A session carries the arguments of the request being executed and a
//! terminated flag. Once terminated by a fatal error it accepts nothing
//! further.

use std::sync::Arc;

use super::errors::{CommandError, CommandResult};
use super::server::ServerEntry;

/// One client connection's state
pub struct Session {
    id: u64,
    args: Vec<Vec<u8>>,
    server: Arc<ServerEntry>,
    terminated: Option<String>,
}

impl Session {
    pub fn new(id: u64, server: Arc<ServerEntry>) -> Self {
        Self {
            id,
            args: Vec::new(),
            server,
            terminated: None,
        }
    }

    /// Session id; ties apply batches to one upstream stream
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Shared server state
    pub fn server(&self) -> &Arc<ServerEntry> {
        &self.server
    }

    /// Arguments of the current request, command name first
    pub fn args(&self) -> &[Vec<u8>] {
        &self.args
    }

    /// Replace the current request's arguments
    pub fn set_args(&mut self, args: Vec<Vec<u8>>) {
        self.args = args;
    }

    /// Argument `index` as UTF-8 text
    pub fn arg_str(&self, index: usize) -> CommandResult<&str> {
        let raw = self
            .args
            .get(index)
            .ok_or_else(|| CommandError::parse_opt(format!("missing argument {}", index)))?;
        std::str::from_utf8(raw)
            .map_err(|_| CommandError::parse_opt(format!("argument {} is not valid utf-8", index)))
    }

    /// Argument `index` as an unsigned integer
    pub fn arg_u64(&self, index: usize) -> CommandResult<u64> {
        let text = self.arg_str(index)?;
        text.parse::<u64>()
            .map_err(|e| CommandError::parse_opt(format!("invalid integer '{}': {}", text, e)))
    }

    /// Mark the session dead; later requests are refused and every store
    /// pinned to it is released
    pub fn terminate(&mut self, reason: impl Into<String>) {
        self.terminated = Some(reason.into());
        self.server.repl_mgr().release_session(self.id);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.is_some()
    }

    /// Why the session was terminated
    pub fn termination_reason(&self) -> Option<&str> {
        self.terminated.as_deref()
    }
}
