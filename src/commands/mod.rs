//! Command surface
//!
//! A request is a sequence of binary arguments, command name first. The
//! `CommandTable` looks the command up, checks its arity and runs it
//! against the session.
//!
//! # Fatal errors
//!
//! A fatal `CommandError` (broken group framing, a placeholder command)
//! terminates the session that received it. The server keeps running;
//! the terminated session is refused from then on.

mod errors;
mod repl;
mod reply;
mod server;
mod session;

use std::collections::HashMap;

pub use errors::{CommandError, CommandErrorCode, CommandResult, Severity};
pub use repl::{
    ApplyBinlogsCommand, BackupCommand, FullSyncCommand, IncrSyncCommand, PullBinlogsCommand,
    RestoreBinlogCommand, SlaveofCommand, ToggleIncrSyncCommand,
};
pub use reply::{resp_error, Reply};
pub use server::{ServerEntry, ServerOptions};
pub use session::Session;

use crate::observability::{log_event_with_fields, Event, Logger};

/// One named command
pub trait Command: Send + Sync {
    /// Lower-case command name
    fn name(&self) -> &'static str;

    /// Exact argument count including the name, or `-n` for at least `n`
    fn arity(&self) -> i32;

    /// Execute against the session's current arguments
    fn run(&self, sess: &mut Session) -> CommandResult<Reply>;
}

fn arity_matches(arity: i32, argc: usize) -> bool {
    if arity >= 0 {
        argc == arity as usize
    } else {
        argc >= arity.unsigned_abs() as usize
    }
}

/// Registry of commands by name
pub struct CommandTable {
    commands: HashMap<&'static str, Box<dyn Command>>,
}

impl CommandTable {
    /// Empty table
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    /// Table holding every replication command
    pub fn with_repl_commands() -> Self {
        let mut table = Self::new();
        table.register(Box::new(BackupCommand));
        table.register(Box::new(FullSyncCommand));
        table.register(Box::new(ToggleIncrSyncCommand));
        table.register(Box::new(IncrSyncCommand));
        table.register(Box::new(PullBinlogsCommand));
        table.register(Box::new(RestoreBinlogCommand));
        table.register(Box::new(ApplyBinlogsCommand));
        table.register(Box::new(SlaveofCommand));
        table
    }

    pub fn register(&mut self, command: Box<dyn Command>) {
        self.commands.insert(command.name(), command);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Command> {
        self.commands
            .get(name.to_ascii_lowercase().as_str())
            .map(|c| c.as_ref())
    }

    /// Run `args` on `sess`.
    ///
    /// A terminated session gets `INTERNAL` without running anything. A
    /// fatal error terminates `sess` before it is returned.
    pub fn dispatch(&self, sess: &mut Session, args: Vec<Vec<u8>>) -> CommandResult<Reply> {
        if let Some(reason) = sess.termination_reason() {
            return Err(CommandError::internal(format!(
                "session {} terminated: {}",
                sess.id(),
                reason
            )));
        }

        let name = args
            .first()
            .map(|raw| String::from_utf8_lossy(raw).to_ascii_lowercase())
            .unwrap_or_default();
        sess.set_args(args);

        let result = match self.commands.get(name.as_str()) {
            None => Err(CommandError::unknown_command(&name)),
            Some(command) if !arity_matches(command.arity(), sess.args().len()) => {
                Err(CommandError::wrong_arity(command.name()))
            }
            Some(command) => command.run(sess),
        };

        if let Err(err) = &result {
            self.record_failure(sess, &name, err);
        }
        result
    }

    fn record_failure(&self, sess: &mut Session, name: &str, err: &CommandError) {
        let metrics = sess.server().metrics();
        metrics.increment_commands_rejected();

        let session_id = sess.id().to_string();
        if err.is_fatal() {
            metrics.increment_sessions_terminated();
            log_event_with_fields(
                Event::SessionTerminated,
                &[
                    ("code", err.code().code()),
                    ("command", name),
                    ("reason", err.message()),
                    ("session", &session_id),
                ],
            );
            sess.terminate(err.to_string());
        } else {
            Logger::warn(
                Event::CommandRejected.as_str(),
                &[
                    ("code", err.code().code()),
                    ("command", name),
                    ("reason", err.message()),
                    ("session", &session_id),
                ],
            );
        }
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::with_repl_commands()
    }
}
