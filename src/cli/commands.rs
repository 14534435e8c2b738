//! CLI command implementations
//!
//! `init` lays out the data directory. `serve` opens the stores, builds the
//! server, and runs the request loop until stdin closes.

use std::collections::HashMap;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::commands::{CommandTable, ServerEntry, ServerOptions, Session};
use crate::observability::{log_event, log_event_with_fields, Event, Logger, Severity};
use crate::replication::DEFAULT_PULL_BATCH_SIZE;
use crate::storage::{KvStore, MemoryKvStore};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{read_lines, write_failure, write_reply, write_response, ReplyFormat, Request};

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory (required)
    pub data_dir: String,

    /// Number of stores hosted by this server (default 10)
    #[serde(default = "default_kv_store_count")]
    pub kv_store_count: u32,

    /// Soft record cap of one pull (default 1000)
    #[serde(default = "default_pull_batch_size")]
    pub pull_batch_size: usize,

    /// Start with incremental sync paused
    #[serde(default)]
    pub incr_sync_paused: bool,

    /// Store indices that start closed
    #[serde(default)]
    pub closed_stores: Vec<u32>,

    /// Minimum log severity written to stderr (default "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Response encoding on stdout, "json" or "resp" (default "json")
    #[serde(default)]
    pub reply_format: ReplyFormat,
}

fn default_kv_store_count() -> u32 {
    10
}
fn default_pull_batch_size() -> usize {
    DEFAULT_PULL_BATCH_SIZE
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config(format!("Failed to read config: {}", e)))?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration text
    pub fn from_json(content: &str) -> CliResult<Self> {
        let config: Config = serde_json::from_str(content)
            .map_err(|e| CliError::config(format!("Invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> CliResult<()> {
        if self.data_dir.is_empty() {
            return Err(CliError::config("data_dir must not be empty"));
        }
        if self.kv_store_count == 0 {
            return Err(CliError::config("kv_store_count must be > 0"));
        }
        if self.pull_batch_size == 0 {
            return Err(CliError::config("pull_batch_size must be > 0"));
        }
        if let Some(bad) = self
            .closed_stores
            .iter()
            .find(|&&id| id >= self.kv_store_count)
        {
            return Err(CliError::config(format!(
                "closed_stores entry {} out of range (kv_store_count {})",
                bad, self.kv_store_count
            )));
        }
        self.severity()?;
        Ok(())
    }

    /// Configured minimum log severity
    pub fn severity(&self) -> CliResult<Severity> {
        Severity::parse(&self.log_level).ok_or_else(|| {
            CliError::config(format!(
                "Invalid log_level: '{}'. Must be trace, info, warn, error or fatal.",
                self.log_level
            ))
        })
    }

    /// Get data directory as Path
    pub fn data_path(&self) -> &Path {
        Path::new(&self.data_dir)
    }

    /// Server tunables derived from this config
    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            pull_batch_size: self.pull_batch_size,
            incr_sync_paused: self.incr_sync_paused,
        }
    }
}

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Init { config } => init(&config),
        Command::Serve { config } => serve(&config),
    }
}

fn is_initialized(data_dir: &Path) -> bool {
    data_dir.join("stores").exists() && data_dir.join("backups").exists()
}

/// Create the data directory layout
pub fn init(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let data_dir = config.data_path();

    if is_initialized(data_dir) {
        return Err(CliError::data_dir_exists(data_dir));
    }

    for dir in [data_dir.join("stores"), data_dir.join("backups")] {
        fs::create_dir_all(&dir).map_err(|e| {
            CliError::config(format!("Failed to create directory {:?}: {}", dir, e))
        })?;
    }

    write_response(&mut io::stdout(), json!({"initialized": true}))
}

/// Open `config.kv_store_count` in-memory stores, closing `closed_stores`
pub fn open_stores(config: &Config) -> Vec<Arc<dyn KvStore>> {
    (0..config.kv_store_count)
        .map(|id| {
            let store = MemoryKvStore::new(id);
            if config.closed_stores.contains(&id) {
                store.close();
            }
            Arc::new(store) as Arc<dyn KvStore>
        })
        .collect()
}

/// Boot the server and serve stdin until it closes
pub fn serve(config_path: &Path) -> CliResult<()> {
    log_event(Event::BootStart);
    let config = Config::load(config_path)?;
    Logger::set_min_severity(config.severity()?);
    log_event_with_fields(
        Event::ConfigLoaded,
        &[
            ("data_dir", &config.data_dir),
            ("kv_store_count", &config.kv_store_count.to_string()),
        ],
    );

    if !is_initialized(config.data_path()) {
        return Err(CliError::data_dir_missing(config.data_path()));
    }

    let server = Arc::new(ServerEntry::new(open_stores(&config), config.server_options()));
    log_event(Event::BootComplete);

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    serve_loop(&server, config.reply_format, stdin.lock(), &mut stdout)
}

/// Execute one request per input line against `server`, answering each in
/// `format`.
///
/// Sessions are created on first use and kept for the whole run, so a
/// session terminated by a fatal error stays refused.
pub fn serve_loop<R: BufRead, W: Write>(
    server: &Arc<ServerEntry>,
    format: ReplyFormat,
    input: R,
    output: &mut W,
) -> CliResult<()> {
    let table = CommandTable::with_repl_commands();
    let mut sessions: HashMap<u64, Session> = HashMap::new();
    log_event(Event::Serving);

    for line in read_lines(input) {
        let args = line.and_then(|line| {
            let request = Request::parse(&line)?;
            let session_id = request.session;
            Ok((session_id, request.into_args()?))
        });
        let (session_id, args) = match args {
            Ok(parsed) => parsed,
            Err(e) => {
                write_failure(output, format, e.code().code(), e.message())?;
                if e.code().is_per_request() {
                    continue;
                }
                break;
            }
        };

        let session = sessions
            .entry(session_id)
            .or_insert_with(|| Session::new(session_id, Arc::clone(server)));
        match table.dispatch(session, args) {
            Ok(reply) => write_reply(output, format, &reply)?,
            Err(e) => write_failure(output, format, e.code().code(), e.message())?,
        }
    }

    log_event_with_fields(
        Event::ShutdownComplete,
        &[("metrics", &server.metrics().to_json())],
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::CliErrorCode;
    use serde_json::Value;
    use std::io::Cursor;

    fn run_raw(config: &Config, input: &str) -> Vec<u8> {
        let server = Arc::new(ServerEntry::new(open_stores(config), config.server_options()));
        let mut out = Vec::new();
        serve_loop(
            &server,
            config.reply_format,
            Cursor::new(input.to_string()),
            &mut out,
        )
        .unwrap();
        out
    }

    fn run_lines(config: &Config, input: &str) -> Vec<Value> {
        String::from_utf8(run_raw(config, input))
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_json(r#"{"data_dir": "/tmp/x"}"#).unwrap();
        assert_eq!(config.kv_store_count, 10);
        assert_eq!(config.pull_batch_size, 1000);
        assert!(!config.incr_sync_paused);
        assert!(config.closed_stores.is_empty());
        assert_eq!(config.severity().unwrap(), Severity::Info);
        assert_eq!(config.reply_format, ReplyFormat::Json);
    }

    #[test]
    fn test_config_rejects_bad_values() {
        assert!(Config::from_json(r#"{"data_dir": "/d", "kv_store_count": 0}"#).is_err());
        assert!(Config::from_json(r#"{"data_dir": "/d", "pull_batch_size": 0}"#).is_err());
        assert!(
            Config::from_json(r#"{"data_dir": "/d", "kv_store_count": 2, "closed_stores": [2]}"#)
                .is_err()
        );
        assert!(Config::from_json(r#"{"data_dir": "/d", "log_level": "loud"}"#).is_err());
        assert!(Config::from_json(r#"{"kv_store_count": 2}"#).is_err());
    }

    #[test]
    fn test_serve_loop_pull_on_empty_store() {
        let config = Config::from_json(r#"{"data_dir": "/d", "kv_store_count": 2}"#).unwrap();
        let replies = run_lines(
            &config,
            "{\"session\":1,\"command\":\"pullbinlogs\",\"args\":[\"1\",\"5\"]}\n",
        );
        assert_eq!(replies[0]["status"], "ok");
        assert_eq!(replies[0]["data"], serde_json::json!([5, []]));
    }

    #[test]
    fn test_serve_loop_bad_line_does_not_stop_loop() {
        let config = Config::from_json(r#"{"data_dir": "/d", "kv_store_count": 1}"#).unwrap();
        let replies = run_lines(
            &config,
            "not json\n{\"session\":1,\"command\":\"toggleincrsync\",\"args\":[\"0\"]}\n",
        );
        assert_eq!(replies[0]["code"], "SHARDREPL_BAD_REQUEST");
        assert_eq!(replies[1]["data"], "OK");
    }

    #[test]
    fn test_terminated_session_refused_other_sessions_served() {
        let config = Config::from_json(r#"{"data_dir": "/d", "kv_store_count": 1}"#).unwrap();
        let replies = run_lines(
            &config,
            concat!(
                "{\"session\":7,\"command\":\"incrsync\",\"args\":[\"0\",\"0\",\"0\"]}\n",
                "{\"session\":7,\"command\":\"toggleincrsync\",\"args\":[\"1\"]}\n",
                "{\"session\":8,\"command\":\"toggleincrsync\",\"args\":[\"1\"]}\n",
            ),
        );
        assert_eq!(replies[0]["code"], "UNREACHABLE_COMMAND");
        assert_eq!(replies[1]["code"], "INTERNAL");
        assert_eq!(replies[2]["status"], "ok");
    }

    #[test]
    fn test_serve_loop_resp_replies() {
        let config =
            Config::from_json(r#"{"data_dir": "/d", "kv_store_count": 1, "reply_format": "resp"}"#)
                .unwrap();
        let out = run_raw(
            &config,
            concat!(
                "{\"session\":1,\"command\":\"pullbinlogs\",\"args\":[\"0\",\"3\"]}\n",
                "{\"session\":1,\"command\":\"pullbinlogs\",\"args\":[\"4\",\"0\"]}\n",
                "not json\n",
                "{\"session\":1,\"command\":\"toggleincrsync\",\"args\":[\"1\"]}\n",
            ),
        );
        let text = String::from_utf8(out).unwrap();
        let mut replies = text.split_inclusive("\r\n");
        assert_eq!(replies.next(), Some("*2\r\n"));
        assert_eq!(replies.next(), Some(":3\r\n"));
        assert_eq!(replies.next(), Some("*0\r\n"));
        assert_eq!(replies.next(), Some("-ERR PARSE_OPT invalid storeId\r\n"));
        assert!(replies
            .next()
            .unwrap()
            .starts_with("-ERR SHARDREPL_BAD_REQUEST invalid request"));
        assert_eq!(replies.next(), Some("+OK\r\n"));
        assert_eq!(replies.next(), None);
    }

    #[test]
    fn test_data_dir_checks() {
        let temp = tempfile::tempdir().unwrap();
        let config_path = temp.path().join("shardrepl.json");
        let data_dir = temp.path().join("data");
        fs::write(
            &config_path,
            json!({"data_dir": data_dir.to_string_lossy()}).to_string(),
        )
        .unwrap();

        let err = serve(&config_path).unwrap_err();
        assert_eq!(err.code(), CliErrorCode::DataDirMissing);

        init(&config_path).unwrap();
        assert!(data_dir.join("stores").is_dir());
        let err = init(&config_path).unwrap_err();
        assert_eq!(err.code(), CliErrorCode::DataDirExists);
        assert!(err.message().contains("data"));
    }

    #[test]
    fn test_closed_stores_start_closed() {
        let config =
            Config::from_json(r#"{"data_dir": "/d", "kv_store_count": 3, "closed_stores": [1]}"#)
                .unwrap();
        let stores = open_stores(&config);
        let open: Vec<bool> = stores.iter().map(|s| s.is_open()).collect();
        assert_eq!(open, vec![true, false, true]);
    }
}
