//! Line I/O for the serve loop
//!
//! - Input: one JSON request object per line
//! - Output: per `ReplyFormat`, one JSON response object per line or one
//!   RESP reply per request
//! - UTF-8 only; binary arguments travel base64 encoded in `blobs`

use std::io::{BufRead, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{CliError, CliResult};
use crate::commands::{resp_error, Reply};

/// Encoding of serve loop responses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyFormat {
    /// `{"status": ..., ...}` objects, bulks base64 encoded
    #[default]
    Json,
    /// Raw RESP, as a wire client reads it
    Resp,
}

/// One command request
///
/// ```json
/// {"session": 1, "command": "applybinlogs", "args": ["0"], "blobs": ["<b64>", "<b64>"]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Request {
    /// Session the command runs on
    pub session: u64,
    /// Command name
    pub command: String,
    /// Text arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Base64 binary arguments, appended after `args`
    #[serde(default)]
    pub blobs: Vec<String>,
}

impl Request {
    /// Parse one input line
    pub fn parse(line: &str) -> CliResult<Self> {
        serde_json::from_str(line).map_err(|e| CliError::bad_request(format!("invalid request: {}", e)))
    }

    /// Full argument vector, command name first, blobs decoded
    pub fn into_args(self) -> CliResult<Vec<Vec<u8>>> {
        let mut out = Vec::with_capacity(1 + self.args.len() + self.blobs.len());
        out.push(self.command.into_bytes());
        out.extend(self.args.into_iter().map(String::into_bytes));
        for (i, blob) in self.blobs.iter().enumerate() {
            let bytes = STANDARD
                .decode(blob)
                .map_err(|e| CliError::bad_request(format!("blob {} is not base64: {}", i, e)))?;
            out.push(bytes);
        }
        Ok(out)
    }
}

/// Non-empty lines of `input`
pub fn read_lines<R: BufRead>(input: R) -> impl Iterator<Item = CliResult<String>> {
    input
        .lines()
        .map(|line| line.map_err(CliError::from))
        .filter(|line| !matches!(line, Ok(l) if l.trim().is_empty()))
}

/// Write a success response
pub fn write_response<W: Write>(out: &mut W, data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });
    write_line(out, &response)
}

/// Write an error response
pub fn write_error<W: Write>(out: &mut W, code: &str, message: &str) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    });
    write_line(out, &response)
}

/// Write a command reply in `format`
pub fn write_reply<W: Write>(out: &mut W, format: ReplyFormat, reply: &Reply) -> CliResult<()> {
    match format {
        ReplyFormat::Json => write_response(out, reply.to_json()),
        ReplyFormat::Resp => write_raw(out, &reply.to_resp()),
    }
}

/// Write a failure in `format`; RESP puts the code first, as in `-ERR CODE msg`
pub fn write_failure<W: Write>(
    out: &mut W,
    format: ReplyFormat,
    code: &str,
    message: &str,
) -> CliResult<()> {
    match format {
        ReplyFormat::Json => write_error(out, code, message),
        ReplyFormat::Resp => write_raw(out, &resp_error(&format!("{} {}", code, message))),
    }
}

fn write_raw<W: Write>(out: &mut W, bytes: &[u8]) -> CliResult<()> {
    out.write_all(bytes)?;
    out.flush()?;
    Ok(())
}

fn write_line<W: Write>(out: &mut W, value: &Value) -> CliResult<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
