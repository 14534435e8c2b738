//! Command replies
//!
//! A reply is rendered either as RESP for a wire client or as JSON for the
//! line-oriented CLI. Bulk strings are binary; JSON carries them base64
//! encoded.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;

/// Structured reply of a successful command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Status `OK`
    Ok,
    Integer(i64),
    Bulk(Vec<u8>),
    Array(Vec<Reply>),
}

impl Reply {
    /// RESP encoding
    pub fn to_resp(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_resp(&mut out);
        out
    }

    fn write_resp(&self, out: &mut Vec<u8>) {
        match self {
            Reply::Ok => out.extend_from_slice(b"+OK\r\n"),
            Reply::Integer(n) => out.extend_from_slice(format!(":{}\r\n", n).as_bytes()),
            Reply::Bulk(bytes) => {
                out.extend_from_slice(format!("${}\r\n", bytes.len()).as_bytes());
                out.extend_from_slice(bytes);
                out.extend_from_slice(b"\r\n");
            }
            Reply::Array(items) => {
                out.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
                for item in items {
                    item.write_resp(out);
                }
            }
        }
    }

    /// JSON rendering; bulks become base64 strings
    pub fn to_json(&self) -> Value {
        match self {
            Reply::Ok => Value::String("OK".to_string()),
            Reply::Integer(n) => Value::from(*n),
            Reply::Bulk(bytes) => Value::String(STANDARD.encode(bytes)),
            Reply::Array(items) => Value::Array(items.iter().map(Reply::to_json).collect()),
        }
    }
}

/// RESP error line for `message`
pub fn resp_error(message: &str) -> Vec<u8> {
    let flat: String = message
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect();
    format!("-ERR {}\r\n", flat).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resp_nested_array() {
        let reply = Reply::Array(vec![
            Reply::Integer(7),
            Reply::Array(vec![Reply::Bulk(b"k".to_vec()), Reply::Bulk(Vec::new())]),
        ]);
        assert_eq!(reply.to_resp(), b"*2\r\n:7\r\n*2\r\n$1\r\nk\r\n$0\r\n\r\n".to_vec());
    }

    #[test]
    fn test_resp_ok_and_error() {
        assert_eq!(Reply::Ok.to_resp(), b"+OK\r\n".to_vec());
        assert_eq!(resp_error("bad\nthing"), b"-ERR bad thing\r\n".to_vec());
    }

    #[test]
    fn test_json_bulk_is_base64() {
        let reply = Reply::Array(vec![Reply::Integer(3), Reply::Bulk(vec![0, 255])]);
        assert_eq!(reply.to_json(), serde_json::json!([3, "AP8="]));
        assert_eq!(Reply::Ok.to_json(), serde_json::json!("OK"));
    }
}
