//! JSON-RPC 2.0 message types and line-delimited framing.
//!
//! One request per line on stdin, one response per line on stdout,
//! diagnostics on stderr. Lines above the cap are rejected rather than
//! buffered.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, BufRead};

use engram_core::Error;

/// Maximum accepted request line (1 MiB).
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Maximum serialized response (10 MiB).
pub const MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;

/// Standard JSON-RPC error codes.
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// JSON-RPC request structure
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: Option<String>,
    pub id: Option<Value>,
    pub method: String,
    pub params: Option<Value>,
}

/// JSON-RPC response structure
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    #[must_use]
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(id: Option<Value>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC error structure
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// Map a domain error onto the wire: standard codes where they exist,
/// application codes in the -32000 range otherwise, with the stable
/// machine code carried in `data`.
impl From<&Error> for JsonRpcError {
    fn from(error: &Error) -> Self {
        let code = match error {
            Error::InvalidParams { .. } | Error::InvalidScope(_) | Error::InvalidContent(_) => {
                INVALID_PARAMS
            }
            Error::NotFound(_) => -32001,
            Error::AccessDenied { .. } => -32002,
            Error::Conflict(_) => -32003,
            Error::Cancelled => -32004,
            Error::Deadline => -32005,
            Error::PoolExhausted(_) | Error::Unavailable { .. } => -32006,
            Error::Corrupted(_) => -32007,
            _ => INTERNAL_ERROR,
        };
        Self {
            code,
            message: error.to_string(),
            data: Some(serde_json::json!({ "code": error.code() })),
        }
    }
}

/// Read the next line-delimited JSON message. Returns `Ok(None)` at EOF.
///
/// Non-JSON lines (stray logs) are skipped; over-long lines produce an
/// error the caller should answer with `PARSE_ERROR`.
pub fn read_next_message<R: BufRead>(reader: &mut R) -> io::Result<Option<String>> {
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        if n > MAX_LINE_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("request line exceeds {MAX_LINE_BYTES} bytes"),
            ));
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('{') {
            return Ok(Some(trimmed.to_string()));
        }
        // Skip anything else (e.g. logs accidentally printed to stdin's
        // peer) and keep reading.
    }
}
