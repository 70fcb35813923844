//! Daemon wire format: one JSON object per line
//!
//! Requests are `{"id","method","params"}` plus an optional `trace_id`
//! shared by the client's and the daemon's log lines. Responses are
//! `{"id","result","error"}`. A set `error` means the request failed; a
//! failed `run` may still carry the output its batch committed before
//! the failure in `result`.

use cfgctl_core::{CtlError, Result};
use cfgctl_core_types::TraceId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};

pub const METHOD_RUN: &str = "run";
pub const METHOD_EXIT: &str = "exit";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<TraceId>,
}

impl Request {
    pub fn new(id: u64, method: &str, params: Vec<String>) -> Self {
        Self {
            id,
            method: method.to_string(),
            params,
            trace_id: None,
        }
    }

    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl Response {
    pub fn ok(id: u64, result: impl Into<String>) -> Self {
        Self {
            id,
            result: Some(result.into()),
            error: None,
        }
    }

    pub fn error(id: u64, error: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(error.into()),
        }
    }

    /// A failure that still has output to deliver; empty output is dropped
    pub fn error_with_output(id: u64, output: String, error: impl Into<String>) -> Self {
        Self {
            id,
            result: Some(output).filter(|o| !o.is_empty()),
            error: Some(error.into()),
        }
    }
}

/// Write one message and flush
///
/// # Errors
///
/// Serialization or write failures.
pub fn write_message<T: Serialize, W: Write>(writer: &mut W, message: &T) -> Result<()> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    writer.write_all(line.as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Decode one line as a message
///
/// # Errors
///
/// The line is not a valid message.
pub fn parse_message<T: DeserializeOwned>(line: &str) -> Result<T> {
    serde_json::from_str(line.trim_end()).map_err(|e| {
        CtlError::Ipc {
            message: format!("malformed message: {}", e),
        }
        .into()
    })
}

/// Read one message; `None` at end of stream
///
/// # Errors
///
/// Read failures or a line that is not a valid message.
pub fn read_message<T: DeserializeOwned, R: BufRead>(reader: &mut R) -> Result<Option<T>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    parse_message(&line).map(Some)
}
