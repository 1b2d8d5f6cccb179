//! Controller reply messages
//!
//! The controller answers every command line with one JSON line of the form
//! `{"status": "ok", "data": {...}}` or
//! `{"status": "error", "data": {"code": -32700, "message": "..."}}`.
//! The agent only inspects replies for logging; a missing or garbled reply
//! never affects the next send.

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reply status reported by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Ok,
    Error,
}

/// One parsed reply line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerReply {
    pub status: ReplyStatus,
    #[serde(default)]
    pub data: Value,
}

impl ControllerReply {
    /// Parse a reply line (surrounding whitespace and line ending are ignored)
    pub fn parse(line: &str) -> Result<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(ProtocolError::EmptyReply);
        }
        serde_json::from_str(trimmed).map_err(ProtocolError::from)
    }

    pub fn is_ok(&self) -> bool {
        self.status == ReplyStatus::Ok
    }

    /// Error code for `error` replies
    pub fn error_code(&self) -> Option<i64> {
        self.data.get("code").and_then(Value::as_i64)
    }

    /// Human-readable message for `error` replies
    pub fn message(&self) -> Option<&str> {
        self.data.get("message").and_then(Value::as_str)
    }
}
