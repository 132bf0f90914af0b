// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for the bridge.

use serde_json::Value;
use thiserror::Error;

use crate::types::RequestId;

/// Top-level error type for all bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    // -- Remote side --
    #[error("remote error: {0}")]
    Remote(RemoteError),

    // -- Request lifecycle --
    #[error("request {id} ({method}) timed out")]
    Timeout { id: RequestId, method: String },

    #[error("request {id} was cancelled")]
    Cancelled { id: RequestId },

    #[error("request id space exhausted")]
    IdSpaceExhausted,

    // -- Transport --
    #[error("transport closed")]
    TransportClosed,

    #[error("outbound sender is already bound")]
    SenderAlreadyBound,

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("server process error: {0}")]
    Process(String),

    // -- Configuration --
    #[error("invalid configuration: {0}")]
    Config(String),

    // -- Storage / encoding --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// The `error` member of a JSON-RPC response, passed through untouched.
///
/// The remote side decides the shape. JSON-RPC 2.0 servers send
/// `{"code": .., "message": ..}`, but plain strings are accepted as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteError(pub Value);

impl RemoteError {
    /// The raw JSON value the remote side sent.
    pub fn value(&self) -> &Value {
        &self.0
    }

    /// `error.message` for structured errors, the string itself for plain
    /// string errors.
    pub fn message(&self) -> Option<&str> {
        match &self.0 {
            Value::String(s) => Some(s),
            Value::Object(map) => map.get("message").and_then(Value::as_str),
            _ => None,
        }
    }

    /// `error.code` for structured errors.
    pub fn code(&self) -> Option<i64> {
        self.0.get("code").and_then(Value::as_i64)
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.message() {
            Some(msg) => f.write_str(msg),
            None => write!(f, "{}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_error_displays_verbatim() {
        let err = BridgeError::Remote(RemoteError(json!("boom")));
        assert_eq!(err.to_string(), "remote error: boom");
    }

    #[test]
    fn structured_error_uses_message() {
        let remote = RemoteError(json!({"code": -32601, "message": "Method not found"}));
        assert_eq!(remote.message(), Some("Method not found"));
        assert_eq!(remote.code(), Some(-32601));
        assert_eq!(remote.to_string(), "Method not found");
    }

    #[test]
    fn unstructured_error_falls_back_to_json() {
        let remote = RemoteError(json!([1, 2]));
        assert_eq!(remote.message(), None);
        assert_eq!(remote.to_string(), "[1,2]");
    }

    #[test]
    fn timeout_names_request() {
        let err = BridgeError::Timeout {
            id: RequestId(7),
            method: "get_info".into(),
        };
        assert_eq!(err.to_string(), "request 7 (get_info) timed out");
    }
}
