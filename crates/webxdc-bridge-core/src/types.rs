// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the JSON-RPC bridge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// JSON-RPC protocol version carried in every outbound envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Identifier of an outbound JSON-RPC request.
///
/// Request ids are allocated from a strictly increasing sequence. The value 0
/// is reserved for notifications and never handed out to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl RequestId {
    /// The id every notification is sent with.
    pub const NOTIFICATION: RequestId = RequestId(0);

    pub fn is_notification(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Lifecycle states of an outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    /// Registered in the pending table, not yet handed to the sender.
    Created,
    /// Handed to the sender; waiting for a response.
    Sent,
    /// A response with a `result` arrived.
    Resolved,
    /// A response with an `error` arrived.
    Rejected,
    /// No response within the configured timeout.
    TimedOut,
    /// Cancelled explicitly or by dropping the call handle.
    Cancelled,
}

impl RequestState {
    /// Whether the request still waits for a response.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Created | Self::Sent)
    }
}

/// Snapshot of one entry in the pending table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub id: RequestId,
    pub method: String,
    pub state: RequestState,
    /// When the request was registered.
    pub issued_at: DateTime<Utc>,
}

impl PendingRequest {
    /// How long the request has been waiting, measured against `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.issued_at
    }
}
