// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// JSON-RPC 2.0 envelopes.
//
// Inbound text is validated once, here, and turned into a tagged `Envelope`.
// Correlation concerns (is this id one of ours?) are left to the transport.

use serde::Serialize;
use serde_json::{Map, Value};

use webxdc_bridge_core::error::{BridgeError, Result};
use webxdc_bridge_core::types::{JSONRPC_VERSION, RequestId};

/// Wire layout of an outbound request or notification.
#[derive(Serialize)]
struct WireCall<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    id: RequestId,
    params: &'a Value,
}

/// A call that expects a response.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub method: String,
    pub params: Value,
}

impl Request {
    pub fn new(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }

    /// Serialize to the wire form:
    /// `{"jsonrpc":"2.0","method":..,"id":..,"params":..}`.
    pub fn to_json(&self) -> Result<String> {
        encode_call(&self.method, self.id, &self.params)
    }
}

/// A one-way call, sent with id 0.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Value,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        encode_call(&self.method, RequestId::NOTIFICATION, &self.params)
    }
}

fn encode_call(method: &str, id: RequestId, params: &Value) -> Result<String> {
    let wire = WireCall {
        jsonrpc: JSONRPC_VERSION,
        method,
        id,
        params,
    };
    Ok(serde_json::to_string(&wire)?)
}

/// How a response settles its request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The `result` member (`null` when absent).
    Success(Value),
    /// The `error` member, untouched.
    Failure(Value),
}

/// A reply to an earlier request.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// The raw `id` member. `None` when absent or `null`.
    pub id: Option<Value>,
    pub outcome: Outcome,
}

impl Response {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            id: Some(Value::from(id.0)),
            outcome: Outcome::Success(result),
        }
    }

    pub fn failure(id: RequestId, error: Value) -> Self {
        Self {
            id: Some(Value::from(id.0)),
            outcome: Outcome::Failure(error),
        }
    }

    /// The id as a request id, if it can name one.
    ///
    /// Absent ids and id 0 never correlate: 0 is the notification id.
    pub fn request_id(&self) -> Option<RequestId> {
        self.id
            .as_ref()
            .and_then(Value::as_u64)
            .filter(|id| *id != 0)
            .map(RequestId)
    }

    pub fn to_json(&self) -> Result<String> {
        let mut map = Map::new();
        map.insert("jsonrpc".into(), Value::from(JSONRPC_VERSION));
        if let Some(id) = &self.id {
            map.insert("id".into(), id.clone());
        }
        match &self.outcome {
            Outcome::Success(result) => map.insert("result".into(), result.clone()),
            Outcome::Failure(error) => map.insert("error".into(), error.clone()),
        };
        Ok(serde_json::to_string(&Value::Object(map))?)
    }
}

/// Any JSON-RPC 2.0 message.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Request(Request),
    Notification(Notification),
    Response(Response),
}

impl Envelope {
    /// Parse serialized JSON into an envelope.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| BridgeError::MalformedEnvelope(format!("invalid JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Classify an already-parsed JSON value.
    ///
    /// Anything carrying a `result` or `error` member is a response, even if
    /// it also names a `method`. Otherwise a message with a `method` is a
    /// call: a request when it has a positive integer id, a notification when
    /// the id is absent, `null` or 0. Everything else is treated as a
    /// response.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut obj) = value else {
            return Err(BridgeError::MalformedEnvelope(
                "expected a JSON object".into(),
            ));
        };

        if let Some(version) = obj.get("jsonrpc") {
            if version.as_str() != Some(JSONRPC_VERSION) {
                return Err(BridgeError::MalformedEnvelope(format!(
                    "unsupported jsonrpc version {version}"
                )));
            }
        }

        let id = obj.remove("id").filter(|id| !id.is_null());

        let is_reply = obj.contains_key("result") || obj.contains_key("error");
        if let Some(method) = obj.remove("method").filter(|_| !is_reply) {
            let Value::String(method) = method else {
                return Err(BridgeError::MalformedEnvelope(
                    "method must be a string".into(),
                ));
            };
            let params = obj.remove("params").unwrap_or(Value::Null);
            return match id {
                None => Ok(Self::Notification(Notification { method, params })),
                Some(id) => match id.as_u64() {
                    Some(0) => Ok(Self::Notification(Notification { method, params })),
                    Some(n) => Ok(Self::Request(Request {
                        id: RequestId(n),
                        method,
                        params,
                    })),
                    None => Err(BridgeError::MalformedEnvelope(format!(
                        "request id must be a non-negative integer, got {id}"
                    ))),
                },
            };
        }

        let outcome = match obj.remove("error").filter(|e| !e.is_null()) {
            Some(error) => Outcome::Failure(error),
            None => Outcome::Success(obj.remove("result").unwrap_or(Value::Null)),
        };
        Ok(Self::Response(Response { id, outcome }))
    }
}
