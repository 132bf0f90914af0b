// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// webxdc-bridge RPC — JSON-RPC 2.0 envelopes, the request/response
// correlator, and the transports that move serialized envelopes between a
// client and the native host.

pub mod client;
pub mod envelope;
pub mod pending;
pub mod pump;
pub mod sender;
pub mod stdio;
pub mod transport;

pub use client::RpcClient;
pub use envelope::{Envelope, Notification, Outcome, Request, Response};
pub use pump::{PumpStats, pump_responses, spawn_response_pump};
pub use sender::{ChannelSender, OutboundSender};
pub use stdio::StdioServer;
pub use transport::{Delivery, DropReason, PendingCall, Transport};
