// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Request/response correlator.
//
// A `Transport` owns the pending table, the id sequence and the one outbound
// sender. Requests leave through the sender; responses come back through
// `deliver_raw` and are routed to their caller purely by id, so unrelated
// requests settle independently and in any order.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Sleep;
use tracing::{debug, trace, warn};

use webxdc_bridge_core::BridgeConfig;
use webxdc_bridge_core::error::{BridgeError, RemoteError, Result};
use webxdc_bridge_core::types::{PendingRequest, RequestId, RequestState};

use crate::envelope::{Envelope, Notification, Outcome, Request, Response};
use crate::pending::{PendingTable, Settlement};
use crate::sender::OutboundSender;

/// Why an inbound message did not settle anything.
#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    /// The message carried no usable id (absent, `null` or 0).
    MissingId,
    /// The id names no outstanding request (unknown, duplicate or late).
    UnknownId(Value),
    /// The message is a request or notification, not a response.
    NotAResponse,
}

/// Result of handing one inbound message to the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// A pending request was completed.
    Settled { id: RequestId, state: RequestState },
    /// The message had no effect.
    Dropped(DropReason),
}

impl Delivery {
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Settled { .. })
    }
}

/// JSON-RPC client transport: id allocation, pending table, outbound sender.
///
/// Share it behind an `Arc` between the code issuing calls and the host
/// loop feeding responses into [`Transport::deliver_raw`].
pub struct Transport {
    sender: OnceLock<Box<dyn OutboundSender>>,
    pending: Arc<PendingTable>,
    next_id: AtomicU64,
    request_timeout: Option<Duration>,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(&BridgeConfig::default())
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("bound", &self.is_bound())
            .field("pending", &self.pending.len())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Transport {
    /// Create a transport with no sender bound yet.
    ///
    /// Until [`Transport::bind`] is called, outbound messages are logged and
    /// discarded; requests still register and wait.
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            sender: OnceLock::new(),
            pending: Arc::new(PendingTable::new()),
            next_id: AtomicU64::new(config.first_request_id.max(1)),
            request_timeout: config.request_timeout(),
        }
    }

    /// Create a transport with its sender already bound.
    pub fn with_sender(config: &BridgeConfig, sender: impl OutboundSender + 'static) -> Self {
        let transport = Self::new(config);
        // A fresh OnceLock is always empty.
        let _ = transport.sender.set(Box::new(sender));
        transport
    }

    /// Bind the outbound sender. A transport accepts exactly one.
    pub fn bind(&self, sender: impl OutboundSender + 'static) -> Result<()> {
        self.sender
            .set(Box::new(sender))
            .map_err(|_| BridgeError::SenderAlreadyBound)
    }

    pub fn is_bound(&self) -> bool {
        self.sender.get().is_some()
    }

    /// Send a fire-and-forget call with id 0.
    pub fn notify(&self, method: &str, params: Value) -> Result<()> {
        let message = Notification::new(method, params).to_json()?;
        debug!(method, "sending notification");
        self.send(message).map(|_| ())
    }

    /// Issue a request and return the handle that settles with its response.
    ///
    /// The entry is in the pending table before the sender runs, so a sender
    /// that answers synchronously still reaches the caller. When the sender
    /// fails the entry is withdrawn and the error returned here.
    pub fn request(&self, method: &str, params: Value) -> Result<PendingCall> {
        let id = self
            .next_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1))
            .map(RequestId)
            .map_err(|_| BridgeError::IdSpaceExhausted)?;
        let message = Request::new(id, method, params).to_json()?;

        let Some(rx) = self.pending.insert(id, method) else {
            debug!(%id, method, "transport closed, request refused");
            return Err(BridgeError::TransportClosed);
        };
        match self.send(message) {
            Ok(true) => self.pending.mark_sent(id),
            // Discarded by an unbound transport; the entry stays Created.
            Ok(false) => {}
            Err(e) => {
                self.pending.remove(id);
                warn!(%id, method, error = %e, "request could not be sent");
                return Err(e);
            }
        }
        debug!(%id, method, "request issued");

        Ok(PendingCall {
            id,
            method: method.to_owned(),
            rx,
            pending: Arc::clone(&self.pending),
            deadline: self.request_timeout.map(|t| Instant::now() + t),
            sleep: None,
            done: false,
        })
    }

    /// Issue a request and wait for its result.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.request(method, params)?.await
    }

    /// Parse serialized JSON from the host and route it.
    ///
    /// Text that is not a valid envelope is rejected with
    /// `BridgeError::MalformedEnvelope`; pending requests are unaffected.
    pub fn deliver_raw(&self, text: &str) -> Result<Delivery> {
        let envelope = Envelope::parse(text)?;
        Ok(self.deliver(envelope))
    }

    /// Route an inbound envelope to the request it answers.
    pub fn deliver(&self, envelope: Envelope) -> Delivery {
        match envelope {
            Envelope::Response(response) => self.settle(response),
            Envelope::Request(Request { method, .. })
            | Envelope::Notification(Notification { method, .. }) => {
                trace!(method = %method, "inbound call ignored");
                Delivery::Dropped(DropReason::NotAResponse)
            }
        }
    }

    fn settle(&self, response: Response) -> Delivery {
        let Some(id) = response.request_id() else {
            return match response.id {
                Some(raw) if !is_zero(&raw) => {
                    debug!(id = %raw, "response id cannot name a request, dropped");
                    Delivery::Dropped(DropReason::UnknownId(raw))
                }
                _ => {
                    trace!("response without id dropped");
                    Delivery::Dropped(DropReason::MissingId)
                }
            };
        };

        let Some(entry) = self.pending.remove(id) else {
            debug!(%id, "response for unknown request dropped");
            return Delivery::Dropped(DropReason::UnknownId(Value::from(id.0)));
        };

        let state = match &response.outcome {
            Outcome::Success(_) => RequestState::Resolved,
            Outcome::Failure(_) => RequestState::Rejected,
        };
        debug!(%id, method = %entry.method, ?state, "request settled");

        if entry.tx.send(Settlement::Response(response.outcome)).is_err() {
            // The caller went away between our removal and now.
            trace!(%id, "caller no longer waiting");
        }
        Delivery::Settled { id, state }
    }

    /// Withdraw a pending request; its caller fails with `Cancelled`.
    ///
    /// Returns `false` when the id is not pending.
    pub fn cancel(&self, id: RequestId) -> bool {
        match self.pending.remove(id) {
            Some(entry) => {
                debug!(%id, method = %entry.method, "request cancelled");
                let _ = entry.tx.send(Settlement::Cancelled);
                true
            }
            None => false,
        }
    }

    /// Fail every outstanding request with `TransportClosed` and refuse new
    /// ones. Called when the inbound side has ended.
    ///
    /// Returns how many requests were failed.
    pub fn close_pending(&self) -> usize {
        let drained = self.pending.close();
        let count = drained.len();
        for (id, entry) in drained {
            debug!(%id, method = %entry.method, "transport closed, request failed");
            let _ = entry.tx.send(Settlement::Closed);
        }
        count
    }

    pub fn is_closed(&self) -> bool {
        self.pending.is_closed()
    }

    /// Outstanding requests, ordered by id.
    pub fn pending_requests(&self) -> Vec<PendingRequest> {
        self.pending.snapshot()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// The timeout applied to each request, if any.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    /// Hand a message to the sender. `Ok(false)` means no sender is bound.
    fn send(&self, message: String) -> Result<bool> {
        match self.sender.get() {
            Some(sender) => sender.send(message).map(|()| true),
            None => {
                warn!(%message, "outbound sender not bound, message discarded");
                Ok(false)
            }
        }
    }
}

fn is_zero(value: &Value) -> bool {
    value.as_u64() == Some(0)
}

/// Handle to an issued request.
///
/// Resolves with the response's `result`, or fails with
/// `BridgeError::Remote` carrying the response's `error`. Dropping the handle
/// before it settles withdraws the request from the pending table.
#[must_use = "a request is withdrawn when its handle is dropped"]
#[derive(Debug)]
pub struct PendingCall {
    id: RequestId,
    method: String,
    rx: oneshot::Receiver<Settlement>,
    pending: Arc<PendingTable>,
    deadline: Option<Instant>,
    sleep: Option<Pin<Box<Sleep>>>,
    done: bool,
}

impl PendingCall {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    fn finish(
        &mut self,
        settlement: std::result::Result<Settlement, oneshot::error::RecvError>,
    ) -> Result<Value> {
        self.done = true;
        match settlement {
            Ok(Settlement::Response(Outcome::Success(result))) => Ok(result),
            Ok(Settlement::Response(Outcome::Failure(error))) => {
                Err(BridgeError::Remote(RemoteError(error)))
            }
            Ok(Settlement::Cancelled) => Err(BridgeError::Cancelled { id: self.id }),
            Ok(Settlement::Closed) | Err(_) => Err(BridgeError::TransportClosed),
        }
    }
}

impl Future for PendingCall {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        if this.done {
            return Poll::Ready(Err(BridgeError::TransportClosed));
        }

        if let Poll::Ready(settlement) = Pin::new(&mut this.rx).poll(cx) {
            return Poll::Ready(this.finish(settlement));
        }

        let Some(deadline) = this.deadline else {
            return Poll::Pending;
        };
        let sleep = this.sleep.get_or_insert_with(|| {
            Box::pin(tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)))
        });
        if sleep.as_mut().poll(cx).is_pending() {
            return Poll::Pending;
        }

        if this.pending.remove(this.id).is_none() {
            // Settled concurrently with the deadline; the response wins.
            if let Ok(settlement) = this.rx.try_recv() {
                return Poll::Ready(this.finish(Ok(settlement)));
            }
        }
        this.done = true;
        warn!(
            id = %this.id,
            method = %this.method,
            state = ?RequestState::TimedOut,
            "request timed out"
        );
        Poll::Ready(Err(BridgeError::Timeout {
            id: this.id,
            method: this.method.clone(),
        }))
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if !self.done && self.pending.remove(self.id).is_some() {
            debug!(
                id = %self.id,
                method = %self.method,
                state = ?RequestState::Cancelled,
                "request handle dropped, withdrawn"
            );
        }
    }
}
