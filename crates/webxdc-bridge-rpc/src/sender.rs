// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Outbound side of the transport boundary.
//
// The correlator never touches the channel to the native host directly; it
// hands each serialized envelope to one `OutboundSender`.

use tokio::sync::mpsc;

use webxdc_bridge_core::error::{BridgeError, Result};

/// Moves one serialized envelope towards the native host.
pub trait OutboundSender: Send + Sync {
    /// Hand over a serialized JSON-RPC envelope.
    ///
    /// Implementations must not call back into the transport's pending-table
    /// operations while holding their own locks.
    fn send(&self, message: String) -> Result<()>;
}

impl<F> OutboundSender for F
where
    F: Fn(String) -> Result<()> + Send + Sync,
{
    fn send(&self, message: String) -> Result<()> {
        self(message)
    }
}

/// Sender backed by an unbounded tokio channel.
///
/// The receiving half is typically drained by a writer task (see
/// [`crate::stdio::spawn_writer`]) or, in tests, by a fake host.
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSender {
    /// Create a sender together with the receiver that gets its messages.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl OutboundSender for ChannelSender {
    fn send(&self, message: String) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| BridgeError::TransportClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_senders() {
        let sender = |message: String| -> Result<()> {
            assert_eq!(message, "{}");
            Ok(())
        };
        assert!(OutboundSender::send(&sender, "{}".into()).is_ok());
    }

    #[test]
    fn channel_sender_forwards_messages() {
        let (sender, mut rx) = ChannelSender::channel();
        sender.send("first".into()).unwrap();
        sender.send("second".into()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), "first");
        assert_eq!(rx.try_recv().unwrap(), "second");
    }

    #[test]
    fn channel_sender_reports_closed_receiver() {
        let (sender, rx) = ChannelSender::channel();
        drop(rx);
        assert!(sender.is_closed());
        assert!(matches!(
            sender.send("lost".into()),
            Err(BridgeError::TransportClosed)
        ));
    }
}
