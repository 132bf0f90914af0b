// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Inbound response pump.
//
// Reads line-delimited JSON produced by the native side and feeds every line
// into the transport until the stream ends. A bad line, including one that
// is not UTF-8, is logged and counted; it never stops the pump.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use webxdc_bridge_core::error::Result;

use crate::transport::{Delivery, Transport};

/// Counters collected over one pump run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PumpStats {
    /// Non-blank lines read.
    pub lines: u64,
    /// Lines that settled a pending request.
    pub settled: u64,
    /// Valid envelopes that matched nothing.
    pub dropped: u64,
    /// Lines rejected as malformed.
    pub malformed: u64,
}

/// Deliver every line from `reader` to `transport` until EOF.
#[instrument(skip_all)]
pub async fn pump_responses<R>(transport: &Transport, reader: R) -> Result<PumpStats>
where
    R: AsyncBufRead + Unpin,
{
    info!("response pump started");
    let mut reader = reader;
    let mut stats = PumpStats::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim(),
            Err(e) => {
                stats.lines += 1;
                stats.malformed += 1;
                warn!(error = %e, "line from host is not UTF-8, skipped");
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }
        stats.lines += 1;

        match transport.deliver_raw(line) {
            Ok(Delivery::Settled { .. }) => stats.settled += 1,
            Ok(Delivery::Dropped(_)) => stats.dropped += 1,
            Err(e) => {
                stats.malformed += 1;
                warn!(error = %e, "malformed line from host skipped");
            }
        }
    }

    info!(
        lines = stats.lines,
        settled = stats.settled,
        dropped = stats.dropped,
        malformed = stats.malformed,
        "response pump finished"
    );
    Ok(stats)
}

/// Run [`pump_responses`] on its own task.
///
/// When the pump stops, at EOF or on a read error, no response can arrive
/// any more: requests still pending fail with `TransportClosed` and new ones
/// are refused.
pub fn spawn_response_pump<R>(
    transport: Arc<Transport>,
    reader: R,
) -> JoinHandle<Result<PumpStats>>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let result = pump_responses(&transport, reader).await;
        if let Err(e) = &result {
            warn!(error = %e, "response pump failed");
        }
        let failed = transport.close_pending();
        if failed > 0 {
            warn!(failed, "inbound stream ended with requests pending");
        }
        result
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use tokio::io::{AsyncWriteExt, BufReader};

    use webxdc_bridge_core::BridgeConfig;
    use webxdc_bridge_core::error::BridgeError;

    use crate::sender::ChannelSender;

    #[tokio::test]
    async fn pump_settles_and_counts() {
        let (sender, _outbound) = ChannelSender::channel();
        let transport = Transport::with_sender(&BridgeConfig::default(), sender);
        let first = transport.request("a", Value::Null).unwrap();
        let second = transport.request("b", Value::Null).unwrap();

        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"result\":\"two\"}\n",
            "\n",
            "garbage\n",
            "{\"jsonrpc\":\"2.0\",\"id\":99,\"result\":null}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"error\":{\"code\":-1,\"message\":\"no\"}}\n",
        );
        let stats = pump_responses(&transport, input.as_bytes()).await.unwrap();

        assert_eq!(
            stats,
            PumpStats {
                lines: 4,
                settled: 2,
                dropped: 1,
                malformed: 1,
            }
        );
        assert_eq!(second.await.unwrap(), json!("two"));
        let err = first.await.unwrap_err();
        assert_eq!(err.to_string(), "remote error: no");
    }

    #[tokio::test]
    async fn spawned_pump_runs_until_eof() {
        let (sender, _outbound) = ChannelSender::channel();
        let transport = Arc::new(Transport::with_sender(&BridgeConfig::default(), sender));
        let call = transport.request("slow", Value::Null).unwrap();

        let (mut host_side, pump_side) = tokio::io::duplex(256);
        let pump = spawn_response_pump(Arc::clone(&transport), BufReader::new(pump_side));

        host_side
            .write_all(b"{\"id\":1,\"result\":[1,2,3]}\n")
            .await
            .unwrap();
        assert_eq!(call.await.unwrap(), json!([1, 2, 3]));

        drop(host_side);
        let stats = pump.await.unwrap().unwrap();
        assert_eq!(stats.settled, 1);
    }

    #[tokio::test]
    async fn invalid_utf8_line_does_not_stop_the_pump() {
        let (sender, _outbound) = ChannelSender::channel();
        let transport = Transport::with_sender(&BridgeConfig::default(), sender);
        let call = transport.request("after", Value::Null).unwrap();

        let input: &[u8] = b"\xff\xfe garbage\n{\"id\":1,\"result\":7}\n";
        let stats = pump_responses(&transport, input).await.unwrap();

        assert_eq!(
            stats,
            PumpStats {
                lines: 2,
                settled: 1,
                dropped: 0,
                malformed: 1,
            }
        );
        assert_eq!(call.await.unwrap(), json!(7));
    }

    #[tokio::test]
    async fn last_line_without_newline_is_delivered() {
        let (sender, _outbound) = ChannelSender::channel();
        let transport = Transport::with_sender(&BridgeConfig::default(), sender);
        let call = transport.request("tail", Value::Null).unwrap();

        let input: &[u8] = b"{\"id\":1,\"result\":\"end\"}";
        let stats = pump_responses(&transport, input).await.unwrap();
        assert_eq!(stats.settled, 1);
        assert_eq!(call.await.unwrap(), json!("end"));
    }

    #[tokio::test]
    async fn eof_fails_requests_still_pending() {
        let (sender, _outbound) = ChannelSender::channel();
        let transport = Arc::new(Transport::with_sender(&BridgeConfig::default(), sender));
        let call = transport.request("unanswered", Value::Null).unwrap();

        let (host_side, pump_side) = tokio::io::duplex(64);
        let pump = spawn_response_pump(Arc::clone(&transport), BufReader::new(pump_side));
        drop(host_side);

        assert!(matches!(call.await, Err(BridgeError::TransportClosed)));
        assert_eq!(pump.await.unwrap().unwrap(), PumpStats::default());
        assert!(transport.is_closed());
        assert!(matches!(
            transport.request("late", Value::Null),
            Err(BridgeError::TransportClosed)
        ));
    }
}
