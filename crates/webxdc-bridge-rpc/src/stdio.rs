// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Line-delimited stdio transport.
//
// A native JSON-RPC server running as a child process reads one envelope per
// line on stdin and writes one per line on stdout. The writer task drains the
// transport's outbound channel into stdin; the response pump feeds stdout
// back into the transport.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use webxdc_bridge_core::BridgeConfig;
use webxdc_bridge_core::error::{BridgeError, Result};

use crate::client::RpcClient;
use crate::pump::{PumpStats, spawn_response_pump};
use crate::sender::ChannelSender;
use crate::transport::Transport;

/// How long `shutdown` waits for the child to exit on its own.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Handle to the task that writes outbound envelopes.
///
/// Dropping the handle has the same effect as [`LineWriter::close`] without
/// waiting for the task.
#[derive(Debug)]
pub struct LineWriter {
    close: oneshot::Sender<()>,
    task: JoinHandle<Result<()>>,
}

impl LineWriter {
    /// Write everything already queued, then stop and release the writer.
    pub async fn close(self) -> Result<()> {
        // The task may already have stopped on a write error.
        let _ = self.close.send(());
        self.task
            .await
            .map_err(|e| BridgeError::Process(format!("writer task failed: {e}")))?
    }
}

/// Spawn a task that writes each outbound message to `writer` as one line.
///
/// The task stops when the returned [`LineWriter`] is closed or dropped,
/// when every clone of the sender is gone, or with an error when a write
/// fails.
pub fn spawn_writer<W>(writer: W) -> (ChannelSender, LineWriter)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (sender, mut outbound) = ChannelSender::channel();
    let (close_tx, mut close_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let mut writer = writer;
        loop {
            tokio::select! {
                biased;
                message = outbound.recv() => match message {
                    Some(message) => write_line(&mut writer, &message).await?,
                    None => break,
                },
                _ = &mut close_rx => {
                    while let Ok(message) = outbound.try_recv() {
                        write_line(&mut writer, &message).await?;
                    }
                    break;
                }
            }
        }
        writer.shutdown().await?;
        Ok::<(), BridgeError>(())
    });

    (
        sender,
        LineWriter {
            close: close_tx,
            task,
        },
    )
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, message: &str) -> Result<()> {
    writer.write_all(message.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    debug!(bytes = message.len(), "envelope written");
    Ok(())
}

/// A JSON-RPC server child process wired to a [`Transport`].
pub struct StdioServer {
    child: Child,
    transport: Arc<Transport>,
    writer: LineWriter,
    pump: JoinHandle<Result<PumpStats>>,
}

impl StdioServer {
    /// Start `program` and bind a new transport to its stdin/stdout.
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(skip(args, config))]
    pub fn spawn(program: &str, args: &[String], config: &BridgeConfig) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BridgeError::Process(format!("spawn {program}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::Process("child stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Process("child stdout not captured".into()))?;

        let transport = Arc::new(Transport::new(config));
        let (sender, writer) = spawn_writer(stdin);
        transport.bind(sender)?;
        let pump = spawn_response_pump(Arc::clone(&transport), BufReader::new(stdout));

        info!(pid = ?child.id(), "server process started");
        Ok(Self {
            child,
            transport,
            writer,
            pump,
        })
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn client(&self) -> RpcClient {
        RpcClient::new(Arc::clone(&self.transport))
    }

    /// Flush and close the server's stdin, wait for it to exit (killing it
    /// after a grace period), and return what the response pump saw.
    pub async fn shutdown(self) -> Result<PumpStats> {
        self.shutdown_with_grace(SHUTDOWN_GRACE).await
    }

    /// [`StdioServer::shutdown`] with a custom grace period.
    pub async fn shutdown_with_grace(self, grace: Duration) -> Result<PumpStats> {
        let Self {
            mut child,
            transport,
            writer,
            pump,
        } = self;

        if let Err(e) = writer.close().await {
            warn!(error = %e, "writing to server failed");
        }

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(status) => {
                let status = status?;
                info!(%status, "server process exited");
            }
            Err(_) => {
                warn!("server process did not exit in time, killing it");
                child.kill().await?;
            }
        }

        let pending = transport.pending_count();
        if pending > 0 {
            warn!(pending, "server stopped with requests still pending");
        }

        pump.await
            .map_err(|e| BridgeError::Process(format!("response pump task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};

    use crate::sender::OutboundSender;

    #[tokio::test]
    async fn writer_frames_one_envelope_per_line() {
        let (host_side, writer_side) = tokio::io::duplex(1024);
        let (sender, writer) = spawn_writer(writer_side);

        let transport = Transport::with_sender(&BridgeConfig::default(), sender);
        transport.notify("first", serde_json::json!([])).unwrap();
        let call = transport
            .request("second", serde_json::json!({"k": "v"}))
            .unwrap();

        let mut lines = BufReader::new(host_side).lines();
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            r#"{"jsonrpc":"2.0","method":"first","id":0,"params":[]}"#
        );
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            r#"{"jsonrpc":"2.0","method":"second","id":1,"params":{"k":"v"}}"#
        );

        drop(call);
        writer.close().await.unwrap();
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn writer_reports_closed_pipe() {
        let (host_side, writer_side) = tokio::io::duplex(64);
        drop(host_side);
        let (sender, writer) = spawn_writer(writer_side);

        sender.send("{}".into()).unwrap();
        assert!(matches!(writer.close().await, Err(BridgeError::Io(_))));
    }

    #[tokio::test]
    async fn spawn_reports_missing_program() {
        let result = StdioServer::spawn(
            "/nonexistent/webxdc-bridge-test-server",
            &[],
            &BridgeConfig::default(),
        );
        assert!(matches!(result, Err(BridgeError::Process(_))));
    }

    /// Answers every request with `{"echo": <id>}` and ignores notifications.
    #[cfg(unix)]
    const ECHO_SERVER: &str = r#"while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  if [ -n "$id" ] && [ "$id" != 0 ]; then
    printf '{"jsonrpc":"2.0","id":%s,"result":{"echo":%s}}\n' "$id" "$id"
  fi
done"#;

    #[cfg(unix)]
    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_owned(), script.to_owned()]
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn server_round_trip_and_clean_shutdown() {
        let server = StdioServer::spawn("sh", &sh(ECHO_SERVER), &BridgeConfig::default()).unwrap();
        let client = server.client();

        client.notify("hello", serde_json::json!([])).unwrap();
        let first = client
            .call_value("ping", serde_json::json!([1]))
            .await
            .unwrap();
        let second = client
            .call_value("ping", serde_json::json!([2]))
            .await
            .unwrap();
        assert_eq!(first, serde_json::json!({"echo": 1}));
        assert_eq!(second, serde_json::json!({"echo": 2}));
        assert_eq!(server.transport().pending_count(), 0);

        let stats = server.shutdown().await.unwrap();
        assert_eq!(
            stats,
            PumpStats {
                lines: 2,
                settled: 2,
                dropped: 0,
                malformed: 0,
            }
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exited_server_fails_calls_instead_of_hanging() {
        let server = StdioServer::spawn("true", &[], &BridgeConfig::default()).unwrap();
        let client = server.client();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            client.call_value("get_system_info", serde_json::json!([])),
        )
        .await
        .expect("call against an exited server must not hang");
        assert!(matches!(result, Err(BridgeError::TransportClosed)));

        let stats = server.shutdown().await.unwrap();
        assert_eq!(stats, PumpStats::default());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unresponsive_server_is_killed_after_grace() {
        // `exec` so the killed process is the one holding stdout.
        let server =
            StdioServer::spawn("sh", &sh("exec sleep 30"), &BridgeConfig::default()).unwrap();
        let transport = Arc::clone(server.transport());
        let call = transport
            .request("never", serde_json::json!([]))
            .unwrap();

        let started = std::time::Instant::now();
        let stats = server
            .shutdown_with_grace(Duration::from_millis(100))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(stats.lines, 0);
        assert!(matches!(call.await, Err(BridgeError::TransportClosed)));
    }
}
