// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;

use webxdc_bridge_core::error::{BridgeError, Result};

#[derive(Debug, Parser)]
#[command(name = "webxdc-bridge", version, about = "Talk JSON-RPC to a native chat core")]
pub(crate) struct Args {
    /// Bridge config file (JSON). Defaults apply when it does not exist.
    #[arg(long, short = 'c', env = "WEBXDC_BRIDGE_CONFIG")]
    pub(crate) config: Option<PathBuf>,
    /// JSON-RPC server executable speaking one envelope per line on stdio.
    #[arg(long, short = 's')]
    pub(crate) server: String,
    /// Argument passed to the server; repeat for several.
    #[arg(long = "server-arg", allow_hyphen_values = true)]
    pub(crate) server_args: Vec<String>,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Issue a request and print its result.
    Call(CallArgs),
    /// Send a notification (id 0); nothing is waited for.
    Notify(CallArgs),
}

#[derive(Debug, Parser)]
pub(crate) struct CallArgs {
    /// Method name.
    pub(crate) method: String,
    /// Params as JSON.
    #[arg(default_value = "[]")]
    pub(crate) params: String,
}

impl CallArgs {
    pub(crate) fn params_json(&self) -> Result<Value> {
        serde_json::from_str(&self.params)
            .map_err(|e| BridgeError::Config(format!("params are not valid JSON: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn call_with_default_params() {
        let args = Args::try_parse_from([
            "webxdc-bridge",
            "--server",
            "deltachat-rpc-server",
            "call",
            "get_system_info",
        ])
        .unwrap();
        assert_eq!(args.server, "deltachat-rpc-server");
        let Command::Call(call) = args.command else {
            panic!("expected call");
        };
        assert_eq!(call.method, "get_system_info");
        assert_eq!(call.params_json().unwrap(), json!([]));
    }

    #[test]
    fn notify_with_params_and_server_args() {
        let args = Args::try_parse_from([
            "webxdc-bridge",
            "-s",
            "rpc-server",
            "--server-arg",
            "--accounts",
            "--server-arg",
            "/tmp/accounts",
            "notify",
            "set_config",
            r#"[1, "displayname", "Alice"]"#,
        ])
        .unwrap();
        assert_eq!(args.server_args, vec!["--accounts", "/tmp/accounts"]);
        let Command::Notify(note) = args.command else {
            panic!("expected notify");
        };
        assert_eq!(note.params_json().unwrap(), json!([1, "displayname", "Alice"]));
    }

    #[test]
    fn invalid_params_are_reported() {
        let call = CallArgs {
            method: "m".into(),
            params: "{oops".into(),
        };
        assert!(matches!(call.params_json(), Err(BridgeError::Config(_))));
    }
}
