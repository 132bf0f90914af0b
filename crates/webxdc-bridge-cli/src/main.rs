// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// webxdc-bridge — issue JSON-RPC requests and notifications against a native
// chat core that speaks one envelope per line on stdio.
//
// Entry point. Loads config, initialises logging, spawns the server, and
// prints the result of the call on stdout.

mod args;

use std::process::ExitCode;

use clap::Parser;

use webxdc_bridge_core::BridgeConfig;
use webxdc_bridge_core::error::{BridgeError, Result};
use webxdc_bridge_rpc::StdioServer;

use args::{Args, Command};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("webxdc-bridge: {e}");
            return ExitCode::from(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(?config, "webxdc-bridge starting");

    match run(&args, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(BridgeError::Remote(remote)) => {
            eprintln!("remote error: {remote}");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "bridge failed");
            eprintln!("webxdc-bridge: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<BridgeConfig> {
    match &args.config {
        Some(path) => BridgeConfig::load_or_default(path),
        None => Ok(BridgeConfig::default()),
    }
}

async fn run(args: &Args, config: &BridgeConfig) -> Result<()> {
    let (call, params) = match &args.command {
        Command::Call(call) | Command::Notify(call) => (call, call.params_json()?),
    };

    let server = StdioServer::spawn(&args.server, &args.server_args, config)?;
    let client = server.client();
    let outcome = match &args.command {
        Command::Call(_) => client.call_value(&call.method, params).await.map(Some),
        Command::Notify(_) => client.notify(&call.method, params).map(|()| None),
    };
    drop(client);

    // Shut down before reporting so queued notifications reach the server.
    let stats = server.shutdown().await?;
    tracing::debug!(?stats, "server stopped");

    if let Some(result) = outcome? {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    Ok(())
}
