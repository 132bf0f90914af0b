// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Typed client over a shared transport.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use webxdc_bridge_core::error::Result;

use crate::transport::Transport;

/// Cheaply cloneable handle for issuing calls with typed params and results.
#[derive(Debug, Clone)]
pub struct RpcClient {
    transport: Arc<Transport>,
}

impl RpcClient {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// Call `method` and decode its result into `R`.
    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let result = self.call_value(method, params).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Call `method` and return the raw JSON result.
    pub async fn call_value<P: Serialize>(&self, method: &str, params: P) -> Result<Value> {
        let params = serde_json::to_value(params)?;
        self.transport.call(method, params).await
    }

    /// Send a notification; nothing comes back.
    pub fn notify<P: Serialize>(&self, method: &str, params: P) -> Result<()> {
        let params = serde_json::to_value(params)?;
        self.transport.notify(method, params)
    }
}
