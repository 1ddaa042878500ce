//! A single MCP server connection with a lazy, single-flight handshake.
//!
//! State transitions:
//!
//! ```text
//! Unconnected ──first caller──▶ Connecting ──ok──▶ Ready
//!      ▲                            │
//!      └──── leader interrupted ────┤
//!                                   └──error──▶ Failed (sticky)
//! ```
//!
//! Concurrent first callers wait on the in-flight attempt instead of
//! starting their own.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;

use ag_domain::config::{McpServerConfig, McpTransportKind};
use ag_domain::CallScope;

use crate::manager::McpError;
use crate::protocol::{self, ToolCallParams, ToolsListResult};
use crate::transport::{HttpTransport, McpTransport, StdioTransport, TransportError};

/// A tool discovered on a server, tagged with the server that owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpTool {
    pub server: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: Value,
}

enum State {
    Unconnected,
    /// The receiver wakes when the leader settles or gives up.
    Connecting(watch::Receiver<()>),
    Ready(Arc<dyn McpTransport>),
    Failed(String),
}

enum Turn {
    Lead(watch::Sender<()>),
    Wait(watch::Receiver<()>),
}

pub struct McpClient {
    name: String,
    config: Option<McpServerConfig>,
    transport: Mutex<Option<Arc<dyn McpTransport>>>,
    state: Mutex<State>,
}

impl McpClient {
    /// Build a client from config. No I/O happens until first use.
    pub fn from_config(config: McpServerConfig) -> Self {
        Self {
            name: config.name.clone(),
            config: Some(config),
            transport: Mutex::new(None),
            state: Mutex::new(State::Unconnected),
        }
    }

    /// Wrap an already-built transport. The handshake is still lazy.
    pub fn attached(name: impl Into<String>, transport: Arc<dyn McpTransport>) -> Self {
        Self {
            name: name.into(),
            config: None,
            transport: Mutex::new(Some(transport)),
            state: Mutex::new(State::Unconnected),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the handshake has completed.
    pub fn is_ready(&self) -> bool {
        matches!(*self.state.lock(), State::Ready(_))
    }

    /// List the server's tools, each tagged with this server's name.
    pub async fn list_tools(&self, scope: &CallScope) -> Result<Vec<McpTool>, McpError> {
        let transport = self.ready(scope).await?;
        let result = transport
            .request("tools/list", None, scope)
            .await
            .map_err(|e| self.transport_error(e))?;

        let listing: ToolsListResult =
            serde_json::from_value(result).map_err(|e| McpError::Protocol {
                server: self.name.clone(),
                message: format!("malformed tools/list result: {e}"),
            })?;

        tracing::debug!(server = %self.name, count = listing.tools.len(), "listed MCP tools");

        Ok(listing
            .tools
            .into_iter()
            .map(|def| McpTool {
                server: self.name.clone(),
                name: def.name,
                description: def.description,
                input_schema: def
                    .input_schema
                    .unwrap_or_else(|| serde_json::json!({ "type": "object" })),
            })
            .collect())
    }

    /// Invoke a tool and return the raw `result` payload.
    pub async fn call_tool(
        &self,
        tool: &str,
        arguments: Value,
        scope: &CallScope,
    ) -> Result<Value, McpError> {
        let transport = self.ready(scope).await?;
        let params = serde_json::to_value(ToolCallParams {
            name: tool.to_string(),
            arguments,
        })
        .map_err(|e| McpError::Protocol {
            server: self.name.clone(),
            message: e.to_string(),
        })?;

        tracing::debug!(server = %self.name, tool, "calling MCP tool");
        transport
            .request("tools/call", Some(params), scope)
            .await
            .map_err(|e| self.transport_error(e))
    }

    /// Shut down the underlying transport, if one was ever built.
    pub async fn shutdown(&self) {
        let transport = self.transport.lock().take();
        *self.state.lock() = State::Failed("client shut down".into());
        if let Some(transport) = transport {
            tracing::info!(server = %self.name, "shutting down MCP server");
            transport.shutdown().await;
        }
    }

    // ── connection state machine ────────────────────────────────────

    async fn ready(&self, scope: &CallScope) -> Result<Arc<dyn McpTransport>, McpError> {
        loop {
            scope.check()?;

            let turn = {
                let mut state = self.state.lock();
                match &*state {
                    State::Ready(transport) => return Ok(transport.clone()),
                    State::Failed(message) => {
                        return Err(McpError::ConnectFailed {
                            server: self.name.clone(),
                            message: message.clone(),
                        })
                    }
                    State::Connecting(rx) => Turn::Wait(rx.clone()),
                    State::Unconnected => {
                        let (tx, rx) = watch::channel(());
                        *state = State::Connecting(rx);
                        Turn::Lead(tx)
                    }
                }
            };

            match turn {
                Turn::Lead(tx) => return self.lead(tx, scope).await,
                Turn::Wait(mut rx) => {
                    // Errs once the leader drops its sender; either way re-read.
                    let _ = scope.guard(rx.changed()).await?;
                }
            }
        }
    }

    async fn lead(
        &self,
        wake: watch::Sender<()>,
        scope: &CallScope,
    ) -> Result<Arc<dyn McpTransport>, McpError> {
        let mut attempt = Attempt {
            state: &self.state,
            settled: false,
            _wake: wake,
        };

        match self.connect(scope).await {
            Ok(transport) => {
                attempt.settle(State::Ready(transport.clone()));
                Ok(transport)
            }
            // Leaves the attempt unsettled so a later caller may retry.
            Err(e) if e.interrupt().is_some() => Err(e),
            Err(e) => {
                tracing::warn!(server = %self.name, error = %e, "MCP server failed to initialize");
                attempt.settle(State::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn connect(&self, scope: &CallScope) -> Result<Arc<dyn McpTransport>, McpError> {
        let transport = self.transport()?;

        let params = serde_json::to_value(protocol::initialize_params()).map_err(|e| {
            McpError::Protocol {
                server: self.name.clone(),
                message: format!("failed to serialize initialize params: {e}"),
            }
        })?;
        let init = transport
            .request("initialize", Some(params), scope)
            .await
            .map_err(|e| self.transport_error(e))?;

        match transport
            .notify("notifications/initialized", None, scope)
            .await
        {
            Ok(()) => {}
            Err(e) if e.interrupt().is_some() => return Err(self.transport_error(e)),
            Err(e) => {
                tracing::warn!(server = %self.name, error = %e, "notifications/initialized was not delivered");
            }
        }

        tracing::info!(
            server = %self.name,
            server_info = ?init.get("serverInfo"),
            "MCP server initialized"
        );
        Ok(transport)
    }

    /// Reuse the transport across retries; build it on first use.
    fn transport(&self) -> Result<Arc<dyn McpTransport>, McpError> {
        let mut slot = self.transport.lock();
        if let Some(transport) = slot.as_ref() {
            return Ok(transport.clone());
        }
        let config = self.config.as_ref().ok_or_else(|| McpError::ConnectFailed {
            server: self.name.clone(),
            message: "client has no transport".into(),
        })?;

        tracing::info!(
            server = %self.name,
            transport = ?config.transport,
            "connecting to MCP server"
        );
        let built: Arc<dyn McpTransport> = match config.transport {
            McpTransportKind::Stdio => {
                Arc::new(StdioTransport::spawn(config).map_err(|e| self.transport_error(e))?)
            }
            McpTransportKind::Http => {
                Arc::new(HttpTransport::new(config).map_err(|e| self.transport_error(e))?)
            }
        };
        *slot = Some(built.clone());
        Ok(built)
    }

    fn transport_error(&self, e: TransportError) -> McpError {
        match e.interrupt() {
            Some(interrupt) => McpError::Interrupted(interrupt),
            None => McpError::Transport {
                server: self.name.clone(),
                source: e,
            },
        }
    }
}

/// Owned by the connection leader. If dropped unsettled (interrupted or
/// cancelled future) the state returns to `Unconnected`; waiters are woken
/// afterwards when the sender drops.
struct Attempt<'a> {
    state: &'a Mutex<State>,
    settled: bool,
    _wake: watch::Sender<()>,
}

impl Attempt<'_> {
    fn settle(&mut self, next: State) {
        *self.state.lock() = next;
        self.settled = true;
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if !self.settled {
            *self.state.lock() = State::Unconnected;
        }
    }
}
