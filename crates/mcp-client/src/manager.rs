//! MCP manager: holds all MCP server connections and orchestrates tool
//! discovery and dispatch.

use std::sync::Arc;

use serde_json::Value;

use ag_domain::config::McpConfig;
use ag_domain::{CallScope, Interrupt};

use crate::client::{McpClient, McpTool};
use crate::transport::TransportError;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// McpManager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Registry of independent MCP server clients, addressed by server name.
pub struct McpManager {
    clients: Vec<Arc<McpClient>>,
}

impl McpManager {
    /// Create an empty manager (no MCP servers configured).
    pub fn empty() -> Self {
        Self {
            clients: Vec::new(),
        }
    }

    /// Build one client per enabled server. Nothing connects until first use.
    pub fn from_config(config: &McpConfig) -> Self {
        let clients: Vec<_> = config
            .enabled_servers()
            .map(|server| Arc::new(McpClient::from_config(server.clone())))
            .collect();

        let skipped = config.servers.len() - clients.len();
        tracing::info!(count = clients.len(), skipped, "MCP manager configured");

        Self { clients }
    }

    pub fn from_clients(clients: impl IntoIterator<Item = McpClient>) -> Self {
        Self {
            clients: clients.into_iter().map(Arc::new).collect(),
        }
    }

    /// List tools across all servers concurrently.
    ///
    /// A server that fails to connect or list is logged and contributes no
    /// tools. An interrupt from the caller's scope fails the whole listing.
    pub async fn list_tools(&self, scope: &CallScope) -> Result<Vec<McpTool>, McpError> {
        let results = futures_util::future::join_all(
            self.clients
                .iter()
                .map(|client| async move { (client.name(), client.list_tools(scope).await) }),
        )
        .await;

        let mut tools = Vec::new();
        for (server, result) in results {
            match result {
                Ok(listed) => tools.extend(listed),
                Err(e) => {
                    if let Some(interrupt) = e.interrupt() {
                        return Err(McpError::Interrupted(interrupt));
                    }
                    tracing::warn!(server, error = %e, "skipping MCP server in tool listing");
                }
            }
        }
        Ok(tools)
    }

    /// Call a tool on the named server. No other server is consulted.
    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
        scope: &CallScope,
    ) -> Result<Value, McpError> {
        let client = self
            .client(server)
            .ok_or_else(|| McpError::ServerNotFound(server.to_string()))?;
        client.call_tool(tool, arguments, scope).await
    }

    pub fn client(&self, server: &str) -> Option<&McpClient> {
        self.clients
            .iter()
            .find(|c| c.name() == server)
            .map(|c| c.as_ref())
    }

    pub fn server_names(&self) -> Vec<&str> {
        self.clients.iter().map(|c| c.name()).collect()
    }

    /// Return the number of configured servers.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Gracefully shut down all servers concurrently.
    pub async fn shutdown(&self) {
        let futs: Vec<_> = self.clients.iter().map(|c| c.shutdown()).collect();
        futures_util::future::join_all(futs).await;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Errors specific to MCP operations.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("MCP transport error on '{server}': {source}")]
    Transport {
        server: String,
        #[source]
        source: TransportError,
    },

    #[error("MCP protocol error on '{server}': {message}")]
    Protocol { server: String, message: String },

    #[error("tool server not found: {0}")]
    ServerNotFound(String),

    #[error("MCP server '{server}' is unavailable: {message}")]
    ConnectFailed { server: String, message: String },

    #[error(transparent)]
    Interrupted(#[from] Interrupt),
}

impl McpError {
    pub fn interrupt(&self) -> Option<Interrupt> {
        match self {
            McpError::Interrupted(i) => Some(*i),
            _ => None,
        }
    }
}
