//! MCP transport layer.
//!
//! Each MCP server communicates over a transport. Currently supported:
//! - **Stdio**: spawn a child process, send JSON-RPC over stdin/stdout.
//! - **Http**: one POST per message, session continuity via `Mcp-Session-Id`.
//!
//! Transports never retry. Every request is bounded by the caller's
//! [`CallScope`]; an interrupted request releases its own pending state.

mod http;
mod stdio;

pub use http::HttpTransport;
pub use stdio::StdioTransport;

use async_trait::async_trait;
use serde_json::Value;

use ag_domain::{CallScope, Interrupt};

use crate::protocol::JsonRpcError;

/// Trait for MCP server transports.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a JSON-RPC request and wait for its correlated result.
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        scope: &CallScope,
    ) -> Result<Value, TransportError>;

    /// Send a JSON-RPC notification (no response expected), bounded by `scope`.
    async fn notify(
        &self,
        method: &str,
        params: Option<Value>,
        scope: &CallScope,
    ) -> Result<(), TransportError>;

    /// Shut down the transport gracefully.
    async fn shutdown(&self);
}

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MCP server process has exited")]
    ProcessExited,

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("{0}")]
    Rpc(#[from] JsonRpcError),

    #[error("invalid transport configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Interrupted(#[from] Interrupt),
}

impl TransportError {
    /// The interrupt behind this failure, if the caller's scope ended it.
    pub fn interrupt(&self) -> Option<Interrupt> {
        match self {
            TransportError::Interrupted(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Request(e.to_string())
    }
}
