//! `ag-mcp-client`: MCP (Model Context Protocol) client for agentgate.
//!
//! This crate provides:
//! - JSON-RPC 2.0 protocol types for communicating with MCP servers.
//! - Stdio and HTTP transports that correlate responses to requests.
//! - `McpClient`, one lazily-initialized connection per server.
//! - `McpManager`, which aggregates tool listings across servers and
//!   routes calls by server name.
//!
//! # Usage
//!
//! ```rust,ignore
//! use ag_mcp_client::McpManager;
//!
//! let manager = McpManager::from_config(&config.mcp);
//! let scope = CallScope::detached(Duration::from_secs(30));
//!
//! for tool in manager.list_tools(&scope).await? {
//!     println!("{}:{}", tool.server, tool.name);
//! }
//!
//! let result = manager
//!     .call_tool("filesystem", "read_file", json!({"path": "/tmp/test.txt"}), &scope)
//!     .await?;
//! ```

pub mod client;
pub mod manager;
pub mod protocol;
pub mod transport;

pub use ag_domain::config::{McpConfig, McpServerConfig, McpTransportKind};
pub use client::{McpClient, McpTool};
pub use manager::{McpError, McpManager};
pub use transport::{HttpTransport, McpTransport, StdioTransport, TransportError};
