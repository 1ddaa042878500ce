//! MCP (Model Context Protocol) configuration types for the domain layer.
//!
//! These are lightweight config structs used to deserialize the `[mcp]`
//! section of the gateway config. The actual MCP client logic lives in
//! the `ag-mcp-client` crate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-level MCP configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpConfig {
    /// List of MCP server definitions.
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,
}

impl McpConfig {
    /// Servers that are not explicitly disabled, in declaration order.
    pub fn enabled_servers(&self) -> impl Iterator<Item = &McpServerConfig> {
        self.servers.iter().filter(|s| s.enabled)
    }
}

/// Configuration for a single MCP server connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Unique server name; tool calls are routed by it.
    #[serde(alias = "id")]
    pub name: String,

    /// Transport type (`"stdio"` or `"http"`).
    #[serde(default)]
    pub transport: McpTransportKind,

    #[serde(default = "d_true")]
    pub enabled: bool,

    /// The command to spawn (stdio only).
    #[serde(default)]
    pub command: String,

    /// Arguments to pass to the command.
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables for the spawned process, layered over
    /// the gateway's own environment.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Endpoint URL (http only).
    #[serde(default)]
    pub url: Option<String>,

    /// Extra request headers sent on every call (http only).
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl McpServerConfig {
    pub fn stdio(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            transport: McpTransportKind::Stdio,
            enabled: true,
            command: command.into(),
            args,
            env: HashMap::new(),
            url: None,
            headers: HashMap::new(),
        }
    }

    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: McpTransportKind::Http,
            enabled: true,
            command: String::new(),
            args: Vec::new(),
            env: HashMap::new(),
            url: Some(url.into()),
            headers: HashMap::new(),
        }
    }
}

/// Transport kind for connecting to an MCP server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum McpTransportKind {
    #[default]
    Stdio,
    Http,
}

fn d_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_defaults() {
        let cfg: McpConfig = serde_json::from_str("{}").unwrap();
        assert!(cfg.servers.is_empty());
    }

    #[test]
    fn deserialize_stdio_server() {
        let raw = r#"{
            "name": "filesystem",
            "command": "npx",
            "args": ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"],
            "transport": "stdio"
        }"#;
        let cfg: McpServerConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.name, "filesystem");
        assert_eq!(cfg.command, "npx");
        assert_eq!(cfg.args.len(), 3);
        assert_eq!(cfg.transport, McpTransportKind::Stdio);
        assert!(cfg.enabled);
    }

    #[test]
    fn id_is_accepted_as_name() {
        let raw = r#"{ "id": "legacy", "command": "echo" }"#;
        let cfg: McpServerConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.name, "legacy");
        assert_eq!(cfg.transport, McpTransportKind::Stdio);
    }

    #[test]
    fn http_server_with_headers() {
        let raw = r#"{
            "name": "remote",
            "transport": "http",
            "url": "http://localhost:8080/mcp",
            "headers": { "authorization": "Bearer t" }
        }"#;
        let cfg: McpServerConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.transport, McpTransportKind::Http);
        assert_eq!(cfg.url.as_deref(), Some("http://localhost:8080/mcp"));
        assert_eq!(cfg.headers["authorization"], "Bearer t");
    }

    #[test]
    fn disabled_servers_are_filtered() {
        let raw = r#"{ "servers": [
            { "name": "a", "command": "x" },
            { "name": "b", "command": "y", "enabled": false }
        ] }"#;
        let cfg: McpConfig = serde_json::from_str(raw).unwrap();
        let names: Vec<_> = cfg.enabled_servers().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a"]);
    }
}
