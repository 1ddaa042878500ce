mod agents;
mod llm;
mod mcp;
mod server;

pub use agents::*;
pub use llm::*;
pub use mcp::*;
pub use server::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Model id advertised on `/v1/models` and echoed in completions.
    #[serde(default = "d_public_model_id")]
    pub public_model_id: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            public_model_id: d_public_model_id(),
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            mcp: McpConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

fn d_public_model_id() -> String {
    "agentgate".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl ConfigError {
    fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError::error("server.port", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError::error("server.host", "host must not be empty"));
        }

        if self.upstream.base_url.is_empty() {
            errors.push(ConfigError::error(
                "upstream.base_url",
                "base_url must not be empty",
            ));
        }
        if self.upstream.model.is_empty() {
            errors.push(ConfigError::error("upstream.model", "model must not be empty"));
        }
        match (&self.upstream.api_key, &self.upstream.api_key_env) {
            (Some(_), _) => errors.push(ConfigError::warning(
                "upstream.api_key",
                "plaintext API key in config; prefer api_key_env",
            )),
            (None, Some(var)) if std::env::var(var).is_err() => {
                errors.push(ConfigError::warning(
                    "upstream.api_key_env",
                    format!("environment variable '{var}' is not set"),
                ));
            }
            (None, None) => errors.push(ConfigError::warning(
                "upstream.api_key_env",
                "no API key configured; requests are sent unauthenticated",
            )),
            _ => {}
        }

        if self.agent.max_steps == 0 {
            errors.push(ConfigError::error("agent.max_steps", "must be greater than 0"));
        }
        if self.agent.request_timeout_ms == 0 {
            errors.push(ConfigError::error(
                "agent.request_timeout_ms",
                "must be greater than 0",
            ));
        }
        if self.agent.max_tool_output_bytes == 0 {
            errors.push(ConfigError::warning(
                "agent.max_tool_output_bytes",
                "0 truncates every tool result to the marker alone",
            ));
        }

        let mut seen = HashSet::new();
        for (i, server) in self.mcp.servers.iter().enumerate() {
            let field = format!("mcp.servers[{i}]");
            if server.name.is_empty() {
                errors.push(ConfigError::error(
                    format!("{field}.name"),
                    "server name must not be empty",
                ));
            } else if !seen.insert(server.name.as_str()) {
                errors.push(ConfigError::error(
                    format!("{field}.name"),
                    format!("duplicate server name '{}'", server.name),
                ));
            }
            match server.transport {
                McpTransportKind::Stdio if server.command.is_empty() => {
                    errors.push(ConfigError::error(
                        format!("{field}.command"),
                        "stdio server requires a command",
                    ));
                }
                McpTransportKind::Http if server.url.as_deref().unwrap_or("").is_empty() => {
                    errors.push(ConfigError::error(
                        format!("{field}.url"),
                        "http server requires a url",
                    ));
                }
                _ => {}
            }
        }

        if self.mcp.enabled_servers().next().is_none() {
            errors.push(ConfigError::warning(
                "mcp.servers",
                "no enabled MCP servers; the agent will answer without tools",
            ));
        }

        errors
    }
}
