//! Core runtime: the bounded reason-act loop that drives the upstream model
//! and the MCP tool registry until a final answer is produced.
//!
//! Entry points: [`run_agent`] runs one request to completion and reports
//! progress through a callback; [`spawn_run`] wraps it in a task and exposes
//! a stream of [`RunEvent`]s suitable for SSE or non-streaming aggregation.

pub mod guard;
pub mod tools;
pub mod turn;

pub use guard::{canonical_json, guard_key, RepeatGuard};
pub use tools::{filter_tools, tool_result_text, truncate_tool_output};
pub use turn::{run_agent, spawn_run, AgentRun, RunEvent, RunHandle};

use ag_domain::Interrupt;
use ag_mcp_client::McpError;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Why a run failed. Every variant aborts the current run only.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("tool not allowed or unavailable: {0}")]
    ToolNotAllowed(String),

    #[error("repeated tool-call guard triggered for {tool} ({count} > {limit})")]
    RepeatedToolCall { tool: String, count: u32, limit: u32 },

    #[error("invalid arguments for tool {tool}: {message}")]
    InvalidToolArguments { tool: String, message: String },

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    #[error("request aborted by client")]
    Cancelled,

    #[error("upstream returned empty choice")]
    EmptyUpstreamResponse,

    #[error("max steps exceeded: {0}")]
    MaxStepsExceeded(u32),

    #[error("upstream error: {0}")]
    Upstream(#[source] ag_domain::Error),

    #[error(transparent)]
    Mcp(McpError),
}

impl AgentError {
    /// Timing failures (deadline or client abort), as opposed to policy or
    /// protocol failures.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, AgentError::DeadlineExceeded | AgentError::Cancelled)
    }
}

impl From<Interrupt> for AgentError {
    fn from(i: Interrupt) -> Self {
        match i {
            Interrupt::Cancelled => AgentError::Cancelled,
            Interrupt::DeadlineExceeded => AgentError::DeadlineExceeded,
        }
    }
}

impl From<ag_domain::Error> for AgentError {
    fn from(e: ag_domain::Error) -> Self {
        match e {
            ag_domain::Error::Interrupted(i) => i.into(),
            other => AgentError::Upstream(other),
        }
    }
}

impl From<McpError> for AgentError {
    fn from(e: McpError) -> Self {
        match e.interrupt() {
            Some(i) => i.into(),
            None => AgentError::Mcp(e),
        }
    }
}
