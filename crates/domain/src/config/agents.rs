use serde::{Deserialize, Serialize};
use std::time::Duration;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent loop limits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Default ceiling on identical tool invocations within one run.
pub const DEFAULT_REPEAT_TOOL_CALL_LIMIT: u32 = 3;

/// Limits and policy for the reason-act loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum upstream round trips before the run fails.
    #[serde(default = "d_8")]
    pub max_steps: u32,
    /// Wall-clock budget for an entire run (milliseconds).
    #[serde(default = "d_60000")]
    pub request_timeout_ms: u64,
    /// Tool output longer than this (in bytes) is truncated before it is
    /// fed back to the model.
    #[serde(default = "d_16384")]
    pub max_tool_output_bytes: usize,
    #[serde(default)]
    pub tool_policy: Option<ToolPolicy>,
    /// Wrap status chunks in `[STATUS]…[/STATUS]` markers.
    #[serde(default)]
    pub status_tags_enabled: bool,
    /// How many times the same tool may be invoked with the same arguments.
    #[serde(default)]
    pub repeat_tool_call_limit: Option<u32>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 8,
            request_timeout_ms: 60_000,
            max_tool_output_bytes: 16_384,
            tool_policy: None,
            status_tags_enabled: false,
            repeat_tool_call_limit: None,
        }
    }
}

impl AgentConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Effective repeat limit: defaults to 3, never below 1.
    pub fn repeat_limit(&self) -> u32 {
        self.repeat_tool_call_limit
            .unwrap_or(DEFAULT_REPEAT_TOOL_CALL_LIMIT)
            .max(1)
    }
}

/// Tool allow/deny policy with exact name matching.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolPolicy {
    /// When present and non-empty, only these tool names are exposed.
    #[serde(default, alias = "allow")]
    pub allowlist: Option<Vec<String>>,
    /// Tool names that are never exposed, even when allowlisted.
    #[serde(default, alias = "deny")]
    pub denylist: Option<Vec<String>>,
}

impl ToolPolicy {
    /// Check whether the given tool name is permitted by this policy.
    ///
    /// The allowlist is applied first, then the denylist removes names.
    /// Matching is exact and case-sensitive.
    pub fn allows(&self, tool_name: &str) -> bool {
        if let Some(allow) = &self.allowlist {
            if !allow.is_empty() && !allow.iter().any(|a| a == tool_name) {
                return false;
            }
        }
        if let Some(deny) = &self.denylist {
            if deny.iter().any(|d| d == tool_name) {
                return false;
            }
        }
        true
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_8() -> u32 {
    8
}
fn d_60000() -> u64 {
    60_000
}
fn d_16384() -> usize {
    16_384
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
