//! Tool exposure and tool-result shaping for the agent loop.

use ag_domain::config::ToolPolicy;
use ag_domain::tool::ToolDefinition;
use ag_mcp_client::McpTool;
use serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Policy filtering
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Apply the allow/deny policy to a registry listing. Order is preserved.
pub fn filter_tools(policy: Option<&ToolPolicy>, tools: Vec<McpTool>) -> Vec<McpTool> {
    match policy {
        Some(policy) => tools.into_iter().filter(|t| policy.allows(&t.name)).collect(),
        None => tools,
    }
}

/// Tool specifications as sent upstream.
pub fn tool_definitions(tools: &[McpTool]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|t| ToolDefinition {
            name: t.name.clone(),
            description: t.description.clone(),
            parameters: t.input_schema.clone(),
        })
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Result text
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Render a raw `tools/call` result as text. Strings pass through untouched.
pub fn tool_result_text(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Cap `text` at `limit` bytes.
///
/// The cut is made on the encoded bytes, so a multi-byte character at the
/// boundary may be split; the partial sequence renders as U+FFFD.
/// The kept prefix is exactly `limit` bytes only when the cut lands on a
/// character boundary. A split character of which `k` bytes were kept is
/// replaced by the 3-byte U+FFFD, so the prefix is `limit - k + 3` bytes.
pub fn truncate_tool_output(text: String, limit: usize) -> String {
    let bytes = text.len();
    if bytes <= limit {
        return text;
    }
    let kept = String::from_utf8_lossy(&text.as_bytes()[..limit]);
    let dropped = bytes - limit;
    format!("{kept}\n...[truncated {dropped} bytes; original={bytes} bytes, limit={limit}]")
}
