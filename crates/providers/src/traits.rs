use ag_domain::error::Result;
use ag_domain::tool::{Message, ToolCall, ToolDefinition};
use ag_domain::CallScope;
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic chat completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// Model identifier sent upstream.
    pub model: String,
    /// The conversation messages to send, in order.
    pub messages: Vec<Message>,
    /// Tool definitions the model may invoke. Omitted upstream when empty.
    pub tools: Vec<ToolDefinition>,
}

/// Token accounting reported by the upstream, when it reports any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Exactly one assistant message returned by the upstream.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    /// Textual content. `None` when the upstream sent `null` or omitted it.
    pub content: Option<String>,
    /// Tool calls emitted by the model, in order.
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    /// The model that actually produced the response.
    pub model: String,
    /// The reason the model stopped generating (e.g. "stop", "tool_calls").
    pub finish_reason: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The upstream chat-completion sender.
///
/// Implementations must honour `scope`: when it is cancelled or its deadline
/// passes, the in-flight call is abandoned and `Error::Interrupted` returned.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request and wait for the full response.
    async fn chat(&self, req: &ChatRequest, scope: &CallScope) -> Result<ChatResponse>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}
