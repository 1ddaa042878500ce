//! OpenAI-compatible adapter.
//!
//! Works with OpenAI, Ollama, vLLM, LM Studio, Together, and any other
//! endpoint that follows the OpenAI chat completions contract.

use crate::traits::{ChatRequest, ChatResponse, LlmProvider, Usage};
use crate::util::{from_reqwest, resolve_api_key};
use ag_domain::config::UpstreamConfig;
use ag_domain::error::{Error, Result};
use ag_domain::tool::{Message, Role, ToolCall, ToolDefinition};
use ag_domain::CallScope;
use serde_json::Value;

const PROVIDER_ID: &str = "openai_compat";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An LLM provider adapter for any OpenAI-compatible API endpoint.
pub struct OpenAiCompatProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new provider from the upstream config.
    ///
    /// No client-level timeout is set: every call is bounded by the
    /// caller's [`CallScope`].
    pub fn from_config(cfg: &UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder().build().map_err(from_reqwest)?;
        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: resolve_api_key(cfg),
            client,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    // ── Internal: build authenticated request builder ──────────────

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        let req = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        if self.api_key.is_empty() {
            req
        } else {
            req.bearer_auth(&self.api_key)
        }
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let url = self.chat_url();
        let body = build_chat_body(req);

        tracing::debug!(
            provider = PROVIDER_ID,
            url = %url,
            model = %req.model,
            messages = req.messages.len(),
            tools = req.tools.len(),
            "chat request"
        );

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let resp_text = resp.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            return Err(Error::Provider {
                provider: PROVIDER_ID.into(),
                message: format!("HTTP {} - {}", status.as_u16(), resp_text),
            });
        }

        let resp_json: Value = serde_json::from_str(&resp_text)?;
        parse_chat_response(&resp_json)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn build_chat_body(req: &ChatRequest) -> Value {
    let messages: Vec<Value> = req.messages.iter().map(msg_to_openai).collect();

    let mut body = serde_json::json!({
        "model": req.model,
        "messages": messages,
        "stream": false,
    });

    if !req.tools.is_empty() {
        let tools: Vec<Value> = req.tools.iter().map(tool_to_openai).collect();
        body["tools"] = Value::Array(tools);
    }
    body
}

fn msg_to_openai(msg: &Message) -> Value {
    let mut obj = serde_json::json!({ "role": msg.role.as_str() });

    obj["content"] = match (&msg.content, msg.role) {
        (Some(text), _) => Value::String(text.clone()),
        // An assistant turn that only carries tool calls has null content.
        (None, Role::Assistant) => Value::Null,
        (None, _) => Value::String(String::new()),
    };

    if !msg.tool_calls.is_empty() {
        let calls: Vec<Value> = msg.tool_calls.iter().map(tool_call_to_openai).collect();
        obj["tool_calls"] = Value::Array(calls);
    }
    if let Some(id) = &msg.tool_call_id {
        obj["tool_call_id"] = Value::String(id.clone());
    }
    obj
}

fn tool_call_to_openai(call: &ToolCall) -> Value {
    serde_json::json!({
        "id": call.call_id,
        "type": "function",
        "function": {
            "name": call.tool_name,
            "arguments": call.arguments,
        }
    })
}

fn tool_to_openai(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_chat_response(body: &Value) -> Result<ChatResponse> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::Provider {
            provider: PROVIDER_ID.into(),
            message: "no choices in response".into(),
        })?;

    let message = choice
        .get("message")
        .filter(|m| m.is_object())
        .ok_or_else(|| Error::Provider {
            provider: PROVIDER_ID.into(),
            message: "no message in choice".into(),
        })?;

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .map(String::from);

    let finish_reason = choice
        .get("finish_reason")
        .and_then(|v| v.as_str())
        .map(String::from);

    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    let tool_calls = parse_openai_tool_calls(message)?;
    let usage = body.get("usage").and_then(parse_openai_usage);

    Ok(ChatResponse {
        content,
        tool_calls,
        usage,
        model,
        finish_reason,
    })
}

/// Tool-call arguments stay exactly as the model wrote them. An entry
/// without an id or function name fails the whole response.
fn parse_openai_tool_calls(message: &Value) -> Result<Vec<ToolCall>> {
    let arr = match message.get("tool_calls").and_then(|v| v.as_array()) {
        Some(a) => a,
        None => return Ok(Vec::new()),
    };
    arr.iter()
        .enumerate()
        .map(|(idx, tc)| {
            let malformed = |what: &str| Error::Provider {
                provider: PROVIDER_ID.into(),
                message: format!("tool_calls[{idx}] has no {what}"),
            };
            let call_id = tc
                .get("id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| malformed("id"))?
                .to_string();
            let func = tc.get("function").ok_or_else(|| malformed("function"))?;
            let tool_name = func
                .get("name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| malformed("function name"))?
                .to_string();
            let arguments = match func.get("arguments") {
                Some(Value::String(raw)) => raw.clone(),
                // Some servers send the object itself.
                Some(v) if !v.is_null() => v.to_string(),
                _ => "{}".to_string(),
            };
            Ok(ToolCall {
                call_id,
                tool_name,
                arguments,
            })
        })
        .collect()
}

/// Counts that do not fit a `u32` drop the usage block.
fn parse_openai_usage(v: &Value) -> Option<Usage> {
    let count = |key: &str| u32::try_from(v.get(key)?.as_u64()?).ok();
    Some(Usage {
        prompt_tokens: count("prompt_tokens")?,
        completion_tokens: count("completion_tokens")?,
        total_tokens: count("total_tokens")?,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(&self, req: &ChatRequest, scope: &CallScope) -> Result<ChatResponse> {
        scope.guard(self.send(req)).await?
    }

    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
