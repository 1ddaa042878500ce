//! OpenAI-compatible `/v1/chat/completions` endpoint.
//!
//! Accepts the standard OpenAI `ChatCompletion` request format, runs the
//! agent loop over the full message list, and returns an OpenAI-shaped
//! response (both streaming and non-streaming). Status lines produced while
//! the agent works are streamed as ordinary content deltas.

use std::convert::Infallible;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use ag_domain::tool::{Message, Role, ToolCall};

use crate::runtime::{spawn_run, RunEvent, RunHandle};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct OpenAIChatRequest {
    /// Echoed back in the response. Falls back to the public model id.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<OpenAIMessage>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIMessage {
    pub role: Role,
    /// A string, an array of content parts, or null.
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default)]
    pub tool_calls: Vec<OpenAIToolCall>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIToolCall {
    pub id: String,
    pub function: OpenAIFunctionCall,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIFunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

impl OpenAIMessage {
    fn into_message(self) -> Message {
        Message {
            role: self.role,
            content: self.content.and_then(content_text),
            tool_calls: self
                .tool_calls
                .into_iter()
                .map(|tc| ToolCall {
                    call_id: tc.id,
                    tool_name: tc.function.name,
                    arguments: tc.function.arguments,
                })
                .collect(),
            tool_call_id: self.tool_call_id,
        }
    }
}

/// Flatten message content. Array content keeps only its text parts.
fn content_text(content: Value) -> Option<String> {
    match content {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Array(parts) => Some(
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        other => Some(other.to_string()),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Serialize)]
struct OpenAIChatResponse {
    id: String,
    object: &'static str,
    created: i64,
    model: String,
    choices: Vec<OpenAIChoice>,
    usage: OpenAIUsage,
}

#[derive(Debug, Serialize)]
struct OpenAIChoice {
    index: u32,
    message: OpenAIResponseMessage,
    finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
struct OpenAIResponseMessage {
    role: &'static str,
    content: String,
}

/// Always zero: token accounting is not aggregated across agent steps.
#[derive(Debug, Serialize, Default)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// ── Streaming chunk types ────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct OpenAIChunk {
    id: String,
    object: &'static str,
    created: i64,
    model: String,
    choices: Vec<OpenAIChunkChoice>,
}

#[derive(Debug, Serialize)]
struct OpenAIChunkChoice {
    index: u32,
    delta: OpenAIChunkDelta,
    finish_reason: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct OpenAIChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/chat/completions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat_completions(
    State(state): State<AppState>,
    Json(body): Json<OpenAIChatRequest>,
) -> Response {
    let model = body
        .model
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| state.config.public_model_id.clone());
    let messages: Vec<Message> = body.messages.into_iter().map(OpenAIMessage::into_message).collect();

    let handle = spawn_run(
        state.upstream.clone(),
        state.mcp.clone(),
        state.agent_run(messages),
    );
    tracing::debug!(run_id = %handle.run_id, stream = body.stream, "chat completion accepted");

    let completion_id = format!("chatcmpl-{}", uuid::Uuid::new_v4());
    let created = chrono::Utc::now().timestamp();

    if body.stream {
        let stream = make_openai_sse_stream(handle, completion_id, created, model);
        Sse::new(stream)
            .keep_alive(KeepAlive::default())
            .into_response()
    } else {
        chat_completions_blocking(handle, completion_id, created, model)
            .await
            .into_response()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Non-streaming
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn chat_completions_blocking(
    mut handle: RunHandle,
    completion_id: String,
    created: i64,
    model: String,
) -> Response {
    // Dropping the handle (client gone) cancels the run.
    let mut outcome = None;
    while let Some(event) = handle.recv().await {
        match event {
            RunEvent::Chunk(_) => {}
            RunEvent::Final(text) => outcome = Some(Ok(text)),
            RunEvent::Error(message) => outcome = Some(Err(message)),
        }
    }

    let final_content = match outcome {
        Some(Ok(text)) => text,
        Some(Err(message)) => {
            return openai_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                &message,
            )
            .into_response();
        }
        None => {
            return openai_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "agent run ended without a result",
            )
            .into_response();
        }
    };

    let response = OpenAIChatResponse {
        id: completion_id,
        object: "chat.completion",
        created,
        model,
        choices: vec![OpenAIChoice {
            index: 0,
            message: OpenAIResponseMessage {
                role: "assistant",
                content: final_content,
            },
            finish_reason: "stop",
        }],
        usage: OpenAIUsage::default(),
    };

    Json(response).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn chunk_event(
    completion_id: &str,
    created: i64,
    model: &str,
    delta: OpenAIChunkDelta,
    finish_reason: Option<&'static str>,
) -> Option<Event> {
    let chunk = OpenAIChunk {
        id: completion_id.to_string(),
        object: "chat.completion.chunk",
        created,
        model: model.to_string(),
        choices: vec![OpenAIChunkChoice {
            index: 0,
            delta,
            finish_reason,
        }],
    };
    serde_json::to_string(&chunk)
        .ok()
        .map(|data| Event::default().data(data))
}

fn make_openai_sse_stream(
    mut handle: RunHandle,
    completion_id: String,
    created: i64,
    model: String,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        // Send initial chunk with the assistant role.
        let role = OpenAIChunkDelta { role: Some("assistant"), content: None };
        if let Some(event) = chunk_event(&completion_id, created, &model, role, None) {
            yield Ok(event);
        }

        while let Some(event) = handle.recv().await {
            match event {
                RunEvent::Chunk(text) => {
                    let delta = OpenAIChunkDelta { role: None, content: Some(text) };
                    if let Some(event) = chunk_event(&completion_id, created, &model, delta, None) {
                        yield Ok(event);
                    }
                }
                RunEvent::Final(_) => {
                    // The final text already went out as the last chunk.
                    let delta = OpenAIChunkDelta { role: None, content: None };
                    if let Some(event) = chunk_event(&completion_id, created, &model, delta, Some("stop")) {
                        yield Ok(event);
                    }
                }
                RunEvent::Error(message) => {
                    let err = serde_json::json!({
                        "error": {
                            "message": message,
                            "type": "server_error",
                        }
                    });
                    yield Ok(Event::default().data(err.to_string()));
                }
            }
        }

        // Terminate the stream with [DONE].
        yield Ok(Event::default().data("[DONE]"));

        // The handle drops here; a client that disconnects earlier drops it
        // with the stream, which cancels the run.
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build a standard OpenAI error response.
pub(crate) fn openai_error_response(
    status: StatusCode,
    error_type: &str,
    message: &str,
) -> (StatusCode, Json<Value>) {
    (
        status,
        Json(serde_json::json!({
            "error": {
                "message": message,
                "type": error_type,
            }
        })),
    )
}
