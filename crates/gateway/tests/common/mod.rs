//! Test doubles shared by the gateway integration tests: a scripted
//! upstream and an in-memory MCP tool server exposing `sum` and `big`.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ag_domain::tool::{Role, ToolCall};
use ag_domain::{CallScope, Interrupt};
use ag_mcp_client::{McpClient, McpManager, McpTransport, TransportError};
use ag_providers::{ChatRequest, ChatResponse, LlmProvider};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Notify;

// ── Scripted upstream ───────────────────────────────────────────────────

pub type Script = Box<dyn Fn(usize, &ChatRequest) -> ChatResponse + Send + Sync>;

pub struct ScriptedUpstream {
    script: Script,
    delay: Duration,
    calls: AtomicUsize,
    pub requests: Mutex<Vec<ChatRequest>>,
    pub budgets: Mutex<Vec<Duration>>,
    pub cancelled: Notify,
}

impl ScriptedUpstream {
    pub fn new(script: impl Fn(usize, &ChatRequest) -> ChatResponse + Send + Sync + 'static) -> Self {
        Self::slow(Duration::ZERO, script)
    }

    pub fn slow(
        delay: Duration,
        script: impl Fn(usize, &ChatRequest) -> ChatResponse + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            delay,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            budgets: Mutex::new(Vec::new()),
            cancelled: Notify::new(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedUpstream {
    async fn chat(&self, req: &ChatRequest, scope: &CallScope) -> ag_domain::Result<ChatResponse> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.budgets.lock().push(scope.remaining());
        self.requests.lock().push(req.clone());
        if let Err(interrupt) = scope.guard(tokio::time::sleep(self.delay)).await {
            if interrupt == Interrupt::Cancelled {
                self.cancelled.notify_one();
            }
            return Err(interrupt.into());
        }
        Ok((self.script)(n, req))
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}

pub fn text(content: &str) -> ChatResponse {
    ChatResponse {
        content: Some(content.to_string()),
        ..Default::default()
    }
}

pub fn tool_call(id: &str, name: &str, arguments: &str) -> ChatResponse {
    ChatResponse {
        tool_calls: vec![ToolCall {
            call_id: id.to_string(),
            tool_name: name.to_string(),
            arguments: arguments.to_string(),
        }],
        ..Default::default()
    }
}

pub fn last_is_tool_result(req: &ChatRequest) -> Option<&str> {
    req.messages
        .last()
        .filter(|m| m.role == Role::Tool)
        .and_then(|m| m.content.as_deref())
}

// ── In-memory tool server ───────────────────────────────────────────────

#[derive(Default)]
pub struct ToolServer {
    pub calls: Mutex<Vec<(String, Value)>>,
}

impl ToolServer {
    pub fn calls_to(&self, name: &str) -> usize {
        self.calls.lock().iter().filter(|(n, _)| n == name).count()
    }
}

#[async_trait]
impl McpTransport for ToolServer {
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        scope: &CallScope,
    ) -> Result<Value, TransportError> {
        scope.check()?;
        match method {
            "initialize" => Ok(json!({ "serverInfo": { "name": "math" } })),
            "tools/list" => Ok(json!({
                "tools": [
                    { "name": "sum", "description": "a + b", "inputSchema": { "type": "object" } },
                    { "name": "big", "inputSchema": { "type": "object" } }
                ]
            })),
            "tools/call" => {
                let params = params.unwrap_or_default();
                let name = params["name"].as_str().unwrap_or_default().to_string();
                let args = params["arguments"].clone();
                self.calls.lock().push((name.clone(), args.clone()));
                match name.as_str() {
                    "sum" => {
                        let a = args["a"].as_i64().unwrap_or_default();
                        let b = args["b"].as_i64().unwrap_or_default();
                        Ok(json!({ "value": a + b }))
                    }
                    "big" => Ok(Value::String("x".repeat(100))),
                    other => Err(TransportError::Malformed(format!("no tool {other}"))),
                }
            }
            other => Err(TransportError::Malformed(format!("unexpected method {other}"))),
        }
    }

    async fn notify(
        &self,
        _method: &str,
        _params: Option<Value>,
        _scope: &CallScope,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn shutdown(&self) {}
}

pub fn registry(server: &Arc<ToolServer>) -> McpManager {
    McpManager::from_clients([McpClient::attached(
        "math",
        server.clone() as Arc<dyn McpTransport>,
    )])
}

/// First turn asks for `sum(2,3)`, second turn answers with the tool output.
pub fn sum_then_answer() -> ScriptedUpstream {
    ScriptedUpstream::new(|_, req| match last_is_tool_result(req) {
        Some(result) => text(&format!("Ответ: {result}")),
        None => tool_call("call_1", "sum", r#"{"a":2,"b":3}"#),
    })
}
