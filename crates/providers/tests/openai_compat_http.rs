//! Integration test: the OpenAI-compatible adapter against an in-process
//! axum upstream.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ag_domain::config::UpstreamConfig;
use ag_domain::tool::{Message, ToolDefinition};
use ag_domain::{CallScope, Deadline, Error, Interrupt};
use ag_providers::{ChatRequest, LlmProvider, OpenAiCompatProvider};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
struct Captured {
    bodies: Arc<Mutex<Vec<Value>>>,
    auth: Arc<Mutex<Vec<Option<String>>>>,
}

async fn completions(
    State(captured): State<Captured>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    captured.auth.lock().push(
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    );
    captured.bodies.lock().push(body.clone());

    let last = body["messages"]
        .as_array()
        .and_then(|m| m.last())
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default()
        .to_string();

    match last.as_str() {
        "fail" => (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response(),
        "hang" => {
            tokio::time::sleep(Duration::from_secs(30)).await;
            StatusCode::OK.into_response()
        }
        "tool" => Json(json!({
            "model": "up-1",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{ "id": "c1", "type": "function", "function": { "name": "sum", "arguments": "{\"a\":2,\"b\":3}" } }]
                },
                "finish_reason": "tool_calls"
            }]
        }))
        .into_response(),
        _ => Json(json!({
            "model": "up-1",
            "choices": [{ "message": { "role": "assistant", "content": format!("echo: {last}") }, "finish_reason": "stop" }]
        }))
        .into_response(),
    }
}

async fn start_upstream() -> (SocketAddr, Captured) {
    let captured = Captured::default();
    let app = Router::new()
        .route("/v1/chat/completions", post(completions))
        .with_state(captured.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, captured)
}

fn provider(addr: SocketAddr, key: Option<&str>) -> OpenAiCompatProvider {
    let cfg = UpstreamConfig {
        base_url: format!("http://{addr}/v1/"),
        model: "up-1".into(),
        api_key: key.map(String::from),
        api_key_env: None,
        timeout_ms: None,
    };
    OpenAiCompatProvider::from_config(&cfg).unwrap()
}

fn request(text: &str, tools: Vec<ToolDefinition>) -> ChatRequest {
    ChatRequest {
        model: "up-1".into(),
        messages: vec![Message::system("be brief"), Message::user(text)],
        tools,
    }
}

fn scope() -> CallScope {
    CallScope::detached(Duration::from_secs(5))
}

#[tokio::test]
async fn text_reply_with_bearer_auth() {
    let (addr, captured) = start_upstream().await;
    let provider = provider(addr, Some("sk-test"));

    let resp = provider.chat(&request("hi", vec![]), &scope()).await.unwrap();
    assert_eq!(resp.content.as_deref(), Some("echo: hi"));
    assert!(resp.tool_calls.is_empty());
    assert_eq!(provider.provider_id(), "openai_compat");

    assert_eq!(captured.auth.lock()[0].as_deref(), Some("Bearer sk-test"));
    let body = captured.bodies.lock()[0].clone();
    assert_eq!(body["model"], "up-1");
    assert_eq!(body["stream"], false);
    assert!(body.get("tools").is_none());
    assert_eq!(body["messages"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn tools_are_sent_and_calls_parsed() {
    let (addr, captured) = start_upstream().await;
    let provider = provider(addr, None);

    let tools = vec![ToolDefinition {
        name: "sum".into(),
        description: Some("sum two numbers".into()),
        parameters: json!({ "type": "object" }),
    }];
    let resp = provider.chat(&request("tool", tools), &scope()).await.unwrap();

    assert!(resp.content.is_none());
    assert_eq!(resp.tool_calls.len(), 1);
    assert_eq!(resp.tool_calls[0].tool_name, "sum");
    assert_eq!(resp.tool_calls[0].arguments, "{\"a\":2,\"b\":3}");
    assert_eq!(resp.finish_reason.as_deref(), Some("tool_calls"));

    assert_eq!(captured.auth.lock()[0], None);
    let body = captured.bodies.lock()[0].clone();
    assert_eq!(body["tools"][0]["function"]["name"], "sum");
}

#[tokio::test]
async fn non_success_status_is_provider_error() {
    let (addr, _captured) = start_upstream().await;
    let provider = provider(addr, None);

    let err = provider.chat(&request("fail", vec![]), &scope()).await.unwrap_err();
    match err {
        Error::Provider { message, .. } => {
            assert!(message.contains("429"), "got {message}");
            assert!(message.contains("slow down"));
        }
        other => panic!("expected provider error, got {other:?}"),
    }
}

#[tokio::test]
async fn deadline_interrupts_hanging_upstream() {
    let (addr, _captured) = start_upstream().await;
    let provider = provider(addr, None);

    let short = CallScope::detached(Duration::from_millis(150));
    let err = provider.chat(&request("hang", vec![]), &short).await.unwrap_err();
    assert!(matches!(err, Error::Interrupted(Interrupt::DeadlineExceeded)), "got {err:?}");
}

#[tokio::test]
async fn cancellation_interrupts_hanging_upstream() {
    let (addr, _captured) = start_upstream().await;
    let provider = provider(addr, None);

    let cancel = CancellationToken::new();
    let scope = CallScope::new(Deadline::after(Duration::from_secs(30)), cancel.clone());
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = provider.chat(&request("hang", vec![]), &scope).await.unwrap_err();
    assert!(matches!(err, Error::Interrupted(Interrupt::Cancelled)), "got {err:?}");
}
