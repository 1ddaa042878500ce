//! One agent run: plan, list tools, then loop over upstream calls and tool
//! dispatch until the model answers or a limit trips.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::Instrument;

use ag_domain::config::AgentConfig;
use ag_domain::tool::{Message, ToolCall};
use ag_domain::{CallScope, Deadline};
use ag_mcp_client::{McpManager, McpTool};
use ag_providers::{ChatRequest, LlmProvider};

use super::guard::RepeatGuard;
use super::tools::{filter_tools, tool_definitions, tool_result_text, truncate_tool_output};
use super::AgentError;

// ── Status chunks ───────────────────────────────────────────────────

const STATUS_PLAN: &str = "Планирую шаги";
const STATUS_LIST_TOOLS: &str = "Получаю список инструментов";
const STATUS_FINAL: &str = "Формирую финальный ответ";

fn status(enabled: bool, msg: &str) -> String {
    if enabled {
        format!("[STATUS]{msg}[/STATUS]")
    } else {
        msg.to_string()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run parameters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Input to a single run.
#[derive(Debug, Clone)]
pub struct AgentRun {
    /// The conversation as received from the client.
    pub messages: Vec<Message>,
    pub agent: AgentConfig,
    /// Model id sent upstream.
    pub model: String,
    /// Per-call upstream timeout. The run deadline applies when tighter.
    pub upstream_timeout: Option<Duration>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// run_agent: the core loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run the agent loop to completion and return the final text.
///
/// `on_chunk` receives every status line and, last, the final text; it is
/// never called after this function returns. Cancelling `cancel` aborts
/// whatever upstream or tool call is in flight.
pub async fn run_agent(
    run: &AgentRun,
    upstream: &dyn LlmProvider,
    mcp: &McpManager,
    cancel: CancellationToken,
    on_chunk: &mut (dyn FnMut(&str) + Send),
) -> Result<String, AgentError> {
    let agent = &run.agent;
    let tags = agent.status_tags_enabled;
    let scope = CallScope::new(Deadline::after(agent.request_timeout()), cancel);

    scope.check()?;
    on_chunk(&status(tags, STATUS_PLAN));
    on_chunk(&status(tags, STATUS_LIST_TOOLS));

    let listed = mcp.list_tools(&scope).await?;
    let tools = filter_tools(agent.tool_policy.as_ref(), listed);
    tracing::debug!(tools = tools.len(), "tools available for run");

    let mut req = ChatRequest {
        model: run.model.clone(),
        messages: run.messages.clone(),
        tools: tool_definitions(&tools),
    };
    let mut guard = RepeatGuard::new(agent.repeat_limit());

    for step in 1..=agent.max_steps {
        scope.check()?;
        on_chunk(&status(tags, &format!("Шаг {step}/{}", agent.max_steps)));

        let call_scope = scope.with_timeout(run.upstream_timeout);
        tracing::debug!(
            step,
            remaining_ms = call_scope.remaining().as_millis() as u64,
            messages = req.messages.len(),
            "calling upstream"
        );
        let reply = upstream.chat(&req, &call_scope).await?;

        if reply.tool_calls.is_empty() {
            let text = reply.content.ok_or(AgentError::EmptyUpstreamResponse)?;
            on_chunk(&status(tags, STATUS_FINAL));
            on_chunk(&text);
            tracing::info!(step, "run finished");
            return Ok(text);
        }

        req.messages.push(Message::assistant_tool_calls(
            reply.content.clone(),
            reply.tool_calls.clone(),
        ));

        for call in &reply.tool_calls {
            scope.check()?;
            let tool = tools
                .iter()
                .find(|t| t.name == call.tool_name)
                .ok_or_else(|| AgentError::ToolNotAllowed(call.tool_name.clone()))?;

            let args = parse_arguments(call)?;
            guard
                .record(&tool.name, &args)
                .map_err(|tripped| AgentError::RepeatedToolCall {
                    tool: tool.name.clone(),
                    count: tripped.count,
                    limit: tripped.limit,
                })?;

            on_chunk(&status(tags, &format!("Вызываю tool: {}", tool.name)));
            let text = call_tool(mcp, tool, args, &scope, agent.max_tool_output_bytes, step).await?;
            req.messages.push(Message::tool_result(&call.call_id, text));
        }
    }

    Err(AgentError::MaxStepsExceeded(agent.max_steps))
}

/// Parse the model's raw argument string. An empty payload means `{}`.
fn parse_arguments(call: &ToolCall) -> Result<Value, AgentError> {
    let raw = call.arguments.trim();
    if raw.is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw).map_err(|e| AgentError::InvalidToolArguments {
        tool: call.tool_name.clone(),
        message: e.to_string(),
    })
}

async fn call_tool(
    mcp: &McpManager,
    tool: &McpTool,
    args: Value,
    scope: &CallScope,
    max_output_bytes: usize,
    step: u32,
) -> Result<String, AgentError> {
    let span = tracing::info_span!("tool.call", server = %tool.server, tool = %tool.name, step);
    async {
        let raw = mcp.call_tool(&tool.server, &tool.name, args, scope).await?;
        let text = tool_result_text(&raw);
        let bytes = text.len();
        let text = truncate_tool_output(text, max_output_bytes);
        tracing::debug!(bytes, truncated = bytes > max_output_bytes, "tool returned");
        Ok::<_, AgentError>(text)
    }
    .instrument(span)
    .await
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// spawn_run: task wrapper with an event channel
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events emitted by a spawned run, in order. Exactly one of `Final` or
/// `Error` ends the sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// A status line or the final text, as passed to `on_chunk`.
    Chunk(String),
    Final(String),
    Error(String),
}

/// Receiving side of a spawned run. Dropping it cancels the run.
pub struct RunHandle {
    pub run_id: uuid::Uuid,
    events: mpsc::UnboundedReceiver<RunEvent>,
    _cancel: DropGuard,
}

impl RunHandle {
    pub async fn recv(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }
}

/// Run the agent loop on a background task.
pub fn spawn_run(
    upstream: Arc<dyn LlmProvider>,
    mcp: Arc<McpManager>,
    run: AgentRun,
) -> RunHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let run_id = uuid::Uuid::new_v4();

    let span = tracing::info_span!("run", %run_id, model = %run.model);
    let token = cancel.clone();
    tokio::spawn(
        async move {
            tracing::debug!(messages = run.messages.len(), "run started");
            let chunk_tx = tx.clone();
            let mut on_chunk = move |text: &str| {
                let _ = chunk_tx.send(RunEvent::Chunk(text.to_string()));
            };
            let event = match run_agent(&run, upstream.as_ref(), &mcp, token, &mut on_chunk).await {
                Ok(text) => RunEvent::Final(text),
                Err(e) => {
                    if e.is_interrupt() {
                        tracing::info!(error = %e, "run interrupted");
                    } else {
                        tracing::warn!(error = %e, "run failed");
                    }
                    RunEvent::Error(e.to_string())
                }
            };
            let _ = tx.send(event);
        }
        .instrument(span),
    );

    RunHandle {
        run_id,
        events: rx,
        _cancel: cancel.drop_guard(),
    }
}
