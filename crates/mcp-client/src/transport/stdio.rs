//! Stdio transport: newline-delimited JSON-RPC over a child's stdin/stdout.
//!
//! A single reader task owns the inbound stream and resolves one-shot
//! completion slots keyed by request id, so any number of requests may be
//! in flight at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use ag_domain::config::McpServerConfig;
use ag_domain::CallScope;

use super::{McpTransport, TransportError};
use crate::protocol::{JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId};

/// How long a child gets to exit after stdin is closed before it is killed.
const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(5);

type Reply = Result<Value, JsonRpcError>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub struct StdioTransport {
    server: String,
    writer: tokio::sync::Mutex<BoxedWriter>,
    pending: PendingMap,
    next_id: AtomicU64,
    alive: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    child: tokio::sync::Mutex<Option<Child>>,
}

impl StdioTransport {
    /// Spawn a child process from the given server config.
    ///
    /// The child inherits the gateway's environment (plus the configured
    /// overrides) and its stderr, which is never parsed.
    pub fn spawn(config: &McpServerConfig) -> Result<Self, TransportError> {
        if config.command.is_empty() {
            return Err(TransportError::Config(format!(
                "server '{}' has no command",
                config.name
            )));
        }

        let mut cmd = tokio::process::Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit());

        let mut child = cmd.spawn()?;

        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "failed to capture child stdin",
            ))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "failed to capture child stdout",
            ))
        })?;

        tracing::debug!(
            server = %config.name,
            command = %config.command,
            pid = ?child.id(),
            "spawned MCP server process"
        );

        Ok(Self::attach(config.name.clone(), stdout, stdin, Some(child)))
    }

    /// Attach to an arbitrary pair of byte streams speaking the stdio framing.
    pub fn from_pipes<R, W>(server: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::attach(server.into(), reader, writer, None)
    }

    fn attach<R, W>(server: String, reader: R, writer: W, child: Option<Child>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));

        let reader = tokio::spawn(read_loop(
            server.clone(),
            reader,
            pending.clone(),
            alive.clone(),
        ));

        Self {
            server,
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            pending,
            next_id: AtomicU64::new(1),
            alive,
            reader,
            child: tokio::sync::Mutex::new(child),
        }
    }

    /// Whether the inbound stream is still open.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Number of requests still awaiting a response.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    async fn write_line(&self, json: &str) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Removes a pending slot when the request that owns it goes away,
/// whether it completed, failed or was interrupted.
struct PendingSlot {
    id: u64,
    pending: PendingMap,
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        scope: &CallScope,
    ) -> Result<Value, TransportError> {
        scope.check()?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        let _slot = PendingSlot {
            id,
            pending: self.pending.clone(),
        };

        // The reader marks the stream dead before draining, so a slot
        // inserted after the drain is caught here.
        if !self.is_alive() {
            return Err(TransportError::ProcessExited);
        }

        let line = serde_json::to_string(&JsonRpcRequest::new(
            RequestId::Number(id),
            method,
            params,
        ))?;
        tracing::debug!(server = %self.server, id, method, "sending MCP request");

        scope
            .guard(async {
                self.write_line(&line).await?;
                let reply = rx.await.map_err(|_| TransportError::ProcessExited)?;
                reply.map_err(TransportError::Rpc)
            })
            .await?
    }

    async fn notify(
        &self,
        method: &str,
        params: Option<Value>,
        scope: &CallScope,
    ) -> Result<(), TransportError> {
        scope.check()?;
        if !self.is_alive() {
            return Err(TransportError::ProcessExited);
        }
        let line = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        tracing::debug!(server = %self.server, method, "sending MCP notification");
        scope.guard(self.write_line(&line)).await?
    }

    async fn shutdown(&self) {
        // Close stdin to signal the process to exit.
        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = writer.shutdown().await {
                tracing::debug!(server = %self.server, error = %e, "error closing MCP server stdin");
            }
        }

        let mut child = self.child.lock().await;
        if let Some(child) = child.as_mut() {
            match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!(server = %self.server, ?status, "MCP server process exited");
                }
                Ok(Err(e)) => {
                    tracing::warn!(server = %self.server, error = %e, "error waiting for MCP server process");
                }
                Err(_) => {
                    tracing::warn!(
                        server = %self.server,
                        "MCP server process did not exit within timeout, killing"
                    );
                    if let Err(e) = child.kill().await {
                        tracing::warn!(server = %self.server, error = %e, "failed to kill MCP server process");
                    }
                }
            }
        }

        self.alive.store(false, Ordering::SeqCst);
        self.reader.abort();
        self.pending.lock().clear();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reader task
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn read_loop<R>(server: String, reader: R, pending: PendingMap, alive: Arc<AtomicBool>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => dispatch(&server, &buf, &pending),
            Err(e) => {
                tracing::warn!(server = %server, error = %e, "error reading MCP server stdout");
                break;
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
    // Dropping the senders fails every waiter with ProcessExited.
    let orphaned: Vec<_> = pending.lock().drain().collect();
    tracing::debug!(
        server = %server,
        orphaned = orphaned.len(),
        "MCP server stdout closed"
    );
}

/// Route one inbound frame to its pending slot.
fn dispatch(server: &str, raw: &[u8], pending: &PendingMap) {
    let line = trim_ascii(raw);
    if line.is_empty() {
        return;
    }

    let value: Value = match serde_json::from_slice(line) {
        Ok(v) => v,
        Err(_) => {
            tracing::debug!(
                server = %server,
                line = %String::from_utf8_lossy(line),
                "skipping non-JSON line from MCP server stdout"
            );
            return;
        }
    };

    // Server-initiated requests and notifications carry a method.
    if value.get("method").is_some() {
        tracing::debug!(server = %server, "skipping server-initiated message");
        return;
    }

    let resp: JsonRpcResponse = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!(server = %server, error = %e, "skipping malformed JSON-RPC frame");
            return;
        }
    };

    let Some(RequestId::Number(id)) = resp.id else {
        tracing::debug!(server = %server, id = ?resp.id, "ignoring frame without a numeric id");
        return;
    };

    let slot = pending.lock().remove(&id);
    match slot {
        Some(tx) => {
            // The waiter may have been interrupted in the meantime.
            let _ = tx.send(resp.into_result());
        }
        None => {
            tracing::debug!(server = %server, id, "ignoring response with unknown id");
        }
    }
}

fn trim_ascii(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if first.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    while let [rest @ .., last] = bytes {
        if last.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    bytes
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
