//! HTTP transport: one POST per JSON-RPC message.
//!
//! The server may assign a session id through the `Mcp-Session-Id` response
//! header of a successful exchange. Once seen it is replayed on every later
//! request; a response without the header leaves the stored id untouched,
//! and a non-2xx response never sets it.

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde_json::Value;

use ag_domain::config::McpServerConfig;
use ag_domain::CallScope;

use super::{McpTransport, TransportError};
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId};

pub const SESSION_HEADER: &str = "mcp-session-id";

pub struct HttpTransport {
    server: String,
    url: String,
    headers: HeaderMap,
    http: reqwest::Client,
    session: RwLock<Option<String>>,
}

impl HttpTransport {
    pub fn new(config: &McpServerConfig) -> Result<Self, TransportError> {
        let url = config
            .url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                TransportError::Config(format!("server '{}' has no url", config.name))
            })?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                TransportError::Config(format!("invalid header name '{name}': {e}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                TransportError::Config(format!("invalid value for header '{name}': {e}"))
            })?;
            headers.insert(name, value);
        }

        Ok(Self {
            server: config.name.clone(),
            url: url.to_string(),
            headers,
            http: reqwest::Client::new(),
            session: RwLock::new(None),
        })
    }

    /// The session id captured from the server, if any.
    pub fn session_id(&self) -> Option<String> {
        self.session.read().clone()
    }

    async fn post(&self, body: &impl serde::Serialize) -> Result<reqwest::Response, TransportError> {
        let mut req = self
            .http
            .post(&self.url)
            .headers(self.headers.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(sid) = self.session_id() {
            req = req.header(SESSION_HEADER, sid);
        }

        let resp = req.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                status: status.as_u16(),
                body,
            });
        }

        if let Some(sid) = resp
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            let mut session = self.session.write();
            if session.as_deref() != Some(sid) {
                tracing::debug!(server = %self.server, session = %sid, "captured MCP session id");
                *session = Some(sid.to_string());
            }
        }
        Ok(resp)
    }
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        scope: &CallScope,
    ) -> Result<Value, TransportError> {
        scope.check()?;

        let id = uuid::Uuid::new_v4().to_string();
        let envelope = JsonRpcRequest::new(RequestId::String(id.clone()), method, params);
        tracing::debug!(server = %self.server, id = %id, method, "sending MCP request");

        scope
            .guard(async {
                let resp = self.post(&envelope).await?;
                let is_sse = resp
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .is_some_and(|ct| ct.starts_with("text/event-stream"));
                let body = resp.text().await?;
                let parsed = if is_sse {
                    parse_sse_response(&body)?
                } else {
                    serde_json::from_str::<JsonRpcResponse>(&body).map_err(|e| {
                        TransportError::Malformed(format!("{e}: {}", snippet(&body)))
                    })?
                };
                parsed.into_result().map_err(TransportError::Rpc)
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
        tracing::debug!(server = %self.server, method, "sending MCP notification");
        let notification = JsonRpcNotification::new(method, params);
        scope
            .guard(async {
                self.post(&notification).await?;
                Ok::<_, TransportError>(())
            })
            .await?
    }

    async fn shutdown(&self) {
        *self.session.write() = None;
    }
}

/// Pick the first `data:` payload of an event stream that is a JSON-RPC response.
fn parse_sse_response(body: &str) -> Result<JsonRpcResponse, TransportError> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .filter_map(|data| serde_json::from_str::<JsonRpcResponse>(data.trim()).ok())
        .find(|resp| resp.id.is_some())
        .ok_or_else(|| {
            TransportError::Malformed(format!(
                "event stream carried no JSON-RPC response: {}",
                snippet(body)
            ))
        })
}

fn snippet(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_body_yields_first_response() {
        let body = "event: message\n\
                    data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\n\
                    event: message\n\
                    data: {\"jsonrpc\":\"2.0\",\"id\":\"a\",\"result\":{\"tools\":[]}}\n\n";
        let resp = parse_sse_response(body).unwrap();
        assert_eq!(resp.id, Some(RequestId::String("a".into())));
        assert!(resp.result.is_some());
    }

    #[test]
    fn sse_body_without_response_is_malformed() {
        let err = parse_sse_response(": keepalive\n\n").unwrap_err();
        assert!(matches!(err, TransportError::Malformed(_)));
    }

    #[test]
    fn missing_url_is_rejected() {
        let mut cfg = McpServerConfig::http("remote", "");
        assert!(matches!(
            HttpTransport::new(&cfg),
            Err(TransportError::Config(_))
        ));
        cfg.url = None;
        assert!(HttpTransport::new(&cfg).is_err());
    }

    #[test]
    fn bad_header_is_rejected() {
        let mut cfg = McpServerConfig::http("remote", "http://127.0.0.1:1/mcp");
        cfg.headers.insert("bad header".into(), "x".into());
        assert!(matches!(
            HttpTransport::new(&cfg),
            Err(TransportError::Config(_))
        ));
    }

    #[test]
    fn snippet_is_char_safe() {
        let long = "ж".repeat(500);
        assert_eq!(snippet(&long).chars().count(), 200);
        assert_eq!(snippet("short"), "short");
    }
}
