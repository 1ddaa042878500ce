//! Integration test: drives a [`StdioTransport`] over in-memory pipes with a
//! scripted server on the other end, covering response correlation, noise
//! on stdout, EOF handling and interrupted requests.

use std::sync::Arc;
use std::time::Duration;

use ag_domain::{CallScope, Deadline, Interrupt};
use ag_mcp_client::{McpTransport, StdioTransport, TransportError};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
use tokio_util::sync::CancellationToken;

// ── Scripted server side ────────────────────────────────────────────────

struct ServerEnd {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    out: WriteHalf<DuplexStream>,
}

impl ServerEnd {
    async fn next_request(&mut self) -> Value {
        let line = self.lines.next_line().await.unwrap().expect("client closed stdin");
        serde_json::from_str(&line).unwrap()
    }

    async fn send_raw(&mut self, raw: &str) {
        self.out.write_all(raw.as_bytes()).await.unwrap();
        self.out.flush().await.unwrap();
    }

    async fn reply(&mut self, id: &Value, result: Value) {
        let frame = json!({ "jsonrpc": "2.0", "id": id, "result": result });
        self.send_raw(&format!("{frame}\n")).await;
    }
}

fn pipe() -> (Arc<StdioTransport>, ServerEnd) {
    let (client_side, server_side) = tokio::io::duplex(64 * 1024);
    let (client_read, client_write) = tokio::io::split(client_side);
    let (server_read, server_write) = tokio::io::split(server_side);
    let transport = StdioTransport::from_pipes("scripted", client_read, client_write);
    let server = ServerEnd {
        lines: BufReader::new(server_read).lines(),
        out: server_write,
    };
    (Arc::new(transport), server)
}

fn scope() -> CallScope {
    CallScope::detached(Duration::from_secs(5))
}

// ── Tests ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn out_of_order_responses_reach_their_callers() {
    let (transport, mut server) = pipe();

    let first = {
        let t = transport.clone();
        tokio::spawn(async move { t.request("first", None, &scope()).await })
    };
    let req1 = server.next_request().await;

    let second = {
        let t = transport.clone();
        tokio::spawn(async move { t.request("second", Some(json!({"x": 1})), &scope()).await })
    };
    let req2 = server.next_request().await;

    assert_eq!(req1["method"], "first");
    assert_eq!(req1["jsonrpc"], "2.0");
    assert_eq!(req2["method"], "second");
    assert_eq!(req2["params"]["x"], 1);
    assert_ne!(req1["id"], req2["id"]);
    assert_eq!(transport.pending_len(), 2);

    // Noise, a blank line and a stray id are all ignored.
    server.send_raw("starting up...\n\n").await;
    server.reply(&json!(999), json!("stray")).await;
    server
        .send_raw("{\"jsonrpc\":\"2.0\",\"method\":\"notifications/message\"}\n")
        .await;

    server.reply(&req2["id"], json!("two")).await;
    server.reply(&req1["id"], json!("one")).await;

    assert_eq!(second.await.unwrap().unwrap(), json!("two"));
    assert_eq!(first.await.unwrap().unwrap(), json!("one"));
    assert_eq!(transport.pending_len(), 0);
}

#[tokio::test]
async fn request_ids_count_up_from_one() {
    let (transport, mut server) = pipe();

    for expected in 1..=3u64 {
        let t = transport.clone();
        let call = tokio::spawn(async move { t.request("ping", None, &scope()).await });
        let req = server.next_request().await;
        assert_eq!(req["id"], json!(expected));
        server.reply(&req["id"], json!({})).await;
        call.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn partial_frames_are_reassembled() {
    let (transport, mut server) = pipe();

    let t = transport.clone();
    let call = tokio::spawn(async move { t.request("split", None, &scope()).await });
    let req = server.next_request().await;

    let frame = json!({ "jsonrpc": "2.0", "id": req["id"], "result": {"ok": true} }).to_string();
    let (head, tail) = frame.split_at(frame.len() / 2);
    server.send_raw(head).await;
    tokio::task::yield_now().await;
    server.send_raw(&format!("{tail}\n")).await;

    assert_eq!(call.await.unwrap().unwrap()["ok"], true);
}

#[tokio::test]
async fn rpc_error_carries_raw_payload() {
    let (transport, mut server) = pipe();

    let t = transport.clone();
    let call = tokio::spawn(async move { t.request("tools/call", None, &scope()).await });
    let req = server.next_request().await;
    let frame = json!({
        "jsonrpc": "2.0",
        "id": req["id"],
        "error": { "code": -32602, "message": "bad params", "data": { "field": "a" } }
    });
    server.send_raw(&format!("{frame}\n")).await;

    let err = call.await.unwrap().unwrap_err();
    match &err {
        TransportError::Rpc(rpc) => {
            assert_eq!(rpc.code, -32602);
            assert_eq!(rpc.message, "bad params");
        }
        other => panic!("expected Rpc error, got {other:?}"),
    }
    let shown = err.to_string();
    assert!(shown.contains("bad params"));
    assert!(shown.contains("\"field\""));
}

#[tokio::test]
async fn eof_fails_pending_requests() {
    let (transport, mut server) = pipe();

    let t = transport.clone();
    let call = tokio::spawn(async move { t.request("hang", None, &scope()).await });
    let _ = server.next_request().await;

    drop(server);

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, TransportError::ProcessExited), "got {err:?}");
    assert!(!transport.is_alive());
    assert_eq!(transport.pending_len(), 0);

    let err = transport.request("after", None, &scope()).await.unwrap_err();
    assert!(matches!(err, TransportError::ProcessExited));
}

#[tokio::test(start_paused = true)]
async fn deadline_releases_the_pending_slot() {
    let (transport, _server) = pipe();

    let scope = CallScope::detached(Duration::from_millis(100));
    let err = transport.request("slow", None, &scope).await.unwrap_err();

    assert_eq!(err.interrupt(), Some(Interrupt::DeadlineExceeded));
    assert_eq!(transport.pending_len(), 0);
}

#[tokio::test]
async fn cancellation_interrupts_in_flight_request() {
    let (transport, mut server) = pipe();

    let cancel = CancellationToken::new();
    let cancellable = CallScope::new(Deadline::after(Duration::from_secs(30)), cancel.clone());
    let t = transport.clone();
    let call = tokio::spawn(async move { t.request("slow", None, &cancellable).await });

    let req = server.next_request().await;
    cancel.cancel();

    let err = call.await.unwrap().unwrap_err();
    assert_eq!(err.interrupt(), Some(Interrupt::Cancelled));
    assert_eq!(transport.pending_len(), 0);

    // A late reply for the abandoned id is dropped without disturbing others.
    server.reply(&req["id"], json!("late")).await;
    let t = transport.clone();
    let next = tokio::spawn(async move { t.request("next", None, &scope()).await });
    let req = server.next_request().await;
    server.reply(&req["id"], json!("fresh")).await;
    assert_eq!(next.await.unwrap().unwrap(), json!("fresh"));
}

#[tokio::test]
async fn notification_has_no_id() {
    let (transport, mut server) = pipe();

    transport
        .notify("notifications/initialized", None, &scope())
        .await
        .unwrap();
    let frame = server.next_request().await;
    assert_eq!(frame["method"], "notifications/initialized");
    assert!(frame.get("id").is_none());
}

#[tokio::test(start_paused = true)]
async fn notification_to_a_stalled_child_is_bounded() {
    // A tiny pipe that nobody drains: the write blocks once it fills.
    let (client_side, _server_side) = tokio::io::duplex(16);
    let (client_read, client_write) = tokio::io::split(client_side);
    let transport = StdioTransport::from_pipes("stalled", client_read, client_write);

    let err = transport
        .notify(
            "notifications/initialized",
            None,
            &CallScope::detached(Duration::from_millis(200)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.interrupt(), Some(Interrupt::DeadlineExceeded));
}
