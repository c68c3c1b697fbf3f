//! HTTP gateway tests against a server bound to an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;

use mini_openclaw::agent::events::RawEvent;
use mini_openclaw::agent::Agent;
use mini_openclaw::config::{AppConfig, ModelSettings, ServerSettings};
use mini_openclaw::gateway::{start_gateway, AppState};
use mini_openclaw::logs::LogBroadcast;
use mini_openclaw::models::{EngineRequest, RawEventStream, ReasoningEngine};
use mini_openclaw::tools::ToolRegistry;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Calls one fake tool, then answers `echo: <message>`.
struct EchoEngine;

impl ReasoningEngine for EchoEngine {
    fn stream(&self, request: EngineRequest) -> RawEventStream {
        let raw = [
            json!({"kind": "tool-start", "run_id": "t1", "name": "read_file", "input": {"path": "x"}}),
            json!({"kind": "tool-end", "run_id": "t1", "output": "contents"}),
            json!({"kind": "chain-end", "run_id": "c1", "output": format!("echo: {}", request.message)}),
        ];
        let events: Vec<anyhow::Result<RawEvent>> = raw
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(anyhow::Error::from))
            .collect();
        Box::pin(tokio_stream::iter(events))
    }
}

struct TestServer {
    _tmp: TempDir,
    addr: SocketAddr,
    logs: LogBroadcast,
    shutdown: CancellationToken,
}

impl TestServer {
    async fn start(api_token: Option<&str>) -> Self {
        let tmp = TempDir::new().unwrap();
        let model = ModelSettings {
            base_url: "http://localhost:9/v1".into(),
            api_key: "sk-test".into(),
            model: "test-model".into(),
            tool_model_override: None,
        };
        let mut config =
            AppConfig::with_settings(tmp.path().join("backend"), model, ServerSettings::default());
        config.api_token = api_token.map(str::to_string);
        config.ensure_runtime_dirs().await.unwrap();

        let agent = Arc::new(Agent::new(
            Arc::new(config),
            Arc::new(EchoEngine),
            Arc::new(ToolRegistry::new()),
        ));
        let logs = LogBroadcast::new();
        let shutdown = CancellationToken::new();
        let gw = start_gateway(
            "127.0.0.1:0".parse().unwrap(),
            AppState::new(agent, logs.clone()),
            shutdown.clone(),
        )
        .await
        .unwrap();

        Self {
            _tmp: tmp,
            addr: gw.addr,
            logs,
            shutdown,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// ── Health / auth ────────────────────────────────────────────

#[tokio::test]
async fn health_is_open() {
    let server = TestServer::start(Some("secret")).await;
    let resp = reqwest::get(server.url("/api/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn token_guards_api_routes() {
    let server = TestServer::start(Some("secret")).await;
    let client = reqwest::Client::new();

    let resp = client.get(server.url("/api/sessions")).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .get(server.url("/api/sessions"))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .get(server.url("/api/sessions"))
        .bearer_auth("secret")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(server.url("/api/sessions?token=secret"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

// ── Chat ─────────────────────────────────────────────────────

#[tokio::test]
async fn buffered_chat_returns_all_events() {
    let server = TestServer::start(None).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/api/chat"))
        .json(&json!({"message": "ping", "session_id": "web", "stream": false}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let events = body["events"].as_array().unwrap();
    let kinds: Vec<&str> = events.iter().map(|e| e["type"].as_str().unwrap()).collect();
    assert_eq!(kinds, vec!["thought", "tool_call", "tool_result", "final"]);
    assert_eq!(events[2], json!({"type": "tool_result", "name": "read_file", "output": "contents"}));
    assert_eq!(events[3], json!({"type": "final", "content": "echo: ping"}));

    let session: Value = client
        .get(server.url("/api/sessions/web"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(session["session_id"], "web");
    let entries = session["entries"].as_array().unwrap();
    let types: Vec<&str> = entries.iter().map(|e| e["type"].as_str().unwrap()).collect();
    assert_eq!(types, vec!["user", "tool", "tool", "assistant"]);
    assert_eq!(entries[2]["tool"]["output"], "contents");
    assert!(entries[0]["ts"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn streaming_chat_sends_sse_frames() {
    let server = TestServer::start(None).await;

    let resp = reqwest::Client::new()
        .post(server.url("/api/chat"))
        .json(&json!({"message": "hi"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let content_type = resp.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let body = resp.text().await.unwrap();
    assert!(body.contains("event: thought\n"));
    assert!(body.contains("event: tool_call\ndata: {\"type\":\"tool_call\""));
    assert!(body.contains("event: final\ndata: {\"type\":\"final\",\"content\":\"echo: hi\"}"));
    assert!(body.find("event: tool_result").unwrap() < body.find("event: final").unwrap());
}

#[tokio::test]
async fn empty_message_is_rejected() {
    let server = TestServer::start(None).await;
    let resp = reqwest::Client::new()
        .post(server.url("/api/chat"))
        .json(&json!({"message": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());
}

// ── Files ────────────────────────────────────────────────────

#[tokio::test]
async fn file_round_trip_and_sandbox() {
    let server = TestServer::start(None).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/api/files"))
        .json(&json!({"path": "workspace/SOUL.md", "content": "be brief"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"ok": true, "path": "workspace/SOUL.md"}));

    let body: Value = client
        .get(server.url("/api/files?path=workspace/SOUL.md"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["content"], "be brief");

    let resp = client
        .get(server.url("/api/files?path=../outside.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .get(server.url("/api/files?path=workspace/missing.md"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .post(server.url("/api/files"))
        .json(&json!({"path": "config.yaml", "content": "addr: x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

// ── Sessions ─────────────────────────────────────────────────

#[tokio::test]
async fn sessions_list_and_delete() {
    let server = TestServer::start(None).await;
    let client = reqwest::Client::new();

    for id in ["first", "second"] {
        client
            .post(server.url("/api/chat"))
            .json(&json!({"message": "hi", "session_id": id, "stream": false}))
            .send()
            .await
            .unwrap();
    }

    let body: Value = client
        .get(server.url("/api/sessions"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let ids: Vec<&str> = body["sessions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&"first") && ids.contains(&"second"));

    let body: Value = client
        .delete(server.url("/api/sessions/first"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"session_id": "first", "deleted": true}));

    let body: Value = client
        .delete(server.url("/api/sessions/first"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["deleted"], false);

    let body: Value = client
        .get(server.url("/api/sessions/first"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["entries"], json!([]));
}

// ── Logs ─────────────────────────────────────────────────────

#[tokio::test]
async fn ws_logs_streams_broadcast_lines() {
    use futures_util::StreamExt;
    use tokio_tungstenite::tungstenite::Message;

    let server = TestServer::start(None).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws/logs", server.addr))
        .await
        .unwrap();

    let line = json!({"type": "log", "level": "INFO", "message": "turn persisted"}).to_string();
    server.logs.send(line.clone());

    let msg = tokio::time::timeout(std::time::Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(msg, Message::Text(line));
}
