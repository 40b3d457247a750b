//! End-to-end tests against a live server backed by the in-memory store.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use phishshield_api::{router::create_router, state::AppState, store::MemoryStore};
use phishshield_core::{
    generation::{GenerationGateway, GenerationRequest, ModelParams, Speaker},
    policy::ModePolicy,
};
use serde_json::{Value, json};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpStream, sync::watch};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message as WsMessage,
};

const NIL_SESSION: &str = "00000000-0000-0000-0000-000000000000";

struct EchoGateway;

#[async_trait]
impl GenerationGateway for EchoGateway {
    async fn complete(&self, request: GenerationRequest) -> anyhow::Result<String> {
        let asked = request
            .context
            .iter()
            .filter(|t| t.speaker == Speaker::Responder)
            .count();
        let last = request.context.last().map(|t| t.content.as_str()).unwrap_or("");
        Ok(format!("**Question {} of 5** (you said: {last})", asked + 1))
    }
}

struct TestServer {
    addr: SocketAddr,
    _shutdown: watch::Sender<bool>,
}

async fn spawn_server() -> TestServer {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = Arc::new(AppState {
        store: Arc::new(MemoryStore::new()),
        gateway: Arc::new(EchoGateway),
        policy: Arc::new(ModePolicy::default()),
        model_params: ModelParams::default(),
        transcriber: None,
        max_audio_bytes: 1024,
        shutdown: shutdown_rx,
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_router(state)).await.unwrap();
    });
    TestServer {
        addr,
        _shutdown: shutdown_tx,
    }
}

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn send(ws: &mut Client, frame: Value) {
    ws.send(WsMessage::text(frame.to_string())).await.unwrap();
}

async fn recv(ws: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if msg.is_text() {
            return serde_json::from_str(msg.to_text().unwrap()).unwrap();
        }
    }
}

async fn assert_silent(ws: &mut Client) {
    let next = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
    assert!(next.is_err(), "unexpected frame: {next:?}");
}

#[tokio::test]
async fn chat_round_trip_over_websocket() {
    let server = spawn_server().await;
    let (mut ws, _) = connect_async(format!("ws://{}/ws/chat/", server.addr))
        .await
        .unwrap();

    send(&mut ws, json!({"type": "init", "mode": "chat"})).await;
    assert_silent(&mut ws).await;

    send(&mut ws, json!({"type": "message", "content": "hello"})).await;
    let reply = recv(&mut ws).await;
    assert_eq!(reply["type"], "bot_response");
    assert_eq!(reply["mode"], "chat");
    assert!(reply["content"].as_str().unwrap().contains("hello"));
    assert!(reply["timestamp"].as_str().unwrap().ends_with('Z'));
    assert!(reply["session_id"].is_string());

    send(&mut ws, json!({"type": "message", "content": "  "})).await;
    let notice = recv(&mut ws).await;
    assert_eq!(notice["type"], "system_message");
    assert_eq!(notice["content"], "Please enter a message.");
}

#[tokio::test]
async fn quiz_resume_replays_transcript() {
    let server = spawn_server().await;
    let url = format!("ws://{}/ws/openai-chat/", server.addr);

    let (mut ws, _) = connect_async(&url).await.unwrap();
    send(&mut ws, json!({"type": "init", "mode": "quiz"})).await;
    let opening = recv(&mut ws).await;
    assert_eq!(opening["type"], "bot_response");
    assert!(opening["content"].as_str().unwrap().contains("Question 1"));
    let session_id = opening["session_id"].as_str().unwrap().to_string();
    ws.close(None).await.unwrap();
    drop(ws);

    // Completion is recorded once the server notices the close.
    let http = reqwest::Client::new();
    let mut status = Value::Null;
    for _ in 0..50 {
        let info: Value = http
            .get(format!("http://{}/api/session/{session_id}/", server.addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        status = info["status"].clone();
        if status == "completed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status, "completed");

    let (mut ws, _) = connect_async(&url).await.unwrap();
    send(
        &mut ws,
        json!({"type": "init", "session_id": session_id, "mode": "chat"}),
    )
    .await;
    let echo = recv(&mut ws).await;
    assert_eq!(echo["type"], "message");
    assert_eq!(echo["content"], "Start the quiz");
    let replayed = recv(&mut ws).await;
    assert_eq!(replayed["type"], "bot_response");
    assert_eq!(replayed["content"], opening["content"]);
    assert_eq!(replayed["mode"], "quiz");
    assert_silent(&mut ws).await;
}

#[tokio::test]
async fn rest_session_lifecycle() {
    let server = spawn_server().await;
    let http = reqwest::Client::new();
    let base = format!("http://{}", server.addr);

    let created = http
        .post(format!("{base}/api/session/create/"))
        .json(&json!({"mode": "quiz", "full_name": "Dana"}))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), reqwest::StatusCode::CREATED);
    let info: Value = created.json().await.unwrap();
    assert_eq!(info["mode"], "quiz");
    assert_eq!(info["status"], "active");
    assert_eq!(info["full_name"], "Dana");
    assert!(info["end_time"].is_null());

    let id = info["session_id"].as_str().unwrap();
    let fetched: Value = http
        .get(format!("{base}/api/session/{id}/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["session_id"], info["session_id"]);

    let defaulted: Value = http
        .post(format!("{base}/api/session/create/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(defaulted["mode"], "chat");
    assert!(defaulted["full_name"].as_str().unwrap().starts_with("Visitor-"));

    let invalid = http
        .post(format!("{base}/api/session/create/"))
        .json(&json!({"mode": "lecture"}))
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), reqwest::StatusCode::BAD_REQUEST);

    let missing = http
        .get(format!("{base}/api/session/{NIL_SESSION}/"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
}
