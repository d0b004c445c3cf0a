#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message;

use resortify_server::AppState;

pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Start the test app on a random TCP port and return the base URL.
pub async fn start_server() -> (String, sqlx::SqlitePool, Arc<AppState>) {
    let pool = super::setup_test_db().await;
    let (app, state, _notifier) = super::create_test_app(pool.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base = format!("http://127.0.0.1:{}", addr.port());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    (base, pool, state)
}

/// Connect a WebSocket with a session token.
pub async fn ws_connect(base: &str, token: &str) -> WsStream {
    let ws_url = format!("{}/gateway?token={}", base.replace("http://", "ws://"), token);
    let (ws, _) = tokio_tungstenite::connect_async(&ws_url).await.unwrap();
    ws
}

/// Read next text message parsed as JSON, with timeout.
pub async fn recv_json(ws: &mut WsStream) -> Option<Value> {
    let timeout = tokio::time::timeout(std::time::Duration::from_secs(3), ws.next()).await;
    match timeout {
        Ok(Some(Ok(Message::Text(text)))) => serde_json::from_str(&text).ok(),
        _ => None,
    }
}

/// Read until an event of the given type arrives, or give up after 3s.
pub async fn recv_type(ws: &mut WsStream, event_type: &str) -> Option<Value> {
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(3);
    while tokio::time::Instant::now() < deadline {
        match recv_json(ws).await {
            Some(v) if v["type"] == event_type => return Some(v),
            Some(_) => continue,
            None => return None,
        }
    }
    None
}

/// Drain all pending messages until timeout.
pub async fn drain_messages(ws: &mut WsStream) -> Vec<Value> {
    let mut messages = Vec::new();
    loop {
        let timeout = tokio::time::timeout(std::time::Duration::from_millis(200), ws.next()).await;
        match timeout {
            Ok(Some(Ok(Message::Text(text)))) => {
                if let Ok(v) = serde_json::from_str::<Value>(&text) {
                    messages.push(v);
                }
            }
            _ => break,
        }
    }
    messages
}

/// Send a JSON message over WebSocket.
pub async fn send_json(ws: &mut WsStream, value: &Value) {
    ws.send(Message::Text(serde_json::to_string(value).unwrap().into()))
        .await
        .unwrap();
}
