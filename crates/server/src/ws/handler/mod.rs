mod chat;
mod lifecycle;

use axum::{
    extract::{ws::{Message, WebSocket}, Query, State, WebSocketUpgrade},
    http::HeaderMap,
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use resortify_shared::events::{ClientEvent, ServerEvent};

use crate::middleware::auth::{load_session, session_token};
use crate::models::AuthUser;
use crate::ws::gateway::ClientId;
use crate::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let auth_user = extract_session(&state, &headers, &query).await;
    ws.on_upgrade(move |socket| handle_socket(socket, state, auth_user))
}

/// Browsers cannot set headers on a WebSocket handshake, so the token may
/// also arrive as `?token=`.
async fn extract_session(
    state: &AppState,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
) -> Option<AuthUser> {
    let token = query
        .get("token")
        .filter(|t| !t.is_empty())
        .cloned()
        .or_else(|| session_token(headers))?;

    match load_session(&state.db, &token).await {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!("Gateway session lookup failed: {}", e);
            None
        }
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, auth_user: Option<AuthUser>) {
    let user = match auth_user {
        Some(u) => u,
        None => return,
    };

    let client_id = state.gateway.next_client_id().await;
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    state.gateway.register(client_id, user.id.clone(), tx).await;
    lifecycle::handle_connect(&state, &user).await;

    // Task to forward messages from mpsc to WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    // Receive loop
    let state_clone = state.clone();
    let user_clone = user.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => {
                    let text_str: &str = &text;
                    match serde_json::from_str::<ClientEvent>(text_str) {
                        Ok(event) => {
                            handle_client_event(&state_clone, client_id, &user_clone, event).await;
                        }
                        Err(_) => {
                            state_clone
                                .gateway
                                .send_to(
                                    client_id,
                                    &ServerEvent::Error {
                                        message: "Unrecognized event".into(),
                                    },
                                )
                                .await;
                        }
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Whichever side ends first, the other must not outlive the connection
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    lifecycle::handle_disconnect(&state, client_id, &user).await;
}

async fn handle_client_event(
    state: &AppState,
    client_id: ClientId,
    user: &AuthUser,
    event: ClientEvent,
) {
    match event {
        ClientEvent::JoinChat { chat_id } => {
            chat::handle_join(state, client_id, user, chat_id).await;
        }
        ClientEvent::LeaveChat { chat_id } => {
            state.gateway.unsubscribe_chat(client_id, &chat_id).await;
        }
        ClientEvent::TypingStart { chat_id } => {
            chat::handle_typing(state, client_id, user, &chat_id, true).await;
        }
        ClientEvent::TypingStop { chat_id } => {
            chat::handle_typing(state, client_id, user, &chat_id, false).await;
        }
        ClientEvent::Ping => {}
    }
}
