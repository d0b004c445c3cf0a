use resortify_shared::events::ServerEvent;

use crate::chat::{ephemeral, find_participant};
use crate::models::AuthUser;
use crate::ws::gateway::ClientId;
use crate::AppState;

/// Subscribe to one conversation's feed. Only participants may listen;
/// `subscribed` is the confirmation the client waits for.
pub async fn handle_join(state: &AppState, client_id: ClientId, user: &AuthUser, chat_id: String) {
    match find_participant(&state.db, &chat_id, &user.id).await {
        Ok(Some(_)) => {
            if !state.gateway.subscribe_chat(client_id, &chat_id).await {
                return;
            }
            state
                .gateway
                .send_to(client_id, &ServerEvent::Subscribed { chat_id })
                .await;
        }
        Ok(None) => {
            state
                .gateway
                .send_to(
                    client_id,
                    &ServerEvent::Error {
                        message: "Not a participant of this chat".into(),
                    },
                )
                .await;
        }
        Err(e) => {
            tracing::warn!("Join of chat {} by {} failed: {}", chat_id, user.id, e);
            state
                .gateway
                .send_to(
                    client_id,
                    &ServerEvent::Error {
                        message: "Chat unavailable, retry".into(),
                    },
                )
                .await;
        }
    }
}

/// Typing is only accepted on conversations this connection joined.
pub async fn handle_typing(
    state: &AppState,
    client_id: ClientId,
    user: &AuthUser,
    chat_id: &str,
    active: bool,
) {
    let subscribed = state
        .gateway
        .clients
        .read()
        .await
        .get(&client_id)
        .map(|c| c.subscribed_chats.contains(chat_id))
        .unwrap_or(false);

    if !subscribed {
        return;
    }

    ephemeral::set_typing(state, chat_id, &user.id, active).await;
}
