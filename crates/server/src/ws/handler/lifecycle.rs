use resortify_shared::model::PresenceStatus;

use crate::chat::ephemeral;
use crate::models::AuthUser;
use crate::ws::gateway::ClientId;
use crate::AppState;

pub async fn handle_connect(state: &AppState, user: &AuthUser) {
    ephemeral::set_presence(state, &user.id, PresenceStatus::Online).await;
}

/// Tear down the connection's subscriptions, stop any typing it left
/// behind, and go offline once the user's last connection is gone.
pub async fn handle_disconnect(state: &AppState, client_id: ClientId, user: &AuthUser) {
    let client = state.gateway.unregister(client_id).await;

    if state.gateway.is_user_connected(&user.id).await {
        return;
    }

    if let Some(client) = client {
        for chat_id in &client.subscribed_chats {
            ephemeral::set_typing(state, chat_id, &user.id, false).await;
        }
    }

    ephemeral::set_presence(state, &user.id, PresenceStatus::Offline).await;
}
