pub mod chats;
pub mod messages;
pub mod presence;

use crate::ws;
use crate::AppState;
use axum::{routing::{delete, get, patch, post}, Router};
use std::sync::Arc;

pub fn build_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Conversations
        .route("/chats", get(chats::list_chats))
        .route("/chats/booking/{bookingId}", post(chats::resolve_booking))
        .route("/chats/resort/{resortId}", post(chats::resolve_resort))
        .route("/chats/{chatId}", get(chats::open_chat))
        .route("/chats/{chatId}", delete(chats::hide_chat))
        .route("/chats/{chatId}/status", patch(chats::update_status))
        .route("/chats/{chatId}/participants", get(chats::list_participants))
        .route("/chats/{chatId}/typing", get(chats::list_typing))
        // Messages
        .route("/chats/{chatId}/messages", get(messages::list_messages))
        .route("/chats/{chatId}/messages", post(messages::send_message))
        .route("/chats/{chatId}/read", post(messages::mark_read))
        .route("/chats/{chatId}/reactions", get(messages::list_reactions))
        .route("/messages/{messageId}", delete(messages::delete_message))
        .route("/messages/{messageId}/reactions", post(messages::react))
        // Presence
        .route("/presence", get(presence::get_presence));

    Router::new()
        .nest("/api", api_routes)
        .route("/gateway", get(ws::handler::ws_handler))
        .with_state(state)
}
