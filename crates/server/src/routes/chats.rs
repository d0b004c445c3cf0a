use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use resortify_shared::api::{ChatSummary, OpenedChat, ParticipantWithPresence, UpdateChatStatusRequest};
use resortify_shared::model::{Chat, ChatScope, TypingEntry};

use crate::chat::{ephemeral, membership, require_participant, resolver};
use crate::error::ChatResult;
use crate::models::AuthUser;
use crate::AppState;

/// POST /api/chats/booking/:bookingId
pub async fn resolve_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(booking_id): Path<String>,
) -> ChatResult<(StatusCode, Json<OpenedChat>)> {
    let opened = resolver::resolve(&state, &ChatScope::booking(booking_id), &user).await?;
    Ok((created_status(&opened), Json(opened)))
}

/// POST /api/chats/resort/:resortId
pub async fn resolve_resort(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(resort_id): Path<String>,
) -> ChatResult<(StatusCode, Json<OpenedChat>)> {
    let opened = resolver::resolve(&state, &ChatScope::resort(resort_id), &user).await?;
    Ok((created_status(&opened), Json(opened)))
}

fn created_status(opened: &OpenedChat) -> StatusCode {
    if opened.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    }
}

/// GET /api/chats
pub async fn list_chats(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ChatResult<Json<Vec<ChatSummary>>> {
    Ok(Json(membership::list_chats(&state.db, &user.id).await?))
}

/// GET /api/chats/:chatId
pub async fn open_chat(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(chat_id): Path<String>,
) -> ChatResult<Json<OpenedChat>> {
    Ok(Json(resolver::open(&state, &chat_id, &user).await?))
}

/// DELETE /api/chats/:chatId
pub async fn hide_chat(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(chat_id): Path<String>,
) -> ChatResult<StatusCode> {
    membership::hide_chat(&state.db, &chat_id, &user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /api/chats/:chatId/status
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(chat_id): Path<String>,
    Json(body): Json<UpdateChatStatusRequest>,
) -> ChatResult<Json<Chat>> {
    Ok(Json(
        membership::set_status(&state, &chat_id, &user.id, body.status).await?,
    ))
}

/// GET /api/chats/:chatId/participants
pub async fn list_participants(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(chat_id): Path<String>,
) -> ChatResult<Json<Vec<ParticipantWithPresence>>> {
    require_participant(&state.db, &chat_id, &user.id).await?;
    Ok(Json(membership::list_participants(&state.db, &chat_id).await?))
}

/// GET /api/chats/:chatId/typing
pub async fn list_typing(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(chat_id): Path<String>,
) -> ChatResult<Json<Vec<TypingEntry>>> {
    require_participant(&state.db, &chat_id, &user.id).await?;
    let mut entries = ephemeral::list_typing(&state.db, &chat_id, state.config.typing_ttl()).await?;
    entries.retain(|e| e.user_id != user.id);
    Ok(Json(entries))
}
