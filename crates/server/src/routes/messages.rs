use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use resortify_shared::api::{
    MarkReadRequest, MarkReadResponse, MessagePage, ReactRequest, ReactResponse, SendMessageRequest,
};
use resortify_shared::model::Message;
use resortify_shared::reactions::ReactionGroup;

use crate::chat::{reactions, require_participant, stream};
use crate::error::ChatResult;
use crate::models::AuthUser;
use crate::AppState;

#[derive(Deserialize)]
pub struct MessageQuery {
    pub before: Option<String>,
    pub limit: Option<i64>,
    #[serde(default)]
    pub moderation: bool,
}

/// GET /api/chats/:chatId/messages
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(chat_id): Path<String>,
    Query(query): Query<MessageQuery>,
) -> ChatResult<Json<MessagePage>> {
    let viewer = require_participant(&state.db, &chat_id, &user.id).await?;
    let page = stream::list_messages(
        &state.db,
        &viewer,
        query.before.as_deref(),
        query.limit,
        query.moderation,
    )
    .await?;
    Ok(Json(page))
}

/// POST /api/chats/:chatId/messages
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(chat_id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> ChatResult<(StatusCode, Json<Message>)> {
    let message = stream::send(&state, &chat_id, &user, body).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// POST /api/chats/:chatId/read
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(chat_id): Path<String>,
    Json(body): Json<MarkReadRequest>,
) -> ChatResult<Json<MarkReadResponse>> {
    let updated = stream::mark_read(&state, &chat_id, &user.id, &body.message_ids).await?;
    Ok(Json(MarkReadResponse { updated }))
}

/// DELETE /api/messages/:messageId
pub async fn delete_message(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(message_id): Path<String>,
) -> ChatResult<Json<Message>> {
    Ok(Json(stream::soft_delete(&state, &message_id, &user.id).await?))
}

/// POST /api/messages/:messageId/reactions
pub async fn react(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(message_id): Path<String>,
    Json(body): Json<ReactRequest>,
) -> ChatResult<Json<ReactResponse>> {
    Ok(Json(
        reactions::toggle(&state, &message_id, &user.id, &body.emoji).await?,
    ))
}

/// GET /api/chats/:chatId/reactions
pub async fn list_reactions(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(chat_id): Path<String>,
) -> ChatResult<Json<BTreeMap<String, Vec<ReactionGroup>>>> {
    require_participant(&state.db, &chat_id, &user.id).await?;
    Ok(Json(
        reactions::grouped_for_chat(&state.db, &chat_id, &user.id).await?,
    ))
}
