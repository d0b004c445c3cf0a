use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use resortify_shared::model::PresenceEntry;

use crate::chat::ephemeral;
use crate::error::{ChatError, ChatResult};
use crate::models::AuthUser;
use crate::AppState;

const MAX_PRESENCE_IDS: usize = 100;

#[derive(Deserialize)]
pub struct PresenceQuery {
    pub ids: Option<String>,
}

/// GET /api/presence?ids=a,b
pub async fn get_presence(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(query): Query<PresenceQuery>,
) -> ChatResult<Json<Vec<PresenceEntry>>> {
    let mut ids: Vec<String> = query
        .ids
        .as_deref()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();
    ids.dedup();

    if ids.len() > MAX_PRESENCE_IDS {
        return Err(ChatError::BadRequest("Too many ids".into()));
    }

    Ok(Json(ephemeral::presence_for(&state.db, &ids).await?))
}
