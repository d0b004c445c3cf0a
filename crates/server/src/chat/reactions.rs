use std::collections::BTreeMap;

use resortify_shared::api::ReactResponse;
use resortify_shared::events::ServerEvent;
use resortify_shared::model::{now_timestamp, Reaction};
use resortify_shared::reactions::{group_by_message, group_reactions, ReactionGroup};
use resortify_shared::validation::validate_emoji;

use crate::db::is_unique_violation;
use crate::error::{ChatError, ChatResult};
use crate::models::{decode_all, ReactionRow};
use crate::AppState;

/// Toggle one (message, user, emoji) reaction: remove it if present,
/// otherwise add it.
pub async fn toggle(
    state: &AppState,
    message_id: &str,
    user_id: &str,
    emoji: &str,
) -> ChatResult<ReactResponse> {
    let emoji = emoji.trim();
    validate_emoji(emoji).map_err(ChatError::BadRequest)?;

    let message = super::fetch_message(&state.db, message_id).await?;
    super::require_participant(&state.db, &message.chat_id, user_id).await?;
    if message.is_deleted() {
        return Err(ChatError::BadRequest("Cannot react to a deleted message".into()));
    }

    let removed = sqlx::query(
        "DELETE FROM message_reactions WHERE message_id = ? AND user_id = ? AND emoji = ?",
    )
    .bind(message_id)
    .bind(user_id)
    .bind(emoji)
    .execute(&state.db)
    .await?
    .rows_affected()
        > 0;

    // False when a concurrent toggle from the same user already added it
    let mut changed = true;
    if !removed {
        let inserted = sqlx::query(
            "INSERT INTO message_reactions (id, message_id, user_id, emoji, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(message_id)
        .bind(user_id)
        .bind(emoji)
        .bind(now_timestamp())
        .execute(&state.db)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => changed = false,
            Err(e) => return Err(e.into()),
        }
    }

    if changed {
        let event = if removed {
            ServerEvent::ReactionRemoved {
                chat_id: message.chat_id.clone(),
                message_id: message_id.to_string(),
                user_id: user_id.to_string(),
                emoji: emoji.to_string(),
            }
        } else {
            ServerEvent::ReactionAdded {
                chat_id: message.chat_id.clone(),
                message_id: message_id.to_string(),
                user_id: user_id.to_string(),
                emoji: emoji.to_string(),
            }
        };
        state.gateway.broadcast_chat(&message.chat_id, &event, None).await;
    }

    let reactions = for_message(&state.db, message_id).await?;
    Ok(ReactResponse {
        added: !removed,
        groups: group_reactions(&reactions, user_id),
    })
}

pub async fn for_message(db: &sqlx::SqlitePool, message_id: &str) -> ChatResult<Vec<Reaction>> {
    let rows = sqlx::query_as::<_, ReactionRow>(
        "SELECT message_id, user_id, emoji, created_at FROM message_reactions \
         WHERE message_id = ? ORDER BY created_at ASC",
    )
    .bind(message_id)
    .fetch_all(db)
    .await?;
    Ok(decode_all(rows)?)
}

/// Grouped reactions for every message in a conversation.
pub async fn grouped_for_chat(
    db: &sqlx::SqlitePool,
    chat_id: &str,
    viewer_id: &str,
) -> ChatResult<BTreeMap<String, Vec<ReactionGroup>>> {
    let rows = sqlx::query_as::<_, ReactionRow>(
        r#"SELECT r.message_id, r.user_id, r.emoji, r.created_at
           FROM message_reactions r
           JOIN chat_messages m ON m.id = r.message_id
           WHERE m.chat_id = ? AND m.deleted_at IS NULL
           ORDER BY r.created_at ASC"#,
    )
    .bind(chat_id)
    .fetch_all(db)
    .await?;

    let reactions: Vec<Reaction> = decode_all(rows)?;
    Ok(group_by_message(&reactions, viewer_id))
}
