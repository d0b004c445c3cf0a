//! The per-conversation message log: snapshot reads, sends, read receipts
//! and soft deletes.

use resortify_shared::api::{MessagePage, SendMessageRequest};
use resortify_shared::constants::MESSAGE_PAGE_SIZE;
use resortify_shared::events::ServerEvent;
use resortify_shared::model::{
    format_timestamp, now_timestamp, Attachment, Chat, ChatStatus, Message, MessageKind, Participant, ParticipantRole,
};
use resortify_shared::validation::validate_message;

use crate::db::is_unique_violation;
use crate::error::{ChatError, ChatResult};
use crate::models::{decode_all, AuthUser, MessageRow, MESSAGE_COLUMNS};
use crate::notify::{self, NewMessageNotice};
use crate::AppState;

const MAX_CLIENT_REF_LENGTH: usize = 64;

pub struct NewMessage<'a> {
    pub chat_id: &'a str,
    pub sender_id: &'a str,
    pub kind: MessageKind,
    pub content: &'a str,
    pub attachment: Option<&'a Attachment>,
    pub client_ref: Option<&'a str>,
}

pub async fn insert_message(db: &sqlx::SqlitePool, new: NewMessage<'_>) -> ChatResult<Message> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = now_timestamp();

    let result = sqlx::query(
        r#"INSERT INTO chat_messages
           (id, chat_id, sender_id, kind, content, attachment_url, attachment_type,
            attachment_name, attachment_size, client_ref, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(new.chat_id)
    .bind(new.sender_id)
    .bind(new.kind.as_str())
    .bind(new.content)
    .bind(new.attachment.map(|a| a.url.as_str()))
    .bind(new.attachment.map(|a| a.content_type.as_str()))
    .bind(new.attachment.map(|a| a.filename.as_str()))
    .bind(new.attachment.map(|a| a.size))
    .bind(new.client_ref)
    .bind(&now)
    .execute(db)
    .await;

    match result {
        Ok(_) => super::fetch_message(db, &id).await,
        Err(e) if is_unique_violation(&e) => Err(ChatError::Conflict(e.to_string())),
        Err(e) => Err(e.into()),
    }
}

/// Snapshot of a conversation, oldest first. Tombstones keep their id,
/// sender and timestamp but lose their content, unless an admin asks for
/// the moderation view.
pub async fn list_messages(
    db: &sqlx::SqlitePool,
    viewer: &Participant,
    before: Option<&str>,
    limit: Option<i64>,
    moderation: bool,
) -> ChatResult<MessagePage> {
    if moderation && viewer.role != ParticipantRole::Admin {
        return Err(ChatError::Forbidden("Moderation view is for admins".into()));
    }

    let limit = limit.unwrap_or(MESSAGE_PAGE_SIZE).clamp(1, MESSAGE_PAGE_SIZE);

    let rows = if let Some(cursor) = before {
        let (created_at, id) = parse_cursor(cursor)?;
        let sql = format!(
            "SELECT {} FROM chat_messages \
             WHERE chat_id = ? AND (created_at < ? OR (created_at = ? AND id < ?)) \
             ORDER BY created_at DESC, id DESC LIMIT ?",
            MESSAGE_COLUMNS
        );
        sqlx::query_as::<_, MessageRow>(&sql)
            .bind(&viewer.chat_id)
            .bind(created_at)
            .bind(created_at)
            .bind(id)
            .bind(limit + 1)
            .fetch_all(db)
            .await?
    } else {
        let sql = format!(
            "SELECT {} FROM chat_messages WHERE chat_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
            MESSAGE_COLUMNS
        );
        sqlx::query_as::<_, MessageRow>(&sql)
            .bind(&viewer.chat_id)
            .bind(limit + 1)
            .fetch_all(db)
            .await?
    };

    let mut items: Vec<Message> = decode_all(rows)?;
    let has_more = items.len() as i64 > limit;
    if has_more {
        items.pop();
    }
    items.reverse(); // chronological order

    if !moderation {
        items = items.into_iter().map(Message::redacted).collect();
    }

    let cursor = items.first().map(page_cursor);

    Ok(MessagePage {
        items,
        cursor,
        has_more,
    })
}

/// Paging cursor for the oldest message of a page: `<created_at>|<id>`.
/// Timestamps repeat, so the id is needed to resume exactly after the row.
fn page_cursor(message: &Message) -> String {
    format!("{}|{}", format_timestamp(message.created_at), message.id)
}

fn parse_cursor(cursor: &str) -> ChatResult<(&str, &str)> {
    match cursor.split_once('|') {
        Some((created_at, id)) if !created_at.is_empty() && !id.is_empty() => Ok((created_at, id)),
        _ => Err(ChatError::BadRequest("Invalid cursor".into())),
    }
}

pub async fn send(
    state: &AppState,
    chat_id: &str,
    sender: &AuthUser,
    req: SendMessageRequest,
) -> ChatResult<Message> {
    let content = req.content.trim();
    validate_message(content, req.attachment.as_ref()).map_err(ChatError::BadRequest)?;

    if let Some(client_ref) = &req.client_ref {
        if client_ref.is_empty() || client_ref.len() > MAX_CLIENT_REF_LENGTH {
            return Err(ChatError::BadRequest("Invalid client reference".into()));
        }
    }

    let participant = super::require_participant(&state.db, chat_id, &sender.id).await?;
    let chat = super::fetch_chat(&state.db, chat_id).await?;
    if chat.status == ChatStatus::Closed {
        return Err(ChatError::BadRequest("Chat is closed".into()));
    }

    // A retried send with the same correlation id returns the stored row.
    if let Some(client_ref) = &req.client_ref {
        if let Some(existing) = find_by_client_ref(&state.db, chat_id, &sender.id, client_ref).await? {
            return Ok(existing.redacted());
        }
    }

    let inserted = insert_message(
        &state.db,
        NewMessage {
            chat_id,
            sender_id: &sender.id,
            kind: MessageKind::User,
            content,
            attachment: req.attachment.as_ref(),
            client_ref: req.client_ref.as_deref(),
        },
    )
    .await;

    let message = match (inserted, &req.client_ref) {
        (Ok(message), _) => message,
        // A concurrent retry stored it first
        (Err(ChatError::Conflict(reason)), Some(client_ref)) => {
            tracing::debug!("Send with client ref {} raced ({}), re-reading", client_ref, reason);
            return find_by_client_ref(&state.db, chat_id, &sender.id, client_ref)
                .await?
                .map(Message::redacted)
                .ok_or_else(|| ChatError::Conflict(format!("message {} missing after unique violation", client_ref)));
        }
        (Err(e), _) => return Err(e),
    };

    if let Err(e) = sqlx::query("UPDATE chats SET updated_at = ? WHERE id = ?")
        .bind(now_timestamp())
        .bind(chat_id)
        .execute(&state.db)
        .await
    {
        tracing::warn!("Failed to bump chat {} activity: {}", chat_id, e);
    }

    super::ephemeral::set_typing(state, chat_id, &sender.id, false).await;

    state
        .gateway
        .broadcast_chat(
            chat_id,
            &ServerEvent::MessageCreated {
                message: message.clone(),
            },
            None,
        )
        .await;

    if participant.role == ParticipantRole::Guest {
        let notice = NewMessageNotice {
            scope: chat.scope.clone(),
            chat_id: chat.id.clone(),
            sender_user_id: sender.id.clone(),
            sender_name: sender.name.clone(),
            content: message.content.clone(),
            recipient_address: resort_owner_email(&state.db, &chat).await,
        };
        notify::dispatch(state.notifier.clone(), notice);
    }

    Ok(message)
}

async fn find_by_client_ref(
    db: &sqlx::SqlitePool,
    chat_id: &str,
    sender_id: &str,
    client_ref: &str,
) -> ChatResult<Option<Message>> {
    let sql = format!(
        "SELECT {} FROM chat_messages WHERE chat_id = ? AND sender_id = ? AND client_ref = ?",
        MESSAGE_COLUMNS
    );
    let row = sqlx::query_as::<_, MessageRow>(&sql)
        .bind(chat_id)
        .bind(sender_id)
        .bind(client_ref)
        .fetch_optional(db)
        .await?;
    Ok(row.map(Message::try_from).transpose()?)
}

/// Best effort; the notifier resolves a recipient itself when this is None.
async fn resort_owner_email(db: &sqlx::SqlitePool, chat: &Chat) -> Option<String> {
    sqlx::query_scalar::<_, String>(
        r#"SELECT u.email
           FROM resorts r
           JOIN "user" u ON u.id = r.owner_id
           WHERE r.id = COALESCE((SELECT resort_id FROM bookings WHERE id = ?), ?)"#,
    )
    .bind(chat.scope.booking_id())
    .bind(chat.scope.resort_id())
    .fetch_optional(db)
    .await
    .ok()
    .flatten()
}

/// Stamp `read_at` on messages the reader did not author. An empty id list
/// means every unread message in the chat. Returns the ids that changed;
/// already-read messages are left alone.
pub async fn mark_read(
    state: &AppState,
    chat_id: &str,
    reader_id: &str,
    message_ids: &[String],
) -> ChatResult<Vec<String>> {
    super::require_participant(&state.db, chat_id, reader_id).await?;

    let now = now_timestamp();
    let base = "UPDATE chat_messages SET read_at = ? \
                WHERE chat_id = ? AND sender_id != ? AND read_at IS NULL AND deleted_at IS NULL";

    let updated: Vec<String> = if message_ids.is_empty() {
        let sql = format!("{} RETURNING id", base);
        sqlx::query_scalar::<_, String>(&sql)
            .bind(&now)
            .bind(chat_id)
            .bind(reader_id)
            .fetch_all(&state.db)
            .await?
    } else {
        let placeholders: Vec<&str> = message_ids.iter().map(|_| "?").collect();
        let sql = format!("{} AND id IN ({}) RETURNING id", base, placeholders.join(","));
        let mut query = sqlx::query_scalar::<_, String>(&sql)
            .bind(&now)
            .bind(chat_id)
            .bind(reader_id);
        for id in message_ids {
            query = query.bind(id);
        }
        query.fetch_all(&state.db).await?
    };

    for id in &updated {
        match super::fetch_message(&state.db, id).await {
            Ok(message) => {
                state
                    .gateway
                    .broadcast_chat(chat_id, &ServerEvent::MessageUpdated { message }, None)
                    .await;
            }
            Err(e) => tracing::warn!("Read receipt for {} not broadcast: {}", id, e),
        }
    }

    Ok(updated)
}

/// Tombstone a message. The sender check is part of the UPDATE itself, so
/// nobody else's message can be touched whatever the caller claims.
pub async fn soft_delete(state: &AppState, message_id: &str, requester_id: &str) -> ChatResult<Message> {
    let message = super::fetch_message(&state.db, message_id).await?;

    if message.sender_id != requester_id {
        return Err(ChatError::Forbidden("Not your message".into()));
    }
    if message.is_system() {
        return Err(ChatError::Forbidden("System messages cannot be deleted".into()));
    }
    if message.is_deleted() {
        return Ok(message.redacted());
    }

    let result = sqlx::query(
        "UPDATE chat_messages SET deleted_at = ? WHERE id = ? AND sender_id = ? AND deleted_at IS NULL",
    )
    .bind(now_timestamp())
    .bind(message_id)
    .bind(requester_id)
    .execute(&state.db)
    .await?;

    let message = super::fetch_message(&state.db, message_id).await?.redacted();

    if result.rows_affected() > 0 {
        state
            .gateway
            .broadcast_chat(
                &message.chat_id,
                &ServerEvent::MessageUpdated {
                    message: message.clone(),
                },
                None,
            )
            .await;
    }

    Ok(message)
}
