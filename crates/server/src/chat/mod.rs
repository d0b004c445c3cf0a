//! The chat core: conversation resolution, membership, the message stream,
//! reactions, and the ephemeral typing/presence layer.
//!
//! Every write is a single row operation; the only multi-step path that can
//! race is conversation creation, which recovers from unique violations in
//! [`resolver`].

pub mod ephemeral;
pub mod membership;
pub mod reactions;
pub mod resolver;
pub mod stream;

use resortify_shared::model::{Chat, Message, Participant};

use crate::error::{ChatError, ChatResult};
use crate::models::{ChatRow, MessageRow, ParticipantRow, CHAT_COLUMNS, MESSAGE_COLUMNS, PARTICIPANT_COLUMNS};

pub async fn fetch_chat(db: &sqlx::SqlitePool, chat_id: &str) -> ChatResult<Chat> {
    let sql = format!("SELECT {} FROM chats WHERE id = ?", CHAT_COLUMNS);
    let row = sqlx::query_as::<_, ChatRow>(&sql)
        .bind(chat_id)
        .fetch_optional(db)
        .await?
        .ok_or(ChatError::NotFound("Chat"))?;
    Ok(Chat::try_from(row)?)
}

pub async fn find_participant(
    db: &sqlx::SqlitePool,
    chat_id: &str,
    user_id: &str,
) -> ChatResult<Option<Participant>> {
    let sql = format!(
        "SELECT {} FROM chat_participants WHERE chat_id = ? AND user_id = ?",
        PARTICIPANT_COLUMNS
    );
    let row = sqlx::query_as::<_, ParticipantRow>(&sql)
        .bind(chat_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    Ok(row.map(Participant::try_from).transpose()?)
}

/// Participants only. Hidden participants still count: hiding is a view
/// preference, not a loss of access.
pub async fn require_participant(
    db: &sqlx::SqlitePool,
    chat_id: &str,
    user_id: &str,
) -> ChatResult<Participant> {
    match find_participant(db, chat_id, user_id).await? {
        Some(p) => Ok(p),
        None => {
            // Distinguish a missing chat from a chat the user may not see.
            fetch_chat(db, chat_id).await?;
            Err(ChatError::Forbidden("Not a participant of this chat".into()))
        }
    }
}

pub async fn fetch_message(db: &sqlx::SqlitePool, message_id: &str) -> ChatResult<Message> {
    let sql = format!("SELECT {} FROM chat_messages WHERE id = ?", MESSAGE_COLUMNS);
    let row = sqlx::query_as::<_, MessageRow>(&sql)
        .bind(message_id)
        .fetch_optional(db)
        .await?
        .ok_or(ChatError::NotFound("Message"))?;
    Ok(Message::try_from(row)?)
}
