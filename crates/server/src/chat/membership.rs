use resortify_shared::api::{ChatSummary, ParticipantWithPresence};
use resortify_shared::events::ServerEvent;
use resortify_shared::model::{
    now_timestamp, Chat, ChatStatus, Message, Participant, ParticipantRole, PresenceStatus,
};

use crate::error::{ChatError, ChatResult};
use crate::models::{ChatRow, MessageRow, ParticipantRow, CHAT_COLUMNS, MESSAGE_COLUMNS, PARTICIPANT_COLUMNS};
use crate::AppState;

/// Idempotent join. The role is fixed by the first join; every entry clears
/// the caller's hidden flag.
pub async fn ensure_member(
    db: &sqlx::SqlitePool,
    chat_id: &str,
    user_id: &str,
    role: ParticipantRole,
) -> ChatResult<Participant> {
    sqlx::query(
        r#"INSERT INTO chat_participants (chat_id, user_id, role, joined_at, deleted_at)
           VALUES (?, ?, ?, ?, NULL)
           ON CONFLICT(chat_id, user_id) DO UPDATE SET deleted_at = NULL"#,
    )
    .bind(chat_id)
    .bind(user_id)
    .bind(role.as_str())
    .bind(now_timestamp())
    .execute(db)
    .await?;

    super::find_participant(db, chat_id, user_id)
        .await?
        .ok_or(ChatError::NotFound("Participant"))
}

/// Register a party who has not entered yet. An existing row, hidden or
/// not, is left as it is.
pub async fn add_member(
    db: &sqlx::SqlitePool,
    chat_id: &str,
    user_id: &str,
    role: ParticipantRole,
) -> ChatResult<()> {
    sqlx::query(
        r#"INSERT INTO chat_participants (chat_id, user_id, role, joined_at, deleted_at)
           VALUES (?, ?, ?, ?, NULL)
           ON CONFLICT(chat_id, user_id) DO NOTHING"#,
    )
    .bind(chat_id)
    .bind(user_id)
    .bind(role.as_str())
    .bind(now_timestamp())
    .execute(db)
    .await?;
    Ok(())
}

/// Hide the conversation from this user's list only. Membership and
/// history are untouched; re-entering restores it.
pub async fn hide_chat(db: &sqlx::SqlitePool, chat_id: &str, user_id: &str) -> ChatResult<()> {
    let result = sqlx::query(
        "UPDATE chat_participants SET deleted_at = ? WHERE chat_id = ? AND user_id = ?",
    )
    .bind(now_timestamp())
    .bind(chat_id)
    .bind(user_id)
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ChatError::NotFound("Chat"));
    }
    Ok(())
}

pub async fn list_participants(
    db: &sqlx::SqlitePool,
    chat_id: &str,
) -> ChatResult<Vec<ParticipantWithPresence>> {
    #[derive(sqlx::FromRow)]
    struct Row {
        #[sqlx(flatten)]
        participant: ParticipantRow,
        name: String,
        status: Option<String>,
    }

    let sql = format!(
        r#"SELECT {}, u.name, pr.status
           FROM chat_participants p
           JOIN "user" u ON u.id = p.user_id
           LEFT JOIN user_presence pr ON pr.user_id = p.user_id
           WHERE p.chat_id = ?
           ORDER BY p.joined_at ASC"#,
        qualified(PARTICIPANT_COLUMNS, "p")
    );

    let rows = sqlx::query_as::<_, Row>(&sql).bind(chat_id).fetch_all(db).await?;

    rows.into_iter()
        .map(|row| -> ChatResult<ParticipantWithPresence> {
            let status = match row.status {
                Some(s) => s.parse()?,
                None => PresenceStatus::Offline,
            };
            Ok(ParticipantWithPresence {
                participant: Participant::try_from(row.participant)?,
                name: row.name,
                status,
            })
        })
        .collect()
}

/// The user's visible conversations, most recently active first.
pub async fn list_chats(db: &sqlx::SqlitePool, user_id: &str) -> ChatResult<Vec<ChatSummary>> {
    #[derive(sqlx::FromRow)]
    struct Row {
        #[sqlx(flatten)]
        chat: ChatRow,
        role: String,
    }

    let sql = format!(
        r#"SELECT {}, p.role
           FROM chats c
           JOIN chat_participants p ON p.chat_id = c.id
           WHERE p.user_id = ? AND p.deleted_at IS NULL
           ORDER BY c.updated_at DESC"#,
        qualified(CHAT_COLUMNS, "c")
    );

    let rows = sqlx::query_as::<_, Row>(&sql).bind(user_id).fetch_all(db).await?;

    let mut summaries = Vec::with_capacity(rows.len());
    for row in rows {
        let chat = Chat::try_from(row.chat)?;

        let last_sql = format!(
            "SELECT {} FROM chat_messages WHERE chat_id = ? ORDER BY created_at DESC, id DESC LIMIT 1",
            MESSAGE_COLUMNS
        );
        let last_message = sqlx::query_as::<_, MessageRow>(&last_sql)
            .bind(&chat.id)
            .fetch_optional(db)
            .await?
            .map(Message::try_from)
            .transpose()?
            .map(Message::redacted);

        let unread_count = sqlx::query_scalar::<_, i64>(
            r#"SELECT COUNT(*) FROM chat_messages
               WHERE chat_id = ? AND sender_id != ? AND read_at IS NULL AND deleted_at IS NULL"#,
        )
        .bind(&chat.id)
        .bind(user_id)
        .fetch_one(db)
        .await?;

        summaries.push(ChatSummary {
            role: row.role.parse()?,
            chat,
            last_message,
            unread_count,
        });
    }

    Ok(summaries)
}

/// Open or close a conversation. Only owner and admin participants may.
pub async fn set_status(
    state: &AppState,
    chat_id: &str,
    actor_id: &str,
    status: ChatStatus,
) -> ChatResult<Chat> {
    let participant = super::require_participant(&state.db, chat_id, actor_id).await?;
    if participant.role == ParticipantRole::Guest {
        return Err(ChatError::Forbidden(
            "Only the resort or an admin can change chat status".into(),
        ));
    }

    sqlx::query("UPDATE chats SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(now_timestamp())
        .bind(chat_id)
        .execute(&state.db)
        .await?;

    let chat = super::fetch_chat(&state.db, chat_id).await?;
    state
        .gateway
        .broadcast_chat(chat_id, &ServerEvent::ChatUpdated { chat: chat.clone() }, None)
        .await;
    Ok(chat)
}

/// Prefix every column in a column list with a table alias.
fn qualified(columns: &str, alias: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{}.{}", alias, c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}
