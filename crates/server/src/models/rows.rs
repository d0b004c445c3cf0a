//! Raw SQLite rows and their checked conversion into shared records.

use resortify_shared::model::{
    parse_optional_timestamp, parse_timestamp, Attachment, Chat, ChatScope, Message,
    Participant, PresenceEntry, Reaction, TypingEntry,
};
use resortify_shared::RecordError;

pub const CHAT_COLUMNS: &str =
    "id, booking_id, resort_id, creator_id, status, created_at, updated_at";

pub const PARTICIPANT_COLUMNS: &str = "chat_id, user_id, role, joined_at, deleted_at";

pub const MESSAGE_COLUMNS: &str = "id, chat_id, sender_id, kind, content, attachment_url, \
     attachment_type, attachment_name, attachment_size, client_ref, read_at, deleted_at, created_at";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatRow {
    pub id: String,
    pub booking_id: Option<String>,
    pub resort_id: Option<String>,
    pub creator_id: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<ChatRow> for Chat {
    type Error = RecordError;

    fn try_from(row: ChatRow) -> Result<Self, Self::Error> {
        Ok(Chat {
            scope: ChatScope::from_columns(row.booking_id, row.resort_id)?,
            status: row.status.parse()?,
            created_at: parse_timestamp("chat", "created_at", &row.created_at)?,
            updated_at: parse_timestamp("chat", "updated_at", &row.updated_at)?,
            id: row.id,
            creator_id: row.creator_id,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ParticipantRow {
    pub chat_id: String,
    pub user_id: String,
    pub role: String,
    pub joined_at: String,
    pub deleted_at: Option<String>,
}

impl TryFrom<ParticipantRow> for Participant {
    type Error = RecordError;

    fn try_from(row: ParticipantRow) -> Result<Self, Self::Error> {
        Ok(Participant {
            role: row.role.parse()?,
            joined_at: parse_timestamp("chat_participant", "joined_at", &row.joined_at)?,
            deleted_at: parse_optional_timestamp(
                "chat_participant",
                "deleted_at",
                row.deleted_at.as_deref(),
            )?,
            chat_id: row.chat_id,
            user_id: row.user_id,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub kind: String,
    pub content: String,
    pub attachment_url: Option<String>,
    pub attachment_type: Option<String>,
    pub attachment_name: Option<String>,
    pub attachment_size: Option<i64>,
    pub client_ref: Option<String>,
    pub read_at: Option<String>,
    pub deleted_at: Option<String>,
    pub created_at: String,
}

impl TryFrom<MessageRow> for Message {
    type Error = RecordError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            kind: row.kind.parse()?,
            attachment: Attachment::from_columns(
                row.attachment_url,
                row.attachment_type,
                row.attachment_name,
                row.attachment_size,
            )?,
            read_at: parse_optional_timestamp("chat_message", "read_at", row.read_at.as_deref())?,
            deleted_at: parse_optional_timestamp(
                "chat_message",
                "deleted_at",
                row.deleted_at.as_deref(),
            )?,
            created_at: parse_timestamp("chat_message", "created_at", &row.created_at)?,
            id: row.id,
            chat_id: row.chat_id,
            sender_id: row.sender_id,
            content: row.content,
            client_ref: row.client_ref,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReactionRow {
    pub message_id: String,
    pub user_id: String,
    pub emoji: String,
    pub created_at: String,
}

impl TryFrom<ReactionRow> for Reaction {
    type Error = RecordError;

    fn try_from(row: ReactionRow) -> Result<Self, Self::Error> {
        Ok(Reaction {
            created_at: parse_timestamp("message_reaction", "created_at", &row.created_at)?,
            message_id: row.message_id,
            user_id: row.user_id,
            emoji: row.emoji,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TypingRow {
    pub chat_id: String,
    pub user_id: String,
    pub updated_at: String,
}

impl TryFrom<TypingRow> for TypingEntry {
    type Error = RecordError;

    fn try_from(row: TypingRow) -> Result<Self, Self::Error> {
        Ok(TypingEntry {
            updated_at: parse_timestamp("chat_typing", "updated_at", &row.updated_at)?,
            chat_id: row.chat_id,
            user_id: row.user_id,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PresenceRow {
    pub user_id: String,
    pub status: String,
    pub last_seen: String,
}

impl TryFrom<PresenceRow> for PresenceEntry {
    type Error = RecordError;

    fn try_from(row: PresenceRow) -> Result<Self, Self::Error> {
        Ok(PresenceEntry {
            status: row.status.parse()?,
            last_seen: parse_timestamp("user_presence", "last_seen", &row.last_seen)?,
            user_id: row.user_id,
        })
    }
}

/// Convert a batch of rows, failing on the first malformed one.
pub fn decode_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, RecordError>
where
    T: TryFrom<R, Error = RecordError>,
{
    rows.into_iter().map(T::try_from).collect()
}
