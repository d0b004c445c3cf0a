//! Typed records for conversations, participants, messages and the
//! ephemeral typing/presence rows.
//!
//! Every record decoded from storage goes through a checked constructor, so
//! an unknown enum string or an unparsable timestamp surfaces as a
//! [`RecordError`] instead of quietly falling back to a default.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::DELETED_PLACEHOLDER;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("malformed {entity}.{field}: {value:?}")]
    InvalidField {
        entity: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("malformed {entity}: {reason}")]
    Inconsistent {
        entity: &'static str,
        reason: String,
    },
}

/// Fixed-width UTC timestamps: lexical order equals chronological order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

pub fn parse_timestamp(
    entity: &'static str,
    field: &'static str,
    value: &str,
) -> Result<DateTime<Utc>, RecordError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| RecordError::InvalidField {
            entity,
            field,
            value: value.to_string(),
        })
}

pub fn parse_optional_timestamp(
    entity: &'static str,
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, RecordError> {
    value.map(|v| parse_timestamp(entity, field, v)).transpose()
}

macro_rules! string_enum {
    ($name:ident, $entity:literal, $field:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = RecordError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(RecordError::InvalidField {
                        entity: $entity,
                        field: $field,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatStatus {
    Open,
    Closed,
}

string_enum!(ChatStatus, "chat", "status", { Open => "open", Closed => "closed" });

/// A participant's role inside one conversation, not their account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Guest,
    Owner,
    Admin,
}

string_enum!(ParticipantRole, "chat_participant", "role", {
    Guest => "guest",
    Owner => "owner",
    Admin => "admin",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    User,
    System,
}

string_enum!(MessageKind, "chat_message", "kind", { User => "user", System => "system" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Offline,
}

string_enum!(PresenceStatus, "user_presence", "status", {
    Online => "online",
    Offline => "offline",
});

/// What a conversation is about: one booking, or a pre-booking inquiry
/// about a resort.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum ChatScope {
    Booking {
        #[serde(rename = "bookingId")]
        booking_id: String,
    },
    Resort {
        #[serde(rename = "resortId")]
        resort_id: String,
    },
}

impl ChatScope {
    pub fn booking(id: impl Into<String>) -> Self {
        Self::Booking {
            booking_id: id.into(),
        }
    }

    pub fn resort(id: impl Into<String>) -> Self {
        Self::Resort {
            resort_id: id.into(),
        }
    }

    /// Exactly one of the two columns must be set.
    pub fn from_columns(
        booking_id: Option<String>,
        resort_id: Option<String>,
    ) -> Result<Self, RecordError> {
        match (booking_id, resort_id) {
            (Some(booking_id), None) => Ok(Self::Booking { booking_id }),
            (None, Some(resort_id)) => Ok(Self::Resort { resort_id }),
            (Some(_), Some(_)) => Err(RecordError::Inconsistent {
                entity: "chat",
                reason: "both booking_id and resort_id are set".into(),
            }),
            (None, None) => Err(RecordError::Inconsistent {
                entity: "chat",
                reason: "neither booking_id nor resort_id is set".into(),
            }),
        }
    }

    pub fn booking_id(&self) -> Option<&str> {
        match self {
            Self::Booking { booking_id } => Some(booking_id),
            Self::Resort { .. } => None,
        }
    }

    pub fn resort_id(&self) -> Option<&str> {
        match self {
            Self::Resort { resort_id } => Some(resort_id),
            Self::Booking { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    #[serde(flatten)]
    pub scope: ChatScope,
    pub creator_id: String,
    pub status: ChatStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub chat_id: String,
    pub user_id: String,
    pub role: ParticipantRole,
    pub joined_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Participant {
    pub fn is_hidden(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Attachment metadata travels as one unit: all four fields or none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    pub content_type: String,
    pub filename: String,
    pub size: i64,
}

impl Attachment {
    pub fn from_columns(
        url: Option<String>,
        content_type: Option<String>,
        filename: Option<String>,
        size: Option<i64>,
    ) -> Result<Option<Self>, RecordError> {
        match (url, content_type, filename, size) {
            (None, None, None, None) => Ok(None),
            (Some(url), Some(content_type), Some(filename), Some(size)) => Ok(Some(Self {
                url,
                content_type,
                filename,
                size,
            })),
            _ => Err(RecordError::Inconsistent {
                entity: "chat_message",
                reason: "attachment columns are partially set".into(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub kind: MessageKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    /// Correlation id chosen by the sending client, echoed back on the
    /// stored row so optimistic entries can be reconciled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<String>,
    pub read_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_system(&self) -> bool {
        self.kind == MessageKind::System
    }

    /// Content as end users may see it. Tombstones never show their text.
    pub fn display_content(&self) -> &str {
        if self.is_deleted() {
            DELETED_PLACEHOLDER
        } else {
            &self.content
        }
    }

    /// Strip content and attachment from a tombstone.
    pub fn redacted(mut self) -> Self {
        if self.is_deleted() {
            self.content.clear();
            self.attachment = None;
        }
        self
    }

    pub fn sort_key(&self) -> (DateTime<Utc>, &str) {
        (self.created_at, self.id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub message_id: String,
    pub user_id: String,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingEntry {
    pub chat_id: String,
    pub user_id: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub user_id: String,
    pub status: PresenceStatus,
    pub last_seen: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_requires_exactly_one_column() {
        assert_eq!(
            ChatScope::from_columns(Some("b1".into()), None),
            Ok(ChatScope::booking("b1"))
        );
        assert!(ChatScope::from_columns(Some("b1".into()), Some("r1".into())).is_err());
        assert!(ChatScope::from_columns(None, None).is_err());
    }

    #[test]
    fn unknown_role_is_malformed() {
        let err = "superuser".parse::<ParticipantRole>().unwrap_err();
        assert_eq!(
            err,
            RecordError::InvalidField {
                entity: "chat_participant",
                field: "role",
                value: "superuser".into(),
            }
        );
        assert_eq!("owner".parse::<ParticipantRole>(), Ok(ParticipantRole::Owner));
    }

    #[test]
    fn partial_attachment_is_malformed() {
        let res = Attachment::from_columns(Some("https://x/y.png".into()), None, None, Some(3));
        assert!(matches!(res, Err(RecordError::Inconsistent { .. })));
        assert_eq!(Attachment::from_columns(None, None, None, None), Ok(None));
    }

    #[test]
    fn timestamps_sort_lexically() {
        let a = parse_timestamp("m", "created_at", "2026-01-01T10:00:00.000001Z").unwrap();
        let b = parse_timestamp("m", "created_at", "2026-01-01T10:00:00.000010Z").unwrap();
        assert!(format_timestamp(a) < format_timestamp(b));
        assert!(parse_timestamp("m", "created_at", "yesterday").is_err());
    }

    #[test]
    fn chat_serializes_scope_inline() {
        let ts = parse_timestamp("chat", "created_at", "2026-01-01T00:00:00Z").unwrap();
        let chat = Chat {
            id: "c1".into(),
            scope: ChatScope::booking("b1"),
            creator_id: "u1".into(),
            status: ChatStatus::Open,
            created_at: ts,
            updated_at: ts,
        };
        let json = serde_json::to_value(&chat).unwrap();
        assert_eq!(json["scope"], "booking");
        assert_eq!(json["bookingId"], "b1");
        let back: Chat = serde_json::from_value(json).unwrap();
        assert_eq!(back, chat);
    }

    #[test]
    fn deleted_message_hides_content() {
        let ts = Utc::now();
        let msg = Message {
            id: "m1".into(),
            chat_id: "c1".into(),
            sender_id: "u1".into(),
            kind: MessageKind::User,
            content: "secret".into(),
            attachment: None,
            client_ref: None,
            read_at: None,
            deleted_at: Some(ts),
            created_at: ts,
        };
        assert_eq!(msg.display_content(), DELETED_PLACEHOLDER);
        assert!(msg.redacted().content.is_empty());
    }
}
