//! Request and response bodies for the HTTP surface.

use serde::{Deserialize, Serialize};

use crate::model::{Attachment, Chat, ChatStatus, Message, Participant, ParticipantRole, PresenceStatus};
use crate::reactions::ReactionGroup;

/// Returned when a conversation is resolved or opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenedChat {
    pub chat: Chat,
    pub role: ParticipantRole,
    /// True only for the call that created the conversation.
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub chat: Chat,
    pub role: ParticipantRole,
    pub last_message: Option<Message>,
    pub unread_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantWithPresence {
    #[serde(flatten)]
    pub participant: Participant,
    pub name: String,
    pub status: PresenceStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachment: Option<Attachment>,
    #[serde(default)]
    pub client_ref: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    /// Empty means "everything unread in this chat".
    #[serde(default)]
    pub message_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadResponse {
    pub updated: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactRequest {
    pub emoji: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactResponse {
    pub added: bool,
    pub groups: Vec<ReactionGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateChatStatusRequest {
    pub status: ChatStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    /// Ascending by (createdAt, id).
    pub items: Vec<Message>,
    /// Pass back as `before` to page further into history.
    pub cursor: Option<String>,
    pub has_more: bool,
}
