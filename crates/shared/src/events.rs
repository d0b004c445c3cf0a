//! Realtime gateway protocol. Both directions are JSON objects tagged by
//! `type`.

use serde::{Deserialize, Serialize};

use crate::model::{Chat, Message, PresenceStatus};

// ── Client → Server Events ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinChat {
        #[serde(rename = "chatId")]
        chat_id: String,
    },
    LeaveChat {
        #[serde(rename = "chatId")]
        chat_id: String,
    },
    TypingStart {
        #[serde(rename = "chatId")]
        chat_id: String,
    },
    TypingStop {
        #[serde(rename = "chatId")]
        chat_id: String,
    },
    Ping,
}

// ── Server → Client Events ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Confirms a `join_chat`; the subscription is live from here on.
    Subscribed {
        #[serde(rename = "chatId")]
        chat_id: String,
    },
    MessageCreated {
        message: Message,
    },
    MessageUpdated {
        message: Message,
    },
    ReactionAdded {
        #[serde(rename = "chatId")]
        chat_id: String,
        #[serde(rename = "messageId")]
        message_id: String,
        #[serde(rename = "userId")]
        user_id: String,
        emoji: String,
    },
    ReactionRemoved {
        #[serde(rename = "chatId")]
        chat_id: String,
        #[serde(rename = "messageId")]
        message_id: String,
        #[serde(rename = "userId")]
        user_id: String,
        emoji: String,
    },
    Typing {
        #[serde(rename = "chatId")]
        chat_id: String,
        #[serde(rename = "userId")]
        user_id: String,
        active: bool,
    },
    Presence {
        #[serde(rename = "userId")]
        user_id: String,
        status: PresenceStatus,
    },
    ChatUpdated {
        chat: Chat,
    },
    Error {
        message: String,
    },
}
