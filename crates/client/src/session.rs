//! One open conversation as the UI sees it.
//!
//! ```text
//! Uninitialized --open--> Resolving --ok--> Ready
//!                             |
//!                             +--err--> Unavailable --retry--> Resolving
//! ```
//!
//! Message operations need `Ready`; the only way out of `Unavailable` is an
//! explicit retry.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use resortify_shared::api::SendMessageRequest;
use resortify_shared::events::ServerEvent;
use resortify_shared::model::{Attachment, Chat, ChatScope, ChatStatus, Message, ParticipantRole, PresenceStatus};
use resortify_shared::validation::validate_message;

use crate::backend::ChatBackend;
use crate::error::ClientError;
use crate::realtime::Confirmation;
use crate::timeline::{PendingMessage, Timeline, TimelineEvent};
use crate::typing::{TypingDebouncer, TypingIndicators, TypingSignal};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Resolving,
    Ready,
    Unavailable { reason: String },
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Resolving => "resolving",
            SessionState::Ready => "ready",
            SessionState::Unavailable { .. } => "unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeStatus {
    Disconnected,
    Live,
    Degraded(String),
}

pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    scope: ChatScope,
    me: String,
    state: SessionState,
    chat: Option<Chat>,
    role: Option<ParticipantRole>,
    timeline: Timeline,
    members: HashSet<String>,
    presence: HashMap<String, PresenceStatus>,
    older_cursor: Option<String>,
    has_more: bool,
    typing_out: TypingDebouncer,
    typing_in: TypingIndicators,
    outbox: Vec<TypingSignal>,
    draft: String,
    attachment: Option<Attachment>,
    error: Option<String>,
    realtime: RealtimeStatus,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn ChatBackend>, scope: ChatScope, me: impl Into<String>) -> Self {
        let me = me.into();
        Self {
            backend,
            scope,
            timeline: Timeline::new(me.clone()),
            typing_in: TypingIndicators::new(me.clone()),
            me,
            state: SessionState::Uninitialized,
            chat: None,
            role: None,
            members: HashSet::new(),
            presence: HashMap::new(),
            older_cursor: None,
            has_more: false,
            typing_out: TypingDebouncer::default(),
            outbox: Vec::new(),
            draft: String::new(),
            attachment: None,
            error: None,
            realtime: RealtimeStatus::Disconnected,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn chat(&self) -> Option<&Chat> {
        self.chat.as_ref()
    }

    pub fn role(&self) -> Option<ParticipantRole> {
        self.role
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn presence(&self) -> &HashMap<String, PresenceStatus> {
        &self.presence
    }

    /// Whether older history is left to page in with [`Self::load_older`].
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    pub fn realtime(&self) -> &RealtimeStatus {
        &self.realtime
    }

    /// First entry into the conversation.
    pub async fn open(&mut self) -> Result<(), ClientError> {
        if self.state != SessionState::Uninitialized {
            return Err(self.invalid("open"));
        }
        self.resolve().await
    }

    /// User-triggered recovery from `Unavailable`.
    pub async fn retry(&mut self) -> Result<(), ClientError> {
        if !matches!(self.state, SessionState::Unavailable { .. }) {
            return Err(self.invalid("retry"));
        }
        self.resolve().await
    }

    async fn resolve(&mut self) -> Result<(), ClientError> {
        self.state = SessionState::Resolving;
        match self.load().await {
            Ok(()) => {
                self.state = SessionState::Ready;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Chat for {:?} unavailable: {}", self.scope, e);
                self.state = SessionState::Unavailable {
                    reason: e.to_string(),
                };
                Err(e)
            }
        }
    }

    async fn load(&mut self) -> Result<(), ClientError> {
        let opened = self.backend.resolve(&self.scope).await?;
        let chat_id = opened.chat.id.clone();

        let page = self.backend.list_messages(&chat_id, None).await?;
        self.older_cursor = page.cursor;
        self.has_more = page.has_more;
        for message in &page.items {
            self.members.insert(message.sender_id.clone());
        }
        self.timeline.apply(TimelineEvent::Snapshot(page.items));

        // Reactions and presence are decoration; the chat works without them
        match self.backend.list_reactions(&chat_id).await {
            Ok(groups) => self.timeline.apply(TimelineEvent::Reactions(groups)),
            Err(e) => tracing::debug!("Reactions for {} not loaded: {}", chat_id, e),
        }
        match self.backend.list_participants(&chat_id).await {
            Ok(participants) => {
                for p in participants {
                    self.members.insert(p.participant.user_id.clone());
                    self.presence.insert(p.participant.user_id, p.status);
                }
            }
            Err(e) => tracing::debug!("Participants for {} not loaded: {}", chat_id, e),
        }

        self.members.insert(self.me.clone());
        self.role = Some(opened.role);
        self.chat = Some(opened.chat);
        Ok(())
    }

    /// Reload the snapshot, for when the live feed is degraded.
    pub async fn refresh(&mut self) -> Result<(), ClientError> {
        let chat_id = self.ready_chat_id()?;
        let page = self.backend.list_messages(&chat_id, None).await?;
        if self.older_cursor.is_none() {
            self.older_cursor = page.cursor;
            self.has_more = page.has_more;
        }
        self.timeline.apply(TimelineEvent::Snapshot(page.items));
        Ok(())
    }

    /// Page in the history before the oldest loaded message. Returns how
    /// many messages came back; zero once the start is reached.
    pub async fn load_older(&mut self) -> Result<usize, ClientError> {
        let chat_id = self.ready_chat_id()?;
        let cursor = match (&self.older_cursor, self.has_more) {
            (Some(cursor), true) => cursor.clone(),
            _ => return Ok(0),
        };

        let page = self.backend.list_messages(&chat_id, Some(&cursor)).await?;
        let loaded = page.items.len();
        self.has_more = page.has_more;
        if page.cursor.is_some() {
            self.older_cursor = page.cursor;
        }
        for message in &page.items {
            self.members.insert(message.sender_id.clone());
        }
        self.timeline.apply(TimelineEvent::Snapshot(page.items));
        Ok(loaded)
    }

    pub fn set_realtime(&mut self, confirmation: Confirmation) {
        self.realtime = match confirmation {
            Confirmation::Live => RealtimeStatus::Live,
            Confirmation::Degraded(reason) => RealtimeStatus::Degraded(reason),
        };
    }

    pub fn set_draft(&mut self, text: impl Into<String>, now: Instant) {
        self.draft = text.into();
        if let Some(signal) = self.typing_out.on_input(now) {
            self.outbox.push(signal);
        }
    }

    pub fn set_attachment(&mut self, attachment: Option<Attachment>) {
        self.attachment = attachment;
    }

    /// Drive the idle-typing timer.
    pub fn tick(&mut self, now: Instant) {
        if let Some(signal) = self.typing_out.poll(now) {
            self.outbox.push(signal);
        }
    }

    /// Typing signals to forward to the live subscription.
    pub fn take_typing_signals(&mut self) -> Vec<TypingSignal> {
        std::mem::take(&mut self.outbox)
    }

    pub fn typing_users(&mut self, now: Instant) -> Vec<String> {
        self.typing_in.active_users(now)
    }

    /// Send the current draft. It shows immediately as sending; on failure
    /// it is taken back out and the draft is restored.
    pub async fn send(&mut self) -> Result<Message, ClientError> {
        let chat_id = self.ready_chat_id()?;

        let content = self.draft.trim().to_string();
        if let Err(reason) = validate_message(&content, self.attachment.as_ref()) {
            self.error = Some(reason.clone());
            return Err(ClientError::Invalid(reason));
        }
        if self.chat.as_ref().map(|c| c.status) == Some(ChatStatus::Closed) {
            self.error = Some("Chat is closed".into());
            return Err(ClientError::Invalid("Chat is closed".into()));
        }

        let client_ref = uuid::Uuid::new_v4().to_string();
        let draft = std::mem::take(&mut self.draft);
        let attachment = self.attachment.take();

        self.timeline.apply(TimelineEvent::Pending(PendingMessage {
            client_ref: client_ref.clone(),
            sender_id: self.me.clone(),
            content: content.clone(),
            attachment: attachment.clone(),
            created_at: Utc::now(),
        }));
        if let Some(signal) = self.typing_out.on_send() {
            self.outbox.push(signal);
        }

        let request = SendMessageRequest {
            content,
            attachment: attachment.clone(),
            client_ref: Some(client_ref.clone()),
        };

        match self.backend.send_message(&chat_id, &request).await {
            Ok(message) => {
                self.timeline.apply(TimelineEvent::Confirmed {
                    client_ref,
                    message: message.clone(),
                });
                Ok(message)
            }
            Err(e) => {
                tracing::warn!("Send to {} failed: {}", chat_id, e);
                self.timeline.apply(TimelineEvent::Failed { client_ref });
                self.draft = draft;
                self.attachment = attachment;
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Mark everything visible from the other side as read.
    pub async fn mark_visible_read(&mut self) -> Result<usize, ClientError> {
        let chat_id = self.ready_chat_id()?;
        let unread = self.timeline.unread_ids();
        if unread.is_empty() {
            return Ok(0);
        }
        let updated = self.backend.mark_read(&chat_id, &unread).await?;
        let now = Utc::now();
        for id in &updated {
            if let Some(message) = self.timeline.get(id).cloned() {
                let mut read = message;
                read.read_at.get_or_insert(now);
                self.timeline.apply(TimelineEvent::Updated(read));
            }
        }
        Ok(updated.len())
    }

    pub async fn delete(&mut self, message_id: &str) -> Result<(), ClientError> {
        self.ready_chat_id()?;
        match self.backend.delete_message(message_id).await {
            Ok(message) => {
                self.timeline.apply(TimelineEvent::Updated(message));
                Ok(())
            }
            Err(e) => {
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub async fn react(&mut self, message_id: &str, emoji: &str) -> Result<(), ClientError> {
        self.ready_chat_id()?;
        match self.backend.react(message_id, emoji).await {
            Ok(response) => {
                self.timeline.apply(TimelineEvent::Reacted {
                    message_id: message_id.to_string(),
                    user_id: self.me.clone(),
                    emoji: emoji.trim().to_string(),
                    added: response.added,
                });
                Ok(())
            }
            Err(e) => {
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Hide the conversation from this user's list. Opening it again
    /// brings it back.
    pub async fn hide(&mut self) -> Result<(), ClientError> {
        let chat_id = self.ready_chat_id()?;
        self.backend.hide_chat(&chat_id).await
    }

    /// Fold one gateway event into the session.
    pub fn handle_event(&mut self, event: ServerEvent, now: Instant) {
        match event {
            ServerEvent::MessageCreated { message } => {
                self.typing_in.clear(&message.sender_id);
                self.members.insert(message.sender_id.clone());
                self.timeline.apply(TimelineEvent::Inserted(message));
            }
            ServerEvent::MessageUpdated { message } => {
                self.timeline.apply(TimelineEvent::Updated(message));
            }
            ServerEvent::ReactionAdded {
                message_id,
                user_id,
                emoji,
                ..
            } => self.timeline.apply(TimelineEvent::Reacted {
                message_id,
                user_id,
                emoji,
                added: true,
            }),
            ServerEvent::ReactionRemoved {
                message_id,
                user_id,
                emoji,
                ..
            } => self.timeline.apply(TimelineEvent::Reacted {
                message_id,
                user_id,
                emoji,
                added: false,
            }),
            ServerEvent::Typing { user_id, active, .. } => {
                self.typing_in.apply(&user_id, active, now);
            }
            ServerEvent::Presence { user_id, status } => {
                if self.members.contains(&user_id) {
                    self.presence.insert(user_id, status);
                }
            }
            ServerEvent::ChatUpdated { chat } => {
                if self.chat.as_ref().map(|c| &c.id) == Some(&chat.id) {
                    self.chat = Some(chat);
                }
            }
            ServerEvent::Subscribed { .. } => {
                self.realtime = RealtimeStatus::Live;
            }
            ServerEvent::Error { message } => {
                tracing::debug!("Gateway error: {}", message);
            }
        }
    }

    fn ready_chat_id(&self) -> Result<String, ClientError> {
        match (&self.state, &self.chat) {
            (SessionState::Ready, Some(chat)) => Ok(chat.id.clone()),
            _ => Err(ClientError::NotReady),
        }
    }

    fn invalid(&self, action: &'static str) -> ClientError {
        ClientError::InvalidTransition {
            action,
            state: self.state.name(),
        }
    }
}
