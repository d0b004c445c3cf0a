//! The in-memory message list for one conversation. Snapshot loads, local
//! optimistic sends and live gateway events all go through [`Timeline::apply`].

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use resortify_shared::model::{Attachment, Message, Reaction};
use resortify_shared::reactions::{group_reactions, ReactionGroup};

/// A message the user sent that the server has not confirmed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub client_ref: String,
    pub sender_id: String,
    pub content: String,
    pub attachment: Option<Attachment>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineEvent {
    Snapshot(Vec<Message>),
    Pending(PendingMessage),
    Confirmed { client_ref: String, message: Message },
    Failed { client_ref: String },
    Inserted(Message),
    Updated(Message),
    Reactions(BTreeMap<String, Vec<ReactionGroup>>),
    Reacted {
        message_id: String,
        user_id: String,
        emoji: String,
        added: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sending,
    Sent,
    Read,
}

/// One row as rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineItem<'a> {
    /// Message id, or the client reference while still sending.
    pub key: &'a str,
    pub sender_id: &'a str,
    pub content: &'a str,
    pub attachment: Option<&'a Attachment>,
    pub created_at: DateTime<Utc>,
    pub delivery: Delivery,
    pub deleted: bool,
    pub mine: bool,
}

#[derive(Debug)]
pub struct Timeline {
    me: String,
    /// Sorted by (created_at, id); ids are unique.
    messages: Vec<Message>,
    pending: Vec<PendingMessage>,
    reactions: BTreeMap<String, Vec<Reaction>>,
}

impl Timeline {
    pub fn new(me: impl Into<String>) -> Self {
        Self {
            me: me.into(),
            messages: Vec::new(),
            pending: Vec::new(),
            reactions: BTreeMap::new(),
        }
    }

    pub fn apply(&mut self, event: TimelineEvent) {
        match event {
            TimelineEvent::Snapshot(messages) => {
                for message in messages {
                    self.upsert(message);
                }
            }
            TimelineEvent::Pending(pending) => {
                if !self.pending.iter().any(|p| p.client_ref == pending.client_ref) {
                    self.pending.push(pending);
                }
            }
            TimelineEvent::Confirmed { client_ref, message } => {
                self.pending.retain(|p| p.client_ref != client_ref);
                self.upsert(message);
            }
            TimelineEvent::Failed { client_ref } => {
                self.pending.retain(|p| p.client_ref != client_ref);
            }
            TimelineEvent::Inserted(message) | TimelineEvent::Updated(message) => {
                self.upsert(message);
            }
            TimelineEvent::Reactions(groups) => {
                self.reactions = groups
                    .into_iter()
                    .map(|(message_id, groups)| {
                        let rows = groups
                            .iter()
                            .flat_map(|g| {
                                g.user_ids.iter().map(|user_id| Reaction {
                                    message_id: message_id.clone(),
                                    user_id: user_id.clone(),
                                    emoji: g.emoji.clone(),
                                    created_at: DateTime::<Utc>::UNIX_EPOCH,
                                })
                            })
                            .collect();
                        (message_id, rows)
                    })
                    .collect();
            }
            TimelineEvent::Reacted {
                message_id,
                user_id,
                emoji,
                added,
            } => {
                let rows = self.reactions.entry(message_id.clone()).or_default();
                let existing = rows
                    .iter()
                    .position(|r| r.user_id == user_id && r.emoji == emoji);
                match (added, existing) {
                    (true, None) => rows.push(Reaction {
                        message_id: message_id.clone(),
                        user_id,
                        emoji,
                        created_at: Utc::now(),
                    }),
                    (false, Some(idx)) => {
                        rows.remove(idx);
                    }
                    _ => {}
                }
                if rows.is_empty() {
                    self.reactions.remove(&message_id);
                }
            }
        }
    }

    /// Insert in order, or patch the existing entry with the same id.
    fn upsert(&mut self, incoming: Message) {
        if let Some(client_ref) = &incoming.client_ref {
            if incoming.sender_id == self.me {
                self.pending.retain(|p| &p.client_ref != client_ref);
            }
        }

        if let Some(existing) = self.messages.iter_mut().find(|m| m.id == incoming.id) {
            merge(existing, incoming);
            return;
        }

        let idx = self
            .messages
            .partition_point(|m| m.sort_key() < incoming.sort_key());
        self.messages.insert(idx, incoming.redacted());
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.pending.is_empty()
    }

    pub fn pending(&self) -> &[PendingMessage] {
        &self.pending
    }

    /// Messages that are not tombstones.
    pub fn active(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| !m.is_deleted())
    }

    /// The latest system message, shown as a banner instead of inline.
    pub fn pinned(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.is_system() && !m.is_deleted())
    }

    /// Everything to render, oldest first. Tombstones show the placeholder;
    /// unconfirmed sends come last.
    pub fn items(&self) -> Vec<TimelineItem<'_>> {
        let pinned_id = self.pinned().map(|m| m.id.as_str());

        let confirmed = self
            .messages
            .iter()
            .filter(|m| Some(m.id.as_str()) != pinned_id)
            .map(|m| TimelineItem {
                key: &m.id,
                sender_id: &m.sender_id,
                content: m.display_content(),
                attachment: m.attachment.as_ref(),
                created_at: m.created_at,
                delivery: if m.read_at.is_some() {
                    Delivery::Read
                } else {
                    Delivery::Sent
                },
                deleted: m.is_deleted(),
                mine: m.sender_id == self.me,
            });

        let sending = self.pending.iter().map(|p| TimelineItem {
            key: &p.client_ref,
            sender_id: &p.sender_id,
            content: &p.content,
            attachment: p.attachment.as_ref(),
            created_at: p.created_at,
            delivery: Delivery::Sending,
            deleted: false,
            mine: true,
        });

        confirmed.chain(sending).collect()
    }

    /// Messages from others this user has not read yet.
    pub fn unread_ids(&self) -> Vec<String> {
        self.active()
            .filter(|m| m.sender_id != self.me && m.read_at.is_none())
            .map(|m| m.id.clone())
            .collect()
    }

    pub fn reactions(&self, message_id: &str) -> Vec<ReactionGroup> {
        self.reactions
            .get(message_id)
            .map(|rows| group_reactions(rows, &self.me))
            .unwrap_or_default()
    }
}

/// Fold a newer copy of a message into the one we hold. Read and delete
/// stamps only ever go from unset to set, whatever order updates arrive in.
fn merge(existing: &mut Message, incoming: Message) {
    let read_at = incoming.read_at.or(existing.read_at);
    let deleted_at = incoming.deleted_at.or(existing.deleted_at);
    let mut merged = incoming;
    merged.read_at = read_at;
    merged.deleted_at = deleted_at;
    *existing = merged.redacted();
}
