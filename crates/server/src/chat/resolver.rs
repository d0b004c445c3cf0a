//! Find-or-create the single canonical conversation for a booking or a
//! resort inquiry.

use resortify_shared::api::OpenedChat;
use resortify_shared::constants::PAYMENT_GUIDANCE;
use resortify_shared::model::{now_timestamp, Chat, ChatScope, ChatStatus, MessageKind, ParticipantRole};

use super::{membership, stream};
use crate::db::is_unique_violation;
use crate::error::{ChatError, ChatResult};
use crate::models::{AuthUser, ChatRow, CHAT_COLUMNS};
use crate::AppState;

/// Resolve the conversation for `scope`, creating it on first use, and
/// register the actor as a visible participant.
pub async fn resolve(state: &AppState, scope: &ChatScope, actor: &AuthUser) -> ChatResult<OpenedChat> {
    let role = role_for_new_entry(&state.db, scope, actor).await?;
    let (chat, created) = find_or_create(&state.db, scope, &actor.id).await?;

    if created {
        tracing::info!("Created chat {} for {:?}", chat.id, scope);
        post_payment_guidance(state, &chat).await;
    }

    let participant = membership::ensure_member(&state.db, &chat.id, &actor.id, role).await?;

    // Inquiries reach the owner through their chat list
    if let ChatScope::Resort { resort_id } = scope {
        let owner_id = resort_owner(&state.db, resort_id).await?;
        membership::add_member(&state.db, &chat.id, &owner_id, ParticipantRole::Owner).await?;
    }

    Ok(OpenedChat {
        chat,
        role: participant.role,
        created,
    })
}

/// Open an existing conversation by id. Outsiders who are entitled to it
/// (the resort owner, an admin) are joined on the way in.
pub async fn open(state: &AppState, chat_id: &str, actor: &AuthUser) -> ChatResult<OpenedChat> {
    let chat = super::fetch_chat(&state.db, chat_id).await?;

    let role = match super::find_participant(&state.db, chat_id, &actor.id).await? {
        Some(p) => p.role,
        None => role_for_existing(&state.db, &chat, actor).await?,
    };

    let participant = membership::ensure_member(&state.db, chat_id, &actor.id, role).await?;

    Ok(OpenedChat {
        chat,
        role: participant.role,
        created: false,
    })
}

pub async fn find(db: &sqlx::SqlitePool, scope: &ChatScope, actor_id: &str) -> ChatResult<Option<Chat>> {
    let row = match scope {
        ChatScope::Booking { booking_id } => {
            let sql = format!("SELECT {} FROM chats WHERE booking_id = ?", CHAT_COLUMNS);
            sqlx::query_as::<_, ChatRow>(&sql)
                .bind(booking_id)
                .fetch_optional(db)
                .await?
        }
        ChatScope::Resort { resort_id } => {
            let sql = format!(
                "SELECT {} FROM chats WHERE resort_id = ? AND creator_id = ?",
                CHAT_COLUMNS
            );
            sqlx::query_as::<_, ChatRow>(&sql)
                .bind(resort_id)
                .bind(actor_id)
                .fetch_optional(db)
                .await?
        }
    };
    Ok(row.map(Chat::try_from).transpose()?)
}

/// Look up, else insert. A unique violation means another actor created the
/// row between our read and our write: read again, and that read must hit.
pub async fn find_or_create(
    db: &sqlx::SqlitePool,
    scope: &ChatScope,
    actor_id: &str,
) -> ChatResult<(Chat, bool)> {
    if let Some(chat) = find(db, scope, actor_id).await? {
        return Ok((chat, false));
    }

    match insert_chat(db, scope, actor_id).await {
        Ok(chat) => Ok((chat, true)),
        Err(ChatError::Conflict(reason)) => {
            tracing::debug!("Chat creation raced ({}), re-reading", reason);
            find(db, scope, actor_id)
                .await?
                .map(|chat| (chat, false))
                .ok_or_else(|| ChatError::Conflict(format!("chat for {:?} missing after unique violation", scope)))
        }
        Err(e) => Err(e),
    }
}

pub async fn insert_chat(db: &sqlx::SqlitePool, scope: &ChatScope, creator_id: &str) -> ChatResult<Chat> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = now_timestamp();

    let result = sqlx::query(
        r#"INSERT INTO chats (id, booking_id, resort_id, creator_id, status, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(scope.booking_id())
    .bind(scope.resort_id())
    .bind(creator_id)
    .bind(ChatStatus::Open.as_str())
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await;

    match result {
        Ok(_) => super::fetch_chat(db, &id).await,
        Err(e) if is_unique_violation(&e) => Err(ChatError::Conflict(e.to_string())),
        Err(e) => Err(e.into()),
    }
}

/// The pinned payment guidance. Best effort: the conversation exists either
/// way.
async fn post_payment_guidance(state: &AppState, chat: &Chat) {
    let result = stream::insert_message(
        &state.db,
        stream::NewMessage {
            chat_id: &chat.id,
            sender_id: &chat.creator_id,
            kind: MessageKind::System,
            content: PAYMENT_GUIDANCE,
            attachment: None,
            client_ref: None,
        },
    )
    .await;

    if let Err(e) = result {
        tracing::warn!("Failed to post payment guidance to chat {}: {}", chat.id, e);
    }
}

struct BookingParties {
    guest_id: String,
    owner_id: String,
}

async fn booking_parties(db: &sqlx::SqlitePool, booking_id: &str) -> ChatResult<BookingParties> {
    let row = sqlx::query_as::<_, (String, String)>(
        r#"SELECT b.guest_id, r.owner_id
           FROM bookings b
           JOIN resorts r ON r.id = b.resort_id
           WHERE b.id = ?"#,
    )
    .bind(booking_id)
    .fetch_optional(db)
    .await?
    .ok_or(ChatError::NotFound("Booking"))?;

    Ok(BookingParties {
        guest_id: row.0,
        owner_id: row.1,
    })
}

async fn resort_owner(db: &sqlx::SqlitePool, resort_id: &str) -> ChatResult<String> {
    sqlx::query_scalar::<_, String>("SELECT owner_id FROM resorts WHERE id = ?")
        .bind(resort_id)
        .fetch_optional(db)
        .await?
        .ok_or(ChatError::NotFound("Resort"))
}

fn booking_role(parties: &BookingParties, actor: &AuthUser) -> ChatResult<ParticipantRole> {
    if parties.guest_id == actor.id {
        Ok(ParticipantRole::Guest)
    } else if parties.owner_id == actor.id {
        Ok(ParticipantRole::Owner)
    } else if actor.is_admin {
        Ok(ParticipantRole::Admin)
    } else {
        Err(ChatError::Forbidden("Not allowed to view this booking".into()))
    }
}

async fn role_for_new_entry(
    db: &sqlx::SqlitePool,
    scope: &ChatScope,
    actor: &AuthUser,
) -> ChatResult<ParticipantRole> {
    match scope {
        ChatScope::Booking { booking_id } => {
            let parties = booking_parties(db, booking_id).await?;
            booking_role(&parties, actor)
        }
        ChatScope::Resort { resort_id } => {
            let owner_id = resort_owner(db, resort_id).await?;
            if owner_id == actor.id {
                // An inquiry thread is keyed on its asker; owners answer
                // existing threads from their chat list.
                Err(ChatError::Forbidden(
                    "Resort owners open inquiries from their chat list".into(),
                ))
            } else if actor.is_admin {
                Ok(ParticipantRole::Admin)
            } else {
                Ok(ParticipantRole::Guest)
            }
        }
    }
}

async fn role_for_existing(db: &sqlx::SqlitePool, chat: &Chat, actor: &AuthUser) -> ChatResult<ParticipantRole> {
    match &chat.scope {
        ChatScope::Booking { booking_id } => {
            let parties = booking_parties(db, booking_id).await?;
            booking_role(&parties, actor)
        }
        ChatScope::Resort { resort_id } => {
            let owner_id = resort_owner(db, resort_id).await?;
            if owner_id == actor.id {
                Ok(ParticipantRole::Owner)
            } else if actor.is_admin {
                Ok(ParticipantRole::Admin)
            } else if chat.creator_id == actor.id {
                Ok(ParticipantRole::Guest)
            } else {
                Err(ChatError::Forbidden("Not allowed to view this chat".into()))
            }
        }
    }
}
