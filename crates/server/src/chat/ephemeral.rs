//! Typing and presence. Best effort throughout: a lost row only means a
//! stale indicator, so storage errors are logged and dropped.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use resortify_shared::events::ServerEvent;
use resortify_shared::model::{format_timestamp, now_timestamp, PresenceEntry, PresenceStatus, TypingEntry};

use crate::error::ChatResult;
use crate::models::{decode_all, PresenceRow, TypingRow};
use crate::AppState;

/// Upsert (active) or delete (inactive) the caller's typing row and tell
/// the other subscribers.
pub async fn set_typing(state: &AppState, chat_id: &str, user_id: &str, active: bool) {
    let result = if active {
        sqlx::query(
            r#"INSERT INTO chat_typing (chat_id, user_id, updated_at) VALUES (?, ?, ?)
               ON CONFLICT(chat_id, user_id) DO UPDATE SET updated_at = excluded.updated_at"#,
        )
        .bind(chat_id)
        .bind(user_id)
        .bind(now_timestamp())
        .execute(&state.db)
        .await
    } else {
        sqlx::query("DELETE FROM chat_typing WHERE chat_id = ? AND user_id = ?")
            .bind(chat_id)
            .bind(user_id)
            .execute(&state.db)
            .await
    };

    match result {
        Ok(done) if !active && done.rows_affected() == 0 => return,
        Ok(_) => {}
        Err(e) => {
            tracing::debug!("Typing update for {} in {} dropped: {}", user_id, chat_id, e);
            return;
        }
    }

    state
        .gateway
        .broadcast_chat(
            chat_id,
            &ServerEvent::Typing {
                chat_id: chat_id.to_string(),
                user_id: user_id.to_string(),
                active,
            },
            None,
        )
        .await;
}

fn cutoff(ttl: Duration) -> String {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(5));
    format_timestamp(Utc::now() - ttl)
}

/// Typing rows younger than `ttl`.
pub async fn list_typing(db: &sqlx::SqlitePool, chat_id: &str, ttl: Duration) -> ChatResult<Vec<TypingEntry>> {
    let rows = sqlx::query_as::<_, TypingRow>(
        "SELECT chat_id, user_id, updated_at FROM chat_typing WHERE chat_id = ? AND updated_at >= ?",
    )
    .bind(chat_id)
    .bind(cutoff(ttl))
    .fetch_all(db)
    .await?;
    Ok(decode_all(rows)?)
}

/// Delete typing rows older than `ttl`, broadcasting each as stopped.
/// Returns how many were cleared.
pub async fn sweep_typing(state: &AppState, ttl: Duration) -> usize {
    let cutoff = cutoff(ttl);

    let stale = match sqlx::query_as::<_, (String, String)>(
        "DELETE FROM chat_typing WHERE updated_at < ? RETURNING chat_id, user_id",
    )
    .bind(&cutoff)
    .fetch_all(&state.db)
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            tracing::debug!("Typing sweep failed: {}", e);
            return 0;
        }
    };

    for (chat_id, user_id) in &stale {
        state
            .gateway
            .broadcast_chat(
                chat_id,
                &ServerEvent::Typing {
                    chat_id: chat_id.clone(),
                    user_id: user_id.clone(),
                    active: false,
                },
                None,
            )
            .await;
    }
    stale.len()
}

pub fn spawn_typing_sweeper(state: Arc<AppState>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
    let interval = state.config.typing_sweep_interval();
    let ttl = state.config.typing_ttl();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let cleared = sweep_typing(&state, ttl).await;
                    if cleared > 0 {
                        tracing::debug!("Cleared {} stale typing indicators", cleared);
                    }
                }
            }
        }
        tracing::info!("Typing sweeper stopped");
    })
}

pub async fn set_presence(state: &AppState, user_id: &str, status: PresenceStatus) {
    let result = sqlx::query(
        r#"INSERT INTO user_presence (user_id, status, last_seen) VALUES (?, ?, ?)
           ON CONFLICT(user_id) DO UPDATE SET status = excluded.status, last_seen = excluded.last_seen"#,
    )
    .bind(user_id)
    .bind(status.as_str())
    .bind(now_timestamp())
    .execute(&state.db)
    .await;

    if let Err(e) = result {
        tracing::debug!("Presence update for {} dropped: {}", user_id, e);
        return;
    }

    // Only people sharing a conversation with the user hear about it
    let chat_ids = match sqlx::query_scalar::<_, String>(
        "SELECT chat_id FROM chat_participants WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_all(&state.db)
    .await
    {
        Ok(ids) => ids,
        Err(e) => {
            tracing::debug!("Presence fan-out for {} dropped: {}", user_id, e);
            return;
        }
    };

    state
        .gateway
        .broadcast_chats(
            &chat_ids,
            &ServerEvent::Presence {
                user_id: user_id.to_string(),
                status,
            },
            None,
        )
        .await;
}

/// Presence for the given users. Users never seen are reported offline.
pub async fn presence_for(db: &sqlx::SqlitePool, user_ids: &[String]) -> ChatResult<Vec<PresenceEntry>> {
    if user_ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders: Vec<&str> = user_ids.iter().map(|_| "?").collect();
    let sql = format!(
        "SELECT user_id, status, last_seen FROM user_presence WHERE user_id IN ({})",
        placeholders.join(",")
    );
    let mut query = sqlx::query_as::<_, PresenceRow>(&sql);
    for id in user_ids {
        query = query.bind(id);
    }
    let known: Vec<PresenceEntry> = decode_all(query.fetch_all(db).await?)?;

    let never_seen = chrono::DateTime::<Utc>::UNIX_EPOCH;
    Ok(user_ids
        .iter()
        .map(|id| {
            known
                .iter()
                .find(|p| &p.user_id == id)
                .cloned()
                .unwrap_or_else(|| PresenceEntry {
                    user_id: id.clone(),
                    status: PresenceStatus::Offline,
                    last_seen: never_seen,
                })
        })
        .collect())
}
