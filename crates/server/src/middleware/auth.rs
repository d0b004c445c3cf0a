use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use axum_extra::extract::CookieJar;
use std::sync::Arc;

use crate::error::ChatError;
use crate::models::AuthUser;
use crate::AppState;

pub const SESSION_COOKIE: &str = "resortify.session_token";

/// Pull a session token from `Authorization: Bearer` or the session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string());

    bearer
        .or_else(|| {
            CookieJar::from_headers(headers)
                .get(SESSION_COOKIE)
                .map(|c| c.value().to_string())
        })
        .filter(|t| !t.is_empty())
}

/// Look up a live session. Expired or unknown tokens yield `None`.
pub async fn load_session(
    db: &sqlx::SqlitePool,
    token: &str,
) -> Result<Option<AuthUser>, ChatError> {
    let row = sqlx::query_as::<_, (String, String, String, String, String)>(
        r#"SELECT u.id, u.name, u.email, u.role, s.expires_at
           FROM "session" s
           JOIN "user" u ON u.id = s.user_id
           WHERE s.token = ?"#,
    )
    .bind(token)
    .fetch_optional(db)
    .await?;

    let Some((id, name, email, role, expires_at)) = row else {
        return Ok(None);
    };

    let now = resortify_shared::model::now_timestamp();
    if expires_at < now {
        return Ok(None);
    }

    Ok(Some(AuthUser {
        id,
        name,
        email,
        is_admin: role == "admin",
    }))
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ChatError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers).ok_or(ChatError::Unauthorized)?;
        load_session(&state.db, &token)
            .await?
            .ok_or(ChatError::Unauthorized)
    }
}
