use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use resortify_shared::RecordError;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Not authenticated")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    /// Another writer got there first. Callers that can recover do so; it
    /// only reaches a response if recovery failed too.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Chat unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),

    #[error("Malformed record: {0}")]
    Malformed(#[from] RecordError),
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ChatError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ChatError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ChatError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            ChatError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ChatError::Conflict(msg) => {
                tracing::error!("Unrecovered conflict: {}", msg);
                (StatusCode::CONFLICT, "Please retry".to_string())
            }
            ChatError::Unavailable(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Chat unavailable, retry".to_string(),
                )
            }
            ChatError::Malformed(e) => {
                tracing::error!("Malformed record: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
