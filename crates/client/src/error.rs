#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status and `{"error": ...}`.
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Rejected locally before reaching the server.
    #[error("{0}")]
    Invalid(String),

    #[error("Subscription closed")]
    Closed,

    #[error("Chat is not ready")]
    NotReady,

    #[error("Cannot {action} while {state}")]
    InvalidTransition { action: &'static str, state: &'static str },
}

impl ClientError {
    /// Worth an automatic or user-triggered retry: transport failures and
    /// server-side unavailability, not validation or permission errors.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Http(_) | ClientError::Gateway(_) | ClientError::Closed => true,
            ClientError::Api { status, .. } => *status >= 500 || *status == 409,
            _ => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
