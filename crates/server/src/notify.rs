//! Out-of-band "you have a new message" notices. Fire and forget: the
//! send path never waits on, or fails because of, a notifier.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use resortify_shared::constants::APP_NAME;
use resortify_shared::model::ChatScope;

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessageNotice {
    #[serde(flatten)]
    pub scope: ChatScope,
    pub chat_id: String,
    pub sender_user_id: String,
    pub sender_name: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_address: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook answered {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notice: NewMessageNotice) -> Result<(), NotifyError>;
}

/// POSTs the notice as JSON to a mail-dispatch endpoint.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(APP_NAME)
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notice: NewMessageNotice) -> Result<(), NotifyError> {
        let res = self.client.post(&self.url).json(&notice).send().await?;
        if !res.status().is_success() {
            return Err(NotifyError::Rejected(res.status().as_u16()));
        }
        Ok(())
    }
}

/// Used when no webhook is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notice: NewMessageNotice) -> Result<(), NotifyError> {
        tracing::info!(
            "New message in chat {} from {} (no webhook configured)",
            notice.chat_id,
            notice.sender_user_id
        );
        Ok(())
    }
}

pub fn from_config(config: &Config) -> Arc<dyn Notifier> {
    match &config.notify_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(LogNotifier),
    }
}

/// Run the notifier on its own task. Failures are logged, never retried.
pub fn dispatch(notifier: Arc<dyn Notifier>, notice: NewMessageNotice) {
    tokio::spawn(async move {
        let chat_id = notice.chat_id.clone();
        if let Err(e) = notifier.notify(notice).await {
            tracing::warn!("Message notification for chat {} failed: {}", chat_id, e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notice_carries_scope_inline() {
        let notice = NewMessageNotice {
            scope: ChatScope::booking("b1"),
            chat_id: "c1".into(),
            sender_user_id: "u1".into(),
            sender_name: "Guest".into(),
            content: "Hi".into(),
            recipient_address: None,
        };
        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["bookingId"], "b1");
        assert_eq!(json["senderUserId"], "u1");
        assert!(json.get("recipientAddress").is_none());
    }
}
