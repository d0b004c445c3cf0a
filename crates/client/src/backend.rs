use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use url::Url;

use resortify_shared::api::{
    ChatSummary, MarkReadRequest, MarkReadResponse, MessagePage, OpenedChat, ParticipantWithPresence,
    ReactRequest, ReactResponse, SendMessageRequest,
};
use resortify_shared::model::{ChatScope, Message};
use resortify_shared::reactions::ReactionGroup;

use crate::error::ClientError;

/// The persistence handle a chat session talks to. Constructed once and
/// shared by `Arc`; tests substitute their own.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn resolve(&self, scope: &ChatScope) -> Result<OpenedChat, ClientError>;
    async fn list_chats(&self) -> Result<Vec<ChatSummary>, ClientError>;
    async fn hide_chat(&self, chat_id: &str) -> Result<(), ClientError>;
    async fn list_messages(&self, chat_id: &str, before: Option<&str>) -> Result<MessagePage, ClientError>;
    async fn send_message(&self, chat_id: &str, req: &SendMessageRequest) -> Result<Message, ClientError>;
    async fn mark_read(&self, chat_id: &str, message_ids: &[String]) -> Result<Vec<String>, ClientError>;
    async fn delete_message(&self, message_id: &str) -> Result<Message, ClientError>;
    async fn react(&self, message_id: &str, emoji: &str) -> Result<ReactResponse, ClientError>;
    async fn list_reactions(&self, chat_id: &str) -> Result<BTreeMap<String, Vec<ReactionGroup>>, ClientError>;
    async fn list_participants(&self, chat_id: &str) -> Result<Vec<ParticipantWithPresence>, ClientError>;
}

/// [`ChatBackend`] over the server's JSON API with a bearer session token.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: Client,
    base: Url,
    token: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpBackend {
    pub fn new(server: &str, token: impl Into<String>) -> Result<Self, ClientError> {
        let mut base = Url::parse(server)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            client: Client::new(),
            base,
            token: token.into(),
        })
    }

    fn api_url(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base.join("api/")?.join(path.trim_start_matches('/'))?)
    }

    /// `ws(s)://host/gateway?token=...` for [`crate::realtime::Subscription`].
    pub fn gateway_url(&self) -> Result<Url, ClientError> {
        let mut url = self.base.join("gateway")?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        // http/https and ws/wss are both special schemes, so this cannot fail
        let _ = url.set_scheme(scheme);
        url.query_pairs_mut().append_pair("token", &self.token);
        Ok(url)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token)
    }

    async fn check(response: Response) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|b| b.error)
            .unwrap_or_else(|_| status.canonical_reason().unwrap_or("Request failed").to_string());
        tracing::debug!("API error {}: {}", status, message);
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = Self::check(self.authed(request).send().await?).await?;
        Ok(response.json().await?)
    }
}

fn segment(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn resolve(&self, scope: &ChatScope) -> Result<OpenedChat, ClientError> {
        let path = match scope {
            ChatScope::Booking { booking_id } => format!("chats/booking/{}", segment(booking_id)),
            ChatScope::Resort { resort_id } => format!("chats/resort/{}", segment(resort_id)),
        };
        let url = self.api_url(&path)?;
        self.json(self.client.post(url)).await
    }

    async fn list_chats(&self) -> Result<Vec<ChatSummary>, ClientError> {
        let url = self.api_url("chats")?;
        self.json(self.client.get(url)).await
    }

    async fn hide_chat(&self, chat_id: &str) -> Result<(), ClientError> {
        let url = self.api_url(&format!("chats/{}", segment(chat_id)))?;
        Self::check(self.authed(self.client.delete(url)).send().await?).await?;
        Ok(())
    }

    async fn list_messages(&self, chat_id: &str, before: Option<&str>) -> Result<MessagePage, ClientError> {
        let mut url = self.api_url(&format!("chats/{}/messages", segment(chat_id)))?;
        if let Some(cursor) = before {
            url.query_pairs_mut().append_pair("before", cursor);
        }
        self.json(self.client.get(url)).await
    }

    async fn send_message(&self, chat_id: &str, req: &SendMessageRequest) -> Result<Message, ClientError> {
        let url = self.api_url(&format!("chats/{}/messages", segment(chat_id)))?;
        self.json(self.client.post(url).json(req)).await
    }

    async fn mark_read(&self, chat_id: &str, message_ids: &[String]) -> Result<Vec<String>, ClientError> {
        let url = self.api_url(&format!("chats/{}/read", segment(chat_id)))?;
        let body = MarkReadRequest {
            message_ids: message_ids.to_vec(),
        };
        let res: MarkReadResponse = self.json(self.client.post(url).json(&body)).await?;
        Ok(res.updated)
    }

    async fn delete_message(&self, message_id: &str) -> Result<Message, ClientError> {
        let url = self.api_url(&format!("messages/{}", segment(message_id)))?;
        self.json(self.client.delete(url)).await
    }

    async fn react(&self, message_id: &str, emoji: &str) -> Result<ReactResponse, ClientError> {
        let url = self.api_url(&format!("messages/{}/reactions", segment(message_id)))?;
        let body = ReactRequest {
            emoji: emoji.to_string(),
        };
        self.json(self.client.post(url).json(&body)).await
    }

    async fn list_reactions(&self, chat_id: &str) -> Result<BTreeMap<String, Vec<ReactionGroup>>, ClientError> {
        let url = self.api_url(&format!("chats/{}/reactions", segment(chat_id)))?;
        self.json(self.client.get(url)).await
    }

    async fn list_participants(&self, chat_id: &str) -> Result<Vec<ParticipantWithPresence>, ClientError> {
        let url = self.api_url(&format!("chats/{}/participants", segment(chat_id)))?;
        self.json(self.client.get(url)).await
    }
}
