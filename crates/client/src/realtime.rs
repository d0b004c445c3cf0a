//! One conversation's live feed over the gateway WebSocket.

use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use url::Url;

use resortify_shared::constants::{WS_HEARTBEAT_INTERVAL_MS, WS_SUBSCRIBE_TIMEOUT_MS};
use resortify_shared::events::{ClientEvent, ServerEvent};

use crate::error::ClientError;
use crate::typing::TypingSignal;

const EVENT_BUFFER: usize = 256;
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// How long to wait for a join confirmation before going degraded.
pub const CONFIRM_TIMEOUT: Duration = Duration::from_millis(WS_SUBSCRIBE_TIMEOUT_MS);

/// Outcome of waiting for the server to confirm a join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Live,
    /// No confirmation. The chat still works from snapshots; live updates
    /// may be missing.
    Degraded(String),
}

enum Outbound {
    Event(ClientEvent),
    Close,
}

/// A gateway connection joined to exactly one chat. Events for other chats
/// never reach the receiver.
pub struct Subscription {
    chat_id: String,
    outbound: mpsc::UnboundedSender<Outbound>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Subscription {
    pub async fn connect(
        gateway: &Url,
        chat_id: &str,
    ) -> Result<(Self, mpsc::Receiver<ServerEvent>), ClientError> {
        let (socket, _) = connect_async(gateway.as_str()).await?;
        let (mut sink, mut stream) = socket.split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
        let (events_tx, events_rx) = mpsc::channel::<ServerEvent>(EVENT_BUFFER);

        let writer = tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(Duration::from_millis(WS_HEARTBEAT_INTERVAL_MS));
            heartbeat.tick().await;
            loop {
                let event = tokio::select! {
                    next = outbound_rx.recv() => match next {
                        Some(Outbound::Event(event)) => event,
                        Some(Outbound::Close) | None => break,
                    },
                    _ = heartbeat.tick() => ClientEvent::Ping,
                };
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!("Dropping unserializable gateway event: {}", e);
                        continue;
                    }
                };
                if sink.send(WsMessage::Text(text.into())).await.is_err() {
                    break;
                }
            }
            let _ = sink.send(WsMessage::Close(None)).await;
        });

        let scope = chat_id.to_string();
        let reader = tokio::spawn(async move {
            while let Some(Ok(msg)) = stream.next().await {
                match msg {
                    WsMessage::Text(text) => match serde_json::from_str::<ServerEvent>(text.as_str()) {
                        Ok(event) if belongs_to(&event, &scope) => {
                            if events_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(e) => tracing::debug!("Unrecognized gateway event: {}", e),
                    },
                    WsMessage::Close(_) => break,
                    _ => {}
                }
            }
            tracing::debug!("Gateway feed for {} ended", scope);
        });

        let subscription = Self {
            chat_id: chat_id.to_string(),
            outbound,
            reader,
            writer,
        };
        subscription.send(ClientEvent::JoinChat {
            chat_id: chat_id.to_string(),
        })?;

        Ok((subscription, events_rx))
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn send(&self, event: ClientEvent) -> Result<(), ClientError> {
        self.outbound
            .send(Outbound::Event(event))
            .map_err(|_| ClientError::Closed)
    }

    pub fn typing(&self, signal: TypingSignal) -> Result<(), ClientError> {
        let chat_id = self.chat_id.clone();
        self.send(match signal {
            TypingSignal::Start => ClientEvent::TypingStart { chat_id },
            TypingSignal::Stop => ClientEvent::TypingStop { chat_id },
        })
    }

    /// Leave the chat, close the socket, and stop both tasks.
    pub async fn close(mut self) {
        let _ = self.send(ClientEvent::LeaveChat {
            chat_id: self.chat_id.clone(),
        });
        let _ = self.outbound.send(Outbound::Close);
        if tokio::time::timeout(CLOSE_GRACE, &mut self.writer).await.is_err() {
            tracing::debug!("Gateway writer for {} did not flush in time", self.chat_id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// Whether a server event concerns `chat_id`. Presence and errors are
/// connection-wide.
pub fn belongs_to(event: &ServerEvent, chat_id: &str) -> bool {
    match event {
        ServerEvent::Subscribed { chat_id: id }
        | ServerEvent::Typing { chat_id: id, .. }
        | ServerEvent::ReactionAdded { chat_id: id, .. }
        | ServerEvent::ReactionRemoved { chat_id: id, .. } => id == chat_id,
        ServerEvent::MessageCreated { message } | ServerEvent::MessageUpdated { message } => {
            message.chat_id == chat_id
        }
        ServerEvent::ChatUpdated { chat } => chat.id == chat_id,
        ServerEvent::Presence { .. } | ServerEvent::Error { .. } => true,
    }
}

/// Wait up to `timeout` for the join to be confirmed. Events that arrive
/// first are handed back so the caller can still apply them.
pub async fn await_confirmation(
    events: &mut mpsc::Receiver<ServerEvent>,
    chat_id: &str,
    timeout: Duration,
) -> (Confirmation, Vec<ServerEvent>) {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut early = Vec::new();

    loop {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Some(ServerEvent::Subscribed { chat_id: id })) if id == chat_id => {
                return (Confirmation::Live, early);
            }
            Ok(Some(ServerEvent::Error { message })) => {
                tracing::warn!("Join of {} refused: {}", chat_id, message);
                return (Confirmation::Degraded(message), early);
            }
            Ok(Some(event)) => early.push(event),
            Ok(None) => return (Confirmation::Degraded("Connection closed".into()), early),
            Err(_) => {
                tracing::warn!("Join of {} not confirmed within {:?}", chat_id, timeout);
                return (Confirmation::Degraded("Timed out".into()), early);
            }
        }
    }
}
