mod broadcast;

use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, RwLock};

pub type ClientId = u64;

pub struct ConnectedClient {
    pub user_id: String,
    pub tx: mpsc::UnboundedSender<String>,
    pub subscribed_chats: HashSet<String>,
}

/// Live WebSocket connections and their per-conversation subscriptions.
pub struct GatewayState {
    next_id: RwLock<u64>,
    pub clients: RwLock<HashMap<ClientId, ConnectedClient>>,
    pub chat_subs: RwLock<HashMap<String, HashSet<ClientId>>>,
}

impl Default for GatewayState {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayState {
    pub fn new() -> Self {
        Self {
            next_id: RwLock::new(1),
            clients: RwLock::new(HashMap::new()),
            chat_subs: RwLock::new(HashMap::new()),
        }
    }

    pub async fn next_client_id(&self) -> ClientId {
        let mut id = self.next_id.write().await;
        let current = *id;
        *id += 1;
        current
    }

    pub async fn register(
        &self,
        client_id: ClientId,
        user_id: String,
        tx: mpsc::UnboundedSender<String>,
    ) {
        let client = ConnectedClient {
            user_id,
            tx,
            subscribed_chats: HashSet::new(),
        };
        self.clients.write().await.insert(client_id, client);
    }

    /// Drop a connection and every subscription it held.
    pub async fn unregister(&self, client_id: ClientId) -> Option<ConnectedClient> {
        let client = self.clients.write().await.remove(&client_id)?;

        let mut subs = self.chat_subs.write().await;
        for chat_id in &client.subscribed_chats {
            if let Some(set) = subs.get_mut(chat_id) {
                set.remove(&client_id);
                if set.is_empty() {
                    subs.remove(chat_id);
                }
            }
        }

        Some(client)
    }

    /// Locks are always taken `clients` first, then `chat_subs`. Returns
    /// false when the connection is already gone.
    pub async fn subscribe_chat(&self, client_id: ClientId, chat_id: &str) -> bool {
        let mut clients = self.clients.write().await;
        let Some(client) = clients.get_mut(&client_id) else {
            return false;
        };
        client.subscribed_chats.insert(chat_id.to_string());

        self.chat_subs
            .write()
            .await
            .entry(chat_id.to_string())
            .or_default()
            .insert(client_id);
        true
    }

    pub async fn unsubscribe_chat(&self, client_id: ClientId, chat_id: &str) {
        let mut clients = self.clients.write().await;
        if let Some(client) = clients.get_mut(&client_id) {
            client.subscribed_chats.remove(chat_id);
        }

        let mut subs = self.chat_subs.write().await;
        if let Some(set) = subs.get_mut(chat_id) {
            set.remove(&client_id);
            if set.is_empty() {
                subs.remove(chat_id);
            }
        }
    }

    pub async fn subscriber_count(&self, chat_id: &str) -> usize {
        self.chat_subs
            .read()
            .await
            .get(chat_id)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    pub async fn is_user_connected(&self, user_id: &str) -> bool {
        self.clients
            .read()
            .await
            .values()
            .any(|c| c.user_id == user_id)
    }
}
