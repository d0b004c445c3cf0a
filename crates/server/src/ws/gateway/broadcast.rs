use super::{ClientId, GatewayState};
use std::collections::HashSet;
use resortify_shared::events::ServerEvent;

impl GatewayState {
    /// Fan an event out to everyone subscribed to one conversation.
    pub async fn broadcast_chat(&self, chat_id: &str, event: &ServerEvent, exclude: Option<ClientId>) {
        let msg = match serde_json::to_string(event) {
            Ok(m) => m,
            Err(_) => return,
        };

        let clients = self.clients.read().await;
        let subs = self.chat_subs.read().await;

        if let Some(subscriber_ids) = subs.get(chat_id) {
            for &cid in subscriber_ids {
                if Some(cid) == exclude {
                    continue;
                }
                if let Some(client) = clients.get(&cid) {
                    let _ = client.tx.send(msg.clone());
                }
            }
        }
    }

    /// Fan an event out to the subscribers of any of `chat_ids`. A client
    /// subscribed to several of them still gets it once.
    pub async fn broadcast_chats(&self, chat_ids: &[String], event: &ServerEvent, exclude: Option<ClientId>) {
        let msg = match serde_json::to_string(event) {
            Ok(m) => m,
            Err(_) => return,
        };

        let clients = self.clients.read().await;
        let subs = self.chat_subs.read().await;

        let mut targets: HashSet<ClientId> = HashSet::new();
        for chat_id in chat_ids {
            if let Some(subscriber_ids) = subs.get(chat_id) {
                targets.extend(subscriber_ids.iter().copied());
            }
        }

        for cid in targets {
            if Some(cid) == exclude {
                continue;
            }
            if let Some(client) = clients.get(&cid) {
                let _ = client.tx.send(msg.clone());
            }
        }
    }

    pub async fn send_to(&self, client_id: ClientId, event: &ServerEvent) {
        let msg = match serde_json::to_string(event) {
            Ok(m) => m,
            Err(_) => return,
        };

        let clients = self.clients.read().await;
        if let Some(client) = clients.get(&client_id) {
            let _ = client.tx.send(msg);
        }
    }
}
