pub mod events;
pub mod handlers;
pub mod message_types;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;
use uuid::Uuid;

use events::ServerEvent;

/// Identifies one websocket connection. A user may hold several at once
/// (multiple devices or tabs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// A live connection: its id, the authenticated identity behind it, and
/// the channel its writer task drains.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub user_id: Uuid,
    pub sender: UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(user_id: Uuid, sender: UnboundedSender<ServerEvent>) -> Self {
        Self {
            id: ConnectionId::new(),
            user_id,
            sender,
        }
    }

    /// Queue an event for this connection. A closed channel means the
    /// writer task is gone; the caller treats that as a dead connection.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

/// Tracks which identities have live connections. Presence is derived:
/// a user is online while they hold at least one connection, and the
/// entry is removed entirely once the last one goes.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, HashMap<ConnectionId, UnboundedSender<ServerEvent>>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection. Returns true when this is the user's
    /// first live connection (the offline-to-online edge).
    pub async fn register(&self, handle: &ConnectionHandle) -> bool {
        let mut map = self.inner.write().await;
        let conns = map.entry(handle.user_id).or_default();
        let came_online = conns.is_empty();
        conns.insert(handle.id, handle.sender.clone());
        came_online
    }

    /// Removes a connection. Returns true when it was the user's last
    /// one (the online-to-offline edge).
    pub async fn unregister(&self, user_id: Uuid, conn_id: ConnectionId) -> bool {
        let mut map = self.inner.write().await;
        let Some(conns) = map.get_mut(&user_id) else {
            return false;
        };
        conns.remove(&conn_id);
        if conns.is_empty() {
            map.remove(&user_id);
            true
        } else {
            false
        }
    }

    pub async fn is_present(&self, user_id: Uuid) -> bool {
        self.inner.read().await.contains_key(&user_id)
    }

    pub async fn connection_count(&self, user_id: Uuid) -> usize {
        self.inner
            .read()
            .await
            .get(&user_id)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    /// Sends to every connection the user holds. Dead senders are
    /// dropped in place. Returns false when the user has no live
    /// connection left.
    pub async fn send_to_user(&self, user_id: Uuid, event: &ServerEvent) -> bool {
        let mut map = self.inner.write().await;
        let Some(conns) = map.get_mut(&user_id) else {
            return false;
        };
        conns.retain(|_, tx| tx.send(event.clone()).is_ok());
        if conns.is_empty() {
            map.remove(&user_id);
            false
        } else {
            true
        }
    }

    /// Sends to every connection of every user except `excluded`.
    pub async fn broadcast_others(&self, excluded: Uuid, event: &ServerEvent) {
        let mut map = self.inner.write().await;
        for (user_id, conns) in map.iter_mut() {
            if *user_id == excluded {
                continue;
            }
            conns.retain(|_, tx| tx.send(event.clone()).is_ok());
        }
        map.retain(|_, conns| !conns.is_empty());
    }
}

#[derive(Default)]
struct TopicState {
    topics: HashMap<Uuid, HashMap<ConnectionId, UnboundedSender<ServerEvent>>>,
    by_conn: HashMap<ConnectionId, HashSet<Uuid>>,
}

/// Per-chat subscription table. Membership is per connection, not per
/// user, so every device joins on its own.
#[derive(Clone, Default)]
pub struct TopicRegistry {
    inner: Arc<RwLock<TopicState>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn join(&self, handle: &ConnectionHandle, chat_id: Uuid) {
        let mut state = self.inner.write().await;
        state
            .topics
            .entry(chat_id)
            .or_default()
            .insert(handle.id, handle.sender.clone());
        state.by_conn.entry(handle.id).or_default().insert(chat_id);
    }

    pub async fn is_subscribed(&self, conn_id: ConnectionId, chat_id: Uuid) -> bool {
        self.inner
            .read()
            .await
            .by_conn
            .get(&conn_id)
            .map(|chats| chats.contains(&chat_id))
            .unwrap_or(false)
    }

    /// Removes the connection from every chat it joined. Called on
    /// disconnect.
    pub async fn leave_all(&self, conn_id: ConnectionId) {
        let mut state = self.inner.write().await;
        let Some(chats) = state.by_conn.remove(&conn_id) else {
            return;
        };
        for chat_id in chats {
            if let Some(members) = state.topics.get_mut(&chat_id) {
                members.remove(&conn_id);
                if members.is_empty() {
                    state.topics.remove(&chat_id);
                }
            }
        }
    }

    /// Delivers an event to every subscribed connection, optionally
    /// skipping one. Returns how many connections it was queued for.
    pub async fn broadcast(
        &self,
        chat_id: Uuid,
        event: &ServerEvent,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let mut state = self.inner.write().await;
        let Some(members) = state.topics.get_mut(&chat_id) else {
            return 0;
        };
        let mut delivered = 0;
        members.retain(|conn_id, tx| {
            if Some(*conn_id) == exclude {
                return true;
            }
            if tx.send(event.clone()).is_ok() {
                delivered += 1;
                true
            } else {
                false
            }
        });
        if members.is_empty() {
            state.topics.remove(&chat_id);
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn handle(user_id: Uuid) -> (ConnectionHandle, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(user_id, tx), rx)
    }

    #[tokio::test]
    async fn presence_tracks_first_and_last_connection() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let (a, _rx_a) = handle(user);
        let (b, _rx_b) = handle(user);

        assert!(registry.register(&a).await);
        assert!(!registry.register(&b).await);
        assert!(registry.is_present(user).await);

        assert!(!registry.unregister(user, a.id).await);
        assert!(registry.is_present(user).await);
        assert!(registry.unregister(user, b.id).await);
        assert!(!registry.is_present(user).await);
    }

    #[tokio::test]
    async fn unregister_unknown_connection_is_harmless() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        assert!(!registry.unregister(user, ConnectionId::new()).await);
    }

    #[tokio::test]
    async fn send_to_user_prunes_dead_connections() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let (a, rx_a) = handle(user);
        registry.register(&a).await;
        drop(rx_a);

        let delivered = registry
            .send_to_user(user, &ServerEvent::StopTyping {
                chat_id: Uuid::new_v4(),
                user_id: user,
            })
            .await;
        assert!(!delivered);
        assert!(!registry.is_present(user).await);
    }

    #[tokio::test]
    async fn topic_broadcast_counts_and_excludes() {
        let topics = TopicRegistry::new();
        let chat = Uuid::new_v4();
        let (a, mut rx_a) = handle(Uuid::new_v4());
        let (b, mut rx_b) = handle(Uuid::new_v4());
        topics.join(&a, chat).await;
        topics.join(&b, chat).await;

        let evt = ServerEvent::StopTyping {
            chat_id: chat,
            user_id: a.user_id,
        };
        assert_eq!(topics.broadcast(chat, &evt, Some(a.id)).await, 1);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());

        assert_eq!(topics.broadcast(chat, &evt, None).await, 2);
    }

    #[tokio::test]
    async fn leave_all_removes_every_subscription() {
        let topics = TopicRegistry::new();
        let (a, _rx) = handle(Uuid::new_v4());
        let chat_1 = Uuid::new_v4();
        let chat_2 = Uuid::new_v4();
        topics.join(&a, chat_1).await;
        topics.join(&a, chat_2).await;

        topics.leave_all(a.id).await;
        assert!(!topics.is_subscribed(a.id, chat_1).await);
        assert!(!topics.is_subscribed(a.id, chat_2).await);
    }
}
