use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::message::{DeliveryStatus, MessageEnvelope, MessageType};
use crate::services::chat_client::{ConversationDirectory, MessageStore};
use crate::services::encryption::MessageCipher;
use crate::websocket::events::{JoinFailure, ServerEvent};
use crate::websocket::{ConnectionHandle, TopicRegistry};

/// The send pipeline: membership, encryption, persistence, fan-out.
pub struct MessageService {
    store: Arc<dyn MessageStore>,
    directory: Arc<dyn ConversationDirectory>,
    cipher: Arc<dyn MessageCipher>,
    topics: TopicRegistry,
}

impl MessageService {
    pub fn new(
        store: Arc<dyn MessageStore>,
        directory: Arc<dyn ConversationDirectory>,
        cipher: Arc<dyn MessageCipher>,
        topics: TopicRegistry,
    ) -> Self {
        Self {
            store,
            directory,
            cipher,
            topics,
        }
    }

    /// Subscribes the connection to each requested chat it is actually
    /// a member of. Partial failure is normal; the caller gets both
    /// lists back.
    pub async fn join_chats(
        &self,
        handle: &ConnectionHandle,
        chat_ids: Vec<Uuid>,
    ) -> ServerEvent {
        let mut joined = Vec::new();
        let mut failed = Vec::new();

        for chat_id in chat_ids {
            match self.directory.is_participant(handle.user_id, chat_id).await {
                Ok(true) => {
                    self.topics.join(handle, chat_id).await;
                    joined.push(chat_id);
                }
                Ok(false) => failed.push(JoinFailure {
                    chat_id,
                    reason: "not a participant".into(),
                }),
                Err(e) => failed.push(JoinFailure {
                    chat_id,
                    reason: e.to_string(),
                }),
            }
        }

        debug!(user_id = %handle.user_id, joined = joined.len(), failed = failed.len(), "join_chats");
        ServerEvent::ChatsJoined { joined, failed }
    }

    /// Full send path. Returns the `message_sent` acknowledgement for
    /// the originating connection only; recipients get `new_message`
    /// through their topic subscriptions.
    pub async fn send_message(
        &self,
        handle: &ConnectionHandle,
        chat_id: Uuid,
        message_type: MessageType,
        content: String,
        meta: Option<Value>,
    ) -> AppResult<ServerEvent> {
        // Senders who never joined the topic get one chance to join
        // implicitly, membership permitting.
        if !self.topics.is_subscribed(handle.id, chat_id).await {
            if !self.directory.is_participant(handle.user_id, chat_id).await? {
                return Err(AppError::Forbidden);
            }
            self.topics.join(handle, chat_id).await;
        }

        let cipher = self.cipher.encrypt(chat_id, &content).await?;

        let envelope = MessageEnvelope {
            id: Uuid::new_v4(),
            chat_id,
            sender_id: handle.user_id,
            message_type,
            content,
            cipher,
            meta,
            status: DeliveryStatus::Sent,
            seen_by: Vec::new(),
            sent_at: Utc::now(),
            delivered_at: None,
            seen_at: None,
        };

        let stored = self.store.insert_message(&envelope).await?;
        let public = stored.to_public();

        let delivered = self
            .topics
            .broadcast(
                chat_id,
                &ServerEvent::NewMessage {
                    message: public.clone(),
                },
                None,
            )
            .await;
        debug!(message_id = %stored.id, %chat_id, delivered, "message fanned out");

        Ok(ServerEvent::MessageSent {
            message: public,
            timestamp: Utc::now(),
        })
    }
}
