use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::message::DeliveryStatus;
use crate::services::chat_client::{ConversationDirectory, MessageStore};
use crate::websocket::events::ServerEvent;
use crate::websocket::TopicRegistry;

/// Advances message delivery status on behalf of receipt events and
/// fans the resulting notification out to the whole chat.
pub struct DeliveryService {
    store: Arc<dyn MessageStore>,
    directory: Arc<dyn ConversationDirectory>,
    topics: TopicRegistry,
}

impl DeliveryService {
    pub fn new(
        store: Arc<dyn MessageStore>,
        directory: Arc<dyn ConversationDirectory>,
        topics: TopicRegistry,
    ) -> Self {
        Self {
            store,
            directory,
            topics,
        }
    }

    pub async fn mark_delivered(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        acting_user: Uuid,
    ) -> AppResult<()> {
        self.mark(chat_id, message_id, acting_user, DeliveryStatus::Delivered)
            .await
    }

    pub async fn mark_seen(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        acting_user: Uuid,
    ) -> AppResult<()> {
        self.mark(chat_id, message_id, acting_user, DeliveryStatus::Seen)
            .await
    }

    async fn mark(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        acting_user: Uuid,
        target: DeliveryStatus,
    ) -> AppResult<()> {
        let Some(mut message) = self.store.fetch_message(message_id).await? else {
            return Err(AppError::NotFound(format!("message {message_id}")));
        };
        if message.chat_id != chat_id {
            return Err(AppError::NotFound(format!("message {message_id}")));
        }
        if !self.directory.is_participant(acting_user, chat_id).await? {
            return Err(AppError::Forbidden);
        }

        // A sender acknowledging their own message changes nothing.
        if message.sender_id == acting_user {
            debug!(%message_id, "sender self-ack ignored");
            return Ok(());
        }

        let event = match target {
            DeliveryStatus::Delivered => {
                let Some(delivered_at) = message.mark_delivered(Utc::now()) else {
                    return Ok(());
                };
                ServerEvent::MessageDelivered {
                    chat_id,
                    message_id,
                    user_id: acting_user,
                    delivered_at,
                }
            }
            DeliveryStatus::Seen => {
                let Some(seen_at) = message.mark_seen(acting_user, Utc::now()) else {
                    return Ok(());
                };
                ServerEvent::MessageSeen {
                    chat_id,
                    message_id,
                    user_id: acting_user,
                    seen_at,
                }
            }
            DeliveryStatus::Sent => return Ok(()),
        };

        // Persist first, then notify everyone in the chat, sender's
        // connections included.
        self.store.update_status(&message).await?;
        self.topics.broadcast(chat_id, &event, None).await;
        Ok(())
    }
}
