use async_trait::async_trait;
use reqwest::StatusCode;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::message::MessageEnvelope;

/// Answers whether an identity belongs to a conversation. Ownership of
/// the membership data lives in the chat service, not here.
#[async_trait]
pub trait ConversationDirectory: Send + Sync {
    async fn is_participant(&self, user_id: Uuid, chat_id: Uuid) -> AppResult<bool>;
}

/// Message persistence collaborator.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert_message(&self, message: &MessageEnvelope) -> AppResult<MessageEnvelope>;
    async fn fetch_message(&self, message_id: Uuid) -> AppResult<Option<MessageEnvelope>>;
    async fn update_status(&self, message: &MessageEnvelope) -> AppResult<()>;
}

/// HTTP client for the internal chat-service API. Implements both
/// collaborator traits against its REST surface.
pub struct ChatServiceClient {
    http: reqwest::Client,
    base_url: String,
}

impl ChatServiceClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl ConversationDirectory for ChatServiceClient {
    async fn is_participant(&self, user_id: Uuid, chat_id: Uuid) -> AppResult<bool> {
        let resp = self
            .http
            .get(self.url(&format!("/internal/chats/{chat_id}/members/{user_id}")))
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("chat service: {e}")))?;

        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(AppError::Storage(format!(
                "chat service returned {status} for membership check"
            ))),
        }
    }
}

#[async_trait]
impl MessageStore for ChatServiceClient {
    async fn insert_message(&self, message: &MessageEnvelope) -> AppResult<MessageEnvelope> {
        let resp = self
            .http
            .post(self.url("/internal/messages"))
            .json(message)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("chat service: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::Storage(format!(
                "chat service returned {} on insert",
                resp.status()
            )));
        }
        resp.json()
            .await
            .map_err(|e| AppError::Storage(format!("chat service body: {e}")))
    }

    async fn fetch_message(&self, message_id: Uuid) -> AppResult<Option<MessageEnvelope>> {
        let resp = self
            .http
            .get(self.url(&format!("/internal/messages/{message_id}")))
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("chat service: {e}")))?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => resp
                .json()
                .await
                .map(Some)
                .map_err(|e| AppError::Storage(format!("chat service body: {e}"))),
            status => Err(AppError::Storage(format!(
                "chat service returned {status} on fetch"
            ))),
        }
    }

    async fn update_status(&self, message: &MessageEnvelope) -> AppResult<()> {
        let resp = self
            .http
            .patch(self.url(&format!("/internal/messages/{}/status", message.id)))
            .json(&serde_json::json!({
                "status": message.status,
                "seen_by": message.seen_by,
                "delivered_at": message.delivered_at,
                "seen_at": message.seen_at,
            }))
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("chat service: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::Storage(format!(
                "chat service returned {} on status update",
                resp.status()
            )));
        }
        Ok(())
    }
}
