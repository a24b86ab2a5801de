use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery status of a message. Transitions are monotonic: a message
/// never moves backwards, and `Seen` implies `Delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Seen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Video,
    Audio,
    File,
}

impl Default for MessageType {
    fn default() -> Self {
        Self::Text
    }
}

/// Ciphertext plus the metadata needed to decrypt it (AES-256-GCM).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CipherBundle {
    pub content_encrypted: String,
    pub iv: String,
    pub auth_tag: String,
}

/// A message as held by the storage collaborator. The ciphertext bundle
/// never leaves the server; the wire form is [`PublicMessage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub message_type: MessageType,
    /// Plaintext content; present on the freshly-sent path, broadcast
    /// verbatim. Stored encrypted via `cipher`.
    pub content: String,
    pub cipher: CipherBundle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    pub status: DeliveryStatus,
    pub seen_by: Vec<Uuid>,
    pub sent_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub seen_at: Option<DateTime<Utc>>,
}

impl MessageEnvelope {
    /// Wire projection: everything the clients see, ciphertext fields
    /// stripped.
    pub fn to_public(&self) -> PublicMessage {
        PublicMessage {
            id: self.id,
            chat_id: self.chat_id,
            sender_id: self.sender_id,
            message_type: self.message_type,
            content: self.content.clone(),
            meta: self.meta.clone(),
            status: self.status,
            seen_by: self.seen_by.clone(),
            sent_at: self.sent_at,
            delivered_at: self.delivered_at,
            seen_at: self.seen_at,
        }
    }

    /// Advance to `Delivered` if the message is still only `Sent`.
    /// Returns the delivery timestamp when something changed.
    pub fn mark_delivered(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.status == DeliveryStatus::Sent {
            self.status = DeliveryStatus::Delivered;
            self.delivered_at = Some(now);
            Some(now)
        } else {
            None
        }
    }

    /// Advance to `Seen` and record the acting identity. Returns the
    /// seen timestamp when either the status moved or the identity was
    /// newly added to the seen-by set.
    pub fn mark_seen(&mut self, user_id: Uuid, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut changed = false;

        if self.status != DeliveryStatus::Seen {
            self.status = DeliveryStatus::Seen;
            self.seen_at = Some(now);
            // Seen implies delivered.
            if self.delivered_at.is_none() {
                self.delivered_at = Some(now);
            }
            changed = true;
        }

        if !self.seen_by.contains(&user_id) {
            self.seen_by.push(user_id);
            changed = true;
        }

        if changed {
            self.seen_at
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub message_type: MessageType,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    pub status: DeliveryStatus,
    pub seen_by: Vec<Uuid>,
    pub sent_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub seen_at: Option<DateTime<Utc>>,
}
