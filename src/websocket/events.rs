use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::message::PublicMessage;

/// Per-chat join outcome reported back to the requesting connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinFailure {
    pub chat_id: Uuid,
    pub reason: String,
}

/// Everything the server pushes to clients. Serialized with a `type`
/// tag so clients can switch on one field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Authenticated {
        user_id: Uuid,
    },
    UserOnline {
        user_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    UserOffline {
        user_id: Uuid,
        last_seen_at: DateTime<Utc>,
    },
    ChatsJoined {
        joined: Vec<Uuid>,
        failed: Vec<JoinFailure>,
    },
    NewMessage {
        message: PublicMessage,
    },
    MessageSent {
        message: PublicMessage,
        timestamp: DateTime<Utc>,
    },
    MessageDelivered {
        chat_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
        delivered_at: DateTime<Utc>,
    },
    MessageSeen {
        chat_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
        seen_at: DateTime<Utc>,
    },
    Typing {
        chat_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    },
    StopTyping {
        chat_id: Uuid,
        user_id: Uuid,
    },
    CallInitiate {
        from_user_id: Uuid,
        call_type: String,
    },
    CallOffer {
        from_user_id: Uuid,
        offer: Value,
    },
    CallAnswer {
        from_user_id: Uuid,
        answer: Value,
    },
    CallIceCandidate {
        from_user_id: Uuid,
        candidate: Value,
    },
    CallAccept {
        from_user_id: Uuid,
    },
    CallReject {
        from_user_id: Uuid,
    },
    CallEnd {
        from_user_id: Uuid,
    },
    CallUnavailable {
        target_user_id: Uuid,
    },
    CallTimeout {
        peer_user_id: Uuid,
    },
    Error {
        error: String,
        message: String,
    },
    Ack {
        ack_id: u64,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl ServerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ServerEvent::Authenticated { .. } => "authenticated",
            ServerEvent::UserOnline { .. } => "user_online",
            ServerEvent::UserOffline { .. } => "user_offline",
            ServerEvent::ChatsJoined { .. } => "chats_joined",
            ServerEvent::NewMessage { .. } => "new_message",
            ServerEvent::MessageSent { .. } => "message_sent",
            ServerEvent::MessageDelivered { .. } => "message_delivered",
            ServerEvent::MessageSeen { .. } => "message_seen",
            ServerEvent::Typing { .. } => "typing",
            ServerEvent::StopTyping { .. } => "stop_typing",
            ServerEvent::CallInitiate { .. } => "call_initiate",
            ServerEvent::CallOffer { .. } => "call_offer",
            ServerEvent::CallAnswer { .. } => "call_answer",
            ServerEvent::CallIceCandidate { .. } => "call_ice_candidate",
            ServerEvent::CallAccept { .. } => "call_accept",
            ServerEvent::CallReject { .. } => "call_reject",
            ServerEvent::CallEnd { .. } => "call_end",
            ServerEvent::CallUnavailable { .. } => "call_unavailable",
            ServerEvent::CallTimeout { .. } => "call_timeout",
            ServerEvent::Error { .. } => "error",
            ServerEvent::Ack { .. } => "ack",
        }
    }

    pub fn error_from(err: &crate::error::AppError) -> Self {
        ServerEvent::Error {
            error: err.error_type().to_string(),
            message: err.to_string(),
        }
    }
}
