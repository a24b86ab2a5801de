use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::message::MessageType;

/// WebRTC session description as clients exchange it. Only shape is
/// validated here; the payload is relayed opaquely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: String,
    #[serde(default)]
    pub sdp: String,
}

fn default_is_typing() -> bool {
    true
}

/// One inbound frame: an optional client-chosen ack id plus the event.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientFrame {
    #[serde(default)]
    pub ack_id: Option<u64>,
    #[serde(flatten)]
    pub event: ClientEvent,
}

/// Everything clients may send. Tagged the same way as server events.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinChats {
        chat_ids: Vec<Uuid>,
    },
    SendMessage {
        chat_id: Uuid,
        #[serde(default)]
        message_type: MessageType,
        content: String,
        #[serde(default)]
        meta: Option<Value>,
    },
    Typing {
        chat_id: Uuid,
        #[serde(default = "default_is_typing")]
        is_typing: bool,
    },
    StopTyping {
        chat_id: Uuid,
    },
    MessageDelivered {
        chat_id: Uuid,
        message_id: Uuid,
    },
    MessageSeen {
        chat_id: Uuid,
        message_id: Uuid,
    },
    CallInitiate {
        target_user_id: Uuid,
        call_type: String,
    },
    CallOffer {
        target_user_id: Uuid,
        offer: SessionDescription,
    },
    CallAnswer {
        target_user_id: Uuid,
        answer: SessionDescription,
    },
    CallIceCandidate {
        target_user_id: Uuid,
        candidate: Value,
    },
    CallAccept {
        target_user_id: Uuid,
    },
    CallReject {
        target_user_id: Uuid,
    },
    CallEnd {
        target_user_id: Uuid,
    },
}
