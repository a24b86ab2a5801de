#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use realtime_service::config::Config;
use realtime_service::error::{AppError, AppResult};
use realtime_service::middleware::auth::CredentialVerifier;
use realtime_service::models::message::MessageEnvelope;
use realtime_service::services::chat_client::{ConversationDirectory, MessageStore};
use realtime_service::services::encryption::{EncryptionService, MessageCipher};
use realtime_service::state::AppState;
use realtime_service::websocket::events::ServerEvent;
use realtime_service::websocket::ConnectionHandle;

/// In-memory message store.
#[derive(Default)]
pub struct MemoryStore {
    messages: Mutex<HashMap<Uuid, MessageEnvelope>>,
}

impl MemoryStore {
    pub fn get(&self, id: Uuid) -> Option<MessageEnvelope> {
        self.messages.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert_message(&self, message: &MessageEnvelope) -> AppResult<MessageEnvelope> {
        self.messages
            .lock()
            .unwrap()
            .insert(message.id, message.clone());
        Ok(message.clone())
    }

    async fn fetch_message(&self, message_id: Uuid) -> AppResult<Option<MessageEnvelope>> {
        Ok(self.messages.lock().unwrap().get(&message_id).cloned())
    }

    async fn update_status(&self, message: &MessageEnvelope) -> AppResult<()> {
        self.messages
            .lock()
            .unwrap()
            .insert(message.id, message.clone());
        Ok(())
    }
}

/// In-memory membership table.
#[derive(Default)]
pub struct MemoryDirectory {
    members: Mutex<HashSet<(Uuid, Uuid)>>,
}

impl MemoryDirectory {
    pub fn allow(&self, user_id: Uuid, chat_id: Uuid) {
        self.members.lock().unwrap().insert((user_id, chat_id));
    }
}

#[async_trait]
impl ConversationDirectory for MemoryDirectory {
    async fn is_participant(&self, user_id: Uuid, chat_id: Uuid) -> AppResult<bool> {
        Ok(self.members.lock().unwrap().contains(&(user_id, chat_id)))
    }
}

/// Token-to-identity map standing in for JWT verification.
#[derive(Default)]
pub struct StaticVerifier {
    tokens: Mutex<HashMap<String, Uuid>>,
}

impl StaticVerifier {
    pub fn accept(&self, token: &str, user_id: Uuid) {
        self.tokens.lock().unwrap().insert(token.to_string(), user_id);
    }
}

#[async_trait]
impl CredentialVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> AppResult<Uuid> {
        self.tokens
            .lock()
            .unwrap()
            .get(token)
            .copied()
            .ok_or(AppError::Unauthorized)
    }
}

pub struct TestHarness {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub directory: Arc<MemoryDirectory>,
}

pub fn harness() -> TestHarness {
    let config = Config::test_defaults();
    harness_with_timeout(Duration::from_secs(config.call_ring_timeout_secs))
}

pub fn harness_with_timeout(ring_timeout: Duration) -> TestHarness {
    let store = Arc::new(MemoryStore::default());
    let directory = Arc::new(MemoryDirectory::default());
    let cipher: Arc<dyn MessageCipher> = Arc::new(EncryptionService::new([9u8; 32]));
    let verifier = Arc::new(StaticVerifier::default());

    let state = AppState::assemble(
        store.clone(),
        directory.clone(),
        cipher,
        verifier,
        ring_timeout,
    );

    TestHarness {
        state,
        store,
        directory,
    }
}

/// Registers a fresh connection for the user and returns its handle and
/// the receiver its events land on.
pub async fn connect(
    state: &AppState,
    user_id: Uuid,
) -> (ConnectionHandle, UnboundedReceiver<ServerEvent>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let handle = ConnectionHandle::new(user_id, tx);
    state.registry.register(&handle).await;
    (handle, rx)
}

/// Drains everything currently queued on a connection.
pub fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(evt) = rx.try_recv() {
        events.push(evt);
    }
    events
}
