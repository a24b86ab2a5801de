use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::AppResult;
use crate::middleware::auth::{CredentialVerifier, JwtVerifier};
use crate::services::call_service::CallService;
use crate::services::chat_client::{ChatServiceClient, ConversationDirectory, MessageStore};
use crate::services::delivery_service::DeliveryService;
use crate::services::encryption::{EncryptionService, MessageCipher};
use crate::services::message_service::MessageService;
use crate::services::presence::PresenceService;
use crate::websocket::{ConnectionRegistry, TopicRegistry};

/// Shared application state handed to every connection.
#[derive(Clone)]
pub struct AppState {
    pub registry: ConnectionRegistry,
    pub topics: TopicRegistry,
    pub presence: PresenceService,
    pub messages: Arc<MessageService>,
    pub delivery: Arc<DeliveryService>,
    pub calls: Arc<CallService>,
    pub verifier: Arc<dyn CredentialVerifier>,
}

impl AppState {
    pub fn new(config: &Config) -> AppResult<Self> {
        let chat_client = Arc::new(ChatServiceClient::new(config.chat_service_url.clone()));
        let store: Arc<dyn MessageStore> = chat_client.clone();
        let directory: Arc<dyn ConversationDirectory> = chat_client;
        let cipher: Arc<dyn MessageCipher> =
            Arc::new(EncryptionService::new(config.encryption_master_key));
        let verifier: Arc<dyn CredentialVerifier> =
            Arc::new(JwtVerifier::new(&config.jwt_public_key_pem)?);

        Ok(Self::assemble(
            store,
            directory,
            cipher,
            verifier,
            Duration::from_secs(config.call_ring_timeout_secs),
        ))
    }

    /// Wires the services around explicit collaborators. Tests use this
    /// directly with in-memory fakes.
    pub fn assemble(
        store: Arc<dyn MessageStore>,
        directory: Arc<dyn ConversationDirectory>,
        cipher: Arc<dyn MessageCipher>,
        verifier: Arc<dyn CredentialVerifier>,
        ring_timeout: Duration,
    ) -> Self {
        let registry = ConnectionRegistry::new();
        let topics = TopicRegistry::new();
        let presence = PresenceService::new(registry.clone());
        let messages = Arc::new(MessageService::new(
            store.clone(),
            directory.clone(),
            cipher,
            topics.clone(),
        ));
        let delivery = Arc::new(DeliveryService::new(store, directory, topics.clone()));
        let calls = Arc::new(CallService::new(registry.clone(), ring_timeout));

        Self {
            registry,
            topics,
            presence,
            messages,
            delivery,
            calls,
            verifier,
        }
    }
}
