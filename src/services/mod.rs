pub mod call_service;
pub mod chat_client;
pub mod delivery_service;
pub mod encryption;
pub mod message_service;
pub mod presence;
