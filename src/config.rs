use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Base URL of the internal chat-service API (membership checks and
    /// message persistence).
    pub chat_service_url: String,
    /// PEM-encoded RS256 public key for connection credentials.
    pub jwt_public_key_pem: String,
    /// Seconds a call may ring before both parties are timed out.
    pub call_ring_timeout_secs: u64,
    pub encryption_master_key: [u8; 32],
}

impl Config {
    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();

        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);

        let chat_service_url = env::var("CHAT_SERVICE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:3001".into())
            .trim_end_matches('/')
            .to_string();

        let jwt_public_key_pem = match env::var("JWT_PUBLIC_KEY_PEM") {
            Ok(pem) => pem,
            Err(_) => {
                let path = env::var("JWT_PUBLIC_KEY_FILE").map_err(|_| {
                    crate::error::AppError::Config("JWT_PUBLIC_KEY_PEM missing".into())
                })?;
                std::fs::read_to_string(path).map_err(|e| {
                    crate::error::AppError::Config(format!("read jwt pubkey file: {e}"))
                })?
            }
        };

        let call_ring_timeout_secs = env::var("CALL_RING_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let master_key_b64 = env::var("MESSAGE_ENCRYPTION_MASTER_KEY").map_err(|_| {
            crate::error::AppError::Config("MESSAGE_ENCRYPTION_MASTER_KEY missing".into())
        })?;
        let master_key_bytes = STANDARD.decode(master_key_b64.trim()).map_err(|_| {
            crate::error::AppError::Config("MESSAGE_ENCRYPTION_MASTER_KEY invalid base64".into())
        })?;
        if master_key_bytes.len() != 32 {
            return Err(crate::error::AppError::Config(
                "MESSAGE_ENCRYPTION_MASTER_KEY must decode to 32 bytes".into(),
            ));
        }
        let mut encryption_master_key = [0u8; 32];
        encryption_master_key.copy_from_slice(&master_key_bytes);

        Ok(Self {
            port,
            chat_service_url,
            jwt_public_key_pem,
            call_ring_timeout_secs,
            encryption_master_key,
        })
    }

    pub fn test_defaults() -> Self {
        Self {
            port: 3000,
            chat_service_url: "http://127.0.0.1:3001".into(),
            jwt_public_key_pem: String::new(),
            call_ring_timeout_secs: 30,
            encryption_master_key: [0u8; 32],
        }
    }
}
