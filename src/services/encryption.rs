use aes_gcm::aead::OsRng;
use aes_gcm::{AeadCore, AeadInPlace, Aes256Gcm, Key, KeyInit, Nonce};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hkdf::Hkdf;
use sha2::Sha256;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::message::CipherBundle;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Encrypts message content at rest. Each chat gets its own derived key
/// so a leaked key exposes one conversation, not all of them.
#[async_trait]
pub trait MessageCipher: Send + Sync {
    async fn encrypt(&self, chat_id: Uuid, plaintext: &str) -> AppResult<CipherBundle>;
    async fn decrypt(&self, chat_id: Uuid, bundle: &CipherBundle) -> AppResult<String>;
}

/// AES-256-GCM with per-chat keys expanded from the master key via
/// HKDF-SHA256, the chat id as info.
pub struct EncryptionService {
    master_key: [u8; 32],
}

impl EncryptionService {
    pub fn new(master_key: [u8; 32]) -> Self {
        Self { master_key }
    }

    fn chat_key(&self, chat_id: Uuid) -> AppResult<[u8; 32]> {
        let hk = Hkdf::<Sha256>::new(None, &self.master_key);
        let mut key = [0u8; 32];
        hk.expand(chat_id.as_bytes(), &mut key)
            .map_err(|_| AppError::Encryption("key derivation failed".into()))?;
        Ok(key)
    }
}

#[async_trait]
impl MessageCipher for EncryptionService {
    async fn encrypt(&self, chat_id: Uuid, plaintext: &str) -> AppResult<CipherBundle> {
        let key = self.chat_key(chat_id)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let mut buf = plaintext.as_bytes().to_vec();
        let tag = cipher
            .encrypt_in_place_detached(&nonce, b"", &mut buf)
            .map_err(|_| AppError::Encryption("encrypt failed".into()))?;

        Ok(CipherBundle {
            content_encrypted: STANDARD.encode(&buf),
            iv: STANDARD.encode(nonce),
            auth_tag: STANDARD.encode(tag),
        })
    }

    async fn decrypt(&self, chat_id: Uuid, bundle: &CipherBundle) -> AppResult<String> {
        let key = self.chat_key(chat_id)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));

        let nonce_bytes = STANDARD
            .decode(&bundle.iv)
            .map_err(|_| AppError::Encryption("bad iv encoding".into()))?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(AppError::Encryption("bad iv length".into()));
        }
        let tag_bytes = STANDARD
            .decode(&bundle.auth_tag)
            .map_err(|_| AppError::Encryption("bad tag encoding".into()))?;
        if tag_bytes.len() != TAG_LEN {
            return Err(AppError::Encryption("bad tag length".into()));
        }
        let mut buf = STANDARD
            .decode(&bundle.content_encrypted)
            .map_err(|_| AppError::Encryption("bad ciphertext encoding".into()))?;

        cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(&nonce_bytes),
                b"",
                &mut buf,
                aes_gcm::Tag::from_slice(&tag_bytes),
            )
            .map_err(|_| AppError::Encryption("decrypt failed".into()))?;

        String::from_utf8(buf).map_err(|_| AppError::Encryption("plaintext not utf-8".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip() {
        let svc = EncryptionService::new([7u8; 32]);
        let chat = Uuid::new_v4();
        let bundle = svc.encrypt(chat, "secret payload").await.unwrap();
        assert_ne!(bundle.content_encrypted, STANDARD.encode(b"secret payload"));
        let plain = svc.decrypt(chat, &bundle).await.unwrap();
        assert_eq!(plain, "secret payload");
    }

    #[tokio::test]
    async fn keys_differ_per_chat() {
        let svc = EncryptionService::new([7u8; 32]);
        let bundle = svc.encrypt(Uuid::new_v4(), "hello").await.unwrap();
        let err = svc.decrypt(Uuid::new_v4(), &bundle).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn tampered_ciphertext_fails_auth() {
        let svc = EncryptionService::new([7u8; 32]);
        let chat = Uuid::new_v4();
        let mut bundle = svc.encrypt(chat, "hello").await.unwrap();
        bundle.auth_tag = STANDARD.encode([0u8; TAG_LEN]);
        assert!(svc.decrypt(chat, &bundle).await.is_err());
    }
}
