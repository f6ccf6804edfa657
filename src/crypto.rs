//! Token encryption module using AES-256-GCM
//!
//! Encryption and decryption utilities for the access and refresh tokens
//! stored in the credentials table, using AES-256-GCM with additional
//! authenticated data (AAD) binding each ciphertext to its
//! (project, provider) slot.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::models::credential::Model as CredentialModel;
use crate::providers::Provider;

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("empty ciphertext")]
    EmptyCiphertext,
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingKey(Vec<u8>);

/// Type alias for crypto keys
pub type CryptoKey = ZeroizingKey;

impl CryptoKey {
    /// Create a new crypto key from bytes
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::EncryptionFailed(
                "Invalid key length: expected 32 bytes".to_string(),
            ));
        }
        Ok(ZeroizingKey(bytes))
    }

    /// Get the key as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Encrypt bytes using AES-256-GCM
pub fn encrypt_bytes(key: &CryptoKey, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    // Prepend version byte and nonce to ciphertext
    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

/// Decrypt bytes using AES-256-GCM
pub fn decrypt_bytes(key: &CryptoKey, aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() {
        return Err(CryptoError::EmptyCiphertext);
    }

    if ciphertext[0] != VERSION_ENCRYPTED || ciphertext.len() < MIN_ENCRYPTED_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let tag_and_ct = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];

    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: tag_and_ct,
                aad,
            },
        )
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// AAD binding a ciphertext to its credential slot. The slot identity is
/// (project, provider): a ciphertext copied onto another slot's row fails
/// authentication on decrypt.
fn credential_aad(project_id: i64, provider: &str) -> String {
    format!("{}|{}", project_id, provider)
}

/// Type alias for encrypted token result
type EncryptedTokens = Result<(Vec<u8>, Option<Vec<u8>>), CryptoError>;

/// Encrypt tokens for a credential slot
pub fn encrypt_credential_tokens(
    key: &CryptoKey,
    project_id: i64,
    provider: Provider,
    access_token: &str,
    refresh_token: Option<&str>,
) -> EncryptedTokens {
    let aad = credential_aad(project_id, provider.as_str());

    let encrypted_access_token = encrypt_bytes(key, aad.as_bytes(), access_token.as_bytes())?;

    let encrypted_refresh_token = refresh_token
        .map(|token| encrypt_bytes(key, aad.as_bytes(), token.as_bytes()))
        .transpose()?;

    Ok((encrypted_access_token, encrypted_refresh_token))
}

/// Type alias for decrypted token result
type DecryptedTokens = Result<(String, Option<String>), CryptoError>;

/// Decrypt tokens from a credential model
pub fn decrypt_credential_tokens(key: &CryptoKey, credential: &CredentialModel) -> DecryptedTokens {
    let aad = credential_aad(credential.project_id, &credential.provider);

    let access_token = decrypt_bytes(key, aad.as_bytes(), &credential.access_token_ciphertext)
        .and_then(|bytes| {
            String::from_utf8(bytes)
                .map_err(|e| CryptoError::DecryptionFailed(format!("Invalid UTF-8: {}", e)))
        })?;

    let refresh_token = credential
        .refresh_token_ciphertext
        .as_ref()
        .map(|token| {
            decrypt_bytes(key, aad.as_bytes(), token).and_then(|bytes| {
                String::from_utf8(bytes)
                    .map_err(|e| CryptoError::DecryptionFailed(format!("Invalid UTF-8: {}", e)))
            })
        })
        .transpose()?;

    Ok((access_token, refresh_token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn test_key() -> CryptoKey {
        CryptoKey::new(vec![0u8; 32]).expect("valid test key")
    }

    fn sample_credential(
        key: &CryptoKey,
        project_id: i64,
        provider: Provider,
        access: &str,
        refresh: Option<&str>,
    ) -> CredentialModel {
        let (access_ct, refresh_ct) =
            encrypt_credential_tokens(key, project_id, provider, access, refresh).unwrap();
        CredentialModel {
            id: Uuid::new_v4(),
            project_id,
            provider: provider.as_str().to_string(),
            access_token_ciphertext: access_ct,
            refresh_token_ciphertext: refresh_ct,
            expires_at: Utc::now().into(),
            account_email: None,
            scopes: None,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    #[test]
    fn test_key_length_enforced() {
        assert!(CryptoKey::new(vec![0u8; 32]).is_ok());
        assert!(CryptoKey::new(vec![0u8; 16]).is_err());
        assert!(CryptoKey::new(Vec::new()).is_err());
    }

    #[test]
    fn test_token_round_trip() {
        let key = test_key();
        let credential = sample_credential(
            &key,
            27,
            Provider::Gsc,
            "ya29.access",
            Some("1//refresh"),
        );

        let (access, refresh) = decrypt_credential_tokens(&key, &credential).unwrap();
        assert_eq!(access, "ya29.access");
        assert_eq!(refresh.as_deref(), Some("1//refresh"));
    }

    #[test]
    fn test_missing_refresh_token_round_trips_as_none() {
        let key = test_key();
        let credential = sample_credential(&key, 27, Provider::Ga4, "ya29.access", None);

        let (_, refresh) = decrypt_credential_tokens(&key, &credential).unwrap();
        assert!(refresh.is_none());
    }

    #[test]
    fn test_aad_binds_slot_identity() {
        let key = test_key();
        let mut credential =
            sample_credential(&key, 27, Provider::Gsc, "ya29.access", None);

        // Moving the ciphertext to another project's slot must fail
        credential.project_id = 28;
        assert!(matches!(
            decrypt_credential_tokens(&key, &credential),
            Err(CryptoError::DecryptionFailed(_))
        ));

        // Same for another provider under the same project
        credential.project_id = 27;
        credential.provider = Provider::Ga4.as_str().to_string();
        assert!(matches!(
            decrypt_credential_tokens(&key, &credential),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_nonce_uniqueness() {
        let key = test_key();
        let aad = b"27|gsc";
        let first = encrypt_bytes(&key, aad, b"token").unwrap();
        let second = encrypt_bytes(&key, aad, b"token").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_rejects_malformed_ciphertext() {
        let key = test_key();
        assert!(matches!(
            decrypt_bytes(&key, b"aad", &[]),
            Err(CryptoError::EmptyCiphertext)
        ));
        assert!(matches!(
            decrypt_bytes(&key, b"aad", b"plaintext-junk"),
            Err(CryptoError::InvalidFormat)
        ));
        assert!(matches!(
            decrypt_bytes(&key, b"aad", &[VERSION_ENCRYPTED, 1, 2, 3]),
            Err(CryptoError::InvalidFormat)
        ));
    }
}
