// AES-256-GCM cipher for vault entries and action secrets

use crate::error::EngineError;
use crate::Result;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Master key length in bytes (AES-256)
pub const KEY_SIZE: usize = 32;

/// 12-byte nonce for AES-GCM (96 bits is the standard)
pub const NONCE_SIZE: usize = 12;

/// Symmetric cipher over the process-wide master secret. The secret itself is
/// configured out-of-band (environment) and never written to disk.
pub struct VaultCipher {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl VaultCipher {
    /// Build from raw key bytes
    pub fn from_bytes(key: [u8; KEY_SIZE]) -> Self {
        Self {
            key: Zeroizing::new(key),
        }
    }

    /// Derive the key from an arbitrary-length secret string.
    /// A 64-char hex string is used verbatim; anything else is hashed.
    pub fn from_secret(secret: &str) -> Self {
        if secret.len() == KEY_SIZE * 2 {
            if let Ok(bytes) = hex::decode(secret) {
                let mut key = [0u8; KEY_SIZE];
                key.copy_from_slice(&bytes);
                return Self::from_bytes(key);
            }
        }

        let digest = Sha256::digest(secret.as_bytes());
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&digest);
        Self::from_bytes(key)
    }

    /// Read the master secret from the configured environment variable,
    /// returning None when the vault should stay sealed.
    pub fn from_env() -> Option<Self> {
        std::env::var(crate::constants::MASTER_KEY_ENV)
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| Self::from_secret(&s))
    }

    /// Encrypt plaintext into a base64 blob of nonce || ciphertext
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        let cipher = Aes256Gcm::new_from_slice(&*self.key)
            .map_err(|e| EngineError::Internal(format!("Invalid vault key: {}", e)))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| EngineError::Internal(format!("Encryption failed: {}", e)))?;

        let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(blob))
    }

    /// Decrypt a base64 blob produced by `encrypt`
    pub fn decrypt(&self, blob: &str) -> Result<Vec<u8>> {
        let bytes = BASE64
            .decode(blob)
            .map_err(|e| EngineError::Internal(format!("Invalid vault blob: {}", e)))?;

        if bytes.len() < NONCE_SIZE {
            return Err(EngineError::Internal(
                "Vault blob shorter than nonce".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_SIZE);
        let cipher = Aes256Gcm::new_from_slice(&*self.key)
            .map_err(|e| EngineError::Internal(format!("Invalid vault key: {}", e)))?;

        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| EngineError::Internal(format!("Decryption failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> VaultCipher {
        VaultCipher::from_bytes([7u8; KEY_SIZE])
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = test_cipher();
        let blob = cipher.encrypt(b"ca passphrase").unwrap();
        assert_ne!(blob.as_bytes(), b"ca passphrase");
        assert_eq!(cipher.decrypt(&blob).unwrap(), b"ca passphrase");
    }

    #[test]
    fn test_each_encryption_unique() {
        let cipher = test_cipher();
        let a = cipher.encrypt(b"same").unwrap();
        let b = cipher.encrypt(b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let blob = test_cipher().encrypt(b"secret").unwrap();
        let other = VaultCipher::from_bytes([9u8; KEY_SIZE]);
        assert!(other.decrypt(&blob).is_err());
    }

    #[test]
    fn test_tampered_blob_fails() {
        let cipher = test_cipher();
        let blob = cipher.encrypt(b"secret").unwrap();
        let mut bytes = BASE64.decode(&blob).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(cipher.decrypt(&BASE64.encode(bytes)).is_err());
    }

    #[test]
    fn test_key_derivation_from_passphrase() {
        let a = VaultCipher::from_secret("correct horse");
        let b = VaultCipher::from_secret("correct horse");
        let blob = a.encrypt(b"x").unwrap();
        assert_eq!(b.decrypt(&blob).unwrap(), b"x");
    }

    #[test]
    fn test_hex_secret_used_verbatim() {
        let hex_key = "aa".repeat(KEY_SIZE);
        let a = VaultCipher::from_secret(&hex_key);
        let b = VaultCipher::from_bytes([0xaa; KEY_SIZE]);
        let blob = a.encrypt(b"x").unwrap();
        assert_eq!(b.decrypt(&blob).unwrap(), b"x");
    }
}
