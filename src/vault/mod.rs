// Passphrase Vault - encrypted store of per-certificate passphrases
//
// Keyed by certificate fingerprint. Plaintext never touches disk; entries are
// AES-256-GCM blobs under a master secret configured out-of-band. Renewals of
// auto-renew certificates read passphrases from here without human
// interaction.

pub mod cipher;

use crate::error::EngineError;
use crate::Result;
use chrono::{DateTime, Utc};
use cipher::VaultCipher;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// One encrypted vault entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPassphrase {
    pub ciphertext: String,
    pub algorithm: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct VaultFile {
    entries: HashMap<String, StoredPassphrase>,
}

/// Encrypted passphrase store. Reads are concurrent, writes exclusive.
pub struct PassphraseVault {
    path: PathBuf,
    cipher: Option<VaultCipher>,
    entries: RwLock<HashMap<String, StoredPassphrase>>,
}

impl PassphraseVault {
    /// Open the vault file, creating state lazily. A missing master secret
    /// leaves the vault sealed: `has` still works against the loaded entries
    /// but `put`/`get` fail with VaultSealed.
    pub fn open(path: impl Into<PathBuf>, cipher: Option<VaultCipher>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            let file: VaultFile = serde_json::from_str(&contents)
                .map_err(|e| EngineError::Internal(format!("Corrupt vault file: {}", e)))?;
            file.entries
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            cipher,
            entries: RwLock::new(entries),
        })
    }

    /// Whether the master secret is available
    pub fn is_sealed(&self) -> bool {
        self.cipher.is_none()
    }

    /// The cipher, for encrypting action secrets with the same master key
    pub fn cipher(&self) -> Option<&VaultCipher> {
        self.cipher.as_ref()
    }

    /// Store a passphrase for a certificate fingerprint
    pub async fn put(&self, fingerprint: &str, plaintext: &str) -> Result<()> {
        let cipher = self.cipher.as_ref().ok_or(EngineError::VaultSealed)?;
        let ciphertext = cipher.encrypt(plaintext.as_bytes())?;

        let mut entries = self.entries.write().await;
        entries.insert(
            fingerprint.to_string(),
            StoredPassphrase {
                ciphertext,
                algorithm: "aes-256-gcm".to_string(),
                created_at: Utc::now(),
            },
        );
        self.persist(&entries)?;

        tracing::debug!(fingerprint, "Stored passphrase in vault");
        Ok(())
    }

    /// Fetch and decrypt a passphrase
    pub async fn get(&self, fingerprint: &str) -> Result<String> {
        let cipher = self.cipher.as_ref().ok_or(EngineError::VaultSealed)?;

        let entries = self.entries.read().await;
        let entry = entries
            .get(fingerprint)
            .ok_or_else(|| EngineError::not_found(format!("Passphrase for {}", fingerprint)))?;

        let bytes = cipher.decrypt(&entry.ciphertext)?;
        String::from_utf8(bytes)
            .map_err(|_| EngineError::Internal("Stored passphrase is not valid UTF-8".into()))
    }

    /// Remove a stored passphrase; idempotent
    pub async fn delete(&self, fingerprint: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        if entries.remove(fingerprint).is_some() {
            self.persist(&entries)?;
            tracing::debug!(fingerprint, "Removed passphrase from vault");
        }
        Ok(())
    }

    /// Whether a passphrase is stored for the fingerprint
    pub async fn has(&self, fingerprint: &str) -> bool {
        self.entries.read().await.contains_key(fingerprint)
    }

    /// Re-key an entry after renewal changes the fingerprint
    pub async fn rekey(&self, old_fingerprint: &str, new_fingerprint: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.remove(old_fingerprint) {
            entries.insert(new_fingerprint.to_string(), entry);
            self.persist(&entries)?;
        }
        Ok(())
    }

    fn persist(&self, entries: &HashMap<String, StoredPassphrase>) -> Result<()> {
        let file = VaultFile {
            entries: entries.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        // Write-to-temp then rename, same as store artifacts
        let tmp = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Convenience for tests and embedding: open a vault relative to a storage root
pub fn open_default(storage_root: &Path) -> Result<PassphraseVault> {
    PassphraseVault::open(
        storage_root.join(crate::constants::VAULT_FILE),
        VaultCipher::from_env(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use cipher::KEY_SIZE;
    use tempfile::TempDir;

    fn open_vault(dir: &TempDir) -> PassphraseVault {
        PassphraseVault::open(
            dir.path().join("vault.json"),
            Some(VaultCipher::from_bytes([3u8; KEY_SIZE])),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let vault = open_vault(&dir);

        vault.put("fp1", "ca secret").await.unwrap();
        assert_eq!(vault.get("fp1").await.unwrap(), "ca secret");
        assert!(vault.has("fp1").await);
    }

    #[tokio::test]
    async fn test_delete_then_get_is_not_found() {
        let dir = TempDir::new().unwrap();
        let vault = open_vault(&dir);

        vault.put("fp1", "secret").await.unwrap();
        vault.delete("fp1").await.unwrap();
        // Idempotent
        vault.delete("fp1").await.unwrap();

        let err = vault.get("fp1").await.unwrap_err();
        assert_eq!(err.kind(), "NotFound");
        assert!(!vault.has("fp1").await);
    }

    #[tokio::test]
    async fn test_sealed_vault_rejects_put_and_get() {
        let dir = TempDir::new().unwrap();
        let vault = PassphraseVault::open(dir.path().join("vault.json"), None).unwrap();

        assert!(vault.is_sealed());
        assert_eq!(vault.put("fp1", "x").await.unwrap_err().kind(), "VaultSealed");
        assert_eq!(vault.get("fp1").await.unwrap_err().kind(), "VaultSealed");
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.json");
        let key = [3u8; KEY_SIZE];

        {
            let vault =
                PassphraseVault::open(&path, Some(VaultCipher::from_bytes(key))).unwrap();
            vault.put("fp1", "persisted").await.unwrap();
        }

        let vault = PassphraseVault::open(&path, Some(VaultCipher::from_bytes(key))).unwrap();
        assert_eq!(vault.get("fp1").await.unwrap(), "persisted");
    }

    #[tokio::test]
    async fn test_plaintext_never_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.json");
        let vault =
            PassphraseVault::open(&path, Some(VaultCipher::from_bytes([3u8; KEY_SIZE]))).unwrap();

        vault.put("fp1", "super-secret-passphrase").await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("super-secret-passphrase"));
        assert!(raw.contains("aes-256-gcm"));
    }

    #[tokio::test]
    async fn test_rekey_moves_entry() {
        let dir = TempDir::new().unwrap();
        let vault = open_vault(&dir);

        vault.put("old", "secret").await.unwrap();
        vault.rekey("old", "new").await.unwrap();

        assert!(!vault.has("old").await);
        assert_eq!(vault.get("new").await.unwrap(), "secret");
    }
}
