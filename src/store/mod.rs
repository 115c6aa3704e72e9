// Certificate store - filesystem layout and artifact lifecycle
//
// One directory per certificate under the storage root:
//
//   {slug}-{store_id prefix}/
//     cert.crt       canonical certificate (PEM)
//     cert.key       canonical private key (PEM)
//     meta.json      engine metadata
//     cert.p12 ...   derived forms, present only if requested before
//     archive/vN/    archived prior versions
//     backups/{id}/  manual snapshots
//
// Artifact writes are write-to-temp then rename, so a crash never leaves a
// half-written cert.crt in place. Structural changes to a certificate are
// serialized through a per-certificate async lock.

pub mod backup;

use crate::constants;
use crate::error::EngineError;
use crate::model::certificate::VersionEntry;
use crate::model::{ArtifactForm, Certificate};
use crate::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

/// Store change notifications, published on every write, archive and delete
#[derive(Debug, Clone)]
pub enum StoreEvent {
    Updated { fingerprint: String },
    Removed { fingerprint: String },
    Archived { fingerprint: String, version: u32 },
}

pub struct CertificateStore {
    root: PathBuf,
    history_retention: usize,
    events: broadcast::Sender<StoreEvent>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CertificateStore {
    pub fn new(root: impl Into<PathBuf>, history_retention: usize) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let (events, _) = broadcast::channel(64);
        Ok(Self {
            root,
            history_retention,
            events,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Per-certificate lock keyed by store id. Renewal, SAN apply and delete
    /// all take this before touching the directory.
    pub async fn lock_for(&self, store_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(store_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Directory for a certificate. The slug is fixed at creation; renames
    /// only change metadata, never the directory.
    pub fn dir_for(&self, cert: &Certificate) -> PathBuf {
        self.root
            .join(format!("{}-{}", slug(&cert.name), id_prefix(&cert.store_id)))
    }

    /// Locate an existing certificate directory by store id suffix
    pub fn find_dir(&self, store_id: &str) -> Result<PathBuf> {
        let suffix = format!("-{}", id_prefix(store_id));
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if name.to_string_lossy().ends_with(&suffix) {
                return Ok(entry.path());
            }
        }
        Err(EngineError::not_found(format!(
            "Certificate directory for {}",
            store_id
        )))
    }

    /// Create the directory for a brand new certificate
    pub fn create_dir(&self, cert: &Certificate) -> Result<PathBuf> {
        let dir = self.dir_for(cert);
        if dir.exists() {
            return Err(EngineError::conflict(format!(
                "A certificate named '{}' already occupies {}",
                cert.name,
                dir.display()
            )));
        }
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Persist metadata, then notify index subscribers
    pub fn save_metadata(&self, cert: &Certificate) -> Result<()> {
        let dir = self.find_dir(&cert.store_id)?;
        self.save_metadata_in(cert, &dir)
    }

    pub fn save_metadata_in(&self, cert: &Certificate, dir: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(cert)?;
        atomic_write(&dir.join(constants::META_FILE), json.as_bytes())?;
        let _ = self.events.send(StoreEvent::Updated {
            fingerprint: cert.fingerprint.clone(),
        });
        Ok(())
    }

    /// Write one artifact into the certificate directory and record its path
    pub fn write_artifact(
        &self,
        cert: &mut Certificate,
        dir: &Path,
        form: ArtifactForm,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        let path = dir.join(form.file_name());
        atomic_write(&path, bytes).map_err(|e| EngineError::MaterializationFailed {
            message: format!("Writing {}: {}", path.display(), e),
        })?;
        cert.paths.insert(form, path.clone());
        Ok(path)
    }

    /// Read a materialized artifact
    pub fn read_artifact(&self, cert: &Certificate, form: ArtifactForm) -> Result<Vec<u8>> {
        let path = cert
            .paths
            .get(&form)
            .ok_or_else(|| EngineError::not_found(format!("Artifact form '{}'", form)))?;
        Ok(std::fs::read(path)?)
    }

    /// Scan the storage root and load every certificate. Directories whose
    /// cert.crt no longer parses are kept with a parse_error marker instead of
    /// aborting the scan.
    pub fn load_all(&self) -> Result<Vec<Certificate>> {
        let mut certs = Vec::new();

        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let dir = entry.path();
            let meta_path = dir.join(constants::META_FILE);
            if !meta_path.exists() {
                continue;
            }

            match self.load_one(&dir) {
                Ok(cert) => certs.push(cert),
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "Skipping unreadable certificate directory");
                }
            }
        }

        Ok(certs)
    }

    /// Reload one certificate from disk by store id
    pub fn reload(&self, store_id: &str) -> Result<Certificate> {
        let dir = self.find_dir(store_id)?;
        self.load_one(&dir)
    }

    fn load_one(&self, dir: &Path) -> Result<Certificate> {
        let meta_raw = std::fs::read_to_string(dir.join(constants::META_FILE))?;
        let mut cert: Certificate = serde_json::from_str(&meta_raw)
            .map_err(|e| EngineError::Internal(format!("Corrupt meta.json: {}", e)))?;
        self.refresh_from_disk(&mut cert, dir);
        Ok(cert)
    }

    /// Re-derive cryptographic fields from the stored PEM files. Metadata
    /// stays authoritative for everything the PEM cannot express.
    fn refresh_from_disk(&self, cert: &mut Certificate, dir: &Path) {
        let crt_path = dir.join(constants::CRT_FILE);
        cert.paths.insert(ArtifactForm::Crt, crt_path.clone());
        let key_path = dir.join(constants::KEY_FILE);
        if key_path.exists() {
            cert.paths.insert(ArtifactForm::Key, key_path.clone());
        }

        match std::fs::read(&crt_path)
            .map_err(EngineError::from)
            .and_then(|pem| crate::crypto::parse_cert(&pem))
        {
            Ok((x509, parsed)) => {
                cert.parse_error = None;
                cert.valid_from = parsed.not_before;
                cert.valid_to = parsed.not_after;
                cert.key_type = parsed.key_type;
                cert.key_size = parsed.key_size;
                cert.sig_alg = parsed.sig_alg;
                if cert.subject.is_empty() {
                    cert.subject = parsed.subject;
                }
                if let Ok(fp) = crate::crypto::compute_fingerprint(&x509) {
                    cert.fingerprint = fp;
                }
            }
            Err(e) => {
                cert.parse_error = Some(e.to_string());
                tracing::warn!(
                    name = %cert.name,
                    error = %e,
                    "Stored certificate failed to parse; excluded from renewal"
                );
            }
        }

        cert.needs_passphrase = std::fs::read(&key_path)
            .map(|pem| crate::crypto::key_needs_passphrase(&pem))
            .unwrap_or(false);
    }

    /// Move the current artifacts into archive/vN before a renewal replaces
    /// them. Returns the new version entry, already appended to the history.
    pub fn archive_current(&self, cert: &mut Certificate, dir: &Path) -> Result<VersionEntry> {
        let version = cert
            .version_history
            .last()
            .map(|v| v.version + 1)
            .unwrap_or(1);
        let archive_dir = dir.join(constants::ARCHIVE_DIR).join(format!("v{}", version));
        std::fs::create_dir_all(&archive_dir).map_err(|e| EngineError::ArchiveFailed {
            message: format!("Creating {}: {}", archive_dir.display(), e),
        })?;

        let mut archived_paths = Vec::new();
        for (form, path) in cert.paths.iter() {
            if !path.exists() {
                continue;
            }
            let target = archive_dir.join(form.file_name());
            std::fs::rename(path, &target).map_err(|e| EngineError::ArchiveFailed {
                message: format!("Archiving {}: {}", path.display(), e),
            })?;
            archived_paths.push(
                target
                    .strip_prefix(dir)
                    .unwrap_or(&target)
                    .to_path_buf(),
            );
        }

        let entry = VersionEntry {
            version,
            fingerprint: cert.fingerprint.clone(),
            valid_from: cert.valid_from,
            valid_to: cert.valid_to,
            archived_at: Utc::now(),
            archived_paths,
        };
        cert.version_history.push(entry.clone());
        self.prune_history(cert, dir)?;

        let _ = self.events.send(StoreEvent::Archived {
            fingerprint: cert.fingerprint.clone(),
            version,
        });
        tracing::info!(name = %cert.name, version, "Archived certificate version");
        Ok(entry)
    }

    /// Undo an archive_current after a failed renewal: move the files back
    /// and drop the version entry.
    pub fn restore_archive(&self, cert: &mut Certificate, dir: &Path, version: u32) -> Result<()> {
        let pos = cert
            .version_history
            .iter()
            .position(|v| v.version == version)
            .ok_or_else(|| EngineError::not_found(format!("Archived version {}", version)))?;
        let entry = cert.version_history.remove(pos);

        for rel in &entry.archived_paths {
            let from = dir.join(rel);
            let file_name = from
                .file_name()
                .ok_or_else(|| EngineError::Internal("Archived path has no file name".into()))?;
            let to = dir.join(file_name);
            std::fs::rename(&from, &to).map_err(|e| EngineError::ArchiveFailed {
                message: format!("Restoring {}: {}", from.display(), e),
            })?;
        }

        let archive_dir = dir.join(constants::ARCHIVE_DIR).join(format!("v{}", version));
        let _ = std::fs::remove_dir(&archive_dir);

        tracing::warn!(name = %cert.name, version, "Restored archived version after failed renewal");
        Ok(())
    }

    /// Read one archived artifact
    pub fn read_archived(
        &self,
        cert: &Certificate,
        version: u32,
        form: ArtifactForm,
    ) -> Result<Vec<u8>> {
        let dir = self.find_dir(&cert.store_id)?;
        let entry = cert
            .version_history
            .iter()
            .find(|v| v.version == version)
            .ok_or_else(|| EngineError::not_found(format!("Archived version {}", version)))?;

        let wanted = form.file_name();
        let rel = entry
            .archived_paths
            .iter()
            .find(|p| p.file_name().map(|n| n.to_string_lossy() == wanted).unwrap_or(false))
            .ok_or_else(|| {
                EngineError::not_found(format!("Form '{}' in archived version {}", form, version))
            })?;
        Ok(std::fs::read(dir.join(rel))?)
    }

    fn prune_history(&self, cert: &mut Certificate, dir: &Path) -> Result<()> {
        while cert.version_history.len() > self.history_retention {
            let dropped = cert.version_history.remove(0);
            let old_dir = dir
                .join(constants::ARCHIVE_DIR)
                .join(format!("v{}", dropped.version));
            if old_dir.exists() {
                std::fs::remove_dir_all(&old_dir)?;
            }
            tracing::debug!(name = %cert.name, version = dropped.version, "Pruned archived version");
        }
        Ok(())
    }

    /// Delete a certificate and its entire directory
    pub fn delete(&self, cert: &Certificate) -> Result<()> {
        let dir = self.find_dir(&cert.store_id)?;
        std::fs::remove_dir_all(&dir)?;
        let _ = self.events.send(StoreEvent::Removed {
            fingerprint: cert.fingerprint.clone(),
        });
        tracing::info!(name = %cert.name, "Deleted certificate");
        Ok(())
    }
}

/// Write-to-temp then rename within the same directory
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension(format!(
        "{}.tmp",
        path.extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default()
    ));
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Directory-safe slug of a certificate name
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        "cert".to_string()
    } else {
        trimmed.to_string()
    }
}

fn id_prefix(store_id: &str) -> &str {
    &store_id[..store_id.len().min(8)]
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::crypto;
    use crate::model::certificate::{CertType, KeyType, RenewalPolicy, SanEntry};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    pub(crate) fn issue_and_place(store: &CertificateStore, name: &str) -> Certificate {
        let key = crypto::generate_key(KeyType::Rsa, 2048).unwrap();
        let params = crypto::IssueParams {
            subject: vec![SanEntry::domain(format!("{}.example.com", name))],
            validity_days: 90,
            is_ca: false,
        };
        let x509 = crypto::create_self_signed(&params, &key).unwrap();
        let parsed = crypto::describe(&x509).unwrap();

        let mut cert = Certificate {
            fingerprint: crypto::compute_fingerprint(&x509).unwrap(),
            store_id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: String::new(),
            group: String::new(),
            cert_type: CertType::Standard,
            subject: parsed.subject,
            idle_subject: vec![],
            valid_from: parsed.not_before,
            valid_to: parsed.not_after,
            key_type: parsed.key_type,
            key_size: parsed.key_size,
            sig_alg: parsed.sig_alg,
            signer_fingerprint: None,
            policy: RenewalPolicy::default(),
            deployment_actions: vec![],
            paths: BTreeMap::new(),
            needs_passphrase: false,
            has_stored_passphrase: false,
            version_history: vec![],
            last_renewal: None,
            parse_error: None,
        };

        let dir = store.create_dir(&cert).unwrap();
        store
            .write_artifact(&mut cert, &dir, ArtifactForm::Crt, &x509.to_pem().unwrap())
            .unwrap();
        store
            .write_artifact(
                &mut cert,
                &dir,
                ArtifactForm::Key,
                &crypto::key_to_pem(&key, None).unwrap(),
            )
            .unwrap();
        store.save_metadata_in(&cert, &dir).unwrap();
        cert
    }

    #[tokio::test]
    async fn test_create_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = CertificateStore::new(tmp.path(), 10).unwrap();
        let cert = issue_and_place(&store, "web frontend");

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].fingerprint, cert.fingerprint);
        assert_eq!(loaded[0].name, "web frontend");
        assert!(loaded[0].parse_error.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let tmp = TempDir::new().unwrap();
        let store = CertificateStore::new(tmp.path(), 10).unwrap();
        let first = issue_and_place(&store, "dup");

        let mut second = first.clone();
        second.store_id = first.store_id.clone();
        let err = store.create_dir(&second).unwrap_err();
        assert_eq!(err.kind(), "Conflict");
    }

    #[tokio::test]
    async fn test_archive_and_restore() {
        let tmp = TempDir::new().unwrap();
        let store = CertificateStore::new(tmp.path(), 10).unwrap();
        let mut cert = issue_and_place(&store, "arch");
        let dir = store.find_dir(&cert.store_id).unwrap();
        let crt_before = std::fs::read(dir.join(constants::CRT_FILE)).unwrap();

        let entry = store.archive_current(&mut cert, &dir).unwrap();
        assert_eq!(entry.version, 1);
        assert!(!dir.join(constants::CRT_FILE).exists());
        assert!(dir.join("archive/v1").join(constants::CRT_FILE).exists());

        store.restore_archive(&mut cert, &dir, 1).unwrap();
        assert!(cert.version_history.is_empty());
        assert_eq!(std::fs::read(dir.join(constants::CRT_FILE)).unwrap(), crt_before);
    }

    #[tokio::test]
    async fn test_history_pruned_to_retention() {
        let tmp = TempDir::new().unwrap();
        let store = CertificateStore::new(tmp.path(), 2).unwrap();
        let mut cert = issue_and_place(&store, "prune");
        let dir = store.find_dir(&cert.store_id).unwrap();

        for _ in 0..4 {
            store.archive_current(&mut cert, &dir).unwrap();
            // Re-materialize a current version so the next archive has files
            store
                .write_artifact(&mut cert, &dir, ArtifactForm::Crt, b"-----BEGIN CERTIFICATE-----\n")
                .unwrap();
        }

        assert_eq!(cert.version_history.len(), 2);
        assert_eq!(cert.version_history[0].version, 3);
        assert!(!dir.join("archive/v1").exists());
        assert!(dir.join("archive/v4").exists());
    }

    #[tokio::test]
    async fn test_corrupt_crt_flagged_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let store = CertificateStore::new(tmp.path(), 10).unwrap();
        let cert = issue_and_place(&store, "broken");
        let dir = store.find_dir(&cert.store_id).unwrap();
        std::fs::write(dir.join(constants::CRT_FILE), b"garbage").unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].parse_error.is_some());
    }

    #[tokio::test]
    async fn test_delete_emits_event() {
        let tmp = TempDir::new().unwrap();
        let store = CertificateStore::new(tmp.path(), 10).unwrap();
        let mut rx = store.subscribe();
        let cert = issue_and_place(&store, "gone");

        store.delete(&cert).unwrap();
        assert!(store.load_all().unwrap().is_empty());

        let mut saw_removed = false;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev, StoreEvent::Removed { ref fingerprint } if *fingerprint == cert.fingerprint)
            {
                saw_removed = true;
            }
        }
        assert!(saw_removed);
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("Web Frontend (prod)"), "web-frontend-prod");
        assert_eq!(slug("***"), "cert");
    }
}
