// Manual backup snapshots of a certificate's current artifacts

use super::CertificateStore;
use crate::constants;
use crate::error::EngineError;
use crate::model::Certificate;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One snapshot under backups/{id}/
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupInfo {
    /// Timestamped identifier, e.g. 20260829-153000
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub files: Vec<String>,
}

impl CertificateStore {
    /// Snapshot every current artifact into backups/{id}/
    pub fn create_backup(&self, cert: &Certificate) -> Result<BackupInfo> {
        let dir = self.find_dir(&cert.store_id)?;
        let now = Utc::now();
        let id = now.format("%Y%m%d-%H%M%S").to_string();
        let backup_dir = dir.join(constants::BACKUP_DIR).join(&id);
        if backup_dir.exists() {
            return Err(EngineError::conflict(format!(
                "Backup {} already exists",
                id
            )));
        }
        std::fs::create_dir_all(&backup_dir)?;

        let mut files = Vec::new();
        for (form, path) in cert.paths.iter() {
            if !path.exists() {
                continue;
            }
            let name = form.file_name();
            std::fs::copy(path, backup_dir.join(&name))?;
            files.push(name);
        }

        tracing::info!(name = %cert.name, backup = %id, "Created backup snapshot");
        Ok(BackupInfo {
            id,
            created_at: now,
            files,
        })
    }

    /// List snapshots, newest first
    pub fn list_backups(&self, cert: &Certificate) -> Result<Vec<BackupInfo>> {
        let backups_dir = self.find_dir(&cert.store_id)?.join(constants::BACKUP_DIR);
        if !backups_dir.exists() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        for entry in std::fs::read_dir(&backups_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().into_owned();
            let created_at = DateTime::from(entry.metadata()?.modified()?);

            let mut files = Vec::new();
            for file in std::fs::read_dir(entry.path())? {
                files.push(file?.file_name().to_string_lossy().into_owned());
            }
            files.sort();
            backups.push(BackupInfo {
                id,
                created_at,
                files,
            });
        }

        backups.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(backups)
    }

    /// Overwrite the current artifacts from a snapshot. Callers are expected
    /// to hold the per-certificate lock and re-index afterwards.
    pub fn restore_backup(&self, cert: &Certificate, backup_id: &str) -> Result<()> {
        let dir = self.find_dir(&cert.store_id)?;
        let backup_dir = dir.join(constants::BACKUP_DIR).join(backup_id);
        if !backup_dir.exists() {
            return Err(EngineError::not_found(format!("Backup {}", backup_id)));
        }

        for entry in std::fs::read_dir(&backup_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let bytes = std::fs::read(entry.path())?;
            super::atomic_write(&dir.join(&name), &bytes)?;
        }

        let _ = self.events.send(super::StoreEvent::Updated {
            fingerprint: cert.fingerprint.clone(),
        });
        tracing::info!(name = %cert.name, backup = %backup_id, "Restored backup snapshot");
        Ok(())
    }

    /// Remove a snapshot; missing snapshots are a NotFound
    pub fn delete_backup(&self, cert: &Certificate, backup_id: &str) -> Result<()> {
        let backup_dir = self
            .find_dir(&cert.store_id)?
            .join(constants::BACKUP_DIR)
            .join(backup_id);
        if !backup_dir.exists() {
            return Err(EngineError::not_found(format!("Backup {}", backup_id)));
        }
        std::fs::remove_dir_all(&backup_dir)?;
        Ok(())
    }
}
