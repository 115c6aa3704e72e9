// SMB adapter for smb-copy deployments
//
// Wraps the smbclient binary the way other transports wrap a library: there
// is no maintained pure-Rust SMB client, and smbclient is ubiquitous where
// SMB shares are. Credentials are passed as a single argv element, never
// through a shell.

use crate::error::EngineError;
use crate::Result;
use std::path::{Path, PathBuf};
use tokio::process::Command;

#[derive(Clone)]
pub struct SmbTarget {
    pub host: String,
    pub share: String,
    pub username: String,
    pub password: String,
}

pub struct SmbClient {
    binary: String,
}

impl Default for SmbClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SmbClient {
    pub fn new() -> Self {
        Self {
            binary: "smbclient".to_string(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Upload bytes to `remote_path` on the share
    pub async fn upload(
        &self,
        target: &SmbTarget,
        remote_path: &Path,
        bytes: &[u8],
    ) -> Result<()> {
        // smbclient's put reads from a local file
        let staging = staging_path();
        tokio::fs::write(&staging, bytes).await?;

        let put = format!(
            "put {} {}",
            staging.display(),
            remote_path.to_string_lossy().replace('/', "\\")
        );
        let result = self.run(target, &put).await;
        let _ = tokio::fs::remove_file(&staging).await;
        result?;

        tracing::debug!(host = %target.host, share = %target.share, path = %remote_path.display(), "Uploaded via SMB");
        Ok(())
    }

    /// List the share root to prove connectivity and credentials
    pub async fn check(&self, target: &SmbTarget) -> Result<()> {
        self.run(target, "ls").await
    }

    async fn run(&self, target: &SmbTarget, command: &str) -> Result<()> {
        let service = format!("//{}/{}", target.host, target.share);
        let credentials = format!("{}%{}", target.username, target.password);

        let output = Command::new(&self.binary)
            .arg(&service)
            .arg("-U")
            .arg(&credentials)
            .arg("-c")
            .arg(command)
            .output()
            .await
            .map_err(|e| EngineError::AdapterUnreachable {
                adapter: "smb".to_string(),
                details: format!("Launching {}: {}", self.binary, e),
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let details = format!("{}: {} {}", service, stdout.trim(), stderr.trim());

        if stdout.contains("NT_STATUS_LOGON_FAILURE")
            || stderr.contains("NT_STATUS_LOGON_FAILURE")
            || stdout.contains("NT_STATUS_ACCESS_DENIED")
            || stderr.contains("NT_STATUS_ACCESS_DENIED")
        {
            Err(EngineError::AdapterAuth {
                adapter: "smb".to_string(),
                details,
            })
        } else if stdout.contains("NT_STATUS_UNSUCCESSFUL")
            || stderr.contains("Connection")
            || stderr.contains("NT_STATUS_HOST_UNREACHABLE")
            || stderr.contains("NT_STATUS_IO_TIMEOUT")
        {
            Err(EngineError::AdapterUnreachable {
                adapter: "smb".to_string(),
                details,
            })
        } else {
            Err(EngineError::AdapterRemote {
                adapter: "smb".to_string(),
                details,
            })
        }
    }
}

fn staging_path() -> PathBuf {
    std::env::temp_dir().join(format!("certmill-smb-{}.tmp", uuid::Uuid::new_v4()))
}
