// Docker adapter: container restarts and in-container file placement

use crate::error::EngineError;
use crate::Result;
use bollard::container::UploadToContainerOptions;
use bollard::Docker;

/// Outcome of a restart request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    Restarted,
    /// Container exists but is not running; nothing to do
    SkippedNotRunning,
}

pub fn connect() -> Result<Docker> {
    Docker::connect_with_local_defaults().map_err(|e| EngineError::AdapterUnreachable {
        adapter: "docker".to_string(),
        details: e.to_string(),
    })
}

/// Restart a container by id or name. Stopped containers are left alone so a
/// renewal does not resurrect something an operator shut down.
pub async fn restart_container(docker: &Docker, container: &str) -> Result<RestartOutcome> {
    let inspect = docker
        .inspect_container(container, None)
        .await
        .map_err(|e| classify(container, e))?;

    let running = inspect
        .state
        .as_ref()
        .and_then(|s| s.running)
        .unwrap_or(false);
    if !running {
        tracing::info!(container, "Container not running, skipping restart");
        return Ok(RestartOutcome::SkippedNotRunning);
    }

    docker
        .restart_container(container, None)
        .await
        .map_err(|e| classify(container, e))?;
    tracing::info!(container, "Restarted container");
    Ok(RestartOutcome::Restarted)
}

/// Whether the container exists; used by simulate mode
pub async fn container_exists(docker: &Docker, container: &str) -> Result<bool> {
    match docker.inspect_container(container, None).await {
        Ok(_) => Ok(true),
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        }) => Ok(false),
        Err(e) => Err(classify(container, e)),
    }
}

/// Write a file into a running container's filesystem via the archive API
pub async fn upload_file(
    docker: &Docker,
    container: &str,
    remote_path: &std::path::Path,
    bytes: &[u8],
) -> Result<()> {
    let dir = remote_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| EngineError::invalid("Container path must be absolute"))?;
    let file_name = remote_path
        .file_name()
        .ok_or_else(|| EngineError::invalid("Container path has no file name"))?;

    // The archive endpoint wants a tar stream unpacked at `path`
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o600);
    header.set_cksum();
    let mut archive = tar::Builder::new(Vec::new());
    archive
        .append_data(&mut header, file_name, bytes)
        .map_err(|e| EngineError::Internal(format!("tar build failed: {}", e)))?;
    let tarball = archive
        .into_inner()
        .map_err(|e| EngineError::Internal(format!("tar build failed: {}", e)))?;

    let options = UploadToContainerOptions {
        path: dir.to_string_lossy().into_owned(),
        ..Default::default()
    };
    docker
        .upload_to_container(container, Some(options), tarball.into())
        .await
        .map_err(|e| classify(container, e))?;

    tracing::debug!(container, path = %remote_path.display(), "Uploaded file into container");
    Ok(())
}

fn classify(container: &str, err: bollard::errors::Error) -> EngineError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => EngineError::AdapterRemote {
            adapter: "docker".to_string(),
            details: format!("Container '{}' does not exist", container),
        },
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => EngineError::AdapterRemote {
            adapter: "docker".to_string(),
            details: format!("HTTP {}: {}", status_code, message),
        },
        other => EngineError::AdapterUnreachable {
            adapter: "docker".to_string(),
            details: other.to_string(),
        },
    }
}
