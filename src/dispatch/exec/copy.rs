// copy: place an artifact at a local filesystem path

use crate::dispatch::ActionContext;
use crate::error::EngineError;
use crate::model::{ArtifactForm, DispatchMode};
use crate::Result;
use std::path::Path;

pub async fn run(
    ctx: &ActionContext<'_>,
    mode: DispatchMode,
    source: ArtifactForm,
    destination: &Path,
    permissions: Option<u32>,
) -> Result<String> {
    if mode == DispatchMode::Simulate {
        // Prove the artifact is readable and the target directory writable
        ctx.artifact(source).await?;
        let parent = destination.parent().unwrap_or(Path::new("/"));
        if !parent.exists() {
            return Err(EngineError::invalid(format!(
                "Destination directory {} does not exist",
                parent.display()
            )));
        }
        return Ok(format!(
            "Would copy {} to {}",
            source,
            destination.display()
        ));
    }

    let bytes = ctx.artifact(source).await?;
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    crate::store::atomic_write(destination, &bytes)?;

    #[cfg(unix)]
    if let Some(mode_bits) = permissions {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(destination, std::fs::Permissions::from_mode(mode_bits))?;
    }
    #[cfg(not(unix))]
    let _ = permissions;

    Ok(format!(
        "Copied {} ({} bytes) to {}",
        source,
        bytes.len(),
        destination.display()
    ))
}
