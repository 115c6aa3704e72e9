// smb-copy: put an artifact on an SMB share

use crate::adapters::smb::{SmbClient, SmbTarget};
use crate::dispatch::ActionContext;
use crate::model::action::Secret;
use crate::model::{ArtifactForm, DispatchMode};
use crate::Result;
use std::path::Path;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    ctx: &ActionContext<'_>,
    mode: DispatchMode,
    host: &str,
    share: &str,
    username: &str,
    password: &Secret,
    source: ArtifactForm,
    remote_path: &Path,
) -> Result<String> {
    let target = SmbTarget {
        host: host.to_string(),
        share: share.to_string(),
        username: username.to_string(),
        password: password.reveal(ctx.cipher)?,
    };
    let client = SmbClient::new();

    if mode == DispatchMode::Simulate {
        ctx.artifact(source).await?;
        client.check(&target).await?;
        return Ok(format!(
            "Would upload {} to //{}/{}/{}",
            source,
            host,
            share,
            remote_path.display()
        ));
    }

    let bytes = ctx.artifact(source).await?;
    client.upload(&target, remote_path, &bytes).await?;
    Ok(format!(
        "Uploaded {} to //{}/{}/{}",
        source,
        host,
        share,
        remote_path.display()
    ))
}
