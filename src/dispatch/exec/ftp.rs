// ftp-copy: put an artifact on an FTP/FTPS server

use crate::adapters::ftp::{self, FtpTarget};
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
    port: u16,
    username: &str,
    password: &Secret,
    secure: bool,
    source: ArtifactForm,
    remote_path: &Path,
) -> Result<String> {
    let target = FtpTarget {
        host: host.to_string(),
        port,
        username: username.to_string(),
        password: password.reveal(ctx.cipher)?,
        secure,
    };
    let scheme = if secure { "ftps" } else { "ftp" };

    if mode == DispatchMode::Simulate {
        ctx.artifact(source).await?;
        ftp::check(target).await?;
        return Ok(format!(
            "Would upload {} to {}://{}{}",
            source,
            scheme,
            host,
            remote_path.display()
        ));
    }

    let bytes = ctx.artifact(source).await?;
    ftp::upload(target, remote_path.to_path_buf(), bytes).await?;
    Ok(format!(
        "Uploaded {} to {}://{}{}",
        source,
        scheme,
        host,
        remote_path.display()
    ))
}
