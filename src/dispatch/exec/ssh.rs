// ssh-copy: SFTP an artifact to a remote host, optionally run a command

use crate::adapters::ssh::{self, SshCredentials, SshTarget};
use crate::dispatch::ActionContext;
use crate::model::action::SshAuth;
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
    auth: &SshAuth,
    source: ArtifactForm,
    remote_path: &Path,
    post_command: Option<&str>,
) -> Result<String> {
    let credentials = match auth {
        SshAuth::Password { password } => SshCredentials::Password(password.reveal(ctx.cipher)?),
        SshAuth::Key {
            private_key,
            passphrase,
        } => SshCredentials::Key {
            private_key: private_key.reveal(ctx.cipher)?,
            passphrase: passphrase
                .as_ref()
                .map(|p| p.reveal(ctx.cipher))
                .transpose()?,
        },
    };
    let target = SshTarget {
        host: host.to_string(),
        port,
        username: username.to_string(),
        auth: credentials,
    };

    if mode == DispatchMode::Simulate {
        ctx.artifact(source).await?;
        ssh::check(target).await?;
        return Ok(format!(
            "Would upload {} to {}@{}:{}",
            source,
            username,
            host,
            remote_path.display()
        ));
    }

    let bytes = ctx.artifact(source).await?;
    let command_output = ssh::upload(
        target,
        remote_path.to_path_buf(),
        bytes,
        post_command.map(String::from),
    )
    .await?;

    let mut message = format!(
        "Uploaded {} to {}@{}:{}",
        source,
        username,
        host,
        remote_path.display()
    );
    if let Some(out) = command_output {
        message.push_str(&format!("; post command exited {}", out.exit_status));
    }
    Ok(message)
}
