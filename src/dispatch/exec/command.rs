// command: run a local program with certificate context in the environment

use crate::dispatch::ActionContext;
use crate::error::EngineError;
use crate::model::{ArtifactForm, DispatchMode};
use crate::Result;
use std::path::Path;
use tokio::process::Command;

pub async fn run(
    ctx: &ActionContext<'_>,
    mode: DispatchMode,
    command: &str,
    working_dir: Option<&Path>,
) -> Result<String> {
    if mode == DispatchMode::Simulate {
        if let Some(dir) = working_dir {
            if !dir.is_dir() {
                return Err(EngineError::invalid(format!(
                    "Working directory {} does not exist",
                    dir.display()
                )));
            }
        }
        return Ok(format!("Would run: {}", command));
    }

    let cert = ctx.cert;
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .env("CERT_NAME", &cert.name)
        .env("CERT_FINGERPRINT", &cert.fingerprint)
        .env("CERT_COMMON_NAME", cert.common_name().unwrap_or(""))
        .env("CERT_VALID_TO", cert.valid_to.to_rfc3339());
    if let Some(path) = cert.paths.get(&ArtifactForm::Crt) {
        cmd.env("CERT_CRT_PATH", path);
    }
    if let Some(path) = cert.paths.get(&ArtifactForm::Key) {
        cmd.env("CERT_KEY_PATH", path);
    }
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    let output = cmd.output().await?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if output.status.success() {
        let summary = stdout.lines().last().unwrap_or("").trim().to_string();
        Ok(if summary.is_empty() {
            "Command succeeded".to_string()
        } else {
            format!("Command succeeded: {}", summary)
        })
    } else {
        Err(EngineError::AdapterRemote {
            adapter: "command".to_string(),
            details: format!(
                "Exited with {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ),
        })
    }
}
