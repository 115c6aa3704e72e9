// docker-restart: bounce a container so it picks up replaced key material

use crate::adapters::docker;
use crate::dispatch::ActionContext;
use crate::error::EngineError;
use crate::model::DispatchMode;
use crate::Result;

pub async fn run(_ctx: &ActionContext<'_>, mode: DispatchMode, container: &str) -> Result<String> {
    let client = docker::connect()?;

    if mode == DispatchMode::Simulate {
        return if docker::container_exists(&client, container).await? {
            Ok(format!("Would restart container '{}'", container))
        } else {
            Err(EngineError::AdapterRemote {
                adapter: "docker".to_string(),
                details: format!("Container '{}' does not exist", container),
            })
        };
    }

    match docker::restart_container(&client, container).await? {
        docker::RestartOutcome::Restarted => Ok(format!("Restarted container '{}'", container)),
        docker::RestartOutcome::SkippedNotRunning => Ok(format!(
            "Container '{}' is not running, restart skipped",
            container
        )),
    }
}
