// nginx-proxy-manager: hand the renewed cert to an NPM instance

use crate::adapters::docker;
use crate::adapters::npm::NpmApiClient;
use crate::dispatch::ActionContext;
use crate::error::EngineError;
use crate::model::action::NpmMethod;
use crate::model::{ArtifactForm, DispatchMode};
use crate::Result;

pub async fn run(ctx: &ActionContext<'_>, mode: DispatchMode, npm: &NpmMethod) -> Result<String> {
    let cert_pem = ctx.artifact(ArtifactForm::Fullchain).await?;
    let key_pem = ctx.artifact(ArtifactForm::Key).await?;

    match npm {
        NpmMethod::Path {
            cert_path,
            key_path,
        } => {
            if mode == DispatchMode::Simulate {
                return Ok(format!(
                    "Would write cert to {} and key to {}",
                    cert_path.display(),
                    key_path.display()
                ));
            }
            crate::store::atomic_write(cert_path, &cert_pem)?;
            crate::store::atomic_write(key_path, &key_pem)?;
            Ok(format!(
                "Wrote cert and key to {} / {}",
                cert_path.display(),
                key_path.display()
            ))
        }

        NpmMethod::Docker {
            container,
            cert_path,
            key_path,
        } => {
            let client = docker::connect()?;
            if mode == DispatchMode::Simulate {
                return if docker::container_exists(&client, container).await? {
                    Ok(format!(
                        "Would place cert into container '{}' and restart it",
                        container
                    ))
                } else {
                    Err(EngineError::AdapterRemote {
                        adapter: "docker".to_string(),
                        details: format!("Container '{}' does not exist", container),
                    })
                };
            }
            docker::upload_file(&client, container, cert_path, &cert_pem).await?;
            docker::upload_file(&client, container, key_path, &key_pem).await?;
            docker::restart_container(&client, container).await?;
            Ok(format!(
                "Placed cert into container '{}' and restarted it",
                container
            ))
        }

        NpmMethod::Api {
            base_url,
            email,
            password,
            certificate_id,
        } => {
            let password = password.reveal(ctx.cipher)?;
            let client = NpmApiClient::new(ctx.http.clone(), base_url, email, &password);
            if mode == DispatchMode::Simulate {
                client.check(*certificate_id).await?;
                return Ok(format!(
                    "Would replace NPM certificate record {}",
                    certificate_id
                ));
            }
            client
                .upload_certificate(*certificate_id, &cert_pem, &key_pem)
                .await?;
            Ok(format!("Replaced NPM certificate record {}", certificate_id))
        }
    }
}
