// Deployment dispatch
//
// After a renewal (or on demand) the dispatcher runs a certificate's
// deployment actions in their declared order. Failures are isolated: a
// failing action is recorded and the run continues, except for actions that
// opted into `requires_previous`. Simulate mode goes through the same code
// path but executors only probe their targets and never mutate anything.

pub mod exec;

use crate::adapters;
use crate::constants;
use crate::error::EngineError;
use crate::index::MetadataIndex;
use crate::model::action::{ActionConfig, ActionResult, ActionStatus, DeployAction};
use crate::model::{ArtifactForm, Certificate, DispatchMode, DispatchReport};
use crate::store::CertificateStore;
use crate::vault::cipher::VaultCipher;
use crate::vault::PassphraseVault;
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Everything an executor may need about the certificate being deployed
pub struct ActionContext<'a> {
    pub cert: &'a Certificate,
    pub store: &'a CertificateStore,
    pub index: &'a MetadataIndex,
    pub http: &'a reqwest::Client,
    pub cipher: Option<&'a VaultCipher>,
}

impl ActionContext<'_> {
    /// Bytes of an artifact form. Materialized files are read as-is; chain,
    /// fullchain, pem, der and cer are derived in memory when absent.
    pub async fn artifact(&self, form: ArtifactForm) -> Result<Vec<u8>> {
        if self.cert.paths.contains_key(&form) {
            return self.store.read_artifact(self.cert, form);
        }
        if form.needs_password() {
            return Err(EngineError::invalid(format!(
                "Form '{}' must be materialized (with an export password) before deployment",
                form
            )));
        }

        let crt_pem = self.store.read_artifact(self.cert, ArtifactForm::Crt)?;
        let (x509, _) = crate::crypto::parse_cert(&crt_pem)?;

        let mut chain = Vec::new();
        for signer in self.index.path_to_root(&self.cert.fingerprint).await? {
            let pem = self.store.read_artifact(&signer, ArtifactForm::Crt)?;
            let (signer_x509, _) = crate::crypto::parse_cert(&pem)?;
            chain.push(signer_x509);
        }

        let input = crate::crypto::ConvertInput {
            cert: &x509,
            key: None,
            chain: &chain,
            password: None,
            friendly_name: &self.cert.name,
        };
        crate::crypto::convert(&input, form)
    }

    /// Expand {{placeholders}} from certificate metadata
    pub fn expand(&self, template: &str) -> String {
        expand_template(template, self.cert)
    }
}

/// Expand the template variables documented for email bodies, webhook raw
/// payloads and api-call bodies.
pub fn expand_template(template: &str, cert: &Certificate) -> String {
    let now = Utc::now();
    template
        .replace("{{name}}", &cert.name)
        .replace("{{fingerprint}}", &cert.fingerprint)
        .replace("{{common_name}}", cert.common_name().unwrap_or(""))
        .replace("{{valid_from}}", &cert.valid_from.to_rfc3339())
        .replace("{{valid_to}}", &cert.valid_to.to_rfc3339())
        .replace(
            "{{days_remaining}}",
            &cert.days_remaining(now).to_string(),
        )
        .replace("{{now}}", &now.to_rfc3339())
}

pub struct Dispatcher {
    store: Arc<CertificateStore>,
    index: Arc<MetadataIndex>,
    vault: Arc<PassphraseVault>,
    http: reqwest::Client,
    limit: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<CertificateStore>,
        index: Arc<MetadataIndex>,
        vault: Arc<PassphraseVault>,
        max_concurrent: usize,
    ) -> Result<Self> {
        Ok(Self {
            store,
            index,
            vault,
            http: adapters::http::build_client()?,
            limit: Arc::new(Semaphore::new(max_concurrent.max(1))),
        })
    }

    /// Run every action of a certificate in declared order
    pub async fn run(&self, fingerprint: &str, mode: DispatchMode) -> Result<DispatchReport> {
        let cert = self.index.get(fingerprint).await?;
        let _permit = self
            .limit
            .acquire()
            .await
            .map_err(|_| EngineError::Cancelled)?;

        let started_at = Utc::now();
        let mut results = Vec::with_capacity(cert.deployment_actions.len());
        let mut any_failed = false;

        for action in &cert.deployment_actions {
            if action.requires_previous && any_failed {
                tracing::info!(
                    cert = %cert.name,
                    action = %action.name,
                    "Skipping action, a previous action failed"
                );
                results.push(ActionResult {
                    action_id: action.id.clone(),
                    name: action.name.clone(),
                    kind: action.config.kind().to_string(),
                    status: ActionStatus::Skipped,
                    message: "Skipped: a previous action failed".to_string(),
                    duration_ms: 0,
                    error_kind: None,
                });
                continue;
            }

            let result = self.run_action(&cert, action, mode).await;
            if result.status == ActionStatus::Failure {
                any_failed = true;
            }
            results.push(result);
        }

        let report = DispatchReport {
            fingerprint: cert.fingerprint.clone(),
            mode,
            success: DispatchReport::overall_success(&results),
            started_at,
            results,
        };
        tracing::info!(
            cert = %cert.name,
            mode = ?mode,
            success = report.success,
            actions = report.results.len(),
            "Dispatch finished"
        );
        Ok(report)
    }

    /// Run one action by id, used by the action test endpoint
    pub async fn run_single(
        &self,
        fingerprint: &str,
        action_id: &str,
        mode: DispatchMode,
    ) -> Result<ActionResult> {
        let cert = self.index.get(fingerprint).await?;
        let action = cert
            .deployment_actions
            .iter()
            .find(|a| a.id == action_id)
            .ok_or_else(|| EngineError::not_found(format!("Action {}", action_id)))?;
        Ok(self.run_action(&cert, action, mode).await)
    }

    async fn run_action(
        &self,
        cert: &Certificate,
        action: &DeployAction,
        mode: DispatchMode,
    ) -> ActionResult {
        let ctx = ActionContext {
            cert,
            store: &self.store,
            index: &self.index,
            http: &self.http,
            cipher: self.vault.cipher(),
        };
        let deadline = Duration::from_secs(
            action
                .timeout_secs
                .unwrap_or(constants::DEFAULT_ACTION_TIMEOUT_SECS),
        );

        let start = Instant::now();
        let outcome = tokio::time::timeout(deadline, dispatch_one(&ctx, &action.config, mode))
            .await
            .map_err(|_| EngineError::Timeout { duration: deadline })
            .and_then(|r| r);
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(message) => ActionResult {
                action_id: action.id.clone(),
                name: action.name.clone(),
                kind: action.config.kind().to_string(),
                status: ActionStatus::Success,
                message,
                duration_ms,
                error_kind: None,
            },
            Err(e) => {
                tracing::warn!(
                    cert = %cert.name,
                    action = %action.name,
                    kind = action.config.kind(),
                    error = %e,
                    "Deployment action failed"
                );
                ActionResult {
                    action_id: action.id.clone(),
                    name: action.name.clone(),
                    kind: action.config.kind().to_string(),
                    status: ActionStatus::Failure,
                    message: e.to_string(),
                    duration_ms,
                    error_kind: Some(e.kind().to_string()),
                }
            }
        }
    }
}

async fn dispatch_one(
    ctx: &ActionContext<'_>,
    config: &ActionConfig,
    mode: DispatchMode,
) -> Result<String> {
    match config {
        ActionConfig::Copy {
            source,
            destination,
            permissions,
        } => exec::copy::run(ctx, mode, *source, destination, *permissions).await,
        ActionConfig::DockerRestart { container } => {
            exec::docker::run(ctx, mode, container).await
        }
        ActionConfig::NginxProxyManager { npm } => exec::npm::run(ctx, mode, npm).await,
        ActionConfig::SshCopy {
            host,
            port,
            username,
            auth,
            source,
            remote_path,
            post_command,
        } => {
            exec::ssh::run(
                ctx,
                mode,
                host,
                *port,
                username,
                auth,
                *source,
                remote_path,
                post_command.as_deref(),
            )
            .await
        }
        ActionConfig::SmbCopy {
            host,
            share,
            username,
            password,
            source,
            remote_path,
        } => {
            exec::smb::run(ctx, mode, host, share, username, password, *source, remote_path).await
        }
        ActionConfig::FtpCopy {
            host,
            port,
            username,
            password,
            secure,
            source,
            remote_path,
        } => {
            exec::ftp::run(
                ctx,
                mode,
                host,
                *port,
                username,
                password,
                *secure,
                *source,
                remote_path,
            )
            .await
        }
        ActionConfig::ApiCall {
            url,
            method,
            headers,
            body,
            basic_auth,
        } => exec::api_call::run(ctx, mode, url, method, headers, body.as_deref(), basic_auth).await,
        ActionConfig::Webhook {
            url,
            method,
            payload,
            headers,
        } => exec::webhook::run(ctx, mode, url, *method, payload, headers).await,
        ActionConfig::Email {
            to,
            subject,
            body,
            attach,
            smtp,
        } => exec::email::run(ctx, mode, to, subject, body, *attach, smtp).await,
        ActionConfig::Command {
            command,
            working_dir,
        } => exec::command::run(ctx, mode, command, working_dir.as_deref()).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::certificate::{CertType, KeyType, RenewalPolicy, SanEntry};
    use chrono::Duration as ChronoDuration;
    use std::collections::BTreeMap;

    fn cert() -> Certificate {
        Certificate {
            fingerprint: "ff00".to_string(),
            store_id: "sid".to_string(),
            name: "web".to_string(),
            description: String::new(),
            group: String::new(),
            cert_type: CertType::Standard,
            subject: vec![SanEntry::domain("example.com")],
            idle_subject: vec![],
            valid_from: Utc::now(),
            valid_to: Utc::now() + ChronoDuration::days(42),
            key_type: KeyType::Rsa,
            key_size: 2048,
            sig_alg: "sha256WithRSAEncryption".to_string(),
            signer_fingerprint: None,
            policy: RenewalPolicy::default(),
            deployment_actions: vec![],
            paths: BTreeMap::new(),
            needs_passphrase: false,
            has_stored_passphrase: false,
            version_history: vec![],
            last_renewal: None,
            parse_error: None,
        }
    }

    #[test]
    fn test_template_expansion() {
        let cert = cert();
        let out = expand_template("{{name}} ({{common_name}}) expires {{valid_to}}", &cert);
        assert!(out.starts_with("web (example.com) expires "));
        assert!(!out.contains("{{"));
    }

    #[test]
    fn test_days_remaining_placeholder() {
        let cert = cert();
        let out = expand_template("{{days_remaining}}", &cert);
        let days: i64 = out.parse().unwrap();
        assert!((41..=43).contains(&days));
    }
}
