// Renewal engine
//
// A renewal replaces a certificate's key material in a fixed order:
// preflight, passphrase resolution, issuance, archive, materialize, publish.
// Nothing on disk changes before the archive step, and a failure in
// materialize rolls the archive back, so the store never holds a half-renewed
// certificate. Concurrent renewals of the same certificate serialize on the
// store's per-certificate lock.

use crate::config::RenewalDefaults;
use crate::crypto;
use crate::dispatch::Dispatcher;
use crate::error::EngineError;
use crate::index::MetadataIndex;
use crate::model::certificate::{CertType, KeyType, RenewalOutcome, RenewalPolicy, SanEntry};
use crate::model::{ArtifactForm, Certificate, DispatchMode};
use crate::renewal::retry::{retry_with_backoff, RetryConfig};
use crate::store::CertificateStore;
use crate::vault::PassphraseVault;
use crate::Result;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Caller-supplied inputs for one renewal
#[derive(Debug, Default, Clone)]
pub struct RenewParams {
    /// Override the policy validity for this renewal only
    pub validity_days: Option<u32>,
    /// Passphrase of the certificate's own key, when encrypted
    pub passphrase: Option<String>,
    /// Passphrase of the signing CA's key, when encrypted
    pub signer_passphrase: Option<String>,
    /// Save supplied passphrases into the vault on success
    pub store_passphrases: bool,
    /// Keep the existing private key instead of generating a fresh one
    pub reuse_key: bool,
}

/// Inputs for issuing a brand new certificate
#[derive(Debug, Clone)]
pub struct CreateCertificate {
    pub name: String,
    pub description: String,
    pub group: String,
    pub cert_type: CertType,
    pub subject: Vec<SanEntry>,
    pub key_type: KeyType,
    pub key_size: Option<u32>,
    pub validity_days: Option<u32>,
    pub signer_fingerprint: Option<String>,
    pub signer_passphrase: Option<String>,
    /// Encrypt the private key at rest with this passphrase
    pub passphrase: Option<String>,
    pub store_passphrase: bool,
    pub policy: RenewalPolicy,
    pub deployment_actions: Vec<crate::model::DeployAction>,
}

/// One row of the passphrase pre-check for a renewal
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassphraseCheck {
    pub fingerprint: String,
    pub name: String,
    /// "certificate" or "signer"
    pub role: &'static str,
    pub required: bool,
    pub stored: bool,
}

/// Outcome of one sweep over the store
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub examined: usize,
    pub due: usize,
    pub renewed: Vec<String>,
    pub failed: Vec<SweepFailure>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepFailure {
    pub name: String,
    pub fingerprint: String,
    pub kind: String,
    pub message: String,
}

pub struct RenewalEngine {
    store: Arc<CertificateStore>,
    index: Arc<MetadataIndex>,
    vault: Arc<PassphraseVault>,
    dispatcher: Arc<Dispatcher>,
    defaults: RenewalDefaults,
    max_concurrent: usize,
    retry: RetryConfig,
}

impl RenewalEngine {
    pub fn new(
        store: Arc<CertificateStore>,
        index: Arc<MetadataIndex>,
        vault: Arc<PassphraseVault>,
        dispatcher: Arc<Dispatcher>,
        defaults: RenewalDefaults,
        max_concurrent: usize,
    ) -> Self {
        Self {
            store,
            index,
            vault,
            dispatcher,
            defaults,
            max_concurrent: max_concurrent.max(1),
            retry: RetryConfig::default(),
        }
    }

    pub fn defaults(&self) -> &RenewalDefaults {
        &self.defaults
    }

    /// Issue a brand new certificate and place it in the store
    pub async fn create(&self, req: CreateCertificate) -> Result<Certificate> {
        if req.name.trim().is_empty() {
            return Err(EngineError::invalid("Certificate name must not be empty"));
        }
        if req.subject.is_empty() {
            return Err(EngineError::invalid(
                "Certificate needs at least one SAN entry (the primary CN)",
            ));
        }
        if req.cert_type == CertType::RootCa && req.signer_fingerprint.is_some() {
            return Err(EngineError::invalid("A root CA cannot have a signer"));
        }
        if req.cert_type == CertType::IntermediateCa && req.signer_fingerprint.is_none() {
            return Err(EngineError::invalid(
                "An intermediate CA must be signed by an existing CA",
            ));
        }

        let signer = match &req.signer_fingerprint {
            Some(fp) => {
                let signer = self.index.get(fp).await?;
                if !signer.cert_type.is_ca() {
                    return Err(EngineError::SignerUnavailable {
                        fingerprint: fp.clone(),
                        reason: format!("'{}' is not a CA certificate", signer.name),
                    });
                }
                // Intermediates hang directly off a root; deeper nesting is rejected
                if req.cert_type == CertType::IntermediateCa
                    && signer.cert_type != CertType::RootCa
                {
                    return Err(EngineError::SignerUnavailable {
                        fingerprint: fp.clone(),
                        reason: format!(
                            "'{}' is not a root CA; intermediate CAs must be signed by a root",
                            signer.name
                        ),
                    });
                }
                // The signer chain itself must be intact
                self.index.path_to_root(fp).await?;
                Some(signer)
            }
            None => None,
        };
        let signer_passphrase = match &signer {
            Some(signer_cert) => {
                self.resolve_passphrase(signer_cert, req.signer_passphrase.as_deref())
                    .await?
            }
            None => None,
        };

        let key_size = req.key_size.unwrap_or(self.defaults.key_size);
        let validity_days = req.validity_days.unwrap_or(self.defaults.validity_days);
        let issue_params = crypto::IssueParams {
            subject: req.subject.clone(),
            validity_days,
            is_ca: req.cert_type.is_ca(),
        };
        let signer_material = match &signer {
            Some(signer_cert) => {
                Some(self.load_signer_material(signer_cert, signer_passphrase.as_deref())?)
            }
            None => None,
        };

        // Keygen and signing are CPU-bound and run on the blocking pool
        let key_type = req.key_type;
        let (key, x509) =
            tokio::task::spawn_blocking(move || -> Result<(PKey<Private>, X509)> {
                let key = crypto::generate_key(key_type, key_size)?;
                let x509 = match &signer_material {
                    Some((ca_x509, ca_key)) => {
                        crypto::sign_with_ca(&issue_params, &key, ca_x509, ca_key)?
                    }
                    None => crypto::create_self_signed(&issue_params, &key)?,
                };
                Ok((key, x509))
            })
            .await??;

        let fingerprint = crypto::compute_fingerprint(&x509)?;
        let parsed = crypto::describe(&x509)?;
        let key_pem = crypto::key_to_pem(&key, req.passphrase.as_deref())?;

        let mut cert = Certificate {
            fingerprint: fingerprint.clone(),
            store_id: uuid::Uuid::new_v4().to_string(),
            name: req.name,
            description: req.description,
            group: req.group,
            cert_type: req.cert_type,
            subject: req.subject,
            idle_subject: Vec::new(),
            valid_from: parsed.not_before,
            valid_to: parsed.not_after,
            key_type: req.key_type,
            key_size,
            sig_alg: parsed.sig_alg,
            signer_fingerprint: signer.as_ref().map(|s| s.fingerprint.clone()),
            policy: req.policy,
            deployment_actions: req.deployment_actions,
            paths: Default::default(),
            needs_passphrase: req.passphrase.is_some(),
            has_stored_passphrase: false,
            version_history: Vec::new(),
            last_renewal: None,
            parse_error: None,
        };

        let dir = self.store.create_dir(&cert)?;
        self.store
            .write_artifact(&mut cert, &dir, ArtifactForm::Crt, &x509.to_pem()?)?;
        self.store
            .write_artifact(&mut cert, &dir, ArtifactForm::Key, &key_pem)?;

        if req.store_passphrase {
            if let Some(pass) = &req.passphrase {
                self.vault.put(&fingerprint, pass).await?;
                cert.has_stored_passphrase = true;
            }
        }

        self.store.save_metadata_in(&cert, &dir)?;
        self.index.upsert(cert.clone()).await;
        tracing::info!(name = %cert.name, fingerprint = %cert.fingerprint, "Created certificate");
        Ok(cert)
    }

    /// Delete a certificate. CAs still referenced by other certificates are
    /// protected by a conflict.
    pub async fn delete(&self, fingerprint: &str) -> Result<()> {
        let cert = self.index.get(fingerprint).await?;
        let lock = self.store.lock_for(&cert.store_id).await;
        let _guard = lock.lock().await;

        let children = self.index.children_of(fingerprint).await;
        if !children.is_empty() {
            return Err(EngineError::conflict(format!(
                "'{}' signs {} certificate(s); delete or re-issue them first",
                cert.name,
                children.len()
            )));
        }

        self.store.delete(&cert)?;
        self.index.remove(fingerprint).await;
        self.vault.delete(fingerprint).await?;
        Ok(())
    }

    /// Renew one certificate through the full state machine
    pub async fn renew(&self, fingerprint: &str, params: RenewParams) -> Result<Certificate> {
        let initial = self.index.get(fingerprint).await?;
        let lock = self.store.lock_for(&initial.store_id).await;
        let _guard = lock.lock().await;

        // Re-read under the lock; the fingerprint may have moved on
        let mut cert = self.index.get_by_store_id(&initial.store_id).await?;
        let old_fingerprint = cert.fingerprint.clone();

        match self.renew_locked(&mut cert, &params).await {
            Ok(()) => {
                tracing::info!(
                    name = %cert.name,
                    old = %old_fingerprint,
                    new = %cert.fingerprint,
                    "Certificate renewed"
                );
                self.publish_renewed(&cert, &old_fingerprint).await?;
                Ok(cert)
            }
            Err(e) => {
                self.record_failure(&mut cert, &e).await;
                Err(e)
            }
        }
    }

    async fn renew_locked(&self, cert: &mut Certificate, params: &RenewParams) -> Result<()> {
        // Preflight
        if let Some(reason) = &cert.parse_error {
            return Err(EngineError::invalid(format!(
                "Stored certificate is unreadable: {}",
                reason
            )));
        }
        let chain = self.index.path_to_root(&cert.fingerprint).await?;
        for signer in &chain {
            if !signer.cert_type.is_ca() {
                return Err(EngineError::SignerUnavailable {
                    fingerprint: signer.fingerprint.clone(),
                    reason: format!("'{}' is not a CA certificate", signer.name),
                });
            }
        }
        if cert.cert_type == CertType::IntermediateCa {
            if let Some(signer) = chain.first() {
                if signer.cert_type != CertType::RootCa {
                    return Err(EngineError::SignerUnavailable {
                        fingerprint: signer.fingerprint.clone(),
                        reason: format!(
                            "'{}' is not a root CA; intermediate CAs must be signed by a root",
                            signer.name
                        ),
                    });
                }
            }
        }

        let dir = self.store.find_dir(&cert.store_id)?;

        // Passphrase resolution, before any mutation
        let passphrase = self
            .resolve_passphrase(cert, params.passphrase.as_deref())
            .await?;
        let signer = chain.first().cloned();
        let signer_passphrase = match &signer {
            Some(signer_cert) => {
                self.resolve_passphrase(signer_cert, params.signer_passphrase.as_deref())
                    .await?
            }
            None => None,
        };

        // Issuance entirely in memory
        let policy = cert.effective_policy(&self.defaults);
        let validity_days = params.validity_days.unwrap_or(policy.validity_days);
        let mut subject = cert.subject.clone();
        subject.extend(cert.idle_subject.iter().cloned());

        let issue_params = crypto::IssueParams {
            subject: subject.clone(),
            validity_days,
            is_ca: cert.cert_type.is_ca(),
        };
        let signer_material = match &signer {
            Some(signer_cert) => {
                Some(self.load_signer_material(signer_cert, signer_passphrase.as_deref())?)
            }
            None => None,
        };
        let mut signer_chain = Vec::new();
        if let Some((ca_x509, _)) = &signer_material {
            signer_chain.push(ca_x509.clone());
            for link in chain.iter().skip(1) {
                let pem = self.store.read_artifact(link, ArtifactForm::Crt)?;
                let (x, _) = crypto::parse_cert(&pem)?;
                signer_chain.push(x);
            }
        }
        let reuse_pem = if params.reuse_key {
            Some(self.store.read_artifact(cert, ArtifactForm::Key)?)
        } else {
            None
        };

        // Keygen and signing are CPU-bound and run on the blocking pool
        let key_type = cert.key_type;
        let key_size = policy.key_size;
        let own_passphrase = passphrase.clone();
        let (key, new_x509) =
            tokio::task::spawn_blocking(move || -> Result<(PKey<Private>, X509)> {
                let key = match reuse_pem {
                    Some(pem) => crypto::load_key(&pem, own_passphrase.as_deref())?,
                    None => crypto::generate_key(key_type, key_size)?,
                };
                let x509 = match &signer_material {
                    Some((ca_x509, ca_key)) => {
                        crypto::sign_with_ca(&issue_params, &key, ca_x509, ca_key)?
                    }
                    None => crypto::create_self_signed(&issue_params, &key)?,
                };
                Ok((key, x509))
            })
            .await??;

        let new_fingerprint = crypto::compute_fingerprint(&new_x509)?;
        let parsed = crypto::describe(&new_x509)?;
        let key_pem = crypto::key_to_pem(&key, passphrase.as_deref())?;

        // Forms materialized before this renewal get re-derived
        let prior_forms: Vec<ArtifactForm> = cert
            .paths
            .keys()
            .copied()
            .filter(|f| ArtifactForm::derivable().contains(f))
            .collect();

        // Archive, then materialize; a failed materialize restores the archive
        let archived = self.store.archive_current(cert, &dir)?;
        cert.paths.clear();

        if let Err(e) = self
            .materialize(
                cert,
                &dir,
                &new_x509,
                &key,
                &key_pem,
                &signer_chain,
                &prior_forms,
                passphrase.as_deref(),
            )
            .await
        {
            if let Err(restore_err) = self.store.restore_archive(cert, &dir, archived.version) {
                tracing::error!(
                    name = %cert.name,
                    error = %restore_err,
                    "Rollback after failed materialization also failed"
                );
            }
            return Err(e);
        }

        // Metadata flip: SAN edits land, fingerprint advances
        let old_fingerprint = cert.fingerprint.clone();
        cert.fingerprint = new_fingerprint.clone();
        cert.subject = subject;
        cert.idle_subject.clear();
        cert.valid_from = parsed.not_before;
        cert.valid_to = parsed.not_after;
        cert.key_size = parsed.key_size;
        cert.sig_alg = parsed.sig_alg;
        cert.needs_passphrase = passphrase.is_some();
        cert.last_renewal = Some(RenewalOutcome {
            at: Utc::now(),
            success: true,
            error_kind: None,
            message: format!("Renewed for {} days", validity_days),
        });

        // Vault follows the fingerprint
        if params.store_passphrases {
            if let Some(pass) = &passphrase {
                self.vault.put(&new_fingerprint, pass).await?;
            }
            if let (Some(signer_cert), Some(pass)) = (&signer, &signer_passphrase) {
                if params.signer_passphrase.is_some() {
                    self.vault.put(&signer_cert.fingerprint, pass).await?;
                }
            }
        } else {
            self.vault.rekey(&old_fingerprint, &new_fingerprint).await?;
        }
        cert.has_stored_passphrase = self.vault.has(&new_fingerprint).await;

        self.store.save_metadata_in(cert, &dir)?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn materialize(
        &self,
        cert: &mut Certificate,
        dir: &Path,
        x509: &X509,
        key: &PKey<Private>,
        key_pem: &[u8],
        chain: &[X509],
        prior_forms: &[ArtifactForm],
        passphrase: Option<&str>,
    ) -> Result<()> {
        self.store
            .write_artifact(cert, dir, ArtifactForm::Crt, &x509.to_pem()?)?;
        self.store
            .write_artifact(cert, dir, ArtifactForm::Key, key_pem)?;

        for form in prior_forms {
            if form.needs_password() && passphrase.is_none() {
                tracing::warn!(
                    name = %cert.name,
                    form = %form,
                    "Cannot re-derive password-protected form without a passphrase, dropping it"
                );
                continue;
            }
            let input = crypto::ConvertInput {
                cert: x509,
                key: Some(key),
                chain,
                password: passphrase,
                friendly_name: &cert.name,
            };
            let bytes = crypto::convert(&input, *form).map_err(|e| {
                EngineError::MaterializationFailed {
                    message: format!("Deriving {}: {}", form, e),
                }
            })?;
            self.store.write_artifact(cert, dir, *form, &bytes)?;
        }
        Ok(())
    }

    /// Index update, signer-link fixup for children, and live dispatch
    async fn publish_renewed(&self, cert: &Certificate, old_fingerprint: &str) -> Result<()> {
        self.index.upsert(cert.clone()).await;

        // Children referenced the CA by its old fingerprint
        for mut child in self.index.children_of(old_fingerprint).await {
            child.signer_fingerprint = Some(cert.fingerprint.clone());
            self.store.save_metadata(&child)?;
            self.index.upsert(child).await;
        }

        if !cert.deployment_actions.is_empty() {
            let dispatcher = self.dispatcher.clone();
            let fingerprint = cert.fingerprint.clone();
            let name = cert.name.clone();
            tokio::spawn(async move {
                match dispatcher.run(&fingerprint, DispatchMode::Live).await {
                    Ok(report) if !report.success => {
                        tracing::warn!(cert = %name, "Post-renewal dispatch had failures");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(cert = %name, error = %e, "Post-renewal dispatch aborted");
                    }
                }
            });
        }
        Ok(())
    }

    async fn record_failure(&self, cert: &mut Certificate, error: &EngineError) {
        tracing::warn!(name = %cert.name, error = %error, "Renewal failed");
        cert.last_renewal = Some(RenewalOutcome {
            at: Utc::now(),
            success: false,
            error_kind: Some(error.kind().to_string()),
            message: error.to_string(),
        });
        if let Err(e) = self.store.save_metadata(cert) {
            tracing::debug!(error = %e, "Could not persist failure outcome");
        } else {
            self.index.upsert(cert.clone()).await;
        }
    }

    async fn resolve_passphrase(
        &self,
        cert: &Certificate,
        supplied: Option<&str>,
    ) -> Result<Option<String>> {
        if !cert.needs_passphrase {
            return Ok(None);
        }
        if let Some(pass) = supplied {
            return Ok(Some(pass.to_string()));
        }
        match self.vault.get(&cert.fingerprint).await {
            Ok(pass) => Ok(Some(pass)),
            Err(EngineError::NotFound { .. }) | Err(EngineError::VaultSealed) => {
                Err(EngineError::PassphraseRequired {
                    fingerprint: cert.fingerprint.clone(),
                })
            }
            Err(e) => Err(e),
        }
    }

    fn load_signer_material(
        &self,
        signer: &Certificate,
        passphrase: Option<&str>,
    ) -> Result<(X509, PKey<Private>)> {
        let crt_pem = self
            .store
            .read_artifact(signer, ArtifactForm::Crt)
            .map_err(|e| EngineError::SignerUnavailable {
                fingerprint: signer.fingerprint.clone(),
                reason: e.to_string(),
            })?;
        let (x509, _) = crypto::parse_cert(&crt_pem)?;

        let key_pem = self
            .store
            .read_artifact(signer, ArtifactForm::Key)
            .map_err(|e| EngineError::SignerUnavailable {
                fingerprint: signer.fingerprint.clone(),
                reason: e.to_string(),
            })?;
        let key = crypto::load_key(&key_pem, passphrase)?;
        Ok((x509, key))
    }

    /// Which passphrases a renewal of this certificate would need
    pub async fn check_renewal_passphrases(
        &self,
        fingerprint: &str,
    ) -> Result<Vec<PassphraseCheck>> {
        let cert = self.index.get(fingerprint).await?;
        let mut checks = vec![PassphraseCheck {
            fingerprint: cert.fingerprint.clone(),
            name: cert.name.clone(),
            role: "certificate",
            required: cert.needs_passphrase,
            stored: self.vault.has(&cert.fingerprint).await,
        }];

        // Only the immediate signer's key is used for signing
        if let Some(signer) = self.index.path_to_root(fingerprint).await?.into_iter().next() {
            checks.push(PassphraseCheck {
                fingerprint: signer.fingerprint.clone(),
                name: signer.name.clone(),
                role: "signer",
                required: signer.needs_passphrase,
                stored: self.vault.has(&signer.fingerprint).await,
            });
        }
        Ok(checks)
    }

    /// One pass over the store: renew everything that is due and allowed to
    /// auto-renew. Transient failures are retried with backoff within the
    /// sweep; everything else is recorded and skipped until the next pass.
    pub async fn sweep(&self) -> SweepReport {
        let started_at = Utc::now();
        let certs = self.index.list().await;
        let examined = certs.len();

        let candidates: Vec<Certificate> = certs
            .into_iter()
            .filter(|c| {
                let policy = c.effective_policy(&self.defaults);
                c.parse_error.is_none()
                    && policy.auto_renew
                    && c.is_due(started_at, policy.renew_before_days)
            })
            .collect();
        let due = candidates.len();
        tracing::info!(examined, due, "Renewal sweep started");

        let outcomes: Vec<(Certificate, Result<Certificate>)> = stream::iter(candidates)
            .map(|cert| async move {
                let result = retry_with_backoff(&self.retry, || {
                    self.renew(&cert.fingerprint, RenewParams::default())
                })
                .await;
                (cert, result)
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let mut renewed = Vec::new();
        let mut failed = Vec::new();
        for (cert, result) in outcomes {
            match result {
                Ok(updated) => renewed.push(updated.name),
                Err(e) => failed.push(SweepFailure {
                    name: cert.name,
                    fingerprint: cert.fingerprint,
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                }),
            }
        }

        let report = SweepReport {
            started_at,
            finished_at: Utc::now(),
            examined,
            due,
            renewed,
            failed,
        };
        tracing::info!(
            renewed = report.renewed.len(),
            failed = report.failed.len(),
            "Renewal sweep finished"
        );
        report
    }
}
