// Deployment action model
//
// Actions are a tagged variant with one shape per kind. They have no identity
// outside their parent certificate; `id` is a generated stable id used by the
// API for CRUD and test runs.

use crate::error::EngineError;
use crate::model::certificate::ArtifactForm;
use crate::vault::cipher::VaultCipher;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Prefix marking an encrypted-at-rest secret value
pub const SECRET_PREFIX: &str = "enc:";

/// A secret in an action configuration (password, private key, token).
/// Stored encrypted with the vault master key; decrypted only in memory at
/// dispatch time.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap an already-encrypted or plaintext value as loaded from disk
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    /// Encrypt a plaintext for storage
    pub fn seal(plaintext: &str, cipher: &VaultCipher) -> Result<Self> {
        Ok(Secret(format!(
            "{}{}",
            SECRET_PREFIX,
            cipher.encrypt(plaintext.as_bytes())?
        )))
    }

    /// Recover the plaintext. Values without the `enc:` prefix are returned
    /// verbatim (legacy/plain configs); encrypted values need the cipher.
    pub fn reveal(&self, cipher: Option<&VaultCipher>) -> Result<String> {
        match self.0.strip_prefix(SECRET_PREFIX) {
            Some(blob) => {
                let cipher = cipher.ok_or(EngineError::VaultSealed)?;
                let bytes = cipher.decrypt(blob)?;
                String::from_utf8(bytes)
                    .map_err(|_| EngineError::Internal("Secret is not valid UTF-8".into()))
            }
            None => Ok(self.0.clone()),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.0.starts_with(SECRET_PREFIX)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// SSH authentication method
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum SshAuth {
    Password { password: Secret },
    Key {
        private_key: Secret,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        passphrase: Option<Secret>,
    },
}

/// nginx-proxy-manager integration method
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum NpmMethod {
    /// Write cert/key to a bind-mounted NPM path
    Path { cert_path: PathBuf, key_path: PathBuf },
    /// Write into the filesystem of an NPM container, then restart it
    Docker {
        container: String,
        cert_path: PathBuf,
        key_path: PathBuf,
    },
    /// Authenticate against the NPM API and PUT the certificate onto an
    /// existing NPM certificate record
    Api {
        base_url: String,
        email: String,
        password: Secret,
        certificate_id: u64,
    },
}

/// HTTP verb subset allowed for webhooks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WebhookMethod {
    Post,
    Put,
    Patch,
}

/// Webhook payload shape
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WebhookPayload {
    /// Engine-composed JSON document describing the renewal
    Json,
    /// Raw body with template variables expanded
    Raw { body: String },
}

/// Kind-specific action configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ActionConfig {
    Copy {
        source: ArtifactForm,
        destination: PathBuf,
        /// POSIX mode; stored decimal, displayed octal
        #[serde(default, skip_serializing_if = "Option::is_none")]
        permissions: Option<u32>,
    },
    DockerRestart {
        /// Container id or name, unique within the connected endpoint
        container: String,
    },
    NginxProxyManager {
        #[serde(flatten)]
        npm: NpmMethod,
    },
    SshCopy {
        host: String,
        #[serde(default = "default_ssh_port")]
        port: u16,
        username: String,
        #[serde(flatten)]
        auth: SshAuth,
        source: ArtifactForm,
        remote_path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        post_command: Option<String>,
    },
    SmbCopy {
        host: String,
        share: String,
        username: String,
        password: Secret,
        source: ArtifactForm,
        remote_path: PathBuf,
    },
    FtpCopy {
        host: String,
        #[serde(default = "default_ftp_port")]
        port: u16,
        username: String,
        password: Secret,
        #[serde(default)]
        secure: bool,
        source: ArtifactForm,
        remote_path: PathBuf,
    },
    ApiCall {
        url: String,
        method: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        basic_auth: Option<BasicAuth>,
    },
    Webhook {
        url: String,
        #[serde(default = "default_webhook_method")]
        method: WebhookMethod,
        payload: WebhookPayload,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    Email {
        to: Vec<String>,
        subject: String,
        /// Body template; variables like {{name}}, {{valid_to}}, {{now}}
        /// are expanded from certificate metadata and current time
        body: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attach: Option<ArtifactForm>,
        smtp: SmtpSettings,
    },
    Command {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        working_dir: Option<PathBuf>,
    },
}

/// HTTP basic auth pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    pub password: Secret,
}

/// SMTP transport settings for email actions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpSettings {
    pub server: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub from_address: String,
    pub username: String,
    pub password: Secret,
    #[serde(default)]
    pub use_tls: bool,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_ftp_port() -> u16 {
    21
}

fn default_smtp_port() -> u16 {
    587
}

fn default_webhook_method() -> WebhookMethod {
    WebhookMethod::Post
}

impl ActionConfig {
    /// Kind tag matching the serde representation
    pub fn kind(&self) -> &'static str {
        match self {
            ActionConfig::Copy { .. } => "copy",
            ActionConfig::DockerRestart { .. } => "docker-restart",
            ActionConfig::NginxProxyManager { .. } => "nginx-proxy-manager",
            ActionConfig::SshCopy { .. } => "ssh-copy",
            ActionConfig::SmbCopy { .. } => "smb-copy",
            ActionConfig::FtpCopy { .. } => "ftp-copy",
            ActionConfig::ApiCall { .. } => "api-call",
            ActionConfig::Webhook { .. } => "webhook",
            ActionConfig::Email { .. } => "email",
            ActionConfig::Command { .. } => "command",
        }
    }
}

/// One configured deployment action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployAction {
    pub id: String,
    pub name: String,

    /// When true, the action is skipped if any predecessor failed
    #[serde(default)]
    pub requires_previous: bool,

    /// Per-action deadline override in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    #[serde(flatten)]
    pub config: ActionConfig,
}

impl DeployAction {
    pub fn new(name: impl Into<String>, config: ActionConfig) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            requires_previous: false,
            timeout_secs: None,
            config,
        }
    }
}

/// Dispatch mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    Live,
    Simulate,
}

/// Per-action outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Success,
    Failure,
    Skipped,
}

/// One entry of a dispatch result log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub action_id: String,
    pub name: String,
    pub kind: String,
    pub status: ActionStatus,
    pub message: String,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

/// Full report of one dispatch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchReport {
    pub fingerprint: String,
    pub mode: DispatchMode,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub results: Vec<ActionResult>,
}

impl DispatchReport {
    pub fn overall_success(results: &[ActionResult]) -> bool {
        results
            .iter()
            .all(|r| !matches!(r.status, ActionStatus::Failure))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_kind_tags_roundtrip() {
        let action = DeployAction::new(
            "copy cert",
            ActionConfig::Copy {
                source: ArtifactForm::Fullchain,
                destination: PathBuf::from("/etc/ssl/site.pem"),
                permissions: Some(420), // 0o644
            },
        );

        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["kind"], "copy");
        assert_eq!(json["source"], "fullchain");

        let back: DeployAction = serde_json::from_value(json).unwrap();
        assert_eq!(back.config.kind(), "copy");
    }

    #[test]
    fn test_webhook_defaults() {
        let json = serde_json::json!({
            "id": "a1",
            "name": "notify",
            "kind": "webhook",
            "url": "https://hooks.example.com/x",
            "payload": {"type": "json"}
        });
        let action: DeployAction = serde_json::from_value(json).unwrap();
        match action.config {
            ActionConfig::Webhook { method, .. } => assert_eq!(method, WebhookMethod::Post),
            other => panic!("unexpected kind {}", other.kind()),
        }
        assert!(!action.requires_previous);
    }

    #[test]
    fn test_secret_debug_redacted() {
        let secret = Secret::new("hunter2");
        assert_eq!(format!("{:?}", secret), "Secret(***)");
    }

    #[test]
    fn test_secret_plain_reveal_without_cipher() {
        let secret = Secret::new("plain-password");
        assert_eq!(secret.reveal(None).unwrap(), "plain-password");
    }

    #[test]
    fn test_secret_encrypted_requires_cipher() {
        let secret = Secret::new("enc:AAAA");
        let err = secret.reveal(None).unwrap_err();
        assert_eq!(err.kind(), "VaultSealed");
    }

    #[test]
    fn test_overall_success_ignores_skips() {
        let mk = |status| ActionResult {
            action_id: "x".into(),
            name: "n".into(),
            kind: "copy".into(),
            status,
            message: String::new(),
            duration_ms: 1,
            error_kind: None,
        };
        assert!(DispatchReport::overall_success(&[
            mk(ActionStatus::Success),
            mk(ActionStatus::Skipped),
        ]));
        assert!(!DispatchReport::overall_success(&[
            mk(ActionStatus::Success),
            mk(ActionStatus::Failure),
        ]));
    }
}
