// API request bodies

use crate::model::certificate::{CertType, KeyType, RenewalPolicy, SanEntry};
use crate::model::action::ActionConfig;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCertificateRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub group: String,
    pub cert_type: CertType,
    pub subject: Vec<SanEntry>,
    #[serde(default = "default_key_type")]
    pub key_type: KeyType,
    pub key_size: Option<u32>,
    pub validity_days: Option<u32>,
    pub signer_fingerprint: Option<String>,
    pub signer_passphrase: Option<String>,
    pub passphrase: Option<String>,
    #[serde(default)]
    pub store_passphrase: bool,
    #[serde(default)]
    pub policy: RenewalPolicy,
}

fn default_key_type() -> KeyType {
    KeyType::Rsa
}

/// Metadata patch; absent fields are left unchanged
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCertificateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub group: Option<String>,
    pub policy: Option<RenewalPolicy>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    /// Queue the change for the next renewal instead of the active set
    #[serde(default)]
    pub idle: bool,
}

/// `?idle=bool` on the path-addressed SAN delete
#[derive(Debug, Default, Deserialize)]
pub struct IdleQuery {
    #[serde(default)]
    pub idle: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewRequest {
    #[serde(alias = "days")]
    pub validity_days: Option<u32>,
    pub passphrase: Option<String>,
    #[serde(alias = "signingCAPassphrase")]
    pub signer_passphrase: Option<String>,
    #[serde(default)]
    pub store_passphrases: bool,
    #[serde(default)]
    pub reuse_key: bool,
}

#[derive(Debug, Deserialize)]
pub struct PassphraseRequest {
    pub passphrase: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertRequest {
    #[serde(alias = "format")]
    pub form: String,
    /// Export password, required for p12/pfx
    pub password: Option<String>,
}

/// Body for action tests; absent body means simulate
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestActionRequest {
    #[serde(default)]
    pub live_mode: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateActionRequest {
    pub name: String,
    #[serde(default)]
    pub requires_previous: bool,
    pub timeout_secs: Option<u64>,
    #[serde(flatten)]
    pub config: ActionConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchQuery {
    /// Run actions for real instead of simulating
    #[serde(default)]
    pub live: bool,
}
