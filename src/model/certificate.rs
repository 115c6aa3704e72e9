// Certificate model - the root entity of the engine

use crate::config::RenewalDefaults;
use crate::error::EngineError;
use crate::model::action::DeployAction;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Certificate type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertType {
    #[serde(rename = "rootCA")]
    RootCa,
    #[serde(rename = "intermediateCA")]
    IntermediateCa,
    #[serde(rename = "standard")]
    Standard,
}

impl CertType {
    /// Whether certificates of this type may sign others
    pub fn is_ca(&self) -> bool {
        matches!(self, CertType::RootCa | CertType::IntermediateCa)
    }
}

impl fmt::Display for CertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertType::RootCa => write!(f, "rootCA"),
            CertType::IntermediateCa => write!(f, "intermediateCA"),
            CertType::Standard => write!(f, "standard"),
        }
    }
}

/// Key algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Rsa,
    Ecdsa,
}

/// SAN entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SanKind {
    Domain,
    Ip,
}

impl FromStr for SanKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "domain" => Ok(SanKind::Domain),
            "ip" => Ok(SanKind::Ip),
            other => Err(EngineError::invalid(format!(
                "Unknown SAN type '{}' (expected domain or ip)",
                other
            ))),
        }
    }
}

/// One subject alternative name. The first entry of a certificate's subject
/// doubles as its CN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanEntry {
    #[serde(rename = "type")]
    pub kind: SanKind,
    pub value: String,
}

impl SanEntry {
    pub fn domain(value: impl Into<String>) -> Self {
        Self {
            kind: SanKind::Domain,
            value: value.into(),
        }
    }

    pub fn ip(value: impl Into<String>) -> Self {
        Self {
            kind: SanKind::Ip,
            value: value.into(),
        }
    }
}

/// Materialized artifact forms. `crt` and `key` are canonical; the rest are
/// derived on request and re-derived on renewal if present before.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactForm {
    Crt,
    Key,
    Pem,
    P12,
    Pfx,
    Csr,
    Chain,
    Fullchain,
    Der,
    P7b,
    Cer,
    Ext,
}

impl ArtifactForm {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactForm::Crt => "crt",
            ArtifactForm::Key => "key",
            ArtifactForm::Pem => "pem",
            ArtifactForm::P12 => "p12",
            ArtifactForm::Pfx => "pfx",
            ArtifactForm::Csr => "csr",
            ArtifactForm::Chain => "chain",
            ArtifactForm::Fullchain => "fullchain",
            ArtifactForm::Der => "der",
            ArtifactForm::P7b => "p7b",
            ArtifactForm::Cer => "cer",
            ArtifactForm::Ext => "ext",
        }
    }

    /// File name used inside the certificate directory
    pub fn file_name(&self) -> String {
        match self {
            ArtifactForm::Crt => crate::constants::CRT_FILE.to_string(),
            ArtifactForm::Key => crate::constants::KEY_FILE.to_string(),
            ArtifactForm::Chain => "chain.pem".to_string(),
            ArtifactForm::Fullchain => "fullchain.pem".to_string(),
            other => format!("cert.{}", other.as_str()),
        }
    }

    /// Whether deriving this form needs an export passphrase
    pub fn needs_password(&self) -> bool {
        matches!(self, ArtifactForm::P12 | ArtifactForm::Pfx)
    }

    /// All derivable (non-canonical) forms
    pub fn derivable() -> &'static [ArtifactForm] {
        &[
            ArtifactForm::Pem,
            ArtifactForm::P12,
            ArtifactForm::Pfx,
            ArtifactForm::Chain,
            ArtifactForm::Fullchain,
            ArtifactForm::Der,
            ArtifactForm::P7b,
            ArtifactForm::Cer,
        ]
    }
}

impl FromStr for ArtifactForm {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "crt" => Ok(ArtifactForm::Crt),
            "key" => Ok(ArtifactForm::Key),
            "pem" => Ok(ArtifactForm::Pem),
            "p12" => Ok(ArtifactForm::P12),
            "pfx" => Ok(ArtifactForm::Pfx),
            "csr" => Ok(ArtifactForm::Csr),
            "chain" => Ok(ArtifactForm::Chain),
            "fullchain" => Ok(ArtifactForm::Fullchain),
            "der" => Ok(ArtifactForm::Der),
            "p7b" => Ok(ArtifactForm::P7b),
            "cer" => Ok(ArtifactForm::Cer),
            "ext" => Ok(ArtifactForm::Ext),
            other => Err(EngineError::invalid(format!(
                "Unknown artifact form '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ArtifactForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-certificate renewal policy. Null fields inherit the global defaults.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RenewalPolicy {
    pub auto_renew: Option<bool>,
    pub validity_days: Option<u32>,
    pub renew_before_days: Option<u32>,
    pub key_size: Option<u32>,
}

/// Fully resolved policy after applying global defaults
#[derive(Debug, Clone, Copy)]
pub struct EffectivePolicy {
    pub auto_renew: bool,
    pub validity_days: u32,
    pub renew_before_days: u32,
    pub key_size: u32,
}

impl RenewalPolicy {
    pub fn resolve(&self, defaults: &RenewalDefaults) -> EffectivePolicy {
        EffectivePolicy {
            auto_renew: self.auto_renew.unwrap_or(defaults.auto_renew),
            validity_days: self.validity_days.unwrap_or(defaults.validity_days),
            renew_before_days: self
                .renew_before_days
                .unwrap_or(defaults.renew_before_days),
            key_size: self.key_size.unwrap_or(defaults.key_size),
        }
    }
}

/// One archived prior version of a certificate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionEntry {
    /// Monotonic version counter, starting at 1
    pub version: u32,
    pub fingerprint: String,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub archived_at: DateTime<Utc>,
    /// Paths of the snapshot, relative to the certificate directory
    pub archived_paths: Vec<PathBuf>,
}

/// Outcome of the most recent renewal attempt, kept for API reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalOutcome {
    pub at: DateTime<Utc>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub message: String,
}

/// Derived certificate status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CertStatus {
    Valid,
    ExpiringSoon,
    Expired,
    Unknown,
}

/// The root entity. Cryptographic fields are immutable between renewals;
/// metadata (name, description, group, policy, actions) is freely mutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    /// SHA-256 over the DER encoding, lowercase hex
    pub fingerprint: String,

    /// Stable directory identity; survives renewals while the fingerprint
    /// changes with every re-key
    pub store_id: String,

    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub group: String,
    pub cert_type: CertType,

    /// Active SAN entries; the first one is the primary CN
    pub subject: Vec<SanEntry>,

    /// Pending SAN edits applied atomically at next renewal
    #[serde(default)]
    pub idle_subject: Vec<SanEntry>,

    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,

    pub key_type: KeyType,
    pub key_size: u32,
    pub sig_alg: String,

    /// Signing CA, or None for self-signed
    #[serde(default)]
    pub signer_fingerprint: Option<String>,

    #[serde(default)]
    pub policy: RenewalPolicy,

    #[serde(default)]
    pub deployment_actions: Vec<DeployAction>,

    /// Materialized artifact paths by form
    #[serde(default)]
    pub paths: BTreeMap<ArtifactForm, PathBuf>,

    /// Derived from key inspection: the key file is encrypted
    #[serde(default)]
    pub needs_passphrase: bool,

    /// Derived from vault presence
    #[serde(default)]
    pub has_stored_passphrase: bool,

    #[serde(default)]
    pub version_history: Vec<VersionEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_renewal: Option<RenewalOutcome>,

    /// Set when the stored crt could not be parsed during index rebuild.
    /// Such certificates are excluded from renewal consideration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

impl Certificate {
    /// Resolve the effective policy against global defaults
    pub fn effective_policy(&self, defaults: &RenewalDefaults) -> EffectivePolicy {
        self.policy.resolve(defaults)
    }

    /// Whether renewal is due: now >= valid_to - renew_before_days.
    /// The comparison is exact to the second; day-granular reporting is
    /// a display concern handled by `days_remaining`.
    pub fn is_due(&self, now: DateTime<Utc>, renew_before_days: u32) -> bool {
        now >= self.valid_to - Duration::days(i64::from(renew_before_days))
    }

    /// Whole days until expiry, at local midnight boundaries so the
    /// displayed count matches the operator's calendar
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        let valid_to = self.valid_to.with_timezone(&chrono::Local).date_naive();
        let now = now.with_timezone(&chrono::Local).date_naive();
        (valid_to - now).num_days()
    }

    /// Derive status for the given instant
    pub fn status(&self, now: DateTime<Utc>, renew_before_days: u32) -> CertStatus {
        if self.parse_error.is_some() {
            CertStatus::Unknown
        } else if now >= self.valid_to {
            CertStatus::Expired
        } else if self.is_due(now, renew_before_days) {
            CertStatus::ExpiringSoon
        } else {
            CertStatus::Valid
        }
    }

    /// Whether the entry exists in subject or idle_subject
    pub fn has_san(&self, entry: &SanEntry) -> bool {
        self.subject.contains(entry) || self.idle_subject.contains(entry)
    }

    /// Add a SAN entry. Duplicates across subject and idle_subject are
    /// rejected with a Conflict.
    pub fn add_san(&mut self, entry: SanEntry, idle: bool) -> Result<()> {
        if self.subject.contains(&entry) {
            return Err(EngineError::conflict(format!(
                "{} is already listed in the certificate's active domains",
                entry.value
            )));
        }
        if self.idle_subject.contains(&entry) {
            return Err(EngineError::conflict(format!(
                "{} is already listed in the certificate's pending (idle) domains",
                entry.value
            )));
        }

        if idle {
            self.idle_subject.push(entry);
        } else {
            self.subject.push(entry);
        }
        Ok(())
    }

    /// Remove a SAN entry from the active or idle set
    pub fn remove_san(&mut self, kind: SanKind, value: &str, idle: bool) -> Result<()> {
        let list = if idle {
            &mut self.idle_subject
        } else {
            &mut self.subject
        };

        let before = list.len();
        list.retain(|e| !(e.kind == kind && e.value == value));

        if list.len() == before {
            return Err(EngineError::not_found(format!(
                "SAN entry {} ({:?})",
                value, kind
            )));
        }

        // The subject must keep its CN
        if !idle && self.subject.is_empty() {
            return Err(EngineError::conflict(
                "Cannot remove the last active SAN entry (primary CN)",
            ));
        }

        Ok(())
    }

    /// Primary common name (first active SAN)
    pub fn common_name(&self) -> Option<&str> {
        self.subject.first().map(|e| e.value.as_str())
    }
}

/// Strip a fingerprint display prefix such as "sha256 Fingerprint=" and
/// normalize to lowercase hex without separators.
pub fn normalize_fingerprint(raw: &str) -> String {
    let stripped = match raw.rsplit_once('=') {
        Some((_, rest)) => rest,
        None => raw,
    };
    stripped
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cert() -> Certificate {
        Certificate {
            fingerprint: "aa11".to_string(),
            store_id: "id-1".to_string(),
            name: "web".to_string(),
            description: String::new(),
            group: String::new(),
            cert_type: CertType::Standard,
            subject: vec![SanEntry::domain("example.com")],
            idle_subject: vec![],
            valid_from: Utc::now() - Duration::days(10),
            valid_to: Utc::now() + Duration::days(90),
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
    fn test_duplicate_san_rejected() {
        let mut cert = test_cert();
        let err = cert.add_san(SanEntry::domain("example.com"), false).unwrap_err();
        assert_eq!(err.kind(), "Conflict");
        assert!(err.to_string().contains("active domains"));
        assert_eq!(cert.subject.len(), 1);
    }

    #[test]
    fn test_duplicate_across_idle_rejected() {
        let mut cert = test_cert();
        cert.add_san(SanEntry::domain("alt.example.com"), true).unwrap();
        let err = cert
            .add_san(SanEntry::domain("alt.example.com"), false)
            .unwrap_err();
        assert_eq!(err.kind(), "Conflict");
        assert!(err.to_string().contains("idle"));
    }

    #[test]
    fn test_add_then_remove_san_restores_subject() {
        let mut cert = test_cert();
        let before = cert.subject.clone();
        cert.add_san(SanEntry::ip("10.0.0.1"), false).unwrap();
        cert.remove_san(SanKind::Ip, "10.0.0.1", false).unwrap();
        assert_eq!(cert.subject, before);
        assert!(cert.idle_subject.is_empty());
    }

    #[test]
    fn test_cannot_remove_primary_cn() {
        let mut cert = test_cert();
        let err = cert
            .remove_san(SanKind::Domain, "example.com", false)
            .unwrap_err();
        assert_eq!(err.kind(), "Conflict");
    }

    #[test]
    fn test_due_boundary_is_exact() {
        let mut cert = test_cert();
        let now = Utc::now();
        cert.valid_to = now + Duration::days(30);

        // Exactly at valid_to - 30d: due
        assert!(cert.is_due(now, 30));
        // One second earlier: not due
        assert!(!cert.is_due(now - Duration::seconds(1), 30));
    }

    #[test]
    fn test_status_derivation() {
        let mut cert = test_cert();
        let now = Utc::now();

        cert.valid_to = now + Duration::days(90);
        assert_eq!(cert.status(now, 30), CertStatus::Valid);

        cert.valid_to = now + Duration::days(10);
        assert_eq!(cert.status(now, 30), CertStatus::ExpiringSoon);

        cert.valid_to = now - Duration::seconds(1);
        assert_eq!(cert.status(now, 30), CertStatus::Expired);

        cert.parse_error = Some("garbage".to_string());
        assert_eq!(cert.status(now, 30), CertStatus::Unknown);
    }

    #[test]
    fn test_days_remaining_counts_local_calendar_days() {
        let mut cert = test_cert();
        let now = DateTime::parse_from_rfc3339("2026-03-10T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        // Same clock time N days later is N calendar days in any zone
        cert.valid_to = now + Duration::days(30);
        assert_eq!(cert.days_remaining(now), 30);

        cert.valid_to = now;
        assert_eq!(cert.days_remaining(now), 0);

        // Boundary sits at the local midnight, not the UTC one
        let local_midnight = now
            .with_timezone(&chrono::Local)
            .date_naive()
            .succ_opt()
            .unwrap();
        cert.valid_to = local_midnight
            .and_hms_opt(0, 10, 0)
            .unwrap()
            .and_local_timezone(chrono::Local)
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(cert.days_remaining(now), 1);
    }

    #[test]
    fn test_normalize_fingerprint() {
        assert_eq!(
            normalize_fingerprint("sha256 Fingerprint=AB:CD:12"),
            "abcd12"
        );
        assert_eq!(normalize_fingerprint("abcd12"), "abcd12");
    }

    #[test]
    fn test_policy_inheritance() {
        let defaults = RenewalDefaults::default();
        let policy = RenewalPolicy {
            validity_days: Some(90),
            ..Default::default()
        };
        let effective = policy.resolve(&defaults);
        assert_eq!(effective.validity_days, 90);
        assert_eq!(effective.renew_before_days, defaults.renew_before_days);
        assert_eq!(effective.auto_renew, defaults.auto_renew);
    }

    #[test]
    fn test_cert_type_serde_names() {
        let json = serde_json::to_string(&CertType::RootCa).unwrap();
        assert_eq!(json, "\"rootCA\"");
        let back: CertType = serde_json::from_str("\"intermediateCA\"").unwrap();
        assert_eq!(back, CertType::IntermediateCa);
    }
}
