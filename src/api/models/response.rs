// API response bodies

use crate::config::RenewalDefaults;
use crate::model::certificate::CertStatus;
use crate::model::Certificate;
use chrono::Utc;
use serde::Serialize;

/// Message-only acknowledgement
#[derive(Debug, Serialize)]
pub struct Ack {
    pub success: bool,
    pub message: String,
}

impl Ack {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// Certificate together with derived display fields
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateView {
    #[serde(flatten)]
    pub certificate: Certificate,
    pub status: CertStatus,
    pub days_remaining: i64,
}

impl CertificateView {
    pub fn build(certificate: Certificate, defaults: &RenewalDefaults) -> Self {
        let now = Utc::now();
        let policy = certificate.effective_policy(defaults);
        Self {
            status: certificate.status(now, policy.renew_before_days),
            days_remaining: certificate.days_remaining(now),
            certificate,
        }
    }
}

/// Mutating endpoints answer with the updated view plus a success flag,
/// mirroring the `{success: false, ...}` error envelope
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateMutation {
    pub success: bool,
    #[serde(flatten)]
    pub view: CertificateView,
}

impl CertificateMutation {
    pub fn build(certificate: Certificate, defaults: &RenewalDefaults) -> Self {
        Self {
            success: true,
            view: CertificateView::build(certificate, defaults),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateList {
    pub certificates: Vec<CertificateView>,
    pub total: usize,
    pub groups: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub form: String,
    pub file_name: String,
    pub size: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub certificates: usize,
    pub vault_sealed: bool,
}
