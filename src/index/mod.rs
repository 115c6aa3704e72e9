// In-memory metadata index over the certificate store
//
// The store on disk is the source of truth; the index is a rebuildable view
// answering the queries the API and renewal engine need without rescanning:
// lookup by fingerprint, signing hierarchy traversal, SAN search, groups.

use crate::error::EngineError;
use crate::model::certificate::normalize_fingerprint;
use crate::model::Certificate;
use crate::Result;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    /// By fingerprint
    certs: HashMap<String, Certificate>,
    /// store_id -> fingerprint
    by_store_id: HashMap<String, String>,
    /// signer fingerprint -> child fingerprints
    children: HashMap<String, Vec<String>>,
    /// SAN value -> fingerprints carrying it
    san: HashMap<String, Vec<String>>,
    groups: BTreeSet<String>,
}

impl Inner {
    fn link(&mut self, cert: &Certificate) {
        self.by_store_id
            .insert(cert.store_id.clone(), cert.fingerprint.clone());
        if let Some(signer) = &cert.signer_fingerprint {
            self.children
                .entry(signer.clone())
                .or_default()
                .push(cert.fingerprint.clone());
        }
        for entry in cert.subject.iter().chain(cert.idle_subject.iter()) {
            self.san
                .entry(entry.value.clone())
                .or_default()
                .push(cert.fingerprint.clone());
        }
        if !cert.group.is_empty() {
            self.groups.insert(cert.group.clone());
        }
    }

    fn unlink(&mut self, cert: &Certificate) {
        self.by_store_id.remove(&cert.store_id);
        if let Some(signer) = &cert.signer_fingerprint {
            if let Some(kids) = self.children.get_mut(signer) {
                kids.retain(|fp| fp != &cert.fingerprint);
                if kids.is_empty() {
                    self.children.remove(signer);
                }
            }
        }
        for entry in cert.subject.iter().chain(cert.idle_subject.iter()) {
            if let Some(fps) = self.san.get_mut(&entry.value) {
                fps.retain(|fp| fp != &cert.fingerprint);
                if fps.is_empty() {
                    self.san.remove(&entry.value);
                }
            }
        }
    }

    fn rebuild_groups(&mut self) {
        self.groups = self
            .certs
            .values()
            .filter(|c| !c.group.is_empty())
            .map(|c| c.group.clone())
            .collect();
    }
}

pub struct MetadataIndex {
    inner: RwLock<Inner>,
}

impl Default for MetadataIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataIndex {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Replace the whole index from a store scan
    pub async fn rebuild(&self, certs: Vec<Certificate>) {
        let mut inner = self.inner.write().await;
        *inner = Inner::default();
        for cert in certs {
            inner.link(&cert);
            inner.certs.insert(cert.fingerprint.clone(), cert);
        }
        tracing::debug!(count = inner.certs.len(), "Rebuilt metadata index");
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.certs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.certs.is_empty()
    }

    /// Lookup by fingerprint. Accepts display forms such as
    /// "sha256 Fingerprint=AB:CD:…" alongside plain lowercase hex.
    pub async fn get(&self, fingerprint: &str) -> Result<Certificate> {
        let fingerprint = normalize_fingerprint(fingerprint);
        self.inner
            .read()
            .await
            .certs
            .get(&fingerprint)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("Certificate {}", fingerprint)))
    }

    pub async fn get_by_store_id(&self, store_id: &str) -> Result<Certificate> {
        let inner = self.inner.read().await;
        inner
            .by_store_id
            .get(store_id)
            .and_then(|fp| inner.certs.get(fp))
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("Certificate {}", store_id)))
    }

    /// All certificates, sorted by name
    pub async fn list(&self) -> Vec<Certificate> {
        let inner = self.inner.read().await;
        let mut certs: Vec<Certificate> = inner.certs.values().cloned().collect();
        certs.sort_by(|a, b| a.name.cmp(&b.name).then(a.fingerprint.cmp(&b.fingerprint)));
        certs
    }

    /// Insert or update a certificate. A changed fingerprint (renewal) is
    /// handled by keying the replacement on the stable store id.
    pub async fn upsert(&self, cert: Certificate) {
        let mut inner = self.inner.write().await;
        if let Some(old_fp) = inner.by_store_id.get(&cert.store_id).cloned() {
            if let Some(old) = inner.certs.remove(&old_fp) {
                inner.unlink(&old);
            }
        }
        inner.link(&cert);
        inner.certs.insert(cert.fingerprint.clone(), cert);
        inner.rebuild_groups();
    }

    pub async fn remove(&self, fingerprint: &str) -> Option<Certificate> {
        let mut inner = self.inner.write().await;
        let cert = inner.certs.remove(fingerprint)?;
        inner.unlink(&cert);
        inner.rebuild_groups();
        Some(cert)
    }

    /// Direct children in the signing hierarchy
    pub async fn children_of(&self, fingerprint: &str) -> Vec<Certificate> {
        let inner = self.inner.read().await;
        inner
            .children
            .get(fingerprint)
            .map(|fps| {
                fps.iter()
                    .filter_map(|fp| inner.certs.get(fp).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Walk signer links up to the root CA. The returned chain starts at the
    /// certificate's signer and ends at the root; self-signed certificates
    /// get an empty chain. Broken links and cycles are SignerUnavailable.
    pub async fn path_to_root(&self, fingerprint: &str) -> Result<Vec<Certificate>> {
        let inner = self.inner.read().await;
        let start = inner
            .certs
            .get(fingerprint)
            .ok_or_else(|| EngineError::not_found(format!("Certificate {}", fingerprint)))?;

        let mut chain = Vec::new();
        let mut seen = BTreeSet::new();
        seen.insert(fingerprint.to_string());
        let mut current = start.signer_fingerprint.clone();

        while let Some(signer_fp) = current {
            if !seen.insert(signer_fp.clone()) {
                return Err(EngineError::SignerUnavailable {
                    fingerprint: signer_fp,
                    reason: "Signing chain contains a cycle".to_string(),
                });
            }
            let signer = inner.certs.get(&signer_fp).ok_or_else(|| {
                EngineError::SignerUnavailable {
                    fingerprint: signer_fp.clone(),
                    reason: "Not present in the store".to_string(),
                }
            })?;
            current = signer.signer_fingerprint.clone();
            chain.push(signer.clone());
        }

        Ok(chain)
    }

    /// Certificates carrying a SAN value, active or idle
    pub async fn find_by_san(&self, value: &str) -> Vec<Certificate> {
        let inner = self.inner.read().await;
        inner
            .san
            .get(value)
            .map(|fps| {
                fps.iter()
                    .filter_map(|fp| inner.certs.get(fp).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn groups(&self) -> Vec<String> {
        self.inner.read().await.groups.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::certificate::{CertType, KeyType, RenewalPolicy, SanEntry};
    use chrono::{Duration, Utc};
    use std::collections::BTreeMap;

    fn cert(fp: &str, name: &str, signer: Option<&str>) -> Certificate {
        Certificate {
            fingerprint: fp.to_string(),
            store_id: format!("sid-{}", fp),
            name: name.to_string(),
            description: String::new(),
            group: String::new(),
            cert_type: if signer.is_none() {
                CertType::RootCa
            } else {
                CertType::Standard
            },
            subject: vec![SanEntry::domain(format!("{}.example.com", name))],
            idle_subject: vec![],
            valid_from: Utc::now(),
            valid_to: Utc::now() + Duration::days(90),
            key_type: KeyType::Rsa,
            key_size: 2048,
            sig_alg: "sha256WithRSAEncryption".to_string(),
            signer_fingerprint: signer.map(String::from),
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

    #[tokio::test]
    async fn test_rebuild_and_lookup() {
        let index = MetadataIndex::new();
        index
            .rebuild(vec![cert("aa", "root", None), cert("bb", "leaf", Some("aa"))])
            .await;

        assert_eq!(index.len().await, 2);
        assert_eq!(index.get("aa").await.unwrap().name, "root");
        assert_eq!(index.get("zz").await.unwrap_err().kind(), "NotFound");
        // Display forms resolve to the same entry
        assert_eq!(index.get("AA").await.unwrap().name, "root");
        assert_eq!(
            index.get("sha256 Fingerprint=AA").await.unwrap().name,
            "root"
        );
    }

    #[tokio::test]
    async fn test_children_and_path_to_root() {
        let index = MetadataIndex::new();
        index
            .rebuild(vec![
                cert("aa", "root", None),
                cert("bb", "mid", Some("aa")),
                cert("cc", "leaf", Some("bb")),
            ])
            .await;

        let kids = index.children_of("aa").await;
        assert_eq!(kids.len(), 1);
        assert_eq!(kids[0].fingerprint, "bb");

        let chain = index.path_to_root("cc").await.unwrap();
        let fps: Vec<&str> = chain.iter().map(|c| c.fingerprint.as_str()).collect();
        assert_eq!(fps, vec!["bb", "aa"]);

        assert!(index.path_to_root("aa").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_broken_signer_link() {
        let index = MetadataIndex::new();
        index.rebuild(vec![cert("cc", "leaf", Some("missing"))]).await;

        let err = index.path_to_root("cc").await.unwrap_err();
        assert_eq!(err.kind(), "SignerUnavailable");
    }

    #[tokio::test]
    async fn test_signer_cycle_detected() {
        let index = MetadataIndex::new();
        index
            .rebuild(vec![cert("aa", "a", Some("bb")), cert("bb", "b", Some("aa"))])
            .await;

        let err = index.path_to_root("aa").await.unwrap_err();
        assert_eq!(err.kind(), "SignerUnavailable");
        assert!(err.to_string().contains("cycle"));
    }

    #[tokio::test]
    async fn test_upsert_replaces_on_renewal() {
        let index = MetadataIndex::new();
        index.rebuild(vec![cert("aa", "web", None)]).await;

        // Renewal: same store_id, new fingerprint
        let mut renewed = cert("aa", "web", None);
        renewed.fingerprint = "aa2".to_string();
        index.upsert(renewed).await;

        assert_eq!(index.len().await, 1);
        assert!(index.get("aa").await.is_err());
        assert_eq!(index.get("aa2").await.unwrap().name, "web");
    }

    #[tokio::test]
    async fn test_san_search_covers_idle() {
        let index = MetadataIndex::new();
        let mut c = cert("aa", "web", None);
        c.idle_subject.push(SanEntry::domain("pending.example.com"));
        index.rebuild(vec![c]).await;

        assert_eq!(index.find_by_san("web.example.com").await.len(), 1);
        assert_eq!(index.find_by_san("pending.example.com").await.len(), 1);
        assert!(index.find_by_san("nope.example.com").await.is_empty());
    }

    #[tokio::test]
    async fn test_groups_follow_membership() {
        let index = MetadataIndex::new();
        let mut a = cert("aa", "a", None);
        a.group = "internal".to_string();
        index.rebuild(vec![a]).await;
        assert_eq!(index.groups().await, vec!["internal"]);

        index.remove("aa").await.unwrap();
        assert!(index.groups().await.is_empty());
    }
}
