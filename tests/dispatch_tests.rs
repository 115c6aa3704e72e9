// Dispatch behavior: ordering, failure isolation and simulate mode

use certmill::config::RenewalDefaults;
use certmill::dispatch::Dispatcher;
use certmill::index::MetadataIndex;
use certmill::model::action::ActionConfig;
use certmill::model::{
    ActionStatus, ArtifactForm, CertType, DeployAction, DispatchMode, KeyType, RenewalPolicy,
    SanEntry, SanKind,
};
use certmill::renewal::{CreateCertificate, RenewalEngine};
use certmill::store::CertificateStore;
use certmill::vault::cipher::VaultCipher;
use certmill::vault::PassphraseVault;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    dir: TempDir,
    store: Arc<CertificateStore>,
    index: Arc<MetadataIndex>,
    engine: RenewalEngine,
    dispatcher: Arc<Dispatcher>,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(CertificateStore::new(dir.path().join("certs"), 10).unwrap());
    let index = Arc::new(MetadataIndex::new());
    let vault = Arc::new(
        PassphraseVault::open(
            dir.path().join("vault.json"),
            Some(VaultCipher::from_secret("test-master-secret")),
        )
        .unwrap(),
    );
    let dispatcher =
        Arc::new(Dispatcher::new(store.clone(), index.clone(), vault.clone(), 2).unwrap());
    let engine = RenewalEngine::new(
        store.clone(),
        index.clone(),
        vault,
        dispatcher.clone(),
        RenewalDefaults::default(),
        2,
    );
    Harness {
        dir,
        store,
        index,
        engine,
        dispatcher,
    }
}

async fn cert_with_actions(h: &Harness, actions: Vec<DeployAction>) -> String {
    let cert = h
        .engine
        .create(CreateCertificate {
            name: "deploy-me".to_string(),
            description: String::new(),
            group: String::new(),
            cert_type: CertType::RootCa,
            subject: vec![SanEntry {
                kind: SanKind::Domain,
                value: "deploy.test".to_string(),
            }],
            key_type: KeyType::Ecdsa,
            key_size: Some(256),
            validity_days: Some(90),
            signer_fingerprint: None,
            signer_passphrase: None,
            passphrase: None,
            store_passphrase: false,
            policy: RenewalPolicy::default(),
            deployment_actions: actions,
        })
        .await
        .unwrap();
    cert.fingerprint
}

fn copy_action(name: &str, destination: PathBuf) -> DeployAction {
    DeployAction::new(
        name,
        ActionConfig::Copy {
            source: ArtifactForm::Crt,
            destination,
            permissions: Some(0o644),
        },
    )
}

#[tokio::test]
async fn live_copy_places_the_artifact() {
    let h = harness();
    let target = h.dir.path().join("out").join("server.crt");
    let fp = cert_with_actions(&h, vec![copy_action("place crt", target.clone())]).await;

    let report = h.dispatcher.run(&fp, DispatchMode::Live).await.unwrap();
    assert!(report.success);
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].status, ActionStatus::Success);

    let cert = h.index.get(&fp).await.unwrap();
    let expected = h.store.read_artifact(&cert, ArtifactForm::Crt).unwrap();
    assert_eq!(std::fs::read(&target).unwrap(), expected);
}

#[tokio::test]
async fn simulate_never_touches_the_target() {
    let h = harness();
    let target = h.dir.path().join("server.crt");
    let fp = cert_with_actions(&h, vec![copy_action("place crt", target.clone())]).await;

    let report = h.dispatcher.run(&fp, DispatchMode::Simulate).await.unwrap();
    assert!(report.success);
    assert_eq!(report.results[0].status, ActionStatus::Success);
    assert!(report.results[0].message.starts_with("Would copy"));
    assert!(!target.exists());
}

#[tokio::test]
async fn failure_is_isolated_unless_dependent() {
    let h = harness();
    // Destination under a directory that does not exist fails even in simulate
    let bad = copy_action("bad", h.dir.path().join("missing").join("server.crt"));
    let mut dependent = copy_action("dependent", h.dir.path().join("a.crt"));
    dependent.requires_previous = true;
    let independent = copy_action("independent", h.dir.path().join("b.crt"));

    let fp = cert_with_actions(&h, vec![bad, dependent, independent]).await;
    let report = h.dispatcher.run(&fp, DispatchMode::Simulate).await.unwrap();

    assert!(!report.success);
    assert_eq!(report.results[0].status, ActionStatus::Failure);
    assert_eq!(report.results[0].error_kind.as_deref(), Some("InvalidInput"));
    assert_eq!(report.results[1].status, ActionStatus::Skipped);
    // Actions without the dependency flag still run after a failure
    assert_eq!(report.results[2].status, ActionStatus::Success);
}

#[tokio::test]
async fn run_single_targets_one_action() {
    let h = harness();
    let target = h.dir.path().join("only.crt");
    let first = copy_action("first", h.dir.path().join("unused.crt"));
    let second = copy_action("second", target.clone());
    let second_id = second.id.clone();

    let fp = cert_with_actions(&h, vec![first, second]).await;
    let result = h
        .dispatcher
        .run_single(&fp, &second_id, DispatchMode::Live)
        .await
        .unwrap();

    assert_eq!(result.status, ActionStatus::Success);
    assert!(target.exists());
    // The sibling action did not run
    assert!(!h.dir.path().join("unused.crt").exists());
}

#[tokio::test]
async fn unknown_action_id_is_not_found() {
    let h = harness();
    let fp = cert_with_actions(&h, Vec::new()).await;
    let err = h
        .dispatcher
        .run_single(&fp, "no-such-action", DispatchMode::Simulate)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "NotFound");
}

#[tokio::test]
async fn command_action_sees_certificate_env() {
    let h = harness();
    let marker = h.dir.path().join("ran.txt");
    let action = DeployAction::new(
        "record env",
        ActionConfig::Command {
            command: format!("echo \"$CERT_NAME\" > {}", marker.display()),
            working_dir: None,
        },
    );

    let fp = cert_with_actions(&h, vec![action]).await;
    let report = h.dispatcher.run(&fp, DispatchMode::Live).await.unwrap();
    assert!(report.success);
    assert_eq!(
        std::fs::read_to_string(&marker).unwrap().trim(),
        "deploy-me"
    );
}

#[tokio::test]
async fn fullchain_is_derived_when_not_materialized() {
    let h = harness();
    let root = h
        .engine
        .create(CreateCertificate {
            name: "chain-root".to_string(),
            description: String::new(),
            group: String::new(),
            cert_type: CertType::RootCa,
            subject: vec![SanEntry {
                kind: SanKind::Domain,
                value: "root.test".to_string(),
            }],
            key_type: KeyType::Ecdsa,
            key_size: Some(256),
            validity_days: Some(90),
            signer_fingerprint: None,
            signer_passphrase: None,
            passphrase: None,
            store_passphrase: false,
            policy: RenewalPolicy::default(),
            deployment_actions: Vec::new(),
        })
        .await
        .unwrap();

    let target = h.dir.path().join("fullchain.pem");
    let child = h
        .engine
        .create(CreateCertificate {
            name: "chain-leaf".to_string(),
            description: String::new(),
            group: String::new(),
            cert_type: CertType::Standard,
            subject: vec![SanEntry {
                kind: SanKind::Domain,
                value: "leaf.test".to_string(),
            }],
            key_type: KeyType::Ecdsa,
            key_size: Some(256),
            validity_days: Some(90),
            signer_fingerprint: Some(root.fingerprint.clone()),
            signer_passphrase: None,
            passphrase: None,
            store_passphrase: false,
            policy: RenewalPolicy::default(),
            deployment_actions: vec![DeployAction::new(
                "fullchain out",
                ActionConfig::Copy {
                    source: ArtifactForm::Fullchain,
                    destination: target.clone(),
                    permissions: None,
                },
            )],
        })
        .await
        .unwrap();

    let report = h
        .dispatcher
        .run(&child.fingerprint, DispatchMode::Live)
        .await
        .unwrap();
    assert!(report.success);

    // Leaf first, then the root
    let pem = std::fs::read_to_string(&target).unwrap();
    assert_eq!(pem.matches("BEGIN CERTIFICATE").count(), 2);
}
