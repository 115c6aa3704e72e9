// API surface tests: router assembly, error mapping, request shapes

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use certmill::api::models::error::ApiError;
use certmill::api::models::request::{ConvertRequest, CreateActionRequest, CreateCertificateRequest};
use certmill::api::routes;
use certmill::api::server::ApiServer;
use certmill::api::state::AppState;
use certmill::config::EngineConfig;
use certmill::dispatch::Dispatcher;
use certmill::error::EngineError;
use certmill::index::MetadataIndex;
use certmill::model::action::ActionConfig;
use certmill::model::{ArtifactForm, CertType, KeyType, RenewalPolicy, SanEntry, SanKind};
use certmill::renewal::CreateCertificate;
use certmill::renewal::{RenewalEngine, SweepScheduler};
use certmill::store::CertificateStore;
use certmill::vault::cipher::VaultCipher;
use certmill::vault::PassphraseVault;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn app_state(dir: &TempDir) -> Arc<AppState> {
    let mut config = EngineConfig::default();
    config.storage.root = dir.path().join("certs");

    let store = Arc::new(
        CertificateStore::new(config.storage.root.clone(), config.storage.history_retention)
            .unwrap(),
    );
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
    let engine = Arc::new(RenewalEngine::new(
        store.clone(),
        index.clone(),
        vault.clone(),
        dispatcher.clone(),
        config.renewal,
        2,
    ));
    let scheduler = Arc::new(SweepScheduler::new(
        engine.clone(),
        config.scheduler.clone(),
        &config.storage.root,
    ));
    Arc::new(AppState::new(
        store, index, vault, engine, dispatcher, scheduler, config,
    ))
}

#[tokio::test]
async fn router_builds_with_full_state() {
    let dir = TempDir::new().unwrap();
    let state = app_state(&dir);
    let server = ApiServer::new(state);
    let _router = server.build_router();
}

#[tokio::test]
async fn passphrase_endpoint_takes_post_not_put() {
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use tower::ServiceExt;

    let dir = TempDir::new().unwrap();
    let state = app_state(&dir);
    let router = ApiServer::new(state).build_router();

    let request = |method: Method| {
        Request::builder()
            .method(method)
            .uri("/api/certificates/feedfacedeadbeef/passphrase")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"passphrase":"hunter2"}"#))
            .unwrap()
    };

    // POST reaches the handler (unknown fingerprint, so 404), PUT is not routed
    let response = router.clone().oneshot(request(Method::POST)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router.oneshot(request(Method::PUT)).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn deploy_settings_round_trip() {
    let dir = TempDir::new().unwrap();
    let state = app_state(&dir);

    assert!(state.load_deploy_settings().await.unwrap().is_empty());

    let mut settings = serde_json::Map::new();
    settings.insert(
        "smtp".to_string(),
        serde_json::json!({"server": "mail.test", "port": 587}),
    );
    state.save_deploy_settings(settings).await.unwrap();

    let loaded = state.load_deploy_settings().await.unwrap();
    assert_eq!(loaded["smtp"]["server"], "mail.test");
}

#[test]
fn error_mapping_matches_http_semantics() {
    fn status_of(err: EngineError) -> u16 {
        ApiError::from(err).into_response().status().as_u16()
    }

    assert_eq!(status_of(EngineError::not_found("Certificate")), 404);
    assert_eq!(status_of(EngineError::conflict("busy")), 409);
    assert_eq!(status_of(EngineError::invalid("bad")), 400);
    assert_eq!(
        status_of(EngineError::PassphraseRequired {
            fingerprint: "ab".to_string()
        }),
        400
    );
    assert_eq!(
        status_of(EngineError::SignerUnavailable {
            fingerprint: "cd".to_string(),
            reason: "gone".to_string()
        }),
        422
    );
    assert_eq!(status_of(EngineError::VaultSealed), 503);
    assert_eq!(
        status_of(EngineError::Timeout {
            duration: Duration::from_secs(5)
        }),
        504
    );
    assert_eq!(
        status_of(EngineError::AdapterAuth {
            adapter: "ssh".to_string(),
            details: "denied".to_string()
        }),
        502
    );
    assert_eq!(status_of(EngineError::Internal("boom".to_string())), 500);
}

fn root_request(name: &str) -> CreateCertificate {
    CreateCertificate {
        name: name.to_string(),
        description: String::new(),
        group: String::new(),
        cert_type: CertType::RootCa,
        subject: vec![SanEntry {
            kind: SanKind::Domain,
            value: format!("{}.test", name),
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
    }
}

#[tokio::test]
async fn convert_to_p12_without_password_requires_passphrase() {
    let dir = TempDir::new().unwrap();
    let state = app_state(&dir);

    let cert = state.engine.create(root_request("export-me")).await.unwrap();

    let err = routes::files::convert(
        State(state.clone()),
        Path(cert.fingerprint.clone()),
        Json(ConvertRequest {
            form: "p12".to_string(),
            password: None,
        }),
    )
    .await
    .unwrap_err();

    assert_eq!(err.0.kind(), "PassphraseRequired");
    assert_eq!(err.into_response().status().as_u16(), 400);

    let reloaded = state.index.get(&cert.fingerprint).await.unwrap();
    assert!(!reloaded.paths.contains_key(&ArtifactForm::P12));
}

#[tokio::test]
async fn renew_answers_with_success_envelope() {
    let dir = TempDir::new().unwrap();
    let state = app_state(&dir);

    let cert = state.engine.create(root_request("self-renewer")).await.unwrap();
    let Json(body) = routes::renew::renew(State(state.clone()), Path(cert.fingerprint.clone()), None)
        .await
        .unwrap();

    let json = serde_json::to_value(&body).unwrap();
    assert_eq!(json["success"], serde_json::json!(true));
    assert!(json["fingerprint"].is_string());
    assert_ne!(json["fingerprint"], serde_json::json!(cert.fingerprint));
}

#[test]
fn create_request_fills_defaults() {
    let req: CreateCertificateRequest = serde_json::from_value(serde_json::json!({
        "name": "web",
        "certType": "standard",
        "subject": [{"type": "domain", "value": "web.test"}]
    }))
    .unwrap();
    assert_eq!(req.name, "web");
    assert!(req.key_size.is_none());
    assert!(!req.store_passphrase);
}

#[test]
fn action_request_uses_kebab_case_kinds() {
    let req: CreateActionRequest = serde_json::from_value(serde_json::json!({
        "name": "place cert",
        "kind": "copy",
        "source": "fullchain",
        "destination": "/etc/ssl/web.pem"
    }))
    .unwrap();
    match req.config {
        ActionConfig::Copy { source, .. } => assert_eq!(source, ArtifactForm::Fullchain),
        other => panic!("wrong action kind: {}", other.kind()),
    }

    let req: CreateActionRequest = serde_json::from_value(serde_json::json!({
        "name": "bounce proxy",
        "kind": "docker-restart",
        "container": "nginx"
    }))
    .unwrap();
    assert_eq!(req.config.kind(), "docker-restart");
}
