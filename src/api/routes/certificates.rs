// Certificate CRUD

use crate::api::models::error::ApiResult;
use crate::api::models::request::{CreateCertificateRequest, UpdateCertificateRequest};
use crate::api::models::response::{Ack, CertificateList, CertificateMutation, CertificateView};
use crate::api::state::AppState;
use crate::error::EngineError;
use crate::renewal::CreateCertificate;
use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;

pub async fn list(State(state): State<Arc<AppState>>) -> ApiResult<Json<CertificateList>> {
    let defaults = state.engine.defaults();
    let views: Vec<CertificateView> = state
        .index
        .list()
        .await
        .into_iter()
        .map(|c| CertificateView::build(c, defaults))
        .collect();
    let groups = state.index.groups().await;
    Ok(Json(CertificateList {
        total: views.len(),
        certificates: views,
        groups,
    }))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(fingerprint): Path<String>,
) -> ApiResult<Json<CertificateView>> {
    let cert = state.index.get(&fingerprint).await?;
    Ok(Json(CertificateView::build(cert, state.engine.defaults())))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCertificateRequest>,
) -> ApiResult<Json<CertificateMutation>> {
    let cert = state
        .engine
        .create(CreateCertificate {
            name: req.name,
            description: req.description,
            group: req.group,
            cert_type: req.cert_type,
            subject: req.subject,
            key_type: req.key_type,
            key_size: req.key_size,
            validity_days: req.validity_days,
            signer_fingerprint: req.signer_fingerprint,
            signer_passphrase: req.signer_passphrase,
            passphrase: req.passphrase,
            store_passphrase: req.store_passphrase,
            policy: req.policy,
            deployment_actions: Vec::new(),
        })
        .await?;
    Ok(Json(CertificateMutation::build(cert, state.engine.defaults())))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(fingerprint): Path<String>,
    Json(req): Json<UpdateCertificateRequest>,
) -> ApiResult<Json<CertificateMutation>> {
    let mut cert = state.index.get(&fingerprint).await?;

    if let Some(name) = req.name {
        if name.trim().is_empty() {
            return Err(EngineError::invalid("Certificate name must not be empty").into());
        }
        cert.name = name;
    }
    if let Some(description) = req.description {
        cert.description = description;
    }
    if let Some(group) = req.group {
        cert.group = group;
    }
    if let Some(policy) = req.policy {
        cert.policy = policy;
    }

    state.store.save_metadata(&cert)?;
    state.index.upsert(cert.clone()).await;
    Ok(Json(CertificateMutation::build(cert, state.engine.defaults())))
}

/// Replace the renewal policy wholesale
pub async fn replace_policy(
    State(state): State<Arc<AppState>>,
    Path(fingerprint): Path<String>,
    Json(policy): Json<crate::model::RenewalPolicy>,
) -> ApiResult<Json<CertificateMutation>> {
    let mut cert = state.index.get(&fingerprint).await?;
    cert.policy = policy;
    state.store.save_metadata(&cert)?;
    state.index.upsert(cert.clone()).await;
    Ok(Json(CertificateMutation::build(cert, state.engine.defaults())))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(fingerprint): Path<String>,
) -> ApiResult<Json<Ack>> {
    state.engine.delete(&fingerprint).await?;
    Ok(Json(Ack::ok("Certificate deleted")))
}

pub async fn children(
    State(state): State<Arc<AppState>>,
    Path(fingerprint): Path<String>,
) -> ApiResult<Json<CertificateList>> {
    // Existence check first so unknown fingerprints are a 404, not an empty list
    state.index.get(&fingerprint).await?;
    let defaults = state.engine.defaults();
    let views: Vec<CertificateView> = state
        .index
        .children_of(&fingerprint)
        .await
        .into_iter()
        .map(|c| CertificateView::build(c, defaults))
        .collect();
    Ok(Json(CertificateList {
        total: views.len(),
        certificates: views,
        groups: Vec::new(),
    }))
}
