// Subject alternative name management
//
// Active SAN edits take effect at the next renewal; "idle" edits are queued
// separately and folded into the subject when a renewal runs. The apply
// endpoint simply triggers a renewal so queued names land immediately.

use crate::api::models::error::ApiResult;
use crate::api::models::request::{IdleQuery, RenewRequest, SanRequest};
use crate::api::models::response::CertificateMutation;
use crate::api::state::AppState;
use crate::model::certificate::{SanEntry, SanKind};
use crate::renewal::RenewParams;
use axum::extract::{Path, Query, State};
use axum::Json;
use std::sync::Arc;

pub async fn add(
    State(state): State<Arc<AppState>>,
    Path(fingerprint): Path<String>,
    Json(req): Json<SanRequest>,
) -> ApiResult<Json<CertificateMutation>> {
    let mut cert = state.index.get(&fingerprint).await?;
    let kind: SanKind = req.kind.parse()?;
    cert.add_san(
        SanEntry {
            kind,
            value: req.value,
        },
        req.idle,
    )?;

    state.store.save_metadata(&cert)?;
    state.index.upsert(cert.clone()).await;
    Ok(Json(CertificateMutation::build(cert, state.engine.defaults())))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path((fingerprint, kind, value)): Path<(String, String, String)>,
    Query(query): Query<IdleQuery>,
) -> ApiResult<Json<CertificateMutation>> {
    let mut cert = state.index.get(&fingerprint).await?;
    let kind: SanKind = kind.parse()?;
    cert.remove_san(kind, &value, query.idle)?;

    state.store.save_metadata(&cert)?;
    state.index.upsert(cert.clone()).await;
    Ok(Json(CertificateMutation::build(cert, state.engine.defaults())))
}

/// Renew now so queued idle names become part of the live certificate
pub async fn apply(
    State(state): State<Arc<AppState>>,
    Path(fingerprint): Path<String>,
    body: Option<Json<RenewRequest>>,
) -> ApiResult<Json<CertificateMutation>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let cert = state
        .engine
        .renew(
            &fingerprint,
            RenewParams {
                validity_days: req.validity_days,
                passphrase: req.passphrase,
                signer_passphrase: req.signer_passphrase,
                store_passphrases: req.store_passphrases,
                reuse_key: req.reuse_key,
            },
        )
        .await?;
    Ok(Json(CertificateMutation::build(cert, state.engine.defaults())))
}
