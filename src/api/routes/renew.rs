// Renewal endpoints

use crate::api::models::error::ApiResult;
use crate::api::models::request::RenewRequest;
use crate::api::models::response::CertificateMutation;
use crate::api::state::AppState;
use crate::model::certificate::VersionEntry;
use crate::renewal::{PassphraseCheck, RenewParams};
use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;

pub async fn renew(
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

/// Which passphrases a renewal would need and whether the vault holds them
pub async fn check_passphrases(
    State(state): State<Arc<AppState>>,
    Path(fingerprint): Path<String>,
) -> ApiResult<Json<Vec<PassphraseCheck>>> {
    Ok(Json(state.engine.check_renewal_passphrases(&fingerprint).await?))
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    Path(fingerprint): Path<String>,
) -> ApiResult<Json<Vec<VersionEntry>>> {
    let cert = state.index.get(&fingerprint).await?;
    Ok(Json(cert.version_history))
}
