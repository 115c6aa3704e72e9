// Vault-backed passphrase storage per certificate

use crate::api::models::error::ApiResult;
use crate::api::models::request::PassphraseRequest;
use crate::api::models::response::Ack;
use crate::api::state::AppState;
use crate::crypto;
use crate::error::EngineError;
use crate::model::ArtifactForm;
use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;

/// Store a key passphrase. The passphrase is checked against the actual key
/// before it is accepted, a wrong one would otherwise surface much later
/// during an unattended renewal.
pub async fn store(
    State(state): State<Arc<AppState>>,
    Path(fingerprint): Path<String>,
    Json(req): Json<PassphraseRequest>,
) -> ApiResult<Json<Ack>> {
    let mut cert = state.index.get(&fingerprint).await?;
    if !cert.needs_passphrase {
        return Err(EngineError::invalid(format!(
            "The key of '{}' is not passphrase protected",
            cert.name
        ))
        .into());
    }

    let key_pem = state.store.read_artifact(&cert, ArtifactForm::Key)?;
    crypto::load_key(&key_pem, Some(&req.passphrase))
        .map_err(|_| EngineError::invalid("Passphrase does not open the stored key"))?;

    state.vault.put(&cert.fingerprint, &req.passphrase).await?;
    cert.has_stored_passphrase = true;
    state.store.save_metadata(&cert)?;
    state.index.upsert(cert).await;
    Ok(Json(Ack::ok("Passphrase stored")))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(fingerprint): Path<String>,
) -> ApiResult<Json<Ack>> {
    let mut cert = state.index.get(&fingerprint).await?;
    state.vault.delete(&cert.fingerprint).await?;
    if cert.has_stored_passphrase {
        cert.has_stored_passphrase = false;
        state.store.save_metadata(&cert)?;
        state.index.upsert(cert).await;
    }
    Ok(Json(Ack::ok("Passphrase removed")))
}
