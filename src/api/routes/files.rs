// Artifact files: listing, download, conversion, bundles and backups

use crate::api::models::error::ApiResult;
use crate::api::models::request::ConvertRequest;
use crate::api::models::response::{Ack, FileEntry};
use crate::api::state::AppState;
use crate::crypto;
use crate::error::EngineError;
use crate::model::{ArtifactForm, Certificate};
use crate::store;
use crate::store::backup::BackupInfo;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use std::io::Write;
use std::sync::Arc;

pub async fn list(
    State(state): State<Arc<AppState>>,
    Path(fingerprint): Path<String>,
) -> ApiResult<Json<Vec<FileEntry>>> {
    let cert = state.index.get(&fingerprint).await?;
    let entries = cert
        .paths
        .iter()
        .map(|(form, path)| FileEntry {
            form: form.to_string(),
            file_name: form.file_name(),
            size: std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
        })
        .collect();
    Ok(Json(entries))
}

pub async fn download(
    State(state): State<Arc<AppState>>,
    Path((fingerprint, form)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let cert = state.index.get(&fingerprint).await?;
    let form: ArtifactForm = form.parse()?;
    let bytes = state.store.read_artifact(&cert, form)?;
    Ok(attachment(content_type(form), &download_name(&cert, form), bytes))
}

/// Download one artifact out of an archived version
pub async fn download_archived(
    State(state): State<Arc<AppState>>,
    Path((fingerprint, version, form)): Path<(String, u32, String)>,
) -> ApiResult<impl IntoResponse> {
    let cert = state.index.get(&fingerprint).await?;
    let form: ArtifactForm = form.parse()?;
    let bytes = state.store.read_archived(&cert, version, form)?;
    let name = format!("{}-v{}.{}", store::slug(&cert.name), version, form.as_str());
    Ok(attachment(content_type(form), &name, bytes))
}

/// Materialize a derived artifact form next to the canonical files
pub async fn convert(
    State(state): State<Arc<AppState>>,
    Path(fingerprint): Path<String>,
    Json(req): Json<ConvertRequest>,
) -> ApiResult<Json<FileEntry>> {
    let mut cert = state.index.get(&fingerprint).await?;
    let form: ArtifactForm = req.form.parse()?;
    if !ArtifactForm::derivable().contains(&form) {
        return Err(EngineError::invalid(format!(
            "Form '{}' is canonical and cannot be derived",
            form
        ))
        .into());
    }
    if form.needs_password() && req.password.is_none() {
        return Err(EngineError::PassphraseRequired {
            fingerprint: cert.fingerprint.clone(),
        }
        .into());
    }

    let crt_pem = state.store.read_artifact(&cert, ArtifactForm::Crt)?;
    let (x509, _) = crypto::parse_cert(&crt_pem)?;

    // The private key only goes into key-carrying and signed forms
    let key = if matches!(
        form,
        ArtifactForm::Pem | ArtifactForm::P12 | ArtifactForm::Pfx | ArtifactForm::P7b
    ) {
        let key_pem = state.store.read_artifact(&cert, ArtifactForm::Key)?;
        let passphrase = if cert.needs_passphrase {
            Some(state.vault.get(&cert.fingerprint).await.map_err(|_| {
                EngineError::PassphraseRequired {
                    fingerprint: cert.fingerprint.clone(),
                }
            })?)
        } else {
            None
        };
        Some(crypto::load_key(&key_pem, passphrase.as_deref())?)
    } else {
        None
    };

    let mut chain = Vec::new();
    for signer in state.index.path_to_root(&cert.fingerprint).await? {
        let pem = state.store.read_artifact(&signer, ArtifactForm::Crt)?;
        let (signer_x509, _) = crypto::parse_cert(&pem)?;
        chain.push(signer_x509);
    }

    let bytes = crypto::convert(
        &crypto::ConvertInput {
            cert: &x509,
            key: key.as_deref(),
            chain: &chain,
            password: req.password.as_deref(),
            friendly_name: &cert.name,
        },
        form,
    )?;

    let dir = state.store.find_dir(&cert.store_id)?;
    let path = state.store.write_artifact(&mut cert, &dir, form, &bytes)?;
    state.store.save_metadata(&cert)?;
    state.index.upsert(cert).await;

    Ok(Json(FileEntry {
        form: form.to_string(),
        file_name: form.file_name(),
        size: std::fs::metadata(&path).map(|m| m.len()).unwrap_or(bytes.len() as u64),
    }))
}

/// Zip of every materialized artifact
pub async fn bundle(
    State(state): State<Arc<AppState>>,
    Path(fingerprint): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let cert = state.index.get(&fingerprint).await?;

    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (form, _) in &cert.paths {
        let bytes = state.store.read_artifact(&cert, *form)?;
        zip.start_file(form.file_name(), options)
            .map_err(|e| EngineError::Internal(format!("Bundle write failed: {}", e)))?;
        zip.write_all(&bytes)
            .map_err(|e| EngineError::Internal(format!("Bundle write failed: {}", e)))?;
    }
    let cursor = zip
        .finish()
        .map_err(|e| EngineError::Internal(format!("Bundle write failed: {}", e)))?;

    let name = format!("{}.zip", store::slug(&cert.name));
    Ok(attachment("application/zip", &name, cursor.into_inner()))
}

pub async fn create_backup(
    State(state): State<Arc<AppState>>,
    Path(fingerprint): Path<String>,
) -> ApiResult<Json<BackupInfo>> {
    let cert = state.index.get(&fingerprint).await?;
    Ok(Json(state.store.create_backup(&cert)?))
}

pub async fn list_backups(
    State(state): State<Arc<AppState>>,
    Path(fingerprint): Path<String>,
) -> ApiResult<Json<Vec<BackupInfo>>> {
    let cert = state.index.get(&fingerprint).await?;
    Ok(Json(state.store.list_backups(&cert)?))
}

pub async fn restore_backup(
    State(state): State<Arc<AppState>>,
    Path((fingerprint, backup_id)): Path<(String, String)>,
) -> ApiResult<Json<Ack>> {
    let cert = state.index.get(&fingerprint).await?;
    let _guard = state.store.lock_for(&cert.store_id).await;
    let _held = _guard.lock().await;
    state.store.restore_backup(&cert, &backup_id)?;

    // The snapshot may carry different metadata than the index
    let restored = state.store.reload(&cert.store_id)?;
    state.index.remove(&cert.fingerprint).await;
    state.index.upsert(restored).await;
    Ok(Json(Ack::ok(format!("Backup {} restored", backup_id))))
}

pub async fn delete_backup(
    State(state): State<Arc<AppState>>,
    Path((fingerprint, backup_id)): Path<(String, String)>,
) -> ApiResult<Json<Ack>> {
    let cert = state.index.get(&fingerprint).await?;
    state.store.delete_backup(&cert, &backup_id)?;
    Ok(Json(Ack::ok(format!("Backup {} deleted", backup_id))))
}

fn attachment(
    content_type: &'static str,
    file_name: &str,
    bytes: Vec<u8>,
) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        bytes,
    )
}

fn download_name(cert: &Certificate, form: ArtifactForm) -> String {
    match form {
        ArtifactForm::Chain => format!("{}-chain.pem", store::slug(&cert.name)),
        ArtifactForm::Fullchain => format!("{}-fullchain.pem", store::slug(&cert.name)),
        other => format!("{}.{}", store::slug(&cert.name), other.as_str()),
    }
}

fn content_type(form: ArtifactForm) -> &'static str {
    match form {
        ArtifactForm::Der | ArtifactForm::Cer => "application/x-x509-ca-cert",
        ArtifactForm::P12 | ArtifactForm::Pfx => "application/x-pkcs12",
        ArtifactForm::P7b => "application/x-pkcs7-certificates",
        _ => "application/x-pem-file",
    }
}
