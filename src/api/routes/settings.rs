// Global deployment settings, stored as named categories in one JSON file

use crate::api::models::error::ApiResult;
use crate::api::models::response::Ack;
use crate::api::state::AppState;
use crate::error::EngineError;
use axum::extract::{Path, State};
use axum::Json;
use serde_json::{Map, Value};
use std::sync::Arc;

pub async fn get_all(State(state): State<Arc<AppState>>) -> ApiResult<Json<Map<String, Value>>> {
    Ok(Json(state.load_deploy_settings().await?))
}

pub async fn put_all(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<Map<String, Value>>,
) -> ApiResult<Json<Ack>> {
    state.save_deploy_settings(settings).await?;
    Ok(Json(Ack::ok("Deployment settings saved")))
}

pub async fn get_category(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
) -> ApiResult<Json<Value>> {
    let settings = state.load_deploy_settings().await?;
    let value = settings
        .get(&category)
        .cloned()
        .ok_or_else(|| EngineError::not_found(format!("Settings category '{}'", category)))?;
    Ok(Json(value))
}

pub async fn put_category(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
    Json(value): Json<Value>,
) -> ApiResult<Json<Ack>> {
    let mut settings = state.load_deploy_settings().await?;
    settings.insert(category.clone(), value);
    state.save_deploy_settings(settings).await?;
    Ok(Json(Ack::ok(format!("Settings category '{}' saved", category))))
}

pub async fn delete_category(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
) -> ApiResult<Json<Ack>> {
    let mut settings = state.load_deploy_settings().await?;
    if settings.remove(&category).is_none() {
        return Err(EngineError::not_found(format!("Settings category '{}'", category)).into());
    }
    state.save_deploy_settings(settings).await?;
    Ok(Json(Ack::ok(format!("Settings category '{}' removed", category))))
}
