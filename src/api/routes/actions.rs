// Deployment action CRUD, testing and full dispatch

use crate::api::models::error::ApiResult;
use crate::api::models::request::{CreateActionRequest, DispatchQuery, TestActionRequest};
use crate::api::models::response::Ack;
use crate::api::state::AppState;
use crate::error::EngineError;
use crate::model::action::{ActionResult, DeployAction};
use crate::model::{DispatchMode, DispatchReport};
use axum::extract::{Path, Query, State};
use axum::Json;
use std::sync::Arc;

pub async fn list(
    State(state): State<Arc<AppState>>,
    Path(fingerprint): Path<String>,
) -> ApiResult<Json<Vec<DeployAction>>> {
    let cert = state.index.get(&fingerprint).await?;
    Ok(Json(cert.deployment_actions))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Path(fingerprint): Path<String>,
    Json(req): Json<CreateActionRequest>,
) -> ApiResult<Json<DeployAction>> {
    let mut cert = state.index.get(&fingerprint).await?;
    let mut action = DeployAction::new(req.name, req.config);
    action.requires_previous = req.requires_previous;
    action.timeout_secs = req.timeout_secs;

    cert.deployment_actions.push(action.clone());
    state.store.save_metadata(&cert)?;
    state.index.upsert(cert).await;
    Ok(Json(action))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path((fingerprint, action_id)): Path<(String, String)>,
    Json(req): Json<CreateActionRequest>,
) -> ApiResult<Json<DeployAction>> {
    let mut cert = state.index.get(&fingerprint).await?;
    let action = cert
        .deployment_actions
        .iter_mut()
        .find(|a| a.id == action_id)
        .ok_or_else(|| EngineError::not_found(format!("Action {}", action_id)))?;

    action.name = req.name;
    action.requires_previous = req.requires_previous;
    action.timeout_secs = req.timeout_secs;
    action.config = req.config;
    let updated = action.clone();

    state.store.save_metadata(&cert)?;
    state.index.upsert(cert).await;
    Ok(Json(updated))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path((fingerprint, action_id)): Path<(String, String)>,
) -> ApiResult<Json<Ack>> {
    let mut cert = state.index.get(&fingerprint).await?;
    let before = cert.deployment_actions.len();
    cert.deployment_actions.retain(|a| a.id != action_id);
    if cert.deployment_actions.len() == before {
        return Err(EngineError::not_found(format!("Action {}", action_id)).into());
    }

    state.store.save_metadata(&cert)?;
    state.index.upsert(cert).await;
    Ok(Json(Ack::ok("Action deleted")))
}

/// Run one action in isolation. Defaults to simulate; `{"liveMode": true}`
/// runs it for real.
pub async fn test(
    State(state): State<Arc<AppState>>,
    Path((fingerprint, action_id)): Path<(String, String)>,
    body: Option<Json<TestActionRequest>>,
) -> ApiResult<Json<ActionResult>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let mode = if req.live_mode {
        DispatchMode::Live
    } else {
        DispatchMode::Simulate
    };
    Ok(Json(
        state.dispatcher.run_single(&fingerprint, &action_id, mode).await?,
    ))
}

/// Run the full action list in declared order
pub async fn deploy(
    State(state): State<Arc<AppState>>,
    Path(fingerprint): Path<String>,
    Query(query): Query<DispatchQuery>,
) -> ApiResult<Json<DispatchReport>> {
    let mode = if query.live {
        DispatchMode::Live
    } else {
        DispatchMode::Simulate
    };
    Ok(Json(state.dispatcher.run(&fingerprint, mode).await?))
}
