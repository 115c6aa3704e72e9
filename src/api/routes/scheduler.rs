// Renewal scheduler control

use crate::api::models::error::ApiResult;
use crate::api::models::response::Ack;
use crate::api::state::AppState;
use crate::config::SchedulerSettings;
use crate::renewal::{SchedulerStatus, SweepReport};
use axum::extract::State;
use axum::Json;
use std::sync::Arc;

pub async fn status(State(state): State<Arc<AppState>>) -> Json<SchedulerStatus> {
    Json(state.scheduler.status().await)
}

pub async fn get_settings(State(state): State<Arc<AppState>>) -> Json<SchedulerSettings> {
    Json(state.scheduler.settings().await)
}

pub async fn put_settings(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<SchedulerSettings>,
) -> ApiResult<Json<Ack>> {
    state.scheduler.update_settings(settings).await?;
    Ok(Json(Ack::ok("Scheduler settings saved")))
}

/// Run one sweep immediately and return its report
pub async fn run_now(State(state): State<Arc<AppState>>) -> Json<SweepReport> {
    Json(state.scheduler.run_now().await)
}

pub async fn last_report(State(state): State<Arc<AppState>>) -> Json<Option<SweepReport>> {
    Json(state.scheduler.last_report().await)
}
