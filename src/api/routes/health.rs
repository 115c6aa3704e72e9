// Health check

use crate::api::models::response::HealthResponse;
use crate::api::state::AppState;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        certificates: state.index.len().await,
        vault_sealed: state.vault.is_sealed(),
    })
}
