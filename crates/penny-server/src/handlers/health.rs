//! Liveness and status handlers

use std::sync::Arc;

use axum::{extract::State, Json};

use crate::{AppError, AppState, StatusResponse};
use penny_core::PennyStatus;

/// GET / - Liveness check
pub async fn root() -> Json<StatusResponse> {
    Json(StatusResponse::ok("Penny backend is running"))
}

/// GET /status - Data and backend status
pub async fn status(State(state): State<Arc<AppState>>) -> Result<Json<PennyStatus>, AppError> {
    Ok(Json(state.penny.status().await?))
}
