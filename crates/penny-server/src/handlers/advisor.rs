//! Finance question handlers

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::{AppError, AppState};
use penny_core::AdvisorOutcome;

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

/// POST /ask - Answer a question from transaction history
pub async fn ask(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AdvisorOutcome>, AppError> {
    let outcome = state.penny.ask(&req.question).await?;
    Ok(Json(outcome))
}
