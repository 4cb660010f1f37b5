//! Transaction handlers

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::{AppError, AppState, StatusResponse};
use penny_core::models::Transaction;

/// Query parameters for listing transactions
#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    /// Only the most recent `limit` transactions
    pub limit: Option<usize>,
}

/// GET /transactions - List transactions in log order
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    let mut transactions = state.penny.transactions()?;

    if let Some(limit) = query.limit {
        let skip = transactions.len().saturating_sub(limit);
        transactions.drain(..skip);
    }

    Ok(Json(transactions))
}

/// POST /reset_data - Clear the ledger and the retrieval index
pub async fn reset_data(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, AppError> {
    state.penny.reset().await?;
    info!("Data reset via API");
    Ok(Json(StatusResponse::ok("All transaction data cleared")))
}
