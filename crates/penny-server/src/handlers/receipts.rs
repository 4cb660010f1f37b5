//! Receipt upload handlers

use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    Json,
};
use tracing::debug;

use crate::{AppError, AppState};
use penny_core::IngestOutcome;

/// Multipart field carrying the receipt
const FILE_FIELD: &str = "file";

/// POST /upload_receipt - Extract, parse, store and index a receipt
///
/// Expects a multipart body with the receipt in the `file` field.
pub async fn upload_receipt(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<IngestOutcome>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(&format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some(FILE_FIELD) {
            debug!(field = ?field.name(), "Ignoring multipart field");
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|_| AppError::bad_request("Failed to read upload (max 10MB)"))?;

        if data.is_empty() {
            return Err(AppError::bad_request("Uploaded file is empty"));
        }

        let outcome = state
            .penny
            .upload_receipt(&data, content_type.as_deref(), filename.as_deref())
            .await?;
        return Ok(Json(outcome));
    }

    Err(AppError::bad_request("No file provided (expected field 'file')"))
}
