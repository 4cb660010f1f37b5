//! Mock backend for testing
//!
//! Provides scripted generation responses and deterministic embeddings.
//! Useful for unit tests and development without a running model server.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

use super::types::StructuredRequest;
use super::AIBackend;

/// Dimension of mock embeddings
pub const MOCK_EMBEDDING_DIMS: usize = 64;

/// Mock AI backend for testing
///
/// Generation returns queued responses first, then a canned valid payload
/// for the request's schema name. Embeddings are a hashed bag of words, so
/// texts sharing words score higher under cosine similarity.
#[derive(Clone, Default)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    responses: Arc<Mutex<VecDeque<Result<String>>>>,
    requests: Arc<Mutex<Vec<StructuredRequest>>>,
    ocr_text: Option<String>,
    fail_embeddings: bool,
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            ..Default::default()
        }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self::default()
    }

    /// Text returned by `extract_document_text`
    pub fn with_ocr_text(mut self, text: &str) -> Self {
        self.ocr_text = Some(text.to_string());
        self
    }

    /// Make every `embed` call fail
    pub fn with_failing_embeddings(mut self) -> Self {
        self.fail_embeddings = true;
        self
    }

    /// Queue a raw response for the next generation call
    pub fn push_response(&self, response: &str) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Ok(response.to_string()));
        }
    }

    /// Queue a failure for the next generation call
    pub fn push_error(&self, message: &str) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Err(Error::InvalidData(message.to_string())));
        }
    }

    /// Every generation request seen so far
    pub fn requests(&self) -> Vec<StructuredRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn canned_response(name: &str) -> String {
        match name {
            "spending_analysis" => serde_json::json!({
                "bullet_points": [
                    "Most of the retrieved spending is on eating out.",
                    "Grocery purchases are smaller but regular.",
                    "No other categories stand out."
                ]
            })
            .to_string(),
            "advisor_answer" => serde_json::json!({
                "response": "You spent most of your money on eating out.",
                "tips": [
                    "Set a weekly dining budget.",
                    "Cook at home a few more nights."
                ]
            })
            .to_string(),
            _ => "{}".to_string(),
        }
    }
}

/// Hashed bag-of-words embedding, L2-normalized
pub fn hashed_embedding(text: &str, dims: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dims];

    for token in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let digest = Sha256::digest(token.as_bytes());
        let mut bucket = [0u8; 8];
        bucket.copy_from_slice(&digest[..8]);
        let idx = (u64::from_le_bytes(bucket) % dims as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[idx] += sign;
    }

    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
    vector
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn generate_json(&self, request: &StructuredRequest) -> Result<String> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }

        let queued = self
            .responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());

        match queued {
            Some(response) => response,
            None => Ok(Self::canned_response(&request.name)),
        }
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail_embeddings {
            return Err(Error::InvalidData("Mock embedding failure".into()));
        }
        Ok(texts
            .iter()
            .map(|t| hashed_embedding(t, MOCK_EMBEDDING_DIMS))
            .collect())
    }

    async fn extract_document_text(
        &self,
        _data: &[u8],
        _mime_type: &str,
        _hint: Option<&str>,
    ) -> Result<String> {
        self.ocr_text
            .clone()
            .ok_or_else(|| Error::Extraction("Mock backend has no OCR text configured".into()))
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn embedding_model(&self) -> &str {
        "mock-embedding"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}
