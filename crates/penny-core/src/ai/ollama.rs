//! Ollama backend implementation
//!
//! HTTP client for the Ollama API: `/api/generate` with a `format` schema
//! for structured output, `/api/embed` for embeddings and `images` for
//! receipt transcription.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::prompts::{PromptId, PromptLibrary};

use super::types::StructuredRequest;
use super::AIBackend;

/// Ollama backend
///
/// # Configuration
///
/// - `OLLAMA_HOST`: Server URL (default: http://localhost:11434)
/// - `OLLAMA_MODEL`: Generation model (default: llama3.2)
/// - `OLLAMA_EMBEDDING_MODEL`: Embedding model (default: nomic-embed-text)
/// - `OLLAMA_VISION_MODEL`: Vision model for receipt images (default: generation model)
#[derive(Clone)]
pub struct OllamaBackend {
    http_client: Client,
    base_url: String,
    model: String,
    embedding_model: String,
    vision_model: Option<String>,
    prompts: Arc<RwLock<PromptLibrary>>,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    pub fn new(base_url: &str, model: &str, embedding_model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            embedding_model: embedding_model.to_string(),
            vision_model: None,
            prompts: Arc::new(RwLock::new(PromptLibrary::embedded_only())),
        }
    }

    pub fn with_vision_model(mut self, model: &str) -> Self {
        self.vision_model = Some(model.to_string());
        self
    }

    pub fn with_prompts(mut self, prompts: Arc<RwLock<PromptLibrary>>) -> Self {
        self.prompts = prompts;
        self
    }

    /// Rebuild the HTTP client with a request timeout
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.http_client = Client::builder()
            .timeout(Duration::from_secs(secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        self
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::InvalidData(format!(
                "Ollama API error {}: {}",
                status, body
            )));
        }

        let body: GenerateResponse = response.json().await?;
        Ok(body.response)
    }
}

/// Request to Ollama `/api/generate`
#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

/// Response from Ollama API
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl AIBackend for OllamaBackend {
    async fn generate_json(&self, request: &StructuredRequest) -> Result<String> {
        let body = GenerateRequest {
            model: self.model.clone(),
            prompt: request.prompt.clone(),
            system: request.system.clone(),
            format: Some(request.schema.clone()),
            images: Vec::new(),
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature,
            },
        };

        let response = self.generate(&body).await?;
        debug!("Ollama response: {}", response);
        Ok(response)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .http_client
            .post(format!("{}/api/embed", self.base_url))
            .json(&EmbedRequest {
                model: &self.embedding_model,
                input: texts,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::InvalidData(format!(
                "Ollama embed error {}: {}",
                status, body
            )));
        }

        let body: EmbedResponse = response.json().await?;
        if body.embeddings.len() != texts.len() {
            return Err(Error::InvalidData(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                body.embeddings.len()
            )));
        }
        Ok(body.embeddings)
    }

    async fn extract_document_text(
        &self,
        data: &[u8],
        mime_type: &str,
        hint: Option<&str>,
    ) -> Result<String> {
        if mime_type == "application/pdf" {
            return Err(Error::Extraction(
                "PDF has no text layer and Ollama cannot read PDF documents".into(),
            ));
        }
        if !mime_type.starts_with("image/") {
            return Err(Error::UnsupportedFormat(mime_type.to_string()));
        }

        let (prompt, temperature) = {
            let mut prompts = self
                .prompts
                .write()
                .map_err(|_| Error::InvalidData("Failed to acquire prompt library lock".into()))?;
            let template = prompts.get(PromptId::OcrReceipt)?;
            let mut vars = HashMap::new();
            if let Some(hint) = hint {
                vars.insert("hint", hint);
            }
            (template.render_full(&vars), template.temperature())
        };

        let body = GenerateRequest {
            model: self.vision_model.clone().unwrap_or_else(|| self.model.clone()),
            prompt,
            system: None,
            format: None,
            images: vec![base64::engine::general_purpose::STANDARD.encode(data)],
            stream: false,
            options: GenerateOptions { temperature },
        };

        let text = self.generate(&body).await?;
        debug!(chars = text.len(), "Vision transcription complete");
        Ok(text)
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_request_serialization() {
        let request = GenerateRequest {
            model: "llama3.2".to_string(),
            prompt: "hi".to_string(),
            system: None,
            format: Some(serde_json::json!({"type": "object"})),
            images: Vec::new(),
            stream: false,
            options: GenerateOptions { temperature: 0.3 },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["format"]["type"], "object");
        assert!(json.get("images").is_none());
        assert!(json.get("system").is_none());
        assert!((json["options"]["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_pdf_is_an_extraction_error() {
        let backend = OllamaBackend::new("http://localhost:11434", "llama3.2", "nomic-embed-text");
        let err = backend
            .extract_document_text(b"%PDF-1.4", "application/pdf", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        let backend = OllamaBackend::new("http://localhost:99999", "llama3.2", "nomic-embed-text");
        assert!(!backend.health_check().await);
    }
}
