//! Pluggable AI backend abstraction
//!
//! This module provides a backend-agnostic interface for the three things
//! Penny asks of a model: schema-constrained JSON generation, text
//! embeddings, and receipt transcription from images or documents.
//!
//! # Architecture
//!
//! - `AIBackend` trait: defines the interface for all AI operations
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OpenAICompatibleBackend`, `OllamaBackend`, `MockBackend`
//!
//! # Usage
//!
//! ```rust,ignore
//! let settings = Settings::load(None)?;
//! let ai = AIClient::from_settings(&settings.ai);
//!
//! let request = StructuredRequest::for_output::<SpendingAnalysis>(None, prompt, 0.2)?;
//! let analysis: SpendingAnalysis = generate_structured(&ai, &request).await?;
//! ```

mod mock;
mod ollama;
mod openai_compatible;
pub mod parsing;
pub mod types;

pub use mock::{hashed_embedding, MockBackend, MOCK_EMBEDDING_DIMS};
pub use ollama::OllamaBackend;
pub use openai_compatible::OpenAICompatibleBackend;
pub use types::*;

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;

use crate::config::{AiSettings, BackendKind};
use crate::error::Result;
use crate::prompts::PromptLibrary;

/// Trait defining the interface for all AI backends
///
/// Backends should be Send + Sync to allow use across async tasks.
#[async_trait]
pub trait AIBackend: Send + Sync {
    /// Generate text constrained to `request.schema`
    ///
    /// Returns the raw model output; use [`generate_structured`] to parse
    /// and validate it.
    async fn generate_json(&self, request: &StructuredRequest) -> Result<String>;

    /// Embed each input text, preserving order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Transcribe a receipt image or document with a vision model
    async fn extract_document_text(
        &self,
        data: &[u8],
        mime_type: &str,
        hint: Option<&str>,
    ) -> Result<String>;

    /// Check if the backend is available
    async fn health_check(&self) -> bool;

    /// Generation model name
    fn model(&self) -> &str;

    /// Embedding model name (recorded in index snapshots)
    fn embedding_model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Run a structured generation call and parse its output into `T`
pub async fn generate_structured<T, B>(backend: &B, request: &StructuredRequest) -> Result<T>
where
    T: StructuredOutput,
    B: AIBackend + ?Sized,
{
    let raw = backend.generate_json(request).await?;
    debug!(name = %request.name, "Structured response: {}", raw);
    parsing::parse_structured(&raw)
}

/// Concrete AI client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
/// All variants implement the same AIBackend operations.
#[derive(Clone)]
pub enum AIClient {
    /// OpenAI or any server implementing its chat/embeddings API
    OpenAICompatible(OpenAICompatibleBackend),
    /// Ollama backend (HTTP API)
    Ollama(OllamaBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl AIClient {
    /// Build a client from resolved settings
    ///
    /// Never fails: a missing API key surfaces on the first call instead.
    pub fn from_settings(settings: &AiSettings) -> Self {
        match settings.backend {
            BackendKind::OpenAICompatible => {
                let mut backend = OpenAICompatibleBackend::new(
                    &settings.openai_base_url,
                    &settings.openai_model,
                    &settings.openai_embedding_model,
                )
                .with_timeout(settings.request_timeout_secs);
                if let Some(ref key) = settings.openai_api_key {
                    backend = backend.with_api_key(key);
                }
                if let Some(ref vision) = settings.openai_vision_model {
                    backend = backend.with_vision_model(vision);
                }
                AIClient::OpenAICompatible(backend)
            }
            BackendKind::Ollama => {
                let mut backend = OllamaBackend::new(
                    &settings.ollama_host,
                    &settings.ollama_model,
                    &settings.ollama_embedding_model,
                )
                .with_timeout(settings.request_timeout_secs);
                if let Some(ref vision) = settings.ollama_vision_model {
                    backend = backend.with_vision_model(vision);
                }
                AIClient::Ollama(backend)
            }
            BackendKind::Mock => AIClient::Mock(MockBackend::new()),
        }
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }

    /// Share a prompt library with the backend (used for OCR prompts)
    pub fn with_prompts(self, prompts: Arc<RwLock<PromptLibrary>>) -> Self {
        match self {
            AIClient::OpenAICompatible(b) => AIClient::OpenAICompatible(b.with_prompts(prompts)),
            AIClient::Ollama(b) => AIClient::Ollama(b.with_prompts(prompts)),
            AIClient::Mock(b) => AIClient::Mock(b),
        }
    }

    /// Backend name for status output
    pub fn kind(&self) -> &'static str {
        match self {
            AIClient::OpenAICompatible(_) => "openai_compatible",
            AIClient::Ollama(_) => "ollama",
            AIClient::Mock(_) => "mock",
        }
    }
}

// Implement AIBackend for AIClient by delegating to the inner backend
#[async_trait]
impl AIBackend for AIClient {
    async fn generate_json(&self, request: &StructuredRequest) -> Result<String> {
        match self {
            AIClient::OpenAICompatible(b) => b.generate_json(request).await,
            AIClient::Ollama(b) => b.generate_json(request).await,
            AIClient::Mock(b) => b.generate_json(request).await,
        }
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match self {
            AIClient::OpenAICompatible(b) => b.embed(texts).await,
            AIClient::Ollama(b) => b.embed(texts).await,
            AIClient::Mock(b) => b.embed(texts).await,
        }
    }

    async fn extract_document_text(
        &self,
        data: &[u8],
        mime_type: &str,
        hint: Option<&str>,
    ) -> Result<String> {
        match self {
            AIClient::OpenAICompatible(b) => b.extract_document_text(data, mime_type, hint).await,
            AIClient::Ollama(b) => b.extract_document_text(data, mime_type, hint).await,
            AIClient::Mock(b) => b.extract_document_text(data, mime_type, hint).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AIClient::OpenAICompatible(b) => b.health_check().await,
            AIClient::Ollama(b) => b.health_check().await,
            AIClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.model(),
            AIClient::Ollama(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn embedding_model(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.embedding_model(),
            AIClient::Ollama(b) => b.embedding_model(),
            AIClient::Mock(b) => b.embedding_model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.host(),
            AIClient::Ollama(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }
}
