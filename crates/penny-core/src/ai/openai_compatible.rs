//! OpenAI-compatible backend implementation
//!
//! Works with the OpenAI API and any server that implements its chat
//! completions and embeddings endpoints (vLLM, LocalAI, llama-server, ...).
//!
//! # Configuration
//!
//! Environment variables (see `config`):
//! - `OPENAI_BASE_URL`: Server URL (default: https://api.openai.com)
//! - `OPENAI_MODEL`: Generation model (default: gpt-4o-mini)
//! - `OPENAI_EMBEDDING_MODEL`: Embedding model (default: text-embedding-3-small)
//! - `OPENAI_VISION_MODEL`: Model for receipt transcription (default: generation model)
//! - `OPENAI_API_KEY`: API key, required by api.openai.com

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::prompts::{PromptId, PromptLibrary};

use super::types::StructuredRequest;
use super::AIBackend;

const HOSTED_API: &str = "api.openai.com";

/// OpenAI-compatible backend
///
/// # Example
///
/// ```rust,ignore
/// // Hosted OpenAI
/// export OPENAI_API_KEY="sk-..."
///
/// // vLLM
/// export AI_BACKEND=openai_compatible
/// export OPENAI_BASE_URL="http://192.168.1.100:8000"
/// export OPENAI_MODEL="meta-llama/Llama-3.2-3B-Instruct"
/// ```
#[derive(Clone)]
pub struct OpenAICompatibleBackend {
    http_client: Client,
    base_url: String,
    model: String,
    embedding_model: String,
    vision_model: Option<String>,
    api_key: Option<String>,
    prompts: Arc<RwLock<PromptLibrary>>,
}

impl OpenAICompatibleBackend {
    /// Create a new OpenAI-compatible backend
    pub fn new(base_url: &str, model: &str, embedding_model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            embedding_model: embedding_model.to_string(),
            vision_model: None,
            api_key: None,
            prompts: Arc::new(RwLock::new(PromptLibrary::embedded_only())),
        }
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
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

    /// Attach the bearer token, or fail if the hosted API has none
    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder> {
        match self.api_key {
            Some(ref api_key) => Ok(builder.header("Authorization", format!("Bearer {}", api_key))),
            None if self.base_url.contains(HOSTED_API) => Err(Error::NotConfigured(
                "OPENAI_API_KEY is not set".into(),
            )),
            None => Ok(builder),
        }
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<Response> {
        let builder = self
            .http_client
            .post(format!("{}{}", self.base_url, path))
            .json(body);
        let response = self.authorized(builder)?.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::InvalidData(format!(
                "OpenAI API error {}: {}",
                status, body
            )));
        }
        Ok(response)
    }

    /// Make a chat completion request and return the first choice's text
    async fn chat_completion(&self, request: &ChatCompletionRequest) -> Result<String> {
        let response = self.post("/v1/chat/completions", request).await?;
        let chat_response: ChatCompletionResponse = response.json().await?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::InvalidData("No response from OpenAI API".into()))
    }

    fn ocr_prompt(&self, hint: Option<&str>) -> Result<(String, f32)> {
        let mut prompts = self
            .prompts
            .write()
            .map_err(|_| Error::InvalidData("Failed to acquire prompt library lock".into()))?;
        let template = prompts.get(PromptId::OcrReceipt)?;
        let mut vars = HashMap::new();
        if let Some(hint) = hint {
            vars.insert("hint", hint);
        }
        Ok((template.render_full(&vars), template.temperature()))
    }
}

/// OpenAI chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    stream: bool,
}

/// Chat message
#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: ChatContent,
}

/// Chat message content (text or multimodal)
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ChatContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// Content part for multimodal messages
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
    #[serde(rename = "file")]
    File { file: FileData },
}

/// Image URL for vision requests
#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

/// Inline document for vision requests
#[derive(Debug, Serialize)]
struct FileData {
    filename: String,
    file_data: String,
}

/// `response_format` for schema-constrained output
#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
    json_schema: JsonSchemaFormat,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat {
    name: String,
    schema: serde_json::Value,
    /// Strict mode rejects `minItems`/`maxItems`; cardinality is checked after parsing
    strict: bool,
}

/// OpenAI chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

/// Chat completion choice
#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

/// Chat response message
#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl AIBackend for OpenAICompatibleBackend {
    async fn generate_json(&self, request: &StructuredRequest) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: ChatContent::Text(system.clone()),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: ChatContent::Text(request.prompt.clone()),
        });

        let chat = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(request.temperature),
            max_tokens: None,
            response_format: Some(ResponseFormat {
                kind: "json_schema".to_string(),
                json_schema: JsonSchemaFormat {
                    name: request.name.clone(),
                    schema: request.schema.clone(),
                    strict: false,
                },
            }),
            stream: false,
        };

        let response = self.chat_completion(&chat).await?;
        debug!("OpenAI-compatible response: {}", response);
        Ok(response)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: texts,
        };
        let response = self.post("/v1/embeddings", &request).await?;
        let mut body: EmbeddingResponse = response.json().await?;

        if body.data.len() != texts.len() {
            return Err(Error::InvalidData(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                body.data.len()
            )));
        }
        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }

    async fn extract_document_text(
        &self,
        data: &[u8],
        mime_type: &str,
        hint: Option<&str>,
    ) -> Result<String> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(data);
        let attachment = if mime_type == "application/pdf" {
            ContentPart::File {
                file: FileData {
                    filename: "receipt.pdf".to_string(),
                    file_data: format!("data:application/pdf;base64,{}", encoded),
                },
            }
        } else if mime_type.starts_with("image/") {
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:{};base64,{}", mime_type, encoded),
                },
            }
        } else {
            return Err(Error::UnsupportedFormat(mime_type.to_string()));
        };

        let (prompt, temperature) = self.ocr_prompt(hint)?;
        let request = ChatCompletionRequest {
            model: self.vision_model.clone().unwrap_or_else(|| self.model.clone()),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: ChatContent::Parts(vec![ContentPart::Text { text: prompt }, attachment]),
            }],
            temperature: Some(temperature),
            max_tokens: Some(4096),
            response_format: None,
            stream: false,
        };

        let text = self.chat_completion(&request).await?;
        debug!(chars = text.len(), "Vision transcription complete");
        Ok(text)
    }

    async fn health_check(&self) -> bool {
        let builder = self.http_client.get(format!("{}/v1/models", self.base_url));
        let Ok(builder) = self.authorized(builder) else {
            return false;
        };
        match builder.send().await {
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
