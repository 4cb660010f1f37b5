//! Test utilities for penny-core
//!
//! This module provides a mock OpenAI-compatible server for backend wire
//! tests and development without network access.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Json, State},
    http::HeaderMap,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::ai::{hashed_embedding, MOCK_EMBEDDING_DIMS};

/// Text returned for vision (image or document) chat requests
pub const MOCK_OCR_TEXT: &str = "Joe's Diner\n2025-03-01\nTotal $42.50";

/// A request the mock server received
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Clone, Default)]
struct MockState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockState {
    fn record(&self, path: &str, headers: &HeaderMap, body: &Value) {
        let authorization = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                path: path.to_string(),
                authorization,
                body: body.clone(),
            });
        }
    }
}

/// Mock OpenAI-compatible server for testing and development
pub struct MockOpenAIServer {
    addr: SocketAddr,
    state: MockState,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockOpenAIServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        let state = MockState::default();
        let app = Router::new()
            .route("/v1/models", get(handle_models))
            .route("/v1/chat/completions", post(handle_chat))
            .route("/v1/embeddings", post(handle_embeddings))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Requests received so far, oldest first
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state
            .requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockOpenAIServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Model listing (health check)
async fn handle_models() -> Json<Value> {
    Json(json!({
        "object": "list",
        "data": [{"id": "gpt-4o-mini", "object": "model"}]
    }))
}

/// Chat completions: canned JSON by schema name, OCR text for vision parts
async fn handle_chat(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.record("/v1/chat/completions", &headers, &body);

    let schema_name = body["response_format"]["json_schema"]["name"]
        .as_str()
        .unwrap_or_default();

    let content = match schema_name {
        "spending_analysis" => json!({
            "bullet_points": [
                "Eating out is the largest category at 42.50 USD.",
                "There is only one transaction so far.",
                "No other categories appear yet."
            ]
        })
        .to_string(),
        "advisor_answer" => json!({
            "response": "You spent 42.50 USD eating out.",
            "tips": ["Plan meals ahead.", "Set a dining budget."]
        })
        .to_string(),
        _ if has_attachment(&body) => MOCK_OCR_TEXT.to_string(),
        _ => "{}".to_string(),
    };

    Json(json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "model": body["model"],
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    }))
}

fn has_attachment(body: &Value) -> bool {
    body["messages"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|m| m["content"].as_array())
        .flatten()
        .any(|part| matches!(part["type"].as_str(), Some("image_url") | Some("file")))
}

#[derive(Debug, Serialize)]
struct EmbeddingItem {
    object: &'static str,
    index: usize,
    embedding: Vec<f32>,
}

/// Embeddings: deterministic hashed bag of words, returned in reverse order
/// so clients must honour `index`
async fn handle_embeddings(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.record("/v1/embeddings", &headers, &body);

    let inputs: Vec<String> = match &body["input"] {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    };

    let mut data: Vec<EmbeddingItem> = inputs
        .iter()
        .enumerate()
        .map(|(index, text)| EmbeddingItem {
            object: "embedding",
            index,
            embedding: hashed_embedding(text, MOCK_EMBEDDING_DIMS),
        })
        .collect();
    data.reverse();

    Json(json!({
        "object": "list",
        "model": body["model"],
        "data": data
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{
        generate_structured, AIBackend, OpenAICompatibleBackend, SpendingAnalysis,
        StructuredRequest,
    };

    fn backend(server: &MockOpenAIServer) -> OpenAICompatibleBackend {
        OpenAICompatibleBackend::new(&server.url(), "gpt-4o-mini", "text-embedding-3-small")
            .with_api_key("sk-test")
    }

    #[tokio::test]
    async fn test_mock_server_health() {
        let server = MockOpenAIServer::start().await;
        assert!(backend(&server).health_check().await);
    }

    #[tokio::test]
    async fn test_structured_generation_over_http() {
        let server = MockOpenAIServer::start().await;
        let backend = backend(&server);

        let request = StructuredRequest::for_output::<SpendingAnalysis>(
            Some("system".into()),
            "question".into(),
            0.2,
        )
        .unwrap();
        let analysis: SpendingAnalysis = generate_structured(&backend, &request).await.unwrap();
        assert_eq!(analysis.bullet_points.len(), 3);

        let recorded = server.requests();
        let chat = recorded
            .iter()
            .find(|r| r.path == "/v1/chat/completions")
            .unwrap();
        assert_eq!(chat.authorization.as_deref(), Some("Bearer sk-test"));
        assert_eq!(chat.body["response_format"]["type"], "json_schema");
        assert_eq!(chat.body["messages"][0]["role"], "system");
        assert_eq!(chat.body["messages"][1]["content"], "question");
    }

    #[tokio::test]
    async fn test_embeddings_follow_index() {
        let server = MockOpenAIServer::start().await;
        let texts = vec!["coffee".to_string(), "rent".to_string()];
        let vectors = backend(&server).embed(&texts).await.unwrap();

        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], hashed_embedding("coffee", MOCK_EMBEDDING_DIMS));
        assert_eq!(vectors[1], hashed_embedding("rent", MOCK_EMBEDDING_DIMS));
    }

    #[tokio::test]
    async fn test_vision_document_request() {
        let server = MockOpenAIServer::start().await;
        let text = backend(&server)
            .extract_document_text(b"%PDF-1.4", "application/pdf", Some("scan.pdf"))
            .await
            .unwrap();
        assert_eq!(text, MOCK_OCR_TEXT);

        let recorded = server.requests();
        let parts = recorded[0].body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(parts[0]["type"], "text");
        assert!(parts[0]["text"].as_str().unwrap().contains("scan.pdf"));
        assert_eq!(parts[1]["type"], "file");
        assert!(parts[1]["file"]["file_data"]
            .as_str()
            .unwrap()
            .starts_with("data:application/pdf;base64,"));
    }
}
