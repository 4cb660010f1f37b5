//! Penny Core Library
//!
//! Shared functionality for the Penny receipt and finance assistant:
//! - Heuristic receipt parsing (amount, date, merchant, currency, category)
//! - Append-only transaction ledger
//! - Embedding-based retrieval index with on-disk snapshots
//! - Pluggable AI backends (OpenAI-compatible, Ollama, mock)
//! - Prompt library for customizable AI prompts
//! - Three-stage advisor pipeline (retrieve, analyze, answer)
//! - Text extraction from text, PDF and image uploads

pub mod advisor;
pub mod ai;
pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod ledger;
pub mod models;
pub mod ocr;
pub mod prompts;
pub mod receipt;

/// Test utilities including mock OpenAI-compatible server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use advisor::{aggregate_retrieved, Advisor, AdvisorOutcome, AdvisorState};
pub use ai::{
    AIBackend, AIClient, AdvisorAnswer, MockBackend, OllamaBackend, OpenAICompatibleBackend,
    SpendingAnalysis, StructuredRequest,
};
pub use classify::{categorize, detect_currency};
pub use config::{BackendKind, Settings};
pub use error::{Error, Result};
pub use extract::{extract_date, extract_merchant, extract_total_amount};
pub use index::{IndexRecord, IndexService, RecordMetadata, ScoredRecord, VectorStore};
pub use ingest::{IngestOutcome, Penny, PennyStatus};
pub use ledger::Ledger;
pub use models::{Category, Currency, ParsedFields, Transaction};
pub use prompts::{PromptId, PromptLibrary};
pub use receipt::parse_receipt;
