//! Integration tests for penny-core
//!
//! These tests exercise the full ingest → index → ask workflow against the
//! mock AI backend, including recovery of the retrieval index from the
//! transaction ledger.

use std::fs;

use penny_core::{
    ai::MockBackend,
    config::Settings,
    index::INDEX_DIR,
    ledger::LEDGER_FILE,
    models::Category,
    AIClient, Error, Penny,
};
use tempfile::TempDir;

fn open(dir: &TempDir) -> Penny {
    let settings = Settings::defaults(dir.path().to_path_buf());
    Penny::with_client(settings, AIClient::mock()).expect("Failed to open data directory")
}

const DINER: &str = "Joe's Diner\n2025-03-01\nTotal $42.50";
const RIDE: &str = "Uber Trip\n2025-03-02\nTotal $18.20";
const STREAMING: &str = "Netflix\n2025-03-05\nAmount due 15.49";

// =============================================================================
// Ingest Workflow
// =============================================================================

#[tokio::test]
async fn test_receipt_to_answer_workflow() {
    let dir = TempDir::new().unwrap();
    let penny = open(&dir);

    for text in [DINER, RIDE, STREAMING] {
        penny.ingest_text(text).await.expect("Failed to ingest");
    }

    let transactions = penny.transactions().unwrap();
    let categories: Vec<Category> = transactions.iter().map(|t| t.category).collect();
    assert_eq!(
        categories,
        vec![Category::EatingOut, Category::Transport, Category::Subscription]
    );

    let ledger = fs::read_to_string(dir.path().join(LEDGER_FILE)).unwrap();
    assert_eq!(ledger.lines().count(), 3);

    let outcome = penny.ask("How much did I spend eating out?").await.unwrap();
    assert!(outcome.retrieved_context.contains("Joe's Diner"));
    assert!(outcome.retrieved_context.contains("Uber Trip"));
    assert_eq!(outcome.analysis_points.len(), 3);
    assert_eq!(outcome.tips.len(), 2);
    assert!(outcome.answer.contains("\n\nTips:\n- "));
}

#[tokio::test]
async fn test_upload_plain_text_receipt() {
    let dir = TempDir::new().unwrap();
    let penny = open(&dir);

    let outcome = penny
        .upload_receipt(DINER.as_bytes(), Some("text/plain"), Some("diner.txt"))
        .await
        .unwrap();

    assert_eq!(outcome.ocr_text, DINER);
    assert_eq!(outcome.parsed_transaction.amount, Some(42.50));
    assert_eq!(outcome.parsed_transaction.currency, "USD");
}

#[tokio::test]
async fn test_empty_upload_stores_nothing() {
    let dir = TempDir::new().unwrap();
    let penny = open(&dir);

    let err = penny
        .upload_receipt(b"   ", Some("text/plain"), Some("blank.txt"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::EmptyInput(_)));
    assert!(penny.transactions().unwrap().is_empty());
}

// =============================================================================
// Persistence and Recovery
// =============================================================================

#[tokio::test]
async fn test_data_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let stored = {
        let penny = open(&dir);
        penny.ingest_text(DINER).await.unwrap();
        penny.ingest_text(RIDE).await.unwrap();
        penny.transactions().unwrap()
    };

    let penny = open(&dir);
    assert_eq!(penny.transactions().unwrap(), stored);

    let status = penny.status().await.unwrap();
    assert_eq!(status.transactions, 2);
    assert_eq!(status.indexed_records, 2);
}

#[tokio::test]
async fn test_corrupt_snapshot_rebuilds_from_ledger() {
    let dir = TempDir::new().unwrap();
    {
        let penny = open(&dir);
        penny.ingest_text(DINER).await.unwrap();
        penny.ingest_text(STREAMING).await.unwrap();
    }

    fs::write(dir.path().join(INDEX_DIR).join("index.json"), "not json").unwrap();

    let penny = open(&dir);
    let outcome = penny.ask("What subscriptions do I pay for?").await.unwrap();
    assert!(outcome.retrieved_context.contains("Netflix"));
    assert_eq!(penny.status().await.unwrap().indexed_records, 2);
}

#[tokio::test]
async fn test_missing_snapshot_rebuilds_from_ledger() {
    let dir = TempDir::new().unwrap();
    {
        let penny = open(&dir);
        penny.ingest_text(RIDE).await.unwrap();
    }

    fs::remove_dir_all(dir.path().join(INDEX_DIR)).unwrap();

    let penny = open(&dir);
    assert_eq!(penny.status().await.unwrap().indexed_records, 1);
    assert!(dir.path().join(INDEX_DIR).join("index.json").exists());
}

#[tokio::test]
async fn test_index_failure_recovers_on_next_open() {
    let dir = TempDir::new().unwrap();
    {
        let settings = Settings::defaults(dir.path().to_path_buf());
        let failing = AIClient::Mock(MockBackend::new().with_failing_embeddings());
        let penny = Penny::with_client(settings, failing).unwrap();
        let outcome = penny.ingest_text(DINER).await.unwrap();
        assert!(!outcome.indexed);
    }

    let penny = open(&dir);
    assert_eq!(penny.transactions().unwrap().len(), 1);
    assert_eq!(penny.status().await.unwrap().indexed_records, 1);
}

#[tokio::test]
async fn test_reset_clears_everything() {
    let dir = TempDir::new().unwrap();
    let penny = open(&dir);
    penny.ingest_text(DINER).await.unwrap();

    penny.reset().await.unwrap();
    penny.reset().await.unwrap();

    assert!(penny.transactions().unwrap().is_empty());
    assert!(!dir.path().join(INDEX_DIR).join("index.json").exists());

    // Only the placeholder remains retrievable
    let outcome = penny.ask("Where did my money go?").await.unwrap();
    assert!(!outcome.retrieved_context.contains("Joe's Diner"));
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_config_file_and_env_layering() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("config.toml"),
        "[ai]\nbackend = \"ollama\"\nollama_model = \"llama3.1\"\n\n[retrieval]\ntop_k = 3\n",
    )
    .unwrap();

    let settings = Settings::load_with(Some(dir.path().to_path_buf()), |key| match key {
        "OLLAMA_MODEL" => Some("qwen2.5".to_string()),
        _ => None,
    })
    .unwrap();

    assert_eq!(settings.ai.backend.as_str(), "ollama");
    assert_eq!(settings.ai.ollama_model, "qwen2.5");
    assert_eq!(settings.retrieval.top_k, 3);
}
