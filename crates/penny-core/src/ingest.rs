//! Penny service: ingest receipts, answer questions
//!
//! Owns the ledger, retrieval index, AI client and prompt library for one
//! data directory. Persistence follows "log first": a transaction is
//! durable once it is in the ledger, and the index is a cache that can be
//! rebuilt from it at any time.

use std::sync::{Arc, RwLock};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::advisor::{Advisor, AdvisorOutcome};
use crate::ai::{AIBackend, AIClient};
use crate::config::Settings;
use crate::error::Result;
use crate::index::IndexService;
use crate::ledger::Ledger;
use crate::models::Transaction;
use crate::ocr;
use crate::prompts::PromptLibrary;
use crate::receipt::parse_receipt;

/// Result of ingesting one receipt
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub ocr_text: String,
    pub parsed_transaction: Transaction,
    /// False when the transaction is logged but not yet indexed
    #[serde(skip)]
    pub indexed: bool,
}

/// Counts for status output
#[derive(Debug, Clone, Serialize)]
pub struct PennyStatus {
    pub data_dir: String,
    pub transactions: usize,
    pub indexed_records: usize,
    pub backend: String,
    pub model: String,
    pub embedding_model: String,
    pub host: String,
    pub backend_healthy: bool,
}

/// SHA-256 hex digest of uploaded bytes
pub fn fingerprint(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Today's date as `YYYY-MM-DD`
fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// The Penny application service
pub struct Penny {
    settings: Settings,
    ledger: Arc<Ledger>,
    index: IndexService,
    ai: AIClient,
    prompts: Arc<RwLock<PromptLibrary>>,
}

impl Penny {
    /// Open the data directory named in `settings`, with a client built from them
    pub fn open(settings: Settings) -> Result<Self> {
        let ai = AIClient::from_settings(&settings.ai);
        Self::with_client(settings, ai)
    }

    /// Open with an explicit AI client
    pub fn with_client(settings: Settings, ai: AIClient) -> Result<Self> {
        let prompts = Arc::new(RwLock::new(PromptLibrary::for_data_dir(&settings.data_dir)));
        let ai = ai.with_prompts(prompts.clone());
        let ledger = Arc::new(Ledger::open(settings.ledger_path())?);
        let index = IndexService::new(settings.index_dir(), ai.clone(), ledger.clone());

        info!(
            data_dir = %settings.data_dir.display(),
            backend = ai.kind(),
            "Opened Penny data directory"
        );

        Ok(Self {
            settings,
            ledger,
            index,
            ai,
            prompts,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn ai(&self) -> &AIClient {
        &self.ai
    }

    /// Extract, parse, log and index an uploaded receipt
    pub async fn upload_receipt(
        &self,
        data: &[u8],
        content_type: Option<&str>,
        filename: Option<&str>,
    ) -> Result<IngestOutcome> {
        info!(
            fingerprint = %fingerprint(data),
            bytes = data.len(),
            filename = filename.unwrap_or(""),
            "Receipt uploaded"
        );
        let text = ocr::extract_text(data, content_type, filename, &self.ai).await?;
        self.ingest_text(&text).await
    }

    /// Parse, log and index receipt text
    ///
    /// Fails only if the ledger append fails. An index failure afterwards is
    /// logged and the index is left to rebuild on next use.
    pub async fn ingest_text(&self, raw_text: &str) -> Result<IngestOutcome> {
        let mut parsed = parse_receipt(raw_text);
        if parsed.date.is_none() {
            parsed.date = Some(today());
        }
        let tx = Transaction::from_parsed(parsed, raw_text);

        self.ledger.append(&tx)?;

        let indexed = match self.index.insert(&tx).await {
            Ok(()) => true,
            Err(e) => {
                warn!(id = %tx.id, error = %e, "Transaction logged but not indexed; index will rebuild");
                false
            }
        };

        info!(
            id = %tx.id,
            merchant = tx.merchant.as_deref().unwrap_or("unknown"),
            category = %tx.category,
            amount = ?tx.amount,
            currency = %tx.currency,
            "Stored transaction"
        );

        Ok(IngestOutcome {
            ocr_text: raw_text.to_string(),
            parsed_transaction: tx,
            indexed,
        })
    }

    /// Answer a finance question from indexed history
    pub async fn ask(&self, question: &str) -> Result<AdvisorOutcome> {
        Advisor::new(
            &self.index,
            &self.ai,
            &self.prompts,
            self.settings.retrieval.top_k,
        )
        .ask(question)
        .await
    }

    /// Every stored transaction, in log order
    pub fn transactions(&self) -> Result<Vec<Transaction>> {
        self.ledger.load()
    }

    /// Clear the ledger and the index
    pub async fn reset(&self) -> Result<()> {
        self.ledger.reset_all()?;
        self.index.reset().await?;
        info!("All data cleared");
        Ok(())
    }

    /// Re-embed the full ledger; returns the number of indexed records
    pub async fn reindex(&self) -> Result<usize> {
        self.index.rebuild().await
    }

    pub async fn status(&self) -> Result<PennyStatus> {
        Ok(PennyStatus {
            data_dir: self.settings.data_dir.display().to_string(),
            transactions: self.ledger.load()?.len(),
            indexed_records: self.index.len().await?,
            backend: self.ai.kind().to_string(),
            model: self.ai.model().to_string(),
            embedding_model: self.ai.embedding_model().to_string(),
            host: self.ai.host().to_string(),
            backend_healthy: self.ai.health_check().await,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockBackend;
    use crate::error::Error;
    use crate::index::{VectorStore, INDEX_DIR};
    use crate::models::Category;
    use tempfile::TempDir;

    fn penny(dir: &TempDir, mock: MockBackend) -> Penny {
        let settings = Settings::defaults(dir.path().to_path_buf());
        Penny::with_client(settings, AIClient::Mock(mock)).unwrap()
    }

    #[test]
    fn test_fingerprint() {
        assert_eq!(
            fingerprint(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_ingest_text_end_to_end() {
        let dir = TempDir::new().unwrap();
        let penny = penny(&dir, MockBackend::new());

        let outcome = penny
            .ingest_text("Joe's Diner\n2025-03-01\nTotal $42.50")
            .await
            .unwrap();
        let tx = &outcome.parsed_transaction;
        assert_eq!(tx.merchant.as_deref(), Some("Joe's Diner"));
        assert_eq!(tx.date.as_deref(), Some("2025-03-01"));
        assert_eq!(tx.category, Category::EatingOut);
        assert_eq!(tx.amount, Some(42.50));
        assert_eq!(tx.currency, "USD");
        assert!(outcome.indexed);

        assert_eq!(penny.transactions().unwrap(), vec![tx.clone()]);
    }

    #[tokio::test]
    async fn test_missing_date_uses_today() {
        let dir = TempDir::new().unwrap();
        let penny = penny(&dir, MockBackend::new());
        let outcome = penny.ingest_text("Corner Shop\nTotal 3.00").await.unwrap();
        assert_eq!(outcome.parsed_transaction.date, Some(today()));
    }

    #[tokio::test]
    async fn test_index_failure_still_logs() {
        let dir = TempDir::new().unwrap();
        let penny = penny(&dir, MockBackend::new().with_failing_embeddings());

        let outcome = penny.ingest_text("Corner Shop\nTotal 3.00").await.unwrap();
        assert!(!outcome.indexed);
        assert_eq!(penny.transactions().unwrap().len(), 1);
        assert!(VectorStore::load(&dir.path().join(INDEX_DIR)).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unsupported_upload_stores_nothing() {
        let dir = TempDir::new().unwrap();
        let penny = penny(&dir, MockBackend::new());
        let err = penny
            .upload_receipt(b"PK..", Some("application/zip"), Some("a.zip"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
        assert!(penny.transactions().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_keeps_text_verbatim() {
        let dir = TempDir::new().unwrap();
        let penny = penny(&dir, MockBackend::new());
        let data = "  Cafe\nTotal 4.50\n";
        let outcome = penny
            .upload_receipt(data.as_bytes(), Some("text/plain"), Some("cafe.txt"))
            .await
            .unwrap();

        assert_eq!(outcome.ocr_text, data);
        assert_eq!(outcome.parsed_transaction.raw_text, data);
        assert_eq!(outcome.parsed_transaction.merchant.as_deref(), Some("Cafe"));
        assert_eq!(penny.transactions().unwrap()[0].raw_text, data);
    }

    #[tokio::test]
    async fn test_upload_image_receipt() {
        let dir = TempDir::new().unwrap();
        let penny = penny(&dir, MockBackend::new().with_ocr_text("Uber Trip\n2024-06-01\nTotal $18.20"));
        let outcome = penny
            .upload_receipt(b"\x89PNG", Some("image/png"), Some("ride.png"))
            .await
            .unwrap();
        assert_eq!(outcome.ocr_text, "Uber Trip\n2024-06-01\nTotal $18.20");
        assert_eq!(outcome.parsed_transaction.category, Category::Transport);
    }

    #[tokio::test]
    async fn test_ask_and_reset() {
        let dir = TempDir::new().unwrap();
        let penny = penny(&dir, MockBackend::new());
        penny
            .ingest_text("Joe's Diner\n2025-03-01\nTotal $42.50")
            .await
            .unwrap();

        let outcome = penny.ask("How much did I spend eating out?").await.unwrap();
        assert!(outcome.retrieved_context.contains("Joe's Diner"));
        assert_eq!(outcome.analysis_points.len(), 3);
        assert!(outcome.answer.contains("\n\nTips:\n- "));

        penny.reset().await.unwrap();
        assert!(penny.transactions().unwrap().is_empty());
        let status = penny.status().await.unwrap();
        assert_eq!(status.transactions, 0);
        assert_eq!(status.indexed_records, 1);
        assert_eq!(status.backend, "mock");
    }

    #[tokio::test]
    async fn test_reindex_counts_ledger() {
        let dir = TempDir::new().unwrap();
        let penny = penny(&dir, MockBackend::new());
        penny.ingest_text("Shop A\nTotal 1.00").await.unwrap();
        penny.ingest_text("Shop B\nTotal 2.00").await.unwrap();
        assert_eq!(penny.reindex().await.unwrap(), 2);
    }
}
