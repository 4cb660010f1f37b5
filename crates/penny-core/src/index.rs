//! Retrieval index over transaction renderings
//!
//! Each transaction is rendered to text, embedded by the AI backend and
//! kept in memory with its metadata. The whole index is snapshotted to two
//! JSON files under `vectorstore/` after every change:
//!
//! - `index.json`: vectors, dimension and embedding model
//! - `records.json`: record texts and metadata
//!
//! The snapshot is a cache of the ledger. A missing or unreadable snapshot,
//! or one made with a different embedding model, is fixed by re-embedding
//! the full ledger history. Transactions logged after the last save are
//! picked up when the snapshot is loaded.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::ai::{AIBackend, AIClient};
use crate::error::{Error, Result};
use crate::ledger::Ledger;
use crate::models::Transaction;

/// Snapshot directory inside the data directory
pub const INDEX_DIR: &str = "vectorstore";
const INDEX_FILE: &str = "index.json";
const RECORDS_FILE: &str = "records.json";
const SNAPSHOT_VERSION: u32 = 1;

/// Id of the record seeded into an empty index
pub const PLACEHOLDER_ID: &str = "placeholder";
pub const PLACEHOLDER_TEXT: &str =
    "This is a placeholder transaction. Add receipts to build your personal finance memory.";

/// Texts embedded per backend call during a rebuild
const EMBED_BATCH_SIZE: usize = 64;

/// Metadata stored next to each record
///
/// Everything is optional so partial records (the placeholder, older
/// snapshots) still load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Older snapshots stored the amount as text
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl RecordMetadata {
    /// Amount, if present and finite
    pub fn amount_value(&self) -> Option<f64> {
        self.amount.filter(|a| a.is_finite())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredAmount {
    Number(f64),
    Text(String),
}

fn deserialize_amount<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<StoredAmount>::deserialize(deserializer)? {
        Some(StoredAmount::Number(n)) => Some(n),
        Some(StoredAmount::Text(s)) => s.trim().parse::<f64>().ok(),
        None => None,
    })
}

/// Render an amount for record text; whole values keep one decimal
pub fn render_amount(amount: f64) -> String {
    if amount.is_finite() && amount.fract() == 0.0 && amount.abs() < 1e16 {
        format!("{:.1}", amount)
    } else {
        amount.to_string()
    }
}

/// An indexed document: rendered text plus metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub text: String,
    pub metadata: RecordMetadata,
}

impl IndexRecord {
    /// Render a transaction for embedding
    pub fn from_transaction(tx: &Transaction) -> Self {
        let rendered = tx.amount.map(render_amount);
        let text = format!(
            "Transaction ID: {}\nDate: {}\nMerchant: {}\nCategory: {}\nAmount: {} {}\n\nRaw Text: {}",
            tx.id,
            tx.date.as_deref().unwrap_or("unknown"),
            tx.merchant.as_deref().unwrap_or("unknown"),
            tx.category,
            rendered.as_deref().unwrap_or("unknown"),
            tx.currency,
            tx.raw_text,
        );

        Self {
            text,
            metadata: RecordMetadata {
                id: Some(tx.id.clone()),
                date: tx.date.clone(),
                merchant: tx.merchant.clone(),
                category: Some(tx.category.as_str().to_string()),
                amount: tx.amount,
                currency: Some(tx.currency.clone()),
            },
        }
    }

    pub fn placeholder() -> Self {
        Self {
            text: PLACEHOLDER_TEXT.to_string(),
            metadata: RecordMetadata {
                id: Some(PLACEHOLDER_ID.to_string()),
                ..Default::default()
            },
        }
    }
}

/// A search hit
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: IndexRecord,
    /// Cosine similarity to the query
    pub score: f32,
}

/// Cosine similarity; zero when either vector has no magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexSnapshot {
    version: u32,
    embedding_model: String,
    dims: usize,
    vectors: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordsSnapshot {
    records: Vec<IndexRecord>,
}

/// In-memory vector store (exhaustive cosine search)
#[derive(Debug, Clone)]
pub struct VectorStore {
    embedding_model: String,
    dims: usize,
    vectors: Vec<Vec<f32>>,
    records: Vec<IndexRecord>,
}

impl VectorStore {
    pub fn new(embedding_model: &str) -> Self {
        Self {
            embedding_model: embedding_model.to_string(),
            dims: 0,
            vectors: Vec::new(),
            records: Vec::new(),
        }
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[IndexRecord] {
        &self.records
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.records
            .iter()
            .any(|r| r.metadata.id.as_deref() == Some(id))
    }

    /// Add a record; the first vector fixes the dimension
    pub fn insert(&mut self, record: IndexRecord, vector: Vec<f32>) -> Result<()> {
        if vector.is_empty() {
            return Err(Error::Index("Empty embedding vector".into()));
        }
        if self.vectors.is_empty() {
            self.dims = vector.len();
        } else if vector.len() != self.dims {
            return Err(Error::Index(format!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dims,
                vector.len()
            )));
        }
        self.vectors.push(vector);
        self.records.push(record);
        Ok(())
    }

    /// Top `k` records by descending cosine similarity
    ///
    /// Equal scores keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<ScoredRecord> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(query, v)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        scored
            .into_iter()
            .take(k)
            .map(|(i, score)| ScoredRecord {
                record: self.records[i].clone(),
                score,
            })
            .collect()
    }

    /// Write both snapshot files atomically
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;

        let index = IndexSnapshot {
            version: SNAPSHOT_VERSION,
            embedding_model: self.embedding_model.clone(),
            dims: self.dims,
            vectors: self.vectors.clone(),
        };
        let records = RecordsSnapshot {
            records: self.records.clone(),
        };

        write_atomic(&dir.join(RECORDS_FILE), &serde_json::to_vec(&records)?)?;
        write_atomic(&dir.join(INDEX_FILE), &serde_json::to_vec(&index)?)?;
        Ok(())
    }

    /// Load a snapshot; `Ok(None)` when there is none on disk
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let index_path = dir.join(INDEX_FILE);
        let records_path = dir.join(RECORDS_FILE);
        if !index_path.exists() && !records_path.exists() {
            return Ok(None);
        }

        let index: IndexSnapshot = serde_json::from_slice(&fs::read(&index_path)?)?;
        let records: RecordsSnapshot = serde_json::from_slice(&fs::read(&records_path)?)?;

        if index.version != SNAPSHOT_VERSION {
            return Err(Error::Index(format!(
                "Unsupported snapshot version {}",
                index.version
            )));
        }
        if index.vectors.len() != records.records.len() {
            return Err(Error::Index(format!(
                "Snapshot has {} vectors but {} records",
                index.vectors.len(),
                records.records.len()
            )));
        }
        if index.vectors.iter().any(|v| v.len() != index.dims) {
            return Err(Error::Index("Snapshot vectors have inconsistent dimensions".into()));
        }

        Ok(Some(Self {
            embedding_model: index.embedding_model,
            dims: index.dims,
            vectors: index.vectors,
            records: records.records,
        }))
    }

    /// Delete snapshot files, if any
    pub fn remove_snapshot(dir: &Path) -> Result<()> {
        for name in [INDEX_FILE, RECORDS_FILE] {
            let path = dir.join(name);
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Index(format!("No parent directory for {}", path.display())))?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Owned retrieval index service
///
/// The store is loaded lazily on first use, exactly once. A single async
/// mutex serializes load, rebuild, insert, save and reset.
pub struct IndexService {
    dir: PathBuf,
    ai: AIClient,
    ledger: Arc<Ledger>,
    store: Mutex<Option<VectorStore>>,
}

impl IndexService {
    pub fn new(dir: impl Into<PathBuf>, ai: AIClient, ledger: Arc<Ledger>) -> Self {
        Self {
            dir: dir.into(),
            ai,
            ledger,
            store: Mutex::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load the snapshot into `slot` if it is empty, rebuilding on any problem
    async fn ensure_loaded(&self, slot: &mut Option<VectorStore>) -> Result<()> {
        if slot.is_some() {
            return Ok(());
        }

        let store = match VectorStore::load(&self.dir) {
            Ok(Some(store)) if store.embedding_model() == self.ai.embedding_model() => {
                debug!(records = store.len(), "Loaded index snapshot");
                self.reconcile(store).await?
            }
            Ok(Some(store)) => {
                warn!(
                    snapshot_model = store.embedding_model(),
                    current_model = self.ai.embedding_model(),
                    "Index snapshot uses a different embedding model, rebuilding from ledger"
                );
                self.build_from_ledger().await?
            }
            Ok(None) => self.build_from_ledger().await?,
            Err(e) => {
                warn!(error = %e, "Index snapshot unreadable, rebuilding from ledger");
                self.build_from_ledger().await?
            }
        };

        *slot = Some(store);
        Ok(())
    }

    /// Bring a loaded snapshot in line with the ledger
    ///
    /// Transactions logged after the last save are embedded and appended.
    /// A snapshot holding ids the ledger no longer has is rebuilt.
    async fn reconcile(&self, mut store: VectorStore) -> Result<VectorStore> {
        let transactions = self.ledger.load()?;
        let ledger_ids: HashSet<&str> = transactions.iter().map(|t| t.id.as_str()).collect();

        let missing: Vec<IndexRecord> = {
            let indexed: HashSet<&str> = store
                .records()
                .iter()
                .filter_map(|r| r.metadata.id.as_deref())
                .filter(|id| *id != PLACEHOLDER_ID)
                .collect();

            if indexed.iter().any(|id| !ledger_ids.contains(id)) {
                warn!("Index snapshot holds transactions missing from the ledger, rebuilding");
                return self.build_from_ledger().await;
            }

            transactions
                .iter()
                .filter(|t| !indexed.contains(t.id.as_str()))
                .map(IndexRecord::from_transaction)
                .collect()
        };

        if missing.is_empty() {
            return Ok(store);
        }

        info!(missing = missing.len(), "Indexing transactions logged after the last snapshot");
        self.embed_into(&mut store, &missing).await?;
        store.save(&self.dir)?;
        Ok(store)
    }

    /// Embed the full ledger history (or the placeholder) and save it
    async fn build_from_ledger(&self) -> Result<VectorStore> {
        let transactions = self.ledger.load()?;
        let records: Vec<IndexRecord> = if transactions.is_empty() {
            vec![IndexRecord::placeholder()]
        } else {
            transactions.iter().map(IndexRecord::from_transaction).collect()
        };

        let mut store = VectorStore::new(self.ai.embedding_model());
        self.embed_into(&mut store, &records).await?;

        store.save(&self.dir)?;
        info!(
            records = store.len(),
            transactions = transactions.len(),
            "Built retrieval index"
        );
        Ok(store)
    }

    /// Embed `records` in batches and add them to `store`
    async fn embed_into(&self, store: &mut VectorStore, records: &[IndexRecord]) -> Result<()> {
        for chunk in records.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = chunk.iter().map(|r| r.text.clone()).collect();
            let vectors = self.ai.embed(&texts).await?;
            if vectors.len() != chunk.len() {
                return Err(Error::Index(format!(
                    "Embedding backend returned {} vectors for {} texts",
                    vectors.len(),
                    chunk.len()
                )));
            }
            for (record, vector) in chunk.iter().cloned().zip(vectors) {
                store.insert(record, vector)?;
            }
        }
        Ok(())
    }

    /// Index one transaction and save the snapshot
    ///
    /// On failure the in-memory store is dropped and the snapshot deleted,
    /// so the next use rebuilds from the ledger.
    pub async fn insert(&self, tx: &Transaction) -> Result<()> {
        let mut slot = self.store.lock().await;
        self.ensure_loaded(&mut slot).await?;

        let record = IndexRecord::from_transaction(tx);
        let result = self.insert_loaded(&mut slot, record).await;

        if result.is_err() {
            *slot = None;
            if let Err(e) = VectorStore::remove_snapshot(&self.dir) {
                warn!(error = %e, "Failed to delete index snapshot");
            }
        }
        result
    }

    async fn insert_loaded(&self, slot: &mut Option<VectorStore>, record: IndexRecord) -> Result<()> {
        let store = slot
            .as_mut()
            .ok_or_else(|| Error::Index("Index not loaded".into()))?;

        // A rebuild triggered by this insert already picked the record up from the ledger
        if let Some(ref id) = record.metadata.id {
            if store.contains_id(id) {
                debug!(id = %id, "Transaction already indexed");
                return Ok(());
            }
        }

        let mut vectors = self.ai.embed(std::slice::from_ref(&record.text)).await?;
        let vector = vectors
            .pop()
            .ok_or_else(|| Error::Index("Embedding backend returned no vector".into()))?;

        store.insert(record, vector)?;
        store.save(&self.dir)?;
        debug!(records = store.len(), "Indexed transaction");
        Ok(())
    }

    /// Top `k` records for a free-text query
    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<ScoredRecord>> {
        let mut slot = self.store.lock().await;
        self.ensure_loaded(&mut slot).await?;

        let mut vectors = self.ai.embed(&[query.to_string()]).await?;
        let vector = vectors
            .pop()
            .ok_or_else(|| Error::Index("Embedding backend returned no vector".into()))?;

        let store = slot
            .as_ref()
            .ok_or_else(|| Error::Index("Index not loaded".into()))?;
        Ok(store.search(&vector, k))
    }

    /// Drop the in-memory store and snapshot
    ///
    /// The next use rebuilds from whatever the ledger holds then.
    pub async fn reset(&self) -> Result<()> {
        let mut slot = self.store.lock().await;
        *slot = None;
        VectorStore::remove_snapshot(&self.dir)?;
        info!("Cleared retrieval index");
        Ok(())
    }

    /// Rebuild from the ledger now, replacing any snapshot
    pub async fn rebuild(&self) -> Result<usize> {
        let mut slot = self.store.lock().await;
        *slot = None;
        let store = self.build_from_ledger().await?;
        let count = store.len();
        *slot = Some(store);
        Ok(count)
    }

    /// Number of indexed records (loads the index if needed)
    pub async fn len(&self) -> Result<usize> {
        let mut slot = self.store.lock().await;
        self.ensure_loaded(&mut slot).await?;
        Ok(slot.as_ref().map(VectorStore::len).unwrap_or(0))
    }
}
