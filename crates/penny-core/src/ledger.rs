//! Append-only transaction log
//!
//! One JSON object per line in `transactions.jsonl`. The log is the source
//! of truth: the retrieval index can always be rebuilt from it.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::Transaction;

/// File name of the log inside the data directory
pub const LEDGER_FILE: &str = "transactions.jsonl";

/// Append-only store of transactions
pub struct Ledger {
    path: PathBuf,
    /// Serializes appends and resets within this process
    write_lock: Mutex<()>,
}

impl Ledger {
    /// Open (or create) the log at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let ledger = Self {
            path,
            write_lock: Mutex::new(()),
        };
        ledger.ensure_file()?;
        Ok(ledger)
    }

    /// Open the log inside a data directory
    pub fn in_dir(data_dir: &Path) -> Result<Self> {
        Self::open(data_dir.join(LEDGER_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_file(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                info!("Created data directory: {}", parent.display());
            }
        }
        if !self.path.exists() {
            File::create(&self.path)?;
        }
        Ok(())
    }

    /// Load every transaction in log order
    ///
    /// Malformed lines are skipped so one bad write never hides the rest
    /// of the history.
    pub fn load(&self) -> Result<Vec<Transaction>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut transactions = Vec::new();
        let mut skipped = 0usize;

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Transaction>(line) {
                Ok(tx) if tx.is_valid() => transactions.push(tx),
                _ => skipped += 1,
            }
        }

        if skipped > 0 {
            debug!(skipped, path = %self.path.display(), "Skipped malformed ledger lines");
        }

        Ok(transactions)
    }

    /// Append one transaction as a single line
    pub fn append(&self, tx: &Transaction) -> Result<()> {
        if !tx.is_valid() {
            return Err(Error::InvalidData(
                "Transaction requires a non-empty id and raw_text".into(),
            ));
        }

        let mut line = serde_json::to_string(tx)?;
        line.push('\n');

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::InvalidData("Failed to acquire ledger lock".into()))?;

        self.ensure_file()?;
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;

        debug!(id = %tx.id, "Appended transaction to ledger");
        Ok(())
    }

    /// Clear the log, leaving an empty file in place
    pub fn reset_all(&self) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::InvalidData("Failed to acquire ledger lock".into()))?;

        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        self.ensure_file()?;
        info!("Cleared transaction ledger: {}", self.path.display());
        Ok(())
    }
}
