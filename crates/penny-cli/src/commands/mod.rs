//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `advisor` - Question answering (ask)
//! - `prompts` - Prompt library inspection
//! - `receipts` - Receipt ingest and dry-run parsing
//! - `serve` - Web server command
//! - `status` - Status and index maintenance (status, reindex, reset)
//! - `transactions` - Transaction listing

pub mod advisor;
pub mod prompts;
pub mod receipts;
pub mod serve;
pub mod status;
pub mod transactions;

// Re-export command functions for main.rs
pub use advisor::*;
pub use prompts::*;
pub use receipts::*;
pub use serve::*;
pub use status::*;
pub use transactions::*;

use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use penny_core::{AIClient, Penny, PromptLibrary, Settings};

/// Open the data directory named in `settings`
pub fn open_penny(settings: Settings) -> Result<Penny> {
    let data_dir = settings.data_dir.display().to_string();
    Penny::open(settings).with_context(|| format!("Failed to open data directory {}", data_dir))
}

/// AI client for commands that work without opening the data directory
///
/// Prompt overrides under the data directory still apply.
pub fn ai_client(settings: &Settings) -> AIClient {
    let prompts = PromptLibrary::for_data_dir(&settings.data_dir);
    AIClient::from_settings(&settings.ai).with_prompts(Arc::new(RwLock::new(prompts)))
}

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Format an optional amount with its currency
pub fn format_amount(amount: Option<f64>, currency: &str) -> String {
    match amount {
        Some(value) => format!("{:.2} {}", value, currency),
        None => format!("? {}", currency),
    }
}
