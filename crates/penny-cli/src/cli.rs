//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Penny - Turn receipts into answers about your spending
#[derive(Parser)]
#[command(name = "penny")]
#[command(about = "Self-hosted receipt and personal finance assistant", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Data directory (defaults to PENNY_DATA_DIR, then the platform data dir)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Extract, store and index a receipt (text, PDF or image)
    Ingest {
        /// Receipt file
        file: PathBuf,

        /// Print the stored transaction as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the fields parsed from a receipt without storing it
    Parse {
        /// Receipt file
        file: PathBuf,
    },

    /// Ask a question about your spending
    Ask {
        /// The question (words are joined with spaces)
        #[arg(required = true)]
        question: Vec<String>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List stored transactions
    Transactions {
        /// Show only the most recent N transactions
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete all transactions and the retrieval index
    Reset {
        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Rebuild the retrieval index from the transaction log
    Reindex,

    /// Show data directory and AI backend status
    Status,

    /// Manage AI prompts (list, show, path)
    Prompts {
        #[command(subcommand)]
        action: Option<PromptsAction>,
    },
}

#[derive(Subcommand)]
pub enum PromptsAction {
    /// List all prompts and their override status
    List,

    /// Show the resolved content of a prompt
    Show {
        /// Prompt ID (analyze_spending, answer_question, ocr_receipt)
        prompt_id: String,
    },

    /// Print the override directory
    Path,
}
