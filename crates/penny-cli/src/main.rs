//! Penny CLI - Receipt and finance assistant
//!
//! Usage:
//!   penny ingest receipt.pdf        Extract, store and index a receipt
//!   penny parse receipt.txt         Show parsed fields without storing
//!   penny ask "Where did it go?"    Ask about your spending
//!   penny serve --port 8000         Start web server

mod cli;
mod commands;


use anyhow::{Context, Result};
use clap::Parser;
use penny_core::Settings;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let settings = Settings::load(cli.data_dir.clone()).context("Failed to load settings")?;

    match cli.command {
        Commands::Serve { port, host } => commands::cmd_serve(settings, &host, port).await,
        Commands::Ingest { file, json } => commands::cmd_ingest(settings, &file, json).await,
        Commands::Parse { file } => commands::cmd_parse(&settings, &file).await,
        Commands::Ask { question, json } => {
            commands::cmd_ask(settings, &question.join(" "), json).await
        }
        Commands::Transactions { limit, json } => {
            commands::cmd_transactions_list(settings, limit, json)
        }
        Commands::Reset { yes } => commands::cmd_reset(settings, yes).await,
        Commands::Reindex => commands::cmd_reindex(settings).await,
        Commands::Status => commands::cmd_status(settings).await,
        Commands::Prompts { action } => match action {
            None | Some(PromptsAction::List) => commands::cmd_prompts_list(&settings),
            Some(PromptsAction::Show { prompt_id }) => {
                commands::cmd_prompts_show(&settings, &prompt_id)
            }
            Some(PromptsAction::Path) => commands::cmd_prompts_path(&settings),
        },
    }
}
