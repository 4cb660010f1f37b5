//! Status and maintenance command implementations (status, reindex, reset)

use std::io::{self, Write};

use anyhow::{Context, Result};
use penny_core::Settings;

use super::open_penny;

pub async fn cmd_status(settings: Settings) -> Result<()> {
    let penny = open_penny(settings)?;
    let status = penny.status().await?;

    println!();
    println!("📊 Penny Status");
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Data directory: {}", status.data_dir);
    println!("   Transactions:   {}", status.transactions);
    println!("   Indexed:        {}", status.indexed_records);
    println!();
    println!("   AI backend:     {} ({})", status.backend, status.host);
    println!("   Model:          {}", status.model);
    println!("   Embeddings:     {}", status.embedding_model);
    if status.backend_healthy {
        println!("   ✅ Backend reachable");
    } else {
        println!("   ⚠️  Backend not responding");
    }
    println!();

    Ok(())
}

pub async fn cmd_reindex(settings: Settings) -> Result<()> {
    let penny = open_penny(settings)?;
    let count = penny
        .reindex()
        .await
        .context("Failed to rebuild retrieval index")?;

    println!("✅ Retrieval index rebuilt ({} records)", count);
    Ok(())
}

pub async fn cmd_reset(settings: Settings, yes: bool) -> Result<()> {
    if !yes {
        print!("⚠️  This will delete all transactions and the retrieval index.\n\n");
        print!("Are you sure? [y/N] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let penny = open_penny(settings)?;
    penny.reset().await.context("Failed to reset data")?;

    println!("✅ All transaction data cleared.");
    Ok(())
}
