//! Transaction command implementations

use anyhow::Result;
use penny_core::Settings;

use super::{format_amount, open_penny, truncate};

pub fn cmd_transactions_list(settings: Settings, limit: usize, json: bool) -> Result<()> {
    let penny = open_penny(settings)?;
    let mut transactions = penny.transactions()?;

    let skip = transactions.len().saturating_sub(limit);
    transactions.drain(..skip);

    if json {
        println!("{}", serde_json::to_string_pretty(&transactions)?);
        return Ok(());
    }

    if transactions.is_empty() {
        println!("No transactions found. Add a receipt with:");
        println!("  penny ingest receipt.jpg");
        return Ok(());
    }

    println!();
    println!("📝 Recent Transactions");
    println!("   ─────────────────────────────────────────────────────────────");

    for tx in transactions {
        println!(
            "   {:<10} │ {:>12} │ {:<12} │ {}",
            tx.date.as_deref().unwrap_or("-"),
            format_amount(tx.amount, &tx.currency),
            tx.category,
            truncate(tx.merchant.as_deref().unwrap_or("(unknown)"), 30)
        );
    }

    Ok(())
}
