//! Receipt command implementations (ingest, parse)

use std::path::Path;

use anyhow::{Context, Result};
use penny_core::{ocr, parse_receipt, Settings};

use super::{ai_client, format_amount, open_penny};

fn read_receipt(file: &Path) -> Result<(Vec<u8>, Option<String>)> {
    let data = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let filename = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());
    Ok((data, filename))
}

pub async fn cmd_ingest(settings: Settings, file: &Path, json: bool) -> Result<()> {
    let (data, filename) = read_receipt(file)?;
    let penny = open_penny(settings)?;

    let outcome = penny
        .upload_receipt(&data, None, filename.as_deref())
        .await
        .with_context(|| format!("Failed to ingest {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    let tx = &outcome.parsed_transaction;
    println!("✅ Stored transaction {}", tx.id);
    println!("   Merchant: {}", tx.merchant.as_deref().unwrap_or("(unknown)"));
    println!("   Date:     {}", tx.date.as_deref().unwrap_or("(unknown)"));
    println!("   Amount:   {}", format_amount(tx.amount, &tx.currency));
    println!("   Category: {}", tx.category);
    if !outcome.indexed {
        println!();
        println!("   ⚠️  Not indexed yet; run 'penny reindex' once the AI backend is reachable.");
    }

    Ok(())
}

/// Extract and parse a receipt, printing the fields as JSON
///
/// Nothing is written to the data directory.
pub async fn cmd_parse(settings: &Settings, file: &Path) -> Result<()> {
    let (data, filename) = read_receipt(file)?;
    let ai = ai_client(settings);

    let text = ocr::extract_text(&data, None, filename.as_deref(), &ai)
        .await
        .with_context(|| format!("Failed to extract text from {}", file.display()))?;

    let parsed = parse_receipt(&text);
    println!("{}", serde_json::to_string_pretty(&parsed)?);
    Ok(())
}
