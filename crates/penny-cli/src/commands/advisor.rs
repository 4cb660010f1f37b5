//! Question answering command

use anyhow::{Context, Result};
use penny_core::Settings;

use super::open_penny;

pub async fn cmd_ask(settings: Settings, question: &str, json: bool) -> Result<()> {
    let penny = open_penny(settings)?;
    let outcome = penny
        .ask(question)
        .await
        .context("Failed to answer question")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    println!();
    println!("💬 {}", outcome.answer);

    if !outcome.analysis_points.is_empty() {
        println!();
        println!("📊 Analysis");
        for point in &outcome.analysis_points {
            println!("   • {}", point);
        }
    }
    println!();

    Ok(())
}
