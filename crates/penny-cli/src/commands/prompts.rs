//! Prompt library commands

use anyhow::Result;
use penny_core::{PromptId, PromptLibrary, Settings};

pub fn cmd_prompts_list(settings: &Settings) -> Result<()> {
    let mut library = PromptLibrary::for_data_dir(&settings.data_dir);

    println!("Available Prompts:\n");
    println!("{:<20} {:>7}  {}", "ID", "VERSION", "OVERRIDE");
    println!("{}", "-".repeat(45));

    for id in PromptId::all() {
        let has_override = library.has_override(*id);
        let prompt = library.get(*id)?;
        let override_status = if has_override { "✓ Custom" } else { "Default" };
        println!(
            "{:<20} {:>7}  {}",
            id.as_str(),
            prompt.metadata.version,
            override_status
        );
    }

    println!();
    if let Some(dir) = library.override_dir() {
        println!("Override directory: {}", dir.display());
    }

    Ok(())
}

/// Resolve a prompt ID from its name
pub fn parse_prompt_id(name: &str) -> Result<PromptId> {
    PromptId::all()
        .iter()
        .copied()
        .find(|id| id.as_str() == name)
        .ok_or_else(|| {
            let known: Vec<&str> = PromptId::all().iter().map(PromptId::as_str).collect();
            anyhow::anyhow!(
                "Unknown prompt ID: {} (available: {})",
                name,
                known.join(", ")
            )
        })
}

pub fn cmd_prompts_show(settings: &Settings, prompt_id: &str) -> Result<()> {
    let id = parse_prompt_id(prompt_id)?;
    let mut library = PromptLibrary::for_data_dir(&settings.data_dir);
    let prompt = library.get(id)?;

    println!("Prompt: {}", prompt.metadata.id);
    println!("Version: {}", prompt.metadata.version);
    println!("Temperature: {}", prompt.temperature());
    if let Some(ref path) = prompt.override_path {
        println!("Override: {}", path.display());
    }
    println!();
    println!("{}", prompt.content);

    Ok(())
}

pub fn cmd_prompts_path(settings: &Settings) -> Result<()> {
    let library = PromptLibrary::for_data_dir(&settings.data_dir);
    if let Some(path) = library.override_dir() {
        println!("{}", path.display());

        if !path.exists() {
            eprintln!();
            eprintln!("Note: This directory does not exist yet.");
            eprintln!("Create it to start adding custom prompts.");
        }
    }
    Ok(())
}
