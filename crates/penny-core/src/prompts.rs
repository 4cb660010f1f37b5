//! Prompt library for the advisor and OCR calls
//!
//! Prompts are loaded with a two-layer resolution:
//! 1. Check for override in data dir (`<data dir>/prompts/overrides/<id>.md`)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! This allows users to tune prompts without rebuilding, while still
//! picking up new defaults on upgrade.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Embedded default prompts (compiled into binary)
mod defaults {
    pub const ANALYZE_SPENDING: &str = include_str!("../../../prompts/analyze_spending.md");
    pub const ANSWER_QUESTION: &str = include_str!("../../../prompts/answer_question.md");
    pub const OCR_RECEIPT: &str = include_str!("../../../prompts/ocr_receipt.md");
}

/// Known prompt IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// Advisor ANALYZE stage: bullet-point observations
    AnalyzeSpending,
    /// Advisor ANSWER stage: direct answer plus tips
    AnswerQuestion,
    /// Vision transcription of an uploaded receipt
    OcrReceipt,
}

impl PromptId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnalyzeSpending => "analyze_spending",
            Self::AnswerQuestion => "answer_question",
            Self::OcrReceipt => "ocr_receipt",
        }
    }

    pub fn all() -> &'static [PromptId] {
        &[Self::AnalyzeSpending, Self::AnswerQuestion, Self::OcrReceipt]
    }

    /// Temperature used when a prompt's frontmatter leaves it out
    pub fn default_temperature(&self) -> f32 {
        match self {
            Self::AnalyzeSpending => 0.2,
            Self::AnswerQuestion => 0.3,
            Self::OcrReceipt => 0.0,
        }
    }

    fn default_content(&self) -> &'static str {
        match self {
            Self::AnalyzeSpending => defaults::ANALYZE_SPENDING,
            Self::AnswerQuestion => defaults::ANSWER_QUESTION,
            Self::OcrReceipt => defaults::OCR_RECEIPT,
        }
    }
}

/// Prompt frontmatter metadata
#[derive(Debug, Clone, Deserialize)]
pub struct PromptMetadata {
    pub id: String,
    pub version: u32,
    /// Sampling temperature for the call this prompt drives
    #[serde(default)]
    pub temperature: Option<f32>,
}

/// A loaded prompt with metadata and content
#[derive(Debug, Clone)]
pub struct Prompt {
    pub id: PromptId,
    pub metadata: PromptMetadata,
    /// The prompt content (system + user sections)
    pub content: String,
    pub is_override: bool,
    pub override_path: Option<PathBuf>,
}

impl Prompt {
    pub fn system_section(&self) -> Option<&str> {
        extract_section(&self.content, "# System")
    }

    pub fn user_section(&self) -> Option<&str> {
        extract_section(&self.content, "# User")
    }

    /// Render the prompt with template variables replaced
    pub fn render(&self, vars: &HashMap<&str, &str>) -> String {
        render_template(&self.content, vars)
    }

    /// Render system and user sections as one prompt
    ///
    /// Falls back to the whole body when the sections are missing.
    pub fn render_full(&self, vars: &HashMap<&str, &str>) -> String {
        match (self.system_section(), self.user_section()) {
            (Some(system), Some(user)) => {
                format!(
                    "{}\n\n{}",
                    render_template(system, vars),
                    render_template(user, vars)
                )
            }
            (None, Some(user)) => render_template(user, vars),
            _ => self.render(vars),
        }
    }

    /// Render just the user section with variables
    pub fn render_user(&self, vars: &HashMap<&str, &str>) -> String {
        match self.user_section() {
            Some(user) => render_template(user, vars),
            None => self.render(vars),
        }
    }

    pub fn temperature(&self) -> f32 {
        self.metadata
            .temperature
            .unwrap_or_else(|| self.id.default_temperature())
    }
}

/// Prompt library for loading and caching prompts
pub struct PromptLibrary {
    override_dir: Option<PathBuf>,
    cache: HashMap<PromptId, Prompt>,
}

impl PromptLibrary {
    /// Create a library that reads overrides from `<data_dir>/prompts/overrides`
    pub fn for_data_dir(data_dir: &Path) -> Self {
        Self::with_override_dir(data_dir.join("prompts").join("overrides"))
    }

    pub fn with_override_dir(path: PathBuf) -> Self {
        Self {
            override_dir: Some(path),
            cache: HashMap::new(),
        }
    }

    /// Create a prompt library with no override directory (embedded only)
    pub fn embedded_only() -> Self {
        Self {
            override_dir: None,
            cache: HashMap::new(),
        }
    }

    /// Get a prompt by ID, loading from override or default
    pub fn get(&mut self, id: PromptId) -> Result<&Prompt> {
        if !self.cache.contains_key(&id) {
            let prompt = self.load(id)?;
            self.cache.insert(id, prompt);
        }
        self.cache
            .get(&id)
            .ok_or_else(|| Error::InvalidData(format!("Prompt not loaded: {}", id.as_str())))
    }

    fn load(&self, id: PromptId) -> Result<Prompt> {
        if let Some(path) = self.override_path(id) {
            if path.exists() {
                let content = fs::read_to_string(&path).map_err(|e| {
                    Error::InvalidData(format!("Failed to read prompt override: {}", e))
                })?;
                let (metadata, body) = parse_prompt(&content)?;
                return Ok(Prompt {
                    id,
                    metadata,
                    content: body,
                    is_override: true,
                    override_path: Some(path),
                });
            }
        }

        let (metadata, body) = parse_prompt(id.default_content())?;
        Ok(Prompt {
            id,
            metadata,
            content: body,
            is_override: false,
            override_path: None,
        })
    }

    fn override_path(&self, id: PromptId) -> Option<PathBuf> {
        self.override_dir
            .as_ref()
            .map(|d| d.join(format!("{}.md", id.as_str())))
    }

    pub fn has_override(&self, id: PromptId) -> bool {
        self.override_path(id).is_some_and(|p| p.exists())
    }

    pub fn override_dir(&self) -> Option<&PathBuf> {
        self.override_dir.as_ref()
    }

    /// Clear the cache (after editing override files)
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::embedded_only()
    }
}

/// Parse a prompt file into metadata and body
fn parse_prompt(content: &str) -> Result<(PromptMetadata, String)> {
    let content = content.trim();

    if !content.starts_with("---") {
        return Err(Error::InvalidData(
            "Prompt must start with YAML frontmatter (---)".into(),
        ));
    }

    let rest = &content[3..];
    let end = rest.find("---").ok_or_else(|| {
        Error::InvalidData("Prompt frontmatter not closed (missing second ---)".into())
    })?;

    let frontmatter = rest[..end].trim();
    let body = rest[end + 3..].trim();

    let metadata: PromptMetadata = serde_yaml::from_str(frontmatter)?;

    Ok((metadata, body.to_string()))
}

/// Extract a section from the prompt content
fn extract_section<'a>(content: &'a str, header: &str) -> Option<&'a str> {
    let start = content.find(header)?;
    let after_header = &content[start + header.len()..];
    let end = after_header.find("\n# ").unwrap_or(after_header.len());
    Some(after_header[..end].trim())
}

/// Resolve `{{#if var}}` blocks, then substitute `{{var}}` placeholders
///
/// Conditionals are resolved first so substituted values (receipt text in
/// particular) are never re-scanned for template markers.
fn render_template(template: &str, vars: &HashMap<&str, &str>) -> String {
    let mut result = remove_unmatched_conditionals(template, vars);
    for (key, value) in vars {
        let pattern = format!("{{{{{}}}}}", key);
        result = result.replace(&pattern, value);
    }
    result
}

fn remove_unmatched_conditionals(content: &str, vars: &HashMap<&str, &str>) -> String {
    let mut result = content.to_string();

    loop {
        let Some(if_start) = result.find("{{#if ") else {
            break;
        };
        let var_start = if_start + 6;
        let Some(var_end) = result[var_start..].find("}}") else {
            break;
        };
        let var_name = result[var_start..var_start + var_end].trim().to_string();
        let block_start = var_start + var_end + 2;
        let Some(endif_pos) = result[block_start..].find("{{/if}}") else {
            break;
        };
        let block_content = result[block_start..block_start + endif_pos].to_string();
        let full_end = block_start + endif_pos + 7;

        let keep = vars.get(var_name.as_str()).is_some_and(|v| !v.is_empty());
        result = if keep {
            format!("{}{}{}", &result[..if_start], block_content, &result[full_end..])
        } else {
            format!("{}{}", &result[..if_start], &result[full_end..])
        };
    }

    result
}
