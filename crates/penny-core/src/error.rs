//! Error types for Penny

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Prompt frontmatter error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Structured output parsed but violated its schema constraints
    #[error("Structured output validation failed: {0}")]
    Validation(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("Text extraction failed: {0}")]
    Extraction(String),

    /// Input that is present but carries no text (blank upload, empty question)
    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl Error {
    /// Whether the error was caused by what the caller sent
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::UnsupportedFormat(_) | Self::EmptyInput(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
