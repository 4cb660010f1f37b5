//! Text extraction from uploaded receipts
//!
//! Plain text is decoded directly, PDFs go through their text layer first,
//! and images (or PDFs without usable text) are transcribed by the AI
//! backend's vision model.

use std::path::Path;

use lopdf::Document;
use tracing::{debug, warn};

use crate::ai::{AIBackend, AIClient};
use crate::error::{Error, Result};

/// What kind of upload we are looking at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Text,
    Pdf,
    /// Image with its MIME type
    Image(String),
}

const IMAGE_EXTENSIONS: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("heic", "image/heic"),
];

/// Classify an upload by content type, then by file extension
pub fn detect_kind(content_type: Option<&str>, filename: Option<&str>) -> Result<SourceKind> {
    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_lowercase())
        .unwrap_or_default();

    match mime.as_str() {
        "text/plain" => return Ok(SourceKind::Text),
        "application/pdf" => return Ok(SourceKind::Pdf),
        m if m.starts_with("image/") => return Ok(SourceKind::Image(mime)),
        _ => {}
    }

    let extension = filename
        .and_then(|f| Path::new(f).extension())
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);

    match extension.as_deref() {
        Some("txt") => Ok(SourceKind::Text),
        Some("pdf") => Ok(SourceKind::Pdf),
        Some(ext) => IMAGE_EXTENSIONS
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, m)| SourceKind::Image(m.to_string()))
            .ok_or_else(|| unsupported(&mime, filename)),
        None => Err(unsupported(&mime, filename)),
    }
}

fn unsupported(mime: &str, filename: Option<&str>) -> Error {
    let what = match (mime.is_empty(), filename) {
        (false, _) => mime.to_string(),
        (true, Some(name)) => name.to_string(),
        (true, None) => "unknown".to_string(),
    };
    Error::UnsupportedFormat(what)
}

/// Text layer of every page, in page order
pub fn pdf_text(data: &[u8]) -> Result<String> {
    let doc = Document::load_mem(data)?;
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    if pages.is_empty() {
        return Ok(String::new());
    }
    Ok(doc.extract_text(&pages)?)
}

/// Extract receipt text from uploaded bytes
///
/// Fails with `UnsupportedFormat` for anything that is not text, PDF or an
/// image, with `Extraction` when a document cannot be read, and with
/// `EmptyInput` when no text comes out. The text is returned as extracted,
/// surrounding whitespace included.
pub async fn extract_text(
    data: &[u8],
    content_type: Option<&str>,
    filename: Option<&str>,
    ai: &AIClient,
) -> Result<String> {
    let kind = detect_kind(content_type, filename)?;
    debug!(?kind, bytes = data.len(), "Extracting receipt text");

    let text = match kind {
        SourceKind::Text => String::from_utf8_lossy(data).into_owned(),
        SourceKind::Pdf => {
            let layer = match pdf_text(data) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "PDF text layer unreadable, trying vision OCR");
                    String::new()
                }
            };
            if layer.trim().is_empty() {
                debug!("PDF has no text layer, sending document to vision backend");
                ai.extract_document_text(data, "application/pdf", filename)
                    .await?
            } else {
                layer
            }
        }
        SourceKind::Image(mime) => ai.extract_document_text(data, &mime, filename).await?,
    };

    if text.trim().is_empty() {
        return Err(Error::EmptyInput(format!(
            "no text could be extracted from {}",
            filename.unwrap_or("upload")
        )));
    }
    Ok(text)
}
