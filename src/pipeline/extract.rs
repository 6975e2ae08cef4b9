//! Payload-to-text extraction.
//!
//! Dispatch is over the closed [`ContentType`] set; anything else fails before any parsing
//! happens. Extraction is pure: errors are returned, never logged, so the orchestrator stays the
//! single place where failures are recorded.

use super::types::{ContentType, PipelineError};
use lopdf::Document;
use serde_json::Value;

const NO_EXTRACTABLE_TEXT: &str = "PDF contains no extractable text";

/// Extract the document text for a declared content type.
pub fn extract(declared_type: &str, raw: &[u8]) -> Result<String, PipelineError> {
    match ContentType::parse(declared_type)? {
        ContentType::Json => extract_json(raw),
        ContentType::PlainText => extract_plain_text(raw),
        ContentType::Pdf => extract_pdf(raw),
    }
}

fn extract_json(raw: &[u8]) -> Result<String, PipelineError> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|error| PipelineError::InvalidInput(format!("Invalid JSON body: {error}")))?;
    let Value::Object(mut fields) = value else {
        return Err(PipelineError::InvalidInput(
            "JSON body must be an object with a `text` field".into(),
        ));
    };
    match fields.remove("text") {
        Some(Value::String(text)) if !text.trim().is_empty() => Ok(text),
        Some(Value::String(_)) => Err(PipelineError::InvalidInput(
            "Field `text` must not be empty".into(),
        )),
        Some(_) => Err(PipelineError::InvalidInput(
            "Field `text` must be a string".into(),
        )),
        None => Err(PipelineError::InvalidInput(
            "JSON body is missing the `text` field".into(),
        )),
    }
}

fn extract_plain_text(raw: &[u8]) -> Result<String, PipelineError> {
    let text = std::str::from_utf8(raw).map_err(|error| {
        PipelineError::InvalidInput(format!("Plain-text body is not valid UTF-8: {error}"))
    })?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::InvalidInput("Text body is empty".into()));
    }
    Ok(trimmed.to_string())
}

fn extract_pdf(raw: &[u8]) -> Result<String, PipelineError> {
    let document = Document::load_mem(raw)
        .map_err(|error| PipelineError::InvalidInput(format!("Malformed PDF: {error}")))?;

    // `get_pages` is keyed by 1-based page number, so iteration follows page order.
    let pages: Vec<String> = document
        .get_pages()
        .keys()
        .filter_map(|page_number| document.extract_text(&[*page_number]).ok())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .collect();

    if pages.is_empty() {
        return Err(PipelineError::InvalidInput(NO_EXTRACTABLE_TEXT.into()));
    }
    Ok(pages.join("\n"))
}
