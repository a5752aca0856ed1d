//! Multi-format document parser (PDF, DOCX, TXT, HTML).
//!
//! Converts raw uploaded bytes (by declared type) into extracted plain
//! text plus flat scalar metadata. The parser is a pure function of its
//! inputs: it retains no reference to the bytes after returning, so the
//! upload boundary can release them immediately.
//!
//! Failure policy: a document-level decode failure is
//! [`EngineError::ParseFailure`]; a PDF page-level failure skips the page
//! and sets [`ParseOutcome::partial`]; zero-length extraction is the
//! [`ParseWarning::EmptyContent`] warning rather than an error, since
//! some files (scanned-image PDFs) are legitimately text-free.

mod docx;
mod html;
mod text;

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::EngineError;
use crate::models::DocumentType;

/// Result of a successful parse.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    /// Extracted text, normalized to UTF-8. Empty when extraction
    /// legitimately produced nothing.
    pub text: String,
    /// Flat metadata: author, title, page_count/paragraph_count,
    /// created, modified, size_bytes.
    pub metadata: BTreeMap<String, String>,
    /// Set when part of the document (e.g. a PDF page) failed to decode
    /// and was skipped.
    pub partial: bool,
    /// Non-fatal warning raised during extraction.
    pub warning: Option<ParseWarning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseWarning {
    /// Extraction produced zero-length text.
    EmptyContent,
}

/// Parse raw bytes according to the declared type.
pub fn parse(bytes: &[u8], doc_type: DocumentType) -> Result<ParseOutcome, EngineError> {
    if bytes.is_empty() {
        return Err(EngineError::ParseFailure("empty input".to_string()));
    }

    let mut outcome = match doc_type {
        DocumentType::Pdf => parse_pdf(bytes)?,
        DocumentType::Docx => docx::parse_docx(bytes)?,
        DocumentType::Txt => text::parse_txt(bytes)?,
        DocumentType::Html => html::parse_html(bytes)?,
    };

    outcome
        .metadata
        .insert("size_bytes".to_string(), bytes.len().to_string());

    if outcome.text.trim().is_empty() {
        outcome.text.clear();
        outcome.warning = Some(ParseWarning::EmptyContent);
        warn!(doc_type = %doc_type, "extraction produced empty text");
    }

    debug!(
        doc_type = %doc_type,
        chars = outcome.text.len(),
        partial = outcome.partial,
        "parsed document"
    );

    Ok(outcome)
}

// ============ PDF ============

/// Extract PDF text page by page, with document-info metadata.
///
/// Text comes from pdf-extract's per-page extraction; structure and the
/// Info dictionary come from an independent lopdf load. A failed
/// per-page pass falls back to whole-document extraction and marks the
/// outcome partial; only when both passes fail is the upload rejected.
fn parse_pdf(bytes: &[u8]) -> Result<ParseOutcome, EngineError> {
    let mut metadata = BTreeMap::new();
    let mut partial = false;

    // Structure + Info dictionary. A text extraction can still succeed
    // when this load fails, so treat it as a partial result, not fatal.
    match lopdf::Document::load_mem(bytes) {
        Ok(doc) => {
            metadata.insert("page_count".to_string(), doc.get_pages().len().to_string());
            read_pdf_info(&doc, &mut metadata);
        }
        Err(e) => {
            debug!(error = %e, "lopdf could not read PDF structure");
            partial = true;
        }
    }

    let text = match pdf_extract::extract_text_from_mem_by_pages(bytes) {
        Ok(pages) => pages
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"),
        Err(e) => {
            debug!(error = %e, "per-page PDF extraction failed, retrying whole document");
            partial = true;
            match pdf_extract::extract_text_from_mem(bytes) {
                Ok(t) => t.trim().to_string(),
                Err(e2) => {
                    // Both passes exhausted. If we could not even read the
                    // structure, the file is not a usable PDF.
                    if !metadata.contains_key("page_count") {
                        return Err(EngineError::ParseFailure(format!(
                            "PDF extraction failed: {}",
                            e2
                        )));
                    }
                    String::new()
                }
            }
        }
    };

    Ok(ParseOutcome {
        text,
        metadata,
        partial,
        warning: None,
    })
}

/// Pull author/title/creation-date out of the trailer Info dictionary.
fn read_pdf_info(doc: &lopdf::Document, metadata: &mut BTreeMap<String, String>) {
    let info = match doc.trailer.get(b"Info") {
        Ok(obj) => obj,
        Err(_) => return,
    };
    let dict = match info {
        lopdf::Object::Reference(id) => match doc.get_object(*id) {
            Ok(lopdf::Object::Dictionary(d)) => d,
            _ => return,
        },
        lopdf::Object::Dictionary(d) => d,
        _ => return,
    };

    for (key, meta_key) in [
        (b"Author".as_slice(), "author"),
        (b"Title".as_slice(), "title"),
    ] {
        if let Ok(obj) = dict.get(key) {
            if let Some(s) = pdf_string(obj) {
                if !s.is_empty() {
                    metadata.insert(meta_key.to_string(), s);
                }
            }
        }
    }

    if let Ok(obj) = dict.get(b"CreationDate") {
        if let Some(raw) = pdf_string(obj) {
            if let Some(created) = parse_pdf_date(&raw) {
                metadata.insert("created".to_string(), created);
            }
        }
    }
}

/// Decode a PDF string object. Handles the UTF-16BE BOM form; everything
/// else is treated as PDFDocEncoding, which is Latin-1 compatible for
/// the fields we care about.
fn pdf_string(obj: &lopdf::Object) -> Option<String> {
    match obj {
        lopdf::Object::String(bytes, _) => {
            if bytes.starts_with(&[0xFE, 0xFF]) {
                let units: Vec<u16> = bytes[2..]
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                String::from_utf16(&units).ok()
            } else {
                Some(bytes.iter().map(|&b| b as char).collect())
            }
        }
        _ => None,
    }
}

/// Parse a PDF date of the form `D:YYYYMMDDHHmmSS...` into RFC 3339.
/// Returns the raw digits when the full form is not present.
fn parse_pdf_date(raw: &str) -> Option<String> {
    let digits: String = raw
        .trim_start_matches("D:")
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.len() >= 14 {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(&digits[..14], "%Y%m%d%H%M%S") {
            return Some(dt.and_utc().to_rfc3339());
        }
    }
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}
