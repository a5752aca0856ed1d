//! DOCX (OOXML word processing) extraction.
//!
//! Pulls paragraph text from `word/document.xml` in document order and
//! core properties (author, title, created, modified) from
//! `docProps/core.xml`.

use std::collections::BTreeMap;
use std::io::Read;

use quick_xml::events::Event;

use crate::error::EngineError;

use super::ParseOutcome;

/// Decompressed ceiling for a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

pub fn parse_docx(bytes: &[u8]) -> Result<ParseOutcome, EngineError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| EngineError::ParseFailure(format!("not a DOCX archive: {}", e)))?;

    let doc_xml = read_entry(&mut archive, "word/document.xml")?
        .ok_or_else(|| EngineError::ParseFailure("word/document.xml not found".to_string()))?;

    let (text, paragraph_count) = extract_paragraphs(&doc_xml)?;

    let mut metadata = BTreeMap::new();
    metadata.insert("paragraph_count".to_string(), paragraph_count.to_string());

    // Core properties are optional; a missing or malformed part is fine.
    if let Ok(Some(core_xml)) = read_entry(&mut archive, "docProps/core.xml") {
        read_core_properties(&core_xml, &mut metadata);
    }

    Ok(ParseOutcome {
        text,
        metadata,
        partial: false,
        warning: None,
    })
}

fn read_entry(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
) -> Result<Option<Vec<u8>>, EngineError> {
    let entry = match archive.by_name(name) {
        Ok(e) => e,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(EngineError::ParseFailure(e.to_string())),
    };
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| EngineError::ParseFailure(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(EngineError::ParseFailure(format!(
            "ZIP entry {} exceeds size limit",
            name
        )));
    }
    Ok(Some(out))
}

/// Walk `word/document.xml`, gathering `w:t` runs and terminating
/// paragraphs at `w:p` end tags. Paragraphs join with single newlines.
fn extract_paragraphs(xml: &[u8]) -> Result<(String, usize), EngineError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"t" => in_text_run = true,
                b"tab" => current.push('\t'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text_run => {
                current.push_str(t.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text_run = false,
                b"p" => {
                    paragraphs.push(std::mem::take(&mut current));
                    in_text_run = false;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(EngineError::ParseFailure(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if !current.is_empty() {
        paragraphs.push(current);
    }

    let count = paragraphs.len();
    let text = paragraphs
        .iter()
        .map(|p| p.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();
    Ok((text, count))
}

/// Read `dc:creator`, `dc:title`, `dcterms:created`, `dcterms:modified`
/// from `docProps/core.xml`. Best-effort: malformed XML just stops.
fn read_core_properties(xml: &[u8], metadata: &mut BTreeMap<String, String>) {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut current_key: Option<&'static str> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                current_key = match e.local_name().as_ref() {
                    b"creator" => Some("author"),
                    b"title" => Some("title"),
                    b"created" => Some("created"),
                    b"modified" => Some("modified"),
                    _ => None,
                };
            }
            Ok(Event::Text(t)) => {
                if let Some(key) = current_key.take() {
                    let value = t.unescape().unwrap_or_default().trim().to_string();
                    if !value.is_empty() {
                        metadata.insert(key.to_string(), value);
                    }
                }
            }
            Ok(Event::End(_)) => current_key = None,
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
}
