//! HTML text extraction: tag stripping, entity decoding, whitespace
//! collapsing. Block-level elements become single newlines; `script`
//! and `style` content is dropped entirely.

use std::collections::BTreeMap;

use crate::error::EngineError;

use super::{text, ParseOutcome};

/// Tags whose boundaries imply a line break in the extracted text.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "tr", "table", "h1", "h2", "h3", "h4", "h5", "h6",
    "blockquote", "pre", "section", "article", "header", "footer", "hr",
];

pub fn parse_html(bytes: &[u8]) -> Result<ParseOutcome, EngineError> {
    // Reuse the plain-text decode chain for the raw markup itself.
    let markup = text::parse_txt(bytes)?.text;
    let stripped = strip_markup(&markup);

    Ok(ParseOutcome {
        text: collapse_whitespace(&stripped),
        metadata: BTreeMap::new(),
        partial: false,
        warning: None,
    })
}

/// Single pass over the markup: text outside tags is kept (entities
/// decoded), tags are dropped, block-tag boundaries emit newlines.
fn strip_markup(html: &str) -> String {
    let mut out = String::with_capacity(html.len() / 2);
    let mut i = 0;
    let mut skip_until_close: Option<&'static str> = None;

    while i < html.len() {
        let rest = &html[i..];
        if let Some(after_lt) = rest.strip_prefix('<') {
            let end = match after_lt.find('>') {
                Some(e) => e,
                None => break, // unterminated tag: drop the remainder
            };
            let (name, closing) = tag_name(&after_lt[..end]);

            if let Some(waiting_for) = skip_until_close {
                if closing && name == waiting_for {
                    skip_until_close = None;
                }
            } else if !closing && name == "script" {
                skip_until_close = Some("script");
            } else if !closing && name == "style" {
                skip_until_close = Some("style");
            } else if BLOCK_TAGS.contains(&name.as_str()) {
                out.push('\n');
            }

            i += 1 + end + 1; // '<' + tag body + '>'
            continue;
        }

        let c = match rest.chars().next() {
            Some(c) => c,
            None => break,
        };

        if skip_until_close.is_some() {
            i += c.len_utf8();
            continue;
        }

        if c == '&' {
            if let Some((decoded, consumed)) = decode_entity(&rest[1..]) {
                out.push_str(&decoded);
                i += 1 + consumed;
                continue;
            }
        }

        out.push(c);
        i += c.len_utf8();
    }

    out
}

/// Lowercased tag name and whether it is a closing tag.
fn tag_name(tag_body: &str) -> (String, bool) {
    let body = tag_body.trim();
    let (body, closing) = match body.strip_prefix('/') {
        Some(rest) => (rest, true),
        None => (body, false),
    };
    let name: String = body
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    (name, closing)
}

/// Decode the entity starting right after an '&'. Returns the decoded
/// text and how many bytes (through the ';') were consumed.
fn decode_entity(rest: &str) -> Option<(String, usize)> {
    let semi = rest.find(';')?;
    if semi == 0 || semi > 10 {
        return None;
    }
    let name = &rest[..semi];
    let decoded = match name {
        "amp" => "&".to_string(),
        "lt" => "<".to_string(),
        "gt" => ">".to_string(),
        "quot" => "\"".to_string(),
        "apos" => "'".to_string(),
        "nbsp" => " ".to_string(),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok()?
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok()?
            } else {
                return None;
            };
            char::from_u32(code)?.to_string()
        }
    };
    Some((decoded, semi + 1))
}

/// Collapse runs of spaces/tabs to one space and runs of newlines to a
/// single newline; trim every line and drop the empties.
fn collapse_whitespace(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in text.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if !collapsed.is_empty() {
            lines.push(collapsed);
        }
    }
    lines.join("\n")
}
