//! Contextual snippet extraction around query matches.
//!
//! Case-insensitive substring scan in first-occurrence order (cheap and
//! deterministic, not best-match order). Each match yields a window of
//! roughly `snippet_length` characters centered on it, trimmed to word
//! boundaries; windows overlapping an already-collected one are skipped.

/// Extract up to `max_snippets` excerpts of `snippet_length` characters
/// around case-insensitive matches of `query` in `text`.
///
/// An empty query yields no snippets; a text shorter than the window is
/// returned whole (once) when it matches.
pub fn extract_snippets(
    text: &str,
    query: &str,
    max_snippets: usize,
    snippet_length: usize,
) -> Vec<String> {
    let query = query.trim();
    if query.is_empty() || text.is_empty() || max_snippets == 0 || snippet_length == 0 {
        return Vec::new();
    }

    let text_lower = text.to_lowercase();
    let query_lower = query.to_lowercase();

    // Offsets found in the lowercased text are applied to the original,
    // so every char's lowercase form must keep its byte length. Scripts
    // that shift lengths (even when the totals cancel out) fall back to
    // a single whole-text snippet rather than risk misaligned offsets.
    if !lowercase_is_offset_stable(text) {
        return if text_lower.contains(&query_lower) {
            vec![text.trim().to_string()]
        } else {
            Vec::new()
        };
    }

    if text.chars().count() <= snippet_length {
        return if text_lower.contains(&query_lower) {
            vec![text.trim().to_string()]
        } else {
            Vec::new()
        };
    }

    let mut snippets = Vec::new();
    let mut search_from = 0usize;
    let mut last_window_end = 0usize;

    while snippets.len() < max_snippets {
        let pos = match text_lower[search_from..].find(&query_lower) {
            Some(p) => search_from + p,
            None => break,
        };
        let match_end = pos + query_lower.len();

        // Deduplicate: skip matches falling inside the previous window.
        if !snippets.is_empty() && pos < last_window_end {
            search_from = match_end;
            continue;
        }

        let half = snippet_length.saturating_sub(query.len()) / 2;
        let mut start = pos.saturating_sub(half);
        let mut end = (match_end + half).min(text.len());

        start = floor_char_boundary(text, start);
        end = ceil_char_boundary(text, end);

        // Trim to word boundaries so excerpts do not cut words in half.
        if start > 0 {
            if let Some(ws) = text[start..pos].find(char::is_whitespace) {
                start += ws + 1;
            }
        }
        if end < text.len() {
            if let Some(ws) = text[match_end..end].rfind(char::is_whitespace) {
                end = match_end + ws;
            }
        }

        let snippet = text[start..end].trim();
        if !snippet.is_empty() {
            snippets.push(snippet.to_string());
            last_window_end = end;
        }
        search_from = match_end;
    }

    snippets
}

fn lowercase_is_offset_stable(text: &str) -> bool {
    text.chars()
        .all(|c| c.to_lowercase().map(char::len_utf8).sum::<usize>() == c.len_utf8())
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}
