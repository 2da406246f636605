//! Snippet construction for search results.
//!
//! Chunk text is cleaned (whitespace runs collapsed, trimmed) and then
//! windowed around the first case-insensitive occurrence of the query:
//! up to [`CONTEXT_CHARS`] on each side, clamped to the text. When the
//! query does not occur verbatim the snippet falls back to the first
//! [`FALLBACK_CHARS`] characters. Both forms carry a trailing ellipsis.

/// Context kept on each side of a query match.
const CONTEXT_CHARS: usize = 100;
/// Prefix length when the query is not found in the chunk.
const FALLBACK_CHARS: usize = 200;
const ELLIPSIS: &str = "...";

pub fn build_snippet(chunk_text: &str, query: &str) -> String {
    let cleaned = collapse_whitespace(chunk_text);
    let needle = query.trim().to_lowercase();

    if !needle.is_empty() {
        let haystack = cleaned.to_lowercase();
        // Byte offsets only transfer back when lowercasing preserved
        // lengths; for the rare scripts where it doesn't, fall through
        // to the prefix form.
        if haystack.len() == cleaned.len() {
            if let Some(pos) = haystack.find(&needle) {
                let start = floor_boundary(&cleaned, pos.saturating_sub(CONTEXT_CHARS));
                let end = ceil_boundary(
                    &cleaned,
                    (pos + needle.len() + CONTEXT_CHARS).min(cleaned.len()),
                );
                return format!("{}{}", &cleaned[start..end], ELLIPSIS);
            }
        }
    }

    let prefix: String = cleaned.chars().take(FALLBACK_CHARS).collect();
    format!("{}{}", prefix, ELLIPSIS)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn floor_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_boundary(s: &str, mut i: usize) -> usize {
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}
