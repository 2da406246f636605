//! Token-window text chunker.
//!
//! Splits a document's extracted text into overlapping windows of at most
//! `window` tokens, advancing `stride` tokens per window. Consecutive
//! windows overlap by `window - stride` tokens and every token of the
//! source appears in at least one window; the last window may be shorter.

use anyhow::{ensure, Result};

use crate::tokenize::Tokenizer;

/// Split text into overlapping token windows, decoded back to text in
/// source order. Empty text yields an empty sequence.
pub fn chunk_text(
    tokenizer: &dyn Tokenizer,
    text: &str,
    window: usize,
    stride: usize,
) -> Result<Vec<String>> {
    ensure!(window > 0, "chunk window must be > 0");
    ensure!(
        stride > 0 && stride <= window,
        "chunk stride must satisfy 0 < stride <= window"
    );

    if text.is_empty() {
        return Ok(Vec::new());
    }

    let ids = tokenizer.encode(text)?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < ids.len() {
        let end = (start + window).min(ids.len());
        chunks.push(tokenizer.decode(&ids[start..end])?);
        start += stride;
    }

    Ok(chunks)
}
