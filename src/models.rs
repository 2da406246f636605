//! Core data models for the ingestion and retrieval pipelines.

use serde::Serialize;

/// One overlapping token window of a document's extracted text, as persisted.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub document_id: String,
    /// Zero-based position among the document's chunks; unique only within
    /// a document.
    pub chunk_index: i64,
    /// Decoded window text with NUL bytes stripped.
    pub chunk_text: String,
    /// Fixed-dimension vector from the embedding model.
    pub embedding: Vec<f32>,
    /// Token count of `chunk_text`, recomputed per chunk after decoding.
    pub token_count: i64,
}

/// Display metadata for a document, owned by the archive subsystem.
#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub id: String,
    pub name: String,
    pub storage_path: String,
    pub mime_type: String,
    pub metadata: serde_json::Value,
}

/// A chunk returned by the vector-search primitive, with its distance
/// to the query vector. Lower score = closer match.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub document_id: String,
    pub chunk_index: i64,
    pub chunk_text: String,
    /// Cosine distance `1 - cos(query, chunk)`; range `[0, 2]`.
    pub score: f64,
}

/// A cleaned excerpt of a matching chunk, built for display.
#[derive(Debug, Clone, Serialize)]
pub struct Snippet {
    pub text: String,
    pub score: f64,
}

/// One ranked document in a search response.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub document_id: String,
    pub title: String,
    /// Short-lived signed URL to the stored object.
    pub url: String,
    pub metadata: serde_json::Value,
    /// Best snippets for this document, best-first.
    pub snippets: Vec<Snippet>,
}
