//! Chunk storage abstraction.
//!
//! [`ChunkStore`] covers every persistence operation the pipelines need:
//! document metadata upsert and batched lookup, whole-document chunk
//! replacement, and the vector-similarity `nearest` primitive. Backends:
//! SQLite ([`sqlite::SqliteChunkStore`]) and in-memory
//! ([`memory::InMemoryChunkStore`]) for tests.
//!
//! Scores returned by `nearest` are cosine distances (`1 - cos`); lower
//! is a closer match. All chunk operations are scoped by `document_id`,
//! so concurrent ingestion of *different* documents does not interfere.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, DocumentInfo, ScoredChunk};

#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Insert or update a document's display metadata.
    async fn upsert_document(&self, doc: &DocumentInfo) -> Result<()>;

    /// Fetch metadata for a set of document ids in one batched lookup.
    /// Unknown ids are silently absent from the result.
    async fn get_documents(&self, ids: &[String]) -> Result<Vec<DocumentInfo>>;

    /// Delete all chunks belonging to a document.
    async fn delete_chunks(&self, document_id: &str) -> Result<()>;

    /// Upsert chunk records keyed by `(document_id, chunk_index)`.
    async fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<()>;

    /// All chunks for one document, ordered by `chunk_index`.
    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>>;

    /// The `limit` nearest chunks to `query` across the whole store,
    /// by cosine distance ascending.
    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredChunk>>;
}
