//! In-memory [`ChunkStore`] for tests.
//!
//! `HashMap` and `Vec` behind `std::sync::RwLock`; `nearest` is
//! brute-force cosine distance over all stored vectors, the same scoring
//! the SQLite backend uses.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::models::{Chunk, DocumentInfo, ScoredChunk};

use super::ChunkStore;

pub struct InMemoryChunkStore {
    docs: RwLock<HashMap<String, DocumentInfo>>,
    chunks: RwLock<Vec<Chunk>>,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            chunks: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn upsert_document(&self, doc: &DocumentInfo) -> Result<()> {
        self.docs
            .write()
            .unwrap()
            .insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn get_documents(&self, ids: &[String]) -> Result<Vec<DocumentInfo>> {
        let docs = self.docs.read().unwrap();
        Ok(ids.iter().filter_map(|id| docs.get(id).cloned()).collect())
    }

    async fn delete_chunks(&self, document_id: &str) -> Result<()> {
        self.chunks
            .write()
            .unwrap()
            .retain(|c| c.document_id != document_id);
        Ok(())
    }

    async fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut stored = self.chunks.write().unwrap();
        for chunk in chunks {
            stored.retain(|c| {
                !(c.document_id == chunk.document_id && c.chunk_index == chunk.chunk_index)
            });
            stored.push(chunk.clone());
        }
        Ok(())
    }

    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let mut found: Vec<Chunk> = self
            .chunks
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        found.sort_by_key(|c| c.chunk_index);
        Ok(found)
    }

    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
        let mut scored: Vec<ScoredChunk> = self
            .chunks
            .read()
            .unwrap()
            .iter()
            .map(|c| ScoredChunk {
                document_id: c.document_id.clone(),
                chunk_index: c.chunk_index,
                chunk_text: c.chunk_text.clone(),
                score: cosine_distance(query, &c.embedding),
            })
            .collect();

        scored.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.document_id.cmp(&b.document_id))
                .then(a.chunk_index.cmp(&b.chunk_index))
        });
        scored.truncate(limit);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(doc: &str, index: i64, embedding: Vec<f32>) -> Chunk {
        Chunk {
            document_id: doc.to_string(),
            chunk_index: index,
            chunk_text: format!("{} chunk {}", doc, index),
            embedding,
            token_count: 3,
        }
    }

    #[tokio::test]
    async fn nearest_orders_by_distance_ascending() {
        let store = InMemoryChunkStore::new();
        store
            .upsert_chunks(&[
                chunk("d1", 0, vec![1.0, 0.0]),  // distance 0 to query
                chunk("d2", 0, vec![0.0, 1.0]),  // distance 1
                chunk("d3", 0, vec![-1.0, 0.0]), // distance 2
            ])
            .await
            .unwrap();

        let hits = store.nearest(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].document_id, "d1");
        assert!(hits[0].score < 1e-6);
        assert_eq!(hits[1].document_id, "d2");
        assert!((hits[1].score - 1.0).abs() < 1e-6);
        assert_eq!(hits[2].document_id, "d3");
        assert!((hits[2].score - 2.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn nearest_respects_limit() {
        let store = InMemoryChunkStore::new();
        store
            .upsert_chunks(&[
                chunk("d1", 0, vec![1.0, 0.0]),
                chunk("d1", 1, vec![0.9, 0.1]),
                chunk("d1", 2, vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = store.nearest(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn upsert_replaces_same_key() {
        let store = InMemoryChunkStore::new();
        store
            .upsert_chunks(&[chunk("d1", 0, vec![1.0])])
            .await
            .unwrap();
        let mut updated = chunk("d1", 0, vec![0.5]);
        updated.chunk_text = "updated".to_string();
        store.upsert_chunks(&[updated]).await.unwrap();

        let chunks = store.chunks_for_document("d1").await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_text, "updated");
    }

    #[tokio::test]
    async fn delete_is_scoped_by_document() {
        let store = InMemoryChunkStore::new();
        store
            .upsert_chunks(&[chunk("d1", 0, vec![1.0]), chunk("d2", 0, vec![1.0])])
            .await
            .unwrap();
        store.delete_chunks("d1").await.unwrap();

        assert!(store.chunks_for_document("d1").await.unwrap().is_empty());
        assert_eq!(store.chunks_for_document("d2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_documents_skips_unknown_ids() {
        let store = InMemoryChunkStore::new();
        store
            .upsert_document(&DocumentInfo {
                id: "d1".to_string(),
                name: "One".to_string(),
                storage_path: "docs/one.txt".to_string(),
                mime_type: "text/plain".to_string(),
                metadata: serde_json::json!({}),
            })
            .await
            .unwrap();

        let docs = store
            .get_documents(&["d1".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].name, "One");
    }
}
