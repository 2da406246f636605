//! SQLite [`ChunkStore`] backend.
//!
//! Embeddings are stored as little-endian f32 BLOBs; `nearest` loads the
//! stored vectors and ranks by cosine distance in Rust. Chunk replacement
//! relies on the `(document_id, chunk_index)` primary key for upserts.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use crate::models::{Chunk, DocumentInfo, ScoredChunk};

use super::ChunkStore;

pub struct SqliteChunkStore {
    pool: SqlitePool,
}

impl SqliteChunkStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ChunkStore for SqliteChunkStore {
    async fn upsert_document(&self, doc: &DocumentInfo) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, name, storage_path, mime_type, metadata_json)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                storage_path = excluded.storage_path,
                mime_type = excluded.mime_type,
                metadata_json = excluded.metadata_json
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.name)
        .bind(&doc.storage_path)
        .bind(&doc.mime_type)
        .bind(doc.metadata.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_documents(&self, ids: &[String]) -> Result<Vec<DocumentInfo>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, name, storage_path, mime_type, metadata_json \
             FROM documents WHERE id IN ({})",
            placeholders
        );

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let docs = rows
            .iter()
            .map(|row| {
                let metadata_json: String = row.get("metadata_json");
                DocumentInfo {
                    id: row.get("id"),
                    name: row.get("name"),
                    storage_path: row.get("storage_path"),
                    mime_type: row.get("mime_type"),
                    metadata: serde_json::from_str(&metadata_json)
                        .unwrap_or(serde_json::json!({})),
                }
            })
            .collect();

        Ok(docs)
    }

    async fn delete_chunks(&self, document_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (document_id, chunk_index, chunk_text, embedding, token_count)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(document_id, chunk_index) DO UPDATE SET
                    chunk_text = excluded.chunk_text,
                    embedding = excluded.embedding,
                    token_count = excluded.token_count
                "#,
            )
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.chunk_text)
            .bind(vec_to_blob(&chunk.embedding))
            .bind(chunk.token_count)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT document_id, chunk_index, chunk_text, embedding, token_count \
             FROM chunks WHERE document_id = ? ORDER BY chunk_index",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                Chunk {
                    document_id: row.get("document_id"),
                    chunk_index: row.get("chunk_index"),
                    chunk_text: row.get("chunk_text"),
                    embedding: blob_to_vec(&blob),
                    token_count: row.get("token_count"),
                }
            })
            .collect())
    }

    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
        let rows = sqlx::query(
            "SELECT document_id, chunk_index, chunk_text, embedding FROM chunks",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<ScoredChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = blob_to_vec(&blob);
                ScoredChunk {
                    document_id: row.get("document_id"),
                    chunk_index: row.get("chunk_index"),
                    chunk_text: row.get("chunk_text"),
                    score: cosine_distance(query, &vec),
                }
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
