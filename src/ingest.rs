//! Ingestion pipeline orchestration.
//!
//! Turns a document reference into a persisted, internally-consistent
//! chunk set: download → extract → chunk → delete old chunks → embed in
//! batches → upsert. Old chunks are always deleted before any new chunk
//! is written, so a retried run can never mix chunk sets from two runs.
//!
//! A failed embedding batch aborts the run and may leave only the batches
//! written so far; the next successful run fully overwrites them. Two
//! concurrent runs for the *same* document are not serialized here and
//! must be serialized by the caller.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;
use tracing::{debug, info};

use crate::blob::{BlobStore, LocalBlobStore};
use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::IngestError;
use crate::extract::{DefaultExtractor, TextExtractor};
use crate::models::{Chunk, DocumentInfo};
use crate::store::sqlite::SqliteChunkStore;
use crate::store::ChunkStore;
use crate::tokenize::{self, Tokenizer};
use crate::{db, migrate};

/// One document to (re)ingest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub document_id: String,
    pub storage_path: String,
    pub mime_type: String,
    /// Display name; defaults to the storage path's file name.
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Successful ingestion outcome.
#[derive(Debug, Clone, Copy)]
pub struct IngestReport {
    pub chunks: usize,
}

/// Chunking and batching knobs for the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub window_tokens: usize,
    pub stride_tokens: usize,
    pub embed_batch_size: usize,
}

impl IngestOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            window_tokens: config.chunking.window_tokens,
            stride_tokens: config.chunking.stride_tokens,
            embed_batch_size: config.embedding.batch_size,
        }
    }
}

pub struct IngestionPipeline {
    blobs: Arc<dyn BlobStore>,
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    tokenizer: Arc<dyn Tokenizer>,
    extractor: Arc<dyn TextExtractor>,
    options: IngestOptions,
}

impl IngestionPipeline {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        tokenizer: Arc<dyn Tokenizer>,
        extractor: Arc<dyn TextExtractor>,
        options: IngestOptions,
    ) -> Self {
        Self {
            blobs,
            store,
            embedder,
            tokenizer,
            extractor,
            options,
        }
    }

    /// Run one ingestion for the referenced document.
    ///
    /// Re-running with unchanged content yields the same final chunk set.
    /// Zero chunks (empty extracted text) is success, not an error.
    pub async fn run(&self, req: &IngestRequest) -> Result<IngestReport, IngestError> {
        validate(req)?;

        let bytes = self
            .blobs
            .download(&req.storage_path)
            .await
            .map_err(|source| IngestError::Download {
                path: req.storage_path.clone(),
                source,
            })?;

        let text = self.extractor.extract(&bytes, &req.mime_type)?;

        let windows = chunk_text(
            self.tokenizer.as_ref(),
            &text,
            self.options.window_tokens,
            self.options.stride_tokens,
        )
        .map_err(|e| IngestError::Tokenize(e.to_string()))?;

        debug!(
            document_id = %req.document_id,
            windows = windows.len(),
            "chunked document text"
        );

        self.store
            .upsert_document(&document_info(req))
            .await
            .map_err(IngestError::Store)?;

        // Delete-before-insert: the store must never mix chunk sets from
        // two ingestion runs.
        self.store
            .delete_chunks(&req.document_id)
            .await
            .map_err(IngestError::Store)?;

        let mut written = 0usize;

        for (batch_idx, batch) in windows.chunks(self.options.embed_batch_size).enumerate() {
            let base_index = batch_idx * self.options.embed_batch_size;

            let vectors = self
                .embedder
                .embed(batch)
                .await
                .map_err(IngestError::Embedding)?;
            if vectors.len() != batch.len() {
                return Err(IngestError::Embedding(anyhow::anyhow!(
                    "provider returned {} vectors for {} inputs",
                    vectors.len(),
                    batch.len()
                )));
            }

            // Zip texts with vectors by position immediately, before any
            // further transformation can disturb the ordering.
            let mut records = Vec::with_capacity(batch.len());
            for (offset, (window, embedding)) in batch.iter().zip(vectors).enumerate() {
                // Some storage layers reject embedded NUL characters.
                let chunk_text = window.replace('\0', "");
                // Recomputed per chunk: decode/re-encode does not always
                // round-trip to the same token count.
                let token_count = self
                    .tokenizer
                    .encode(&chunk_text)
                    .map_err(|e| IngestError::Tokenize(e.to_string()))?
                    .len() as i64;

                records.push(Chunk {
                    document_id: req.document_id.clone(),
                    chunk_index: (base_index + offset) as i64,
                    chunk_text,
                    embedding,
                    token_count,
                });
            }

            self.store
                .upsert_chunks(&records)
                .await
                .map_err(IngestError::Store)?;
            written += records.len();
        }

        info!(
            document_id = %req.document_id,
            chunks = written,
            "ingestion complete"
        );

        Ok(IngestReport { chunks: written })
    }
}

fn validate(req: &IngestRequest) -> Result<(), IngestError> {
    if req.document_id.trim().is_empty() {
        return Err(IngestError::InvalidRequest(
            "documentId must not be empty".to_string(),
        ));
    }
    if req.storage_path.trim().is_empty() {
        return Err(IngestError::InvalidRequest(
            "storagePath must not be empty".to_string(),
        ));
    }
    if req.mime_type.trim().is_empty() {
        return Err(IngestError::InvalidRequest(
            "mimeType must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn document_info(req: &IngestRequest) -> DocumentInfo {
    let name = req.display_name.clone().unwrap_or_else(|| {
        Path::new(&req.storage_path)
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| req.storage_path.clone())
    });

    DocumentInfo {
        id: req.document_id.clone(),
        name,
        storage_path: req.storage_path.clone(),
        mime_type: req.mime_type.clone(),
        metadata: req.metadata.clone().unwrap_or(serde_json::json!({})),
    }
}

/// Build the production pipeline from config and run one ingestion (CLI).
pub async fn run_ingest(
    config: &Config,
    document_id: &str,
    storage_path: &str,
    mime_type: &str,
    display_name: Option<String>,
) -> Result<()> {
    migrate::run_migrations(config).await?;

    let pool = db::connect(config).await?;
    let store = Arc::new(SqliteChunkStore::new(pool));
    let pipeline = IngestionPipeline::new(
        Arc::new(LocalBlobStore::new(&config.blob)),
        store.clone(),
        embedding::create_provider(&config.embedding)?,
        tokenize::create_tokenizer(&config.chunking)?,
        Arc::new(DefaultExtractor),
        IngestOptions::from_config(config),
    );

    let report = pipeline
        .run(&IngestRequest {
            document_id: document_id.to_string(),
            storage_path: storage_path.to_string(),
            mime_type: mime_type.to_string(),
            display_name,
            metadata: None,
        })
        .await?;

    println!("ingest {}", document_id);
    println!("  chunks written: {}", report.chunks);
    println!("ok");

    store.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::embedding::HashProvider;
    use crate::error::ExtractError;
    use crate::store::memory::InMemoryChunkStore;
    use crate::tokenize::WhitespaceTokenizer;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const OPTIONS: IngestOptions = IngestOptions {
        window_tokens: 4,
        stride_tokens: 2,
        embed_batch_size: 2,
    };

    fn request(id: &str, path: &str) -> IngestRequest {
        IngestRequest {
            document_id: id.to_string(),
            storage_path: path.to_string(),
            mime_type: "text/plain".to_string(),
            display_name: None,
            metadata: None,
        }
    }

    struct Fixture {
        blobs: Arc<MemoryBlobStore>,
        store: Arc<InMemoryChunkStore>,
        pipeline: IngestionPipeline,
    }

    fn fixture_with(embedder: Arc<dyn EmbeddingProvider>, options: IngestOptions) -> Fixture {
        let blobs = Arc::new(MemoryBlobStore::new());
        let store = Arc::new(InMemoryChunkStore::new());
        let pipeline = IngestionPipeline::new(
            blobs.clone(),
            store.clone(),
            embedder,
            Arc::new(WhitespaceTokenizer::new()),
            Arc::new(DefaultExtractor),
            options,
        );
        Fixture {
            blobs,
            store,
            pipeline,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(HashProvider::new(16)), OPTIONS)
    }

    /// Fails every batch after the first.
    struct FlakyProvider {
        inner: HashProvider,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyProvider {
        fn model_name(&self) -> &str {
            "flaky"
        }
        fn dims(&self) -> usize {
            self.inner.dims()
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
                anyhow::bail!("provider unavailable");
            }
            self.inner.embed(texts).await
        }
    }

    #[tokio::test]
    async fn ingest_writes_ordered_chunks() {
        let fx = fixture();
        fx.blobs
            .put("docs/a.txt", b"w0 w1 w2 w3 w4 w5 w6".to_vec());

        let report = fx.pipeline.run(&request("d1", "docs/a.txt")).await.unwrap();
        assert_eq!(report.chunks, 4);

        let chunks = fx.store.chunks_for_document("d1").await.unwrap();
        assert_eq!(chunks.len(), 4);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as i64);
            assert!(chunk.token_count <= OPTIONS.window_tokens as i64);
        }
        assert_eq!(chunks[0].chunk_text, "w0 w1 w2 w3");
        assert_eq!(chunks[1].chunk_text, "w2 w3 w4 w5");
    }

    #[tokio::test]
    async fn ingest_is_idempotent() {
        let fx = fixture();
        fx.blobs.put("docs/a.txt", b"alpha beta gamma delta epsilon".to_vec());

        fx.pipeline.run(&request("d1", "docs/a.txt")).await.unwrap();
        let first = fx.store.chunks_for_document("d1").await.unwrap();
        fx.pipeline.run(&request("d1", "docs/a.txt")).await.unwrap();
        let second = fx.store.chunks_for_document("d1").await.unwrap();

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.chunk_index, b.chunk_index);
            assert_eq!(a.chunk_text, b.chunk_text);
            assert_eq!(a.token_count, b.token_count);
        }
    }

    #[tokio::test]
    async fn reingesting_shorter_content_leaves_no_stale_chunks() {
        let fx = fixture();
        fx.blobs
            .put("docs/a.txt", b"w0 w1 w2 w3 w4 w5 w6 w7 w8 w9".to_vec());
        fx.pipeline.run(&request("d1", "docs/a.txt")).await.unwrap();
        let long = fx.store.chunks_for_document("d1").await.unwrap().len();

        fx.blobs.put("docs/a.txt", b"w0 w1".to_vec());
        fx.pipeline.run(&request("d1", "docs/a.txt")).await.unwrap();
        let chunks = fx.store.chunks_for_document("d1").await.unwrap();

        assert!(long > 1);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[tokio::test]
    async fn empty_text_succeeds_with_zero_chunks() {
        let fx = fixture();
        fx.blobs.put("docs/empty.txt", Vec::new());

        let report = fx
            .pipeline
            .run(&request("d1", "docs/empty.txt"))
            .await
            .unwrap();
        assert_eq!(report.chunks, 0);
        assert!(fx.store.chunks_for_document("d1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn nul_bytes_are_stripped_from_chunk_text() {
        let fx = fixture();
        fx.blobs.put("docs/a.txt", b"foo\0bar baz".to_vec());

        fx.pipeline.run(&request("d1", "docs/a.txt")).await.unwrap();
        let chunks = fx.store.chunks_for_document("d1").await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(!chunks[0].chunk_text.contains('\0'));
        assert_eq!(chunks[0].chunk_text, "foobar baz");
    }

    #[tokio::test]
    async fn unsupported_mime_type_is_a_distinct_error() {
        let fx = fixture();
        fx.blobs.put("docs/a.bin", b"1234".to_vec());

        let mut req = request("d1", "docs/a.bin");
        req.mime_type = "application/octet-stream".to_string();
        let err = fx.pipeline.run(&req).await.unwrap_err();
        assert!(matches!(
            err,
            IngestError::Extract(ExtractError::UnsupportedMimeType(_))
        ));
    }

    #[tokio::test]
    async fn missing_blob_surfaces_download_error() {
        let fx = fixture();
        let err = fx
            .pipeline
            .run(&request("d1", "docs/nope.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Download { .. }));
    }

    #[tokio::test]
    async fn blank_fields_are_rejected_before_side_effects() {
        let fx = fixture();
        let err = fx.pipeline.run(&request("", "docs/a.txt")).await.unwrap_err();
        assert!(matches!(err, IngestError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn mid_batch_embedding_failure_aborts_and_surfaces() {
        let flaky = Arc::new(FlakyProvider {
            inner: HashProvider::new(16),
            calls: AtomicUsize::new(0),
        });
        let fx = fixture_with(flaky, OPTIONS);
        // 7 tokens with window 4 / stride 2 -> 4 windows -> 2 batches of 2.
        fx.blobs
            .put("docs/a.txt", b"w0 w1 w2 w3 w4 w5 w6".to_vec());

        let err = fx.pipeline.run(&request("d1", "docs/a.txt")).await;
        assert!(matches!(err, Err(IngestError::Embedding(_))));

        // Only the first batch was written; the next successful run
        // replaces it entirely.
        let partial = fx.store.chunks_for_document("d1").await.unwrap();
        assert_eq!(partial.len(), 2);
    }

    #[tokio::test]
    async fn document_metadata_is_registered() {
        let fx = fixture();
        fx.blobs.put("docs/report.txt", b"hello world".to_vec());
        fx.pipeline
            .run(&request("d1", "docs/report.txt"))
            .await
            .unwrap();

        let docs = fx.store.get_documents(&["d1".to_string()]).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].name, "report.txt");
        assert_eq!(docs[0].mime_type, "text/plain");
    }
}
