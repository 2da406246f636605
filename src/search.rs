//! Retrieval pipeline: query → candidate chunks → per-document groups →
//! ranked, deduplicated results with snippets and signed URLs.
//!
//! Scores are cosine distances, so lower means closer throughout.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use crate::blob::{BlobStore, LocalBlobStore};
use crate::config::{Config, RetrievalConfig};
use crate::embedding::{self, embed_query, EmbeddingProvider};
use crate::error::SearchError;
use crate::models::{ScoredChunk, SearchResult, Snippet};
use crate::snippet::build_snippet;
use crate::store::sqlite::SqliteChunkStore;
use crate::store::ChunkStore;
use crate::{db, migrate};

/// Candidate chunks for one document, best (lowest) score first.
struct DocGroup {
    document_id: String,
    chunks: Vec<ScoredChunk>,
}

impl DocGroup {
    fn best_score(&self) -> f64 {
        self.chunks.first().map(|c| c.score).unwrap_or(f64::MAX)
    }
}

pub struct SearchPipeline {
    store: Arc<dyn ChunkStore>,
    blobs: Arc<dyn BlobStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    params: RetrievalConfig,
}

impl SearchPipeline {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        blobs: Arc<dyn BlobStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        params: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            blobs,
            embedder,
            params,
        }
    }

    /// Run one search. Returns at most `max_documents` results, best first,
    /// each document appearing exactly once.
    pub async fn run(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let vector = embed_query(self.embedder.as_ref(), query)
            .await
            .map_err(SearchError::Embedding)?;

        let candidates = self
            .store
            .nearest(&vector, self.params.candidate_limit)
            .await
            .map_err(SearchError::Store)?;

        let threshold = self.params.score_threshold;
        let kept: Vec<ScoredChunk> = candidates
            .into_iter()
            .filter(|c| c.score < threshold)
            .collect();
        debug!(query, kept = kept.len(), "filtered candidate chunks");

        let groups = group_and_rank(
            kept,
            self.params.max_chunks_per_doc,
            self.params.max_documents,
        );

        self.assemble(query, groups).await
    }

    /// Resolve groups into presentable results: metadata lookup, signed
    /// URL, snippets. Documents whose metadata row is missing are skipped
    /// with a warning; a second group for an already-emitted document is
    /// dropped.
    async fn assemble(
        &self,
        query: &str,
        groups: Vec<DocGroup>,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let ids: Vec<String> = groups.iter().map(|g| g.document_id.clone()).collect();
        let docs = self
            .store
            .get_documents(&ids)
            .await
            .map_err(SearchError::Metadata)?;
        let by_id: HashMap<&str, _> = docs.iter().map(|d| (d.id.as_str(), d)).collect();

        let mut seen = HashSet::new();
        let mut results = Vec::with_capacity(groups.len());

        for group in &groups {
            if !seen.insert(group.document_id.as_str()) {
                continue;
            }
            let Some(doc) = by_id.get(group.document_id.as_str()) else {
                warn!(document_id = %group.document_id, "no metadata for matched document, skipping");
                continue;
            };

            let url = self
                .blobs
                .create_signed_url(&doc.storage_path, self.params.url_ttl_secs)
                .await
                .map_err(SearchError::SignedUrl)?;

            let snippets = group
                .chunks
                .iter()
                .map(|c| Snippet {
                    text: build_snippet(&c.chunk_text, query),
                    score: c.score,
                })
                .collect();

            results.push(SearchResult {
                document_id: doc.id.clone(),
                title: doc.name.clone(),
                url,
                metadata: doc.metadata.clone(),
                snippets,
            });
        }

        Ok(results)
    }
}

/// Group candidates by document, keep the best `max_per_doc` chunks of
/// each, and rank documents by their single best chunk. Ties break on
/// chunk index within a document and on document id across documents, so
/// equal-score inputs rank deterministically.
fn group_and_rank(
    candidates: Vec<ScoredChunk>,
    max_per_doc: usize,
    max_documents: usize,
) -> Vec<DocGroup> {
    let mut by_doc: HashMap<String, Vec<ScoredChunk>> = HashMap::new();
    for chunk in candidates {
        by_doc.entry(chunk.document_id.clone()).or_default().push(chunk);
    }

    let mut groups: Vec<DocGroup> = by_doc
        .into_iter()
        .map(|(document_id, mut chunks)| {
            chunks.sort_by(|a, b| {
                a.score
                    .total_cmp(&b.score)
                    .then(a.chunk_index.cmp(&b.chunk_index))
            });
            chunks.truncate(max_per_doc);
            DocGroup {
                document_id,
                chunks,
            }
        })
        .collect();

    groups.sort_by(|a, b| {
        a.best_score()
            .total_cmp(&b.best_score())
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
    groups.truncate(max_documents);
    groups
}

/// Build the production pipeline from config and run one search (CLI).
pub async fn run_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    migrate::run_migrations(config).await?;

    let pool = db::connect(config).await?;
    let store = Arc::new(SqliteChunkStore::new(pool));

    let mut params = config.retrieval.clone();
    if let Some(limit) = limit {
        params.max_documents = limit;
    }

    let pipeline = SearchPipeline::new(
        store.clone(),
        Arc::new(LocalBlobStore::new(&config.blob)),
        embedding::create_provider(&config.embedding)?,
        params,
    );

    let results = pipeline.run(query).await?;
    if results.is_empty() {
        println!("no results");
    }
    for (rank, result) in results.iter().enumerate() {
        println!("{}. {} ({})", rank + 1, result.title, result.document_id);
        println!("   {}", result.url);
        for snippet in &result.snippets {
            println!("   [{:.4}] {}", snippet.score, snippet.text);
        }
    }

    store.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::config::RetrievalConfig;
    use crate::embedding::HashProvider;
    use crate::models::DocumentInfo;
    use crate::store::memory::InMemoryChunkStore;

    fn scored(doc: &str, index: i64, score: f64) -> ScoredChunk {
        ScoredChunk {
            document_id: doc.to_string(),
            chunk_index: index,
            chunk_text: format!("{doc} chunk {index}"),
            score,
        }
    }

    fn params() -> RetrievalConfig {
        RetrievalConfig {
            candidate_limit: 300,
            max_chunks_per_doc: 3,
            max_documents: 10,
            score_threshold: 1.0,
            url_ttl_secs: 120,
        }
    }

    #[test]
    fn keeps_best_chunks_per_document_in_ascending_order() {
        let groups = group_and_rank(
            vec![
                scored("d1", 0, 0.1),
                scored("d1", 1, 0.5),
                scored("d1", 2, 0.05),
                scored("d1", 3, 0.9),
            ],
            3,
            10,
        );
        assert_eq!(groups.len(), 1);
        let scores: Vec<f64> = groups[0].chunks.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![0.05, 0.1, 0.5]);
    }

    #[test]
    fn ranks_documents_by_best_chunk() {
        let groups = group_and_rank(
            vec![
                scored("d1", 0, 0.2),
                scored("d1", 1, 0.25),
                scored("d2", 0, 0.1),
            ],
            3,
            10,
        );
        let order: Vec<&str> = groups.iter().map(|g| g.document_id.as_str()).collect();
        assert_eq!(order, vec!["d2", "d1"]);
    }

    #[test]
    fn equal_scores_rank_by_document_id() {
        let groups = group_and_rank(
            vec![scored("b", 0, 0.3), scored("a", 0, 0.3)],
            3,
            10,
        );
        let order: Vec<&str> = groups.iter().map(|g| g.document_id.as_str()).collect();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn truncates_to_max_documents() {
        let groups = group_and_rank(
            vec![
                scored("d1", 0, 0.1),
                scored("d2", 0, 0.2),
                scored("d3", 0, 0.3),
            ],
            3,
            2,
        );
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].document_id, "d2");
    }

    fn doc(id: &str) -> DocumentInfo {
        DocumentInfo {
            id: id.to_string(),
            name: format!("{id}.txt"),
            storage_path: format!("docs/{id}.txt"),
            mime_type: "text/plain".to_string(),
            metadata: serde_json::json!({}),
        }
    }

    fn pipeline(store: Arc<InMemoryChunkStore>) -> SearchPipeline {
        SearchPipeline::new(
            store,
            Arc::new(MemoryBlobStore::new()),
            Arc::new(HashProvider::new(16)),
            params(),
        )
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let pipeline = pipeline(Arc::new(InMemoryChunkStore::new()));
        assert!(matches!(pipeline.run("   ").await, Err(SearchError::EmptyQuery)));
    }

    #[tokio::test]
    async fn no_candidates_yields_empty_results() {
        let pipeline = pipeline(Arc::new(InMemoryChunkStore::new()));
        let results = pipeline.run("anything").await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn duplicate_groups_emit_a_document_once() {
        let store = Arc::new(InMemoryChunkStore::new());
        store.upsert_document(&doc("d1")).await.unwrap();
        let pipeline = pipeline(store);

        let groups = vec![
            DocGroup {
                document_id: "d1".to_string(),
                chunks: vec![scored("d1", 0, 0.1)],
            },
            DocGroup {
                document_id: "d1".to_string(),
                chunks: vec![scored("d1", 1, 0.4)],
            },
        ];
        let results = pipeline.assemble("chunk", groups).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].snippets.len(), 1);
        assert!((results[0].snippets[0].score - 0.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn missing_metadata_skips_the_document() {
        let store = Arc::new(InMemoryChunkStore::new());
        store.upsert_document(&doc("d2")).await.unwrap();
        let pipeline = pipeline(store);

        let groups = vec![
            DocGroup {
                document_id: "ghost".to_string(),
                chunks: vec![scored("ghost", 0, 0.05)],
            },
            DocGroup {
                document_id: "d2".to_string(),
                chunks: vec![scored("d2", 0, 0.2)],
            },
        ];
        let results = pipeline.assemble("chunk", groups).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document_id, "d2");
    }

    #[tokio::test]
    async fn results_carry_signed_urls_and_snippets() {
        let store = Arc::new(InMemoryChunkStore::new());
        store.upsert_document(&doc("d1")).await.unwrap();
        let pipeline = pipeline(store);

        let groups = vec![DocGroup {
            document_id: "d1".to_string(),
            chunks: vec![scored("d1", 0, 0.1)],
        }];
        let results = pipeline.assemble("chunk", groups).await.unwrap();
        assert_eq!(results[0].title, "d1.txt");
        assert!(results[0].url.contains("docs/d1.txt"));
        assert!(results[0].snippets[0].text.contains("chunk"));
    }

    #[tokio::test]
    async fn threshold_filters_far_candidates() {
        let store = Arc::new(InMemoryChunkStore::new());
        store.upsert_document(&doc("d1")).await.unwrap();

        // An embedding orthogonal to every query vector sits at distance
        // 1.0, exactly on the (exclusive) threshold.
        store
            .upsert_chunks(&[crate::models::Chunk {
                document_id: "d1".to_string(),
                chunk_index: 0,
                chunk_text: "unrelated".to_string(),
                embedding: vec![0.0; 16],
                token_count: 1,
            }])
            .await
            .unwrap();

        let pipeline = pipeline(store);
        let results = pipeline.run("zzzz").await.unwrap();
        assert!(results.is_empty());
    }
}
