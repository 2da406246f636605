//! Error taxonomy for the ingestion and retrieval pipelines.
//!
//! Input errors, unsupported-content errors, and downstream failures are
//! distinct variants so the HTTP layer can map them to 400, 415, and 500
//! without string matching. Downstream causes are wrapped `anyhow::Error`s
//! from the collaborator traits.

use thiserror::Error;

/// Text extraction failures.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Mime type the extractor does not handle. Permanent, not transient.
    #[error("unsupported mime type: {0}")]
    UnsupportedMimeType(String),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("text decode failed: {0}")]
    Decode(String),
}

/// Failures aborting an ingestion run. Every variant aborts the whole run
/// for the document; there is no partial-success return.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("download failed for '{path}': {source}")]
    Download {
        path: String,
        source: anyhow::Error,
    },

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("tokenizer error: {0}")]
    Tokenize(String),

    #[error("embedding provider failed: {0}")]
    Embedding(anyhow::Error),

    #[error("chunk store write failed: {0}")]
    Store(anyhow::Error),
}

/// Failures aborting a search request. No partial result list is returned.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error("embedding provider failed: {0}")]
    Embedding(anyhow::Error),

    #[error("vector search failed: {0}")]
    Store(anyhow::Error),

    #[error("metadata lookup failed: {0}")]
    Metadata(anyhow::Error),

    #[error("signed URL generation failed: {0}")]
    SignedUrl(anyhow::Error),
}
