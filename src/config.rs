use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub blob: BlobConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Token window size per chunk.
    #[serde(default = "default_window_tokens")]
    pub window_tokens: usize,
    /// Token stride between consecutive windows; `stride <= window`.
    #[serde(default = "default_stride_tokens")]
    pub stride_tokens: usize,
    /// `"whitespace"` or a path to a HuggingFace `tokenizer.json`.
    #[serde(default = "default_tokenizer")]
    pub tokenizer: String,
}

fn default_window_tokens() -> usize {
    500
}
fn default_stride_tokens() -> usize {
    250
}
fn default_tokenizer() -> String {
    "whitespace".to_string()
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_tokens: default_window_tokens(),
            stride_tokens: default_stride_tokens(),
            tokenizer: default_tokenizer(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"openai"`, `"hash"`, or `"disabled"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Chunk texts per embedding API call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    10
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Nearest chunks fetched globally before aggregation.
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
    /// Best chunks kept per document.
    #[serde(default = "default_max_chunks_per_doc")]
    pub max_chunks_per_doc: usize,
    /// Documents kept in the final result list.
    #[serde(default = "default_max_documents")]
    pub max_documents: usize,
    /// Cosine-distance cutoff: chunks with `score >= threshold` are dropped.
    /// 1.0 keeps only chunks with positive cosine similarity to the query.
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,
    /// Lifetime of signed document URLs in search results.
    #[serde(default = "default_url_ttl_secs")]
    pub url_ttl_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_limit: default_candidate_limit(),
            max_chunks_per_doc: default_max_chunks_per_doc(),
            max_documents: default_max_documents(),
            score_threshold: default_score_threshold(),
            url_ttl_secs: default_url_ttl_secs(),
        }
    }
}

fn default_candidate_limit() -> usize {
    300
}
fn default_max_chunks_per_doc() -> usize {
    3
}
fn default_max_documents() -> usize {
    10
}
fn default_score_threshold() -> f64 {
    1.0
}
fn default_url_ttl_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct BlobConfig {
    /// Root directory of the local blob store.
    pub root: PathBuf,
    /// HMAC secret for signed URL tokens.
    pub secret: String,
    /// Public base URL prefixed to signed blob paths.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    "http://127.0.0.1:7411".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.window_tokens == 0 {
        anyhow::bail!("chunking.window_tokens must be > 0");
    }
    if config.chunking.stride_tokens == 0 {
        anyhow::bail!("chunking.stride_tokens must be > 0");
    }
    if config.chunking.stride_tokens > config.chunking.window_tokens {
        anyhow::bail!("chunking.stride_tokens must be <= chunking.window_tokens");
    }

    if config.retrieval.candidate_limit == 0 {
        anyhow::bail!("retrieval.candidate_limit must be >= 1");
    }
    if config.retrieval.max_chunks_per_doc == 0 {
        anyhow::bail!("retrieval.max_chunks_per_doc must be >= 1");
    }
    if config.retrieval.max_documents == 0 {
        anyhow::bail!("retrieval.max_documents must be >= 1");
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be >= 1");
    }
    match config.embedding.provider.as_str() {
        "disabled" | "hash" => {}
        "openai" => {
            if config.embedding.model.is_none() {
                anyhow::bail!("embedding.model must be specified when provider is 'openai'");
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!("embedding.dims must be > 0 when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hash, or openai.",
            other
        ),
    }

    if config.blob.secret.is_empty() {
        anyhow::bail!("blob.secret must not be empty");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &std::path::Path, body: &str) -> PathBuf {
        let path = dir.join("shelf.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    const MINIMAL: &str = r#"
[db]
path = "/tmp/shelf.sqlite"

[blob]
root = "/tmp/blobs"
secret = "test-secret"

[server]
bind = "127.0.0.1:7411"
"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(tmp.path(), MINIMAL);
        let config = load_config(&path).unwrap();
        assert_eq!(config.chunking.window_tokens, 500);
        assert_eq!(config.chunking.stride_tokens, 250);
        assert_eq!(config.retrieval.candidate_limit, 300);
        assert_eq!(config.retrieval.max_chunks_per_doc, 3);
        assert_eq!(config.retrieval.max_documents, 10);
        assert_eq!(config.retrieval.url_ttl_secs, 120);
        assert_eq!(config.embedding.batch_size, 10);
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn stride_larger_than_window_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let body = format!("{}\n[chunking]\nwindow_tokens = 100\nstride_tokens = 200\n", MINIMAL);
        let path = write_config(tmp.path(), &body);
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("stride_tokens"));
    }

    #[test]
    fn openai_provider_requires_model_and_dims() {
        let tmp = tempfile::tempdir().unwrap();
        let body = format!("{}\n[embedding]\nprovider = \"openai\"\n", MINIMAL);
        let path = write_config(tmp.path(), &body);
        assert!(load_config(&path).is_err());
    }
}
