//! Tokenizer abstraction for chunking and token accounting.
//!
//! The chunker and ingestion pipeline only need encode/decode over token
//! ids, so the backing tokenizer is injected behind a trait. Production
//! configs point at a HuggingFace `tokenizer.json`; the whitespace
//! tokenizer is a dependency-free fallback used in development and tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use anyhow::Result;

use crate::config::ChunkingConfig;

pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<u32>>;
    fn decode(&self, ids: &[u32]) -> Result<String>;
}

/// Build the tokenizer named by the chunking config.
pub fn create_tokenizer(config: &ChunkingConfig) -> Result<Arc<dyn Tokenizer>> {
    match config.tokenizer.as_str() {
        "whitespace" => Ok(Arc::new(WhitespaceTokenizer::new())),
        path => Ok(Arc::new(HfTokenizer::from_file(Path::new(path))?)),
    }
}

/// HuggingFace tokenizer loaded from a `tokenizer.json` file.
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
}

impl HfTokenizer {
    pub fn from_file(path: &Path) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer {}: {}", path.display(), e))?;
        Ok(Self { inner })
    }
}

impl Tokenizer for HfTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| anyhow::anyhow!("tokenizer encode failed: {}", e))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.inner
            .decode(ids, true)
            .map_err(|e| anyhow::anyhow!("tokenizer decode failed: {}", e))
    }
}

/// Word-level tokenizer splitting on Unicode whitespace.
///
/// Ids are interned per instance, so encode/decode round-trips within one
/// tokenizer. Decoding joins words with single spaces; original whitespace
/// runs are not preserved.
pub struct WhitespaceTokenizer {
    vocab: RwLock<Vocab>,
}

#[derive(Default)]
struct Vocab {
    ids: HashMap<String, u32>,
    words: Vec<String>,
}

impl WhitespaceTokenizer {
    pub fn new() -> Self {
        Self {
            vocab: RwLock::new(Vocab::default()),
        }
    }
}

impl Default for WhitespaceTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for WhitespaceTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let mut vocab = self
            .vocab
            .write()
            .map_err(|_| anyhow::anyhow!("tokenizer vocab lock poisoned"))?;
        let mut out = Vec::new();
        for word in text.split_whitespace() {
            let id = match vocab.ids.get(word) {
                Some(&id) => id,
                None => {
                    let id = vocab.words.len() as u32;
                    vocab.words.push(word.to_string());
                    vocab.ids.insert(word.to_string(), id);
                    id
                }
            };
            out.push(id);
        }
        Ok(out)
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        let vocab = self
            .vocab
            .read()
            .map_err(|_| anyhow::anyhow!("tokenizer vocab lock poisoned"))?;
        let mut words = Vec::with_capacity(ids.len());
        for &id in ids {
            let word = vocab
                .words
                .get(id as usize)
                .ok_or_else(|| anyhow::anyhow!("unknown token id: {}", id))?;
            words.push(word.as_str());
        }
        Ok(words.join(" "))
    }
}
