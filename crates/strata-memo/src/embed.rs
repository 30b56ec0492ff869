//! Cached text embeddings.
//!
//! Each text is cached under `{"embedding_list": [f32, ...]}`. The batch path
//! reads every key in one `mget`, embeds the misses in one model call and
//! writes them back in one `mset`, then reassembles results in input order.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use strata_store::{BoxError, DocumentStore, Store};
use strata_types::Document;
use tracing::debug;

use crate::error::{MemoError, MemoResult};
use crate::key::MemoKeyer;

/// Cache entry field holding the embedding.
pub const EMBEDDING_FIELD: &str = "embedding_list";

/// An embedding model.
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts. The result has one vector per input, in order.
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BoxError>;

    /// Embed a single query text.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>, BoxError> {
        self.embed_documents(&[text.to_string()])?
            .pop()
            .ok_or_else(|| "embedder returned no vector".into())
    }
}

/// Vector dimension of a known embedding model.
pub fn embedding_dimension(model_name: &str) -> MemoResult<usize> {
    match model_name {
        "openai-text-embedding-3-small" => Ok(1536),
        "openai-text-embedding-3-large" => Ok(3072),
        other => Err(MemoError::UnknownModel(other.to_string())),
    }
}

/// An [`Embedder`] with an optional document-store side cache.
///
/// Without a cache every call goes straight to the model.
pub struct CachedEmbedder {
    model_name: String,
    dimension: usize,
    inner: Arc<dyn Embedder>,
    cache: Option<Arc<dyn DocumentStore>>,
}

impl CachedEmbedder {
    /// Wrap a model whose dimension is in the known-model table.
    pub fn new(
        model_name: impl Into<String>,
        inner: Arc<dyn Embedder>,
        cache: Option<Arc<dyn DocumentStore>>,
    ) -> MemoResult<Self> {
        let model_name = model_name.into();
        let dimension = embedding_dimension(&model_name)?;
        Ok(Self::with_dimension(model_name, dimension, inner, cache))
    }

    /// Wrap a model with an explicitly supplied dimension.
    pub fn with_dimension(
        model_name: impl Into<String>,
        dimension: usize,
        inner: Arc<dyn Embedder>,
        cache: Option<Arc<dyn DocumentStore>>,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            dimension,
            inner,
            cache,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    fn cache_key(&self, text: &str) -> String {
        MemoKeyer::EMBEDDING.key(&self.model_name, text)
    }

    fn call_model(&self, texts: &[String]) -> MemoResult<Vec<Vec<f32>>> {
        let vectors = self
            .inner
            .embed_documents(texts)
            .map_err(|source| MemoError::Model {
                model: self.model_name.clone(),
                source,
            })?;
        if vectors.len() != texts.len() {
            return Err(MemoError::LengthMismatch {
                model: self.model_name.clone(),
                expected: texts.len(),
                found: vectors.len(),
            });
        }
        Ok(vectors)
    }

    /// Embed a batch, serving cached texts from the store.
    ///
    /// Repeated texts within one batch are embedded once.
    pub fn embed_documents(&self, texts: &[String]) -> MemoResult<Vec<Vec<f32>>> {
        let Some(cache) = &self.cache else {
            return self.call_model(texts);
        };
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = texts.iter().map(|t| self.cache_key(t)).collect();
        let cached = cache.mget(&keys)?;

        let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        for (key, entry) in keys.iter().zip(cached) {
            results.push(match entry {
                Some(doc) => Some(decode_entry(key, &doc)?),
                None => None,
            });
        }

        // Distinct misses in first-seen order.
        let mut miss_slot: HashMap<&str, usize> = HashMap::new();
        let mut miss_keys: Vec<String> = Vec::new();
        let mut miss_texts: Vec<String> = Vec::new();
        for (i, result) in results.iter().enumerate() {
            if result.is_none() && !miss_slot.contains_key(keys[i].as_str()) {
                miss_slot.insert(keys[i].as_str(), miss_texts.len());
                miss_keys.push(keys[i].clone());
                miss_texts.push(texts[i].clone());
            }
        }

        debug!(
            model = %self.model_name,
            total = texts.len(),
            misses = miss_texts.len(),
            "embed batch"
        );

        if !miss_texts.is_empty() {
            let computed = self.call_model(&miss_texts)?;
            let entries: Vec<(String, Document)> = miss_keys
                .iter()
                .cloned()
                .zip(computed.iter().map(|v| encode_entry(v)))
                .collect();
            cache.mset(&entries)?;
            for (i, result) in results.iter_mut().enumerate() {
                if result.is_none() {
                    let slot = miss_slot[keys[i].as_str()];
                    *result = Some(computed[slot].clone());
                }
            }
        }

        Ok(results.into_iter().flatten().collect())
    }

    /// Embed one text, serving it from the store when cached.
    pub fn embed_query(&self, text: &str) -> MemoResult<Vec<f32>> {
        let Some(cache) = &self.cache else {
            return self
                .inner
                .embed_query(text)
                .map_err(|source| MemoError::Model {
                    model: self.model_name.clone(),
                    source,
                });
        };
        let key = self.cache_key(text);
        if let Some(doc) = cache.get(&key)? {
            return decode_entry(&key, &doc);
        }
        let vector = self
            .inner
            .embed_query(text)
            .map_err(|source| MemoError::Model {
                model: self.model_name.clone(),
                source,
            })?;
        cache.set(&key, encode_entry(&vector))?;
        Ok(vector)
    }
}

impl Embedder for CachedEmbedder {
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BoxError> {
        CachedEmbedder::embed_documents(self, texts).map_err(Into::into)
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>, BoxError> {
        CachedEmbedder::embed_query(self, text).map_err(Into::into)
    }
}

fn encode_entry(vector: &[f32]) -> Document {
    let mut doc = Document::new();
    doc.insert(EMBEDDING_FIELD.to_string(), json!(vector));
    doc
}

fn decode_entry(key: &str, doc: &Document) -> MemoResult<Vec<f32>> {
    let corrupt = |reason: String| MemoError::CorruptEntry {
        key: key.to_string(),
        reason,
    };
    let list = doc
        .get(EMBEDDING_FIELD)
        .and_then(Value::as_array)
        .ok_or_else(|| corrupt(format!("missing {EMBEDDING_FIELD} list")))?;
    list.iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| corrupt(format!("non-numeric component {v}")))
        })
        .collect()
}
