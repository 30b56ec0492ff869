use serde_json::{Map, Value};
use strata_memo::Embedder;
use strata_store::{StoreError, StoreResult};
use tracing::debug;
use uuid::Uuid;

use crate::record::VectorRecord;

/// A text to embed and store. Without an `id` one is generated.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextEntry {
    pub id: Option<String>,
    pub text: String,
    pub metadata: Map<String, Value>,
}

impl TextEntry {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Keyed access to embedding vectors.
///
/// `get_vectors_by_ids` returns one slot per id in input order, `None` for
/// ids that are not stored.
pub trait VectorStore: Send + Sync {
    fn collection_name(&self) -> &str;

    fn get_vectors_by_ids(&self, ids: &[String]) -> StoreResult<Vec<Option<Vec<f32>>>>;

    /// Insert or replace records by id.
    fn upsert_vectors(&self, records: &[VectorRecord]) -> StoreResult<()>;

    /// Embed `entries` in one model call and upsert the results. Returns the
    /// record ids in input order.
    fn add_texts(&self, embedder: &dyn Embedder, entries: Vec<TextEntry>) -> StoreResult<Vec<String>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = entries
            .iter()
            .map(|e| e.id.clone().unwrap_or_else(|| Uuid::now_v7().to_string()))
            .collect();
        let texts: Vec<String> = entries.iter().map(|e| e.text.clone()).collect();
        let vectors = embedder
            .embed_documents(&texts)
            .map_err(|e| StoreError::backend(self.collection_name(), "embed", &ids, e))?;
        if vectors.len() != entries.len() {
            return Err(StoreError::InvalidArgument(format!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                entries.len()
            )));
        }
        let records: Vec<VectorRecord> = entries
            .into_iter()
            .zip(ids.iter())
            .zip(vectors)
            .map(|((entry, id), vector)| VectorRecord {
                id: id.clone(),
                text: entry.text,
                metadata: entry.metadata,
                vector,
            })
            .collect();
        debug!(collection = self.collection_name(), count = records.len(), "add texts");
        self.upsert_vectors(&records)?;
        Ok(ids)
    }
}

/// Reject records whose vector length differs from `dimension`.
pub fn check_dimensions(collection: &str, dimension: usize, records: &[VectorRecord]) -> StoreResult<()> {
    match records.iter().find(|r| r.vector.len() != dimension) {
        Some(bad) => Err(StoreError::InvalidArgument(format!(
            "record {:?} in {collection:?} has {} dimensions, expected {dimension}",
            bad.id,
            bad.vector.len()
        ))),
        None => Ok(()),
    }
}
