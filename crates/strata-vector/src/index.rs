//! Vectors in a managed vector-index service.
//!
//! The service SDK sits behind [`VectorIndexClient`]. Only per-id fetch and
//! upsert are used for data; listing and creating indexes is used by
//! [`IndexVectorProvider`](crate::IndexVectorProvider).

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strata_store::{BoxError, StoreError, StoreResult};
use strata_types::validate_keys;
use tracing::debug;

use crate::record::VectorRecord;
use crate::store::{check_dimensions, VectorStore};

/// Metadata field holding the embedded text in the index.
pub const TEXT_FIELD: &str = "text";

pub type ClientResult<T> = Result<T, BoxError>;

/// A vector as the index service stores it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexedVector {
    pub id: String,
    pub values: Vec<f32>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cosine,
    Euclidean,
    Dotproduct,
}

/// Parameters for creating a serverless index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
    pub cloud: String,
    pub region: String,
}

/// The subset of a vector-index service SDK the stores need.
pub trait VectorIndexClient: Send + Sync {
    /// Fetch the vectors that exist among `ids`, in any order.
    fn fetch(&self, index: &str, ids: &[String]) -> ClientResult<Vec<IndexedVector>>;

    fn upsert(&self, index: &str, vectors: &[IndexedVector]) -> ClientResult<()>;

    fn list_indexes(&self) -> ClientResult<Vec<String>>;

    fn create_index(&self, spec: &IndexSpec) -> ClientResult<()>;
}

/// One index per collection. The record text is kept in the vector's
/// metadata under [`TEXT_FIELD`].
pub struct IndexVectorStore {
    index: String,
    dimension: usize,
    client: Arc<dyn VectorIndexClient>,
}

impl IndexVectorStore {
    pub fn new(index: &str, dimension: usize, client: Arc<dyn VectorIndexClient>) -> Self {
        Self {
            index: index.to_string(),
            dimension,
            client,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

impl VectorStore for IndexVectorStore {
    fn collection_name(&self) -> &str {
        &self.index
    }

    /// The service answers in its own order and omits unknown ids, so
    /// results are matched back to `ids` by id.
    fn get_vectors_by_ids(&self, ids: &[String]) -> StoreResult<Vec<Option<Vec<f32>>>> {
        validate_keys(ids)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let fetched = self
            .client
            .fetch(&self.index, ids)
            .map_err(|e| StoreError::backend(&self.index, "fetch", ids, e))?;
        debug!(index = %self.index, requested = ids.len(), found = fetched.len(), "fetch");
        let by_id: HashMap<String, Vec<f32>> =
            fetched.into_iter().map(|v| (v.id, v.values)).collect();
        Ok(ids.iter().map(|id| by_id.get(id).cloned()).collect())
    }

    fn upsert_vectors(&self, records: &[VectorRecord]) -> StoreResult<()> {
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        validate_keys(&ids)?;
        check_dimensions(&self.index, self.dimension, records)?;
        if records.is_empty() {
            return Ok(());
        }
        let vectors: Vec<IndexedVector> = records
            .iter()
            .map(|r| {
                let mut metadata = r.metadata.clone();
                metadata.insert(TEXT_FIELD.to_string(), Value::String(r.text.clone()));
                IndexedVector {
                    id: r.id.clone(),
                    values: r.vector.clone(),
                    metadata,
                }
            })
            .collect();
        self.client
            .upsert(&self.index, &vectors)
            .map_err(|e| StoreError::backend(&self.index, "upsert", &ids, e))?;
        debug!(index = %self.index, count = vectors.len(), "upsert");
        Ok(())
    }
}
