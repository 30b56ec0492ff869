//! Vector records kept in an ordinary keyed store.

use std::sync::Arc;

use strata_store::{Store, StoreResult};

use crate::record::VectorRecord;
use crate::store::{check_dimensions, VectorStore};

/// Stores each [`VectorRecord`] under its id in any record store, usually a
/// typed store from a [`StoreProvider`](strata_provider::StoreProvider).
pub struct ObjectVectorStore {
    records: Arc<dyn Store<Value = VectorRecord>>,
    dimension: Option<usize>,
}

impl ObjectVectorStore {
    pub fn new(records: Arc<dyn Store<Value = VectorRecord>>) -> Self {
        Self {
            records,
            dimension: None,
        }
    }

    /// Reject upserts whose vectors are not `dimension` long.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    pub fn records(&self) -> &Arc<dyn Store<Value = VectorRecord>> {
        &self.records
    }
}

impl VectorStore for ObjectVectorStore {
    fn collection_name(&self) -> &str {
        self.records.collection_name()
    }

    fn get_vectors_by_ids(&self, ids: &[String]) -> StoreResult<Vec<Option<Vec<f32>>>> {
        Ok(self
            .records
            .mget(ids)?
            .into_iter()
            .map(|r| r.map(|r| r.vector))
            .collect())
    }

    fn upsert_vectors(&self, records: &[VectorRecord]) -> StoreResult<()> {
        if let Some(dimension) = self.dimension {
            check_dimensions(self.collection_name(), dimension, records)?;
        }
        let pairs: Vec<(String, VectorRecord)> =
            records.iter().map(|r| (r.id.clone(), r.clone())).collect();
        self.records.mset(&pairs)
    }
}
