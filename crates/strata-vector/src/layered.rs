use std::sync::Arc;

use strata_store::{DualWriteFailure, StoreError, StoreResult};
use tracing::{debug, warn};

use crate::record::VectorRecord;
use crate::store::VectorStore;

/// A fast vector store in front of an authoritative one.
///
/// Same contract as [`LayeredStore`](strata_store::LayeredStore): reads try
/// the cache, fetch the misses from the base in one call and never backfill;
/// upserts go to both, cache first, and report divergence as
/// [`StoreError::DualWrite`].
pub struct LayeredVectorStore {
    cache: Arc<dyn VectorStore>,
    base: Arc<dyn VectorStore>,
}

impl LayeredVectorStore {
    pub fn new(cache: Arc<dyn VectorStore>, base: Arc<dyn VectorStore>) -> StoreResult<Self> {
        if cache.collection_name() != base.collection_name() {
            return Err(StoreError::Configuration(format!(
                "cannot layer vector collection {:?} over {:?}",
                cache.collection_name(),
                base.collection_name()
            )));
        }
        Ok(Self { cache, base })
    }
}

impl VectorStore for LayeredVectorStore {
    fn collection_name(&self) -> &str {
        self.base.collection_name()
    }

    fn get_vectors_by_ids(&self, ids: &[String]) -> StoreResult<Vec<Option<Vec<f32>>>> {
        let mut results = self.cache.get_vectors_by_ids(ids)?;
        let misses: Vec<usize> = (0..results.len()).filter(|&i| results[i].is_none()).collect();
        debug!(
            collection = self.collection_name(),
            requested = ids.len(),
            misses = misses.len(),
            "layered vector get"
        );
        if misses.is_empty() {
            return Ok(results);
        }
        let miss_ids: Vec<String> = misses.iter().map(|&i| ids[i].clone()).collect();
        let fetched = self.base.get_vectors_by_ids(&miss_ids)?;
        for (slot, vector) in misses.into_iter().zip(fetched) {
            results[slot] = vector;
        }
        Ok(results)
    }

    fn upsert_vectors(&self, records: &[VectorRecord]) -> StoreResult<()> {
        let cache = self.cache.upsert_vectors(records);
        let base = self.base.upsert_vectors(records);
        let Some(failure) = DualWriteFailure::from_outcomes(cache, base) else {
            return Ok(());
        };
        warn!(
            collection = self.collection_name(),
            records = records.len(),
            failure = %failure,
            "vector layers diverged"
        );
        Err(StoreError::DualWrite {
            collection: self.collection_name().to_string(),
            operation: "upsert_vectors",
            failure,
        })
    }
}
