//! In-process vector index.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::index::{ClientResult, IndexSpec, IndexedVector, VectorIndexClient};

struct Index {
    spec: IndexSpec,
    vectors: BTreeMap<String, IndexedVector>,
}

/// A [`VectorIndexClient`] backed by maps. `fetch` returns vectors in
/// reverse id order so callers cannot rely on the service preserving order.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    indexes: Mutex<HashMap<String, Index>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameters an index was created with.
    pub fn spec(&self, index: &str) -> Option<IndexSpec> {
        let indexes = self.indexes.lock().ok()?;
        indexes.get(index).map(|i| i.spec.clone())
    }

    pub fn vector(&self, index: &str, id: &str) -> Option<IndexedVector> {
        let indexes = self.indexes.lock().ok()?;
        indexes.get(index)?.vectors.get(id).cloned()
    }
}

impl VectorIndexClient for InMemoryVectorIndex {
    fn fetch(&self, index: &str, ids: &[String]) -> ClientResult<Vec<IndexedVector>> {
        let indexes = self.indexes.lock().map_err(|_| "index lock poisoned")?;
        let index = indexes
            .get(index)
            .ok_or_else(|| format!("index {index:?} not found"))?;
        let mut found: Vec<IndexedVector> = ids
            .iter()
            .filter_map(|id| index.vectors.get(id).cloned())
            .collect();
        found.sort_by(|a, b| b.id.cmp(&a.id));
        found.dedup_by(|a, b| a.id == b.id);
        Ok(found)
    }

    fn upsert(&self, index: &str, vectors: &[IndexedVector]) -> ClientResult<()> {
        let mut indexes = self.indexes.lock().map_err(|_| "index lock poisoned")?;
        let index = indexes
            .get_mut(index)
            .ok_or_else(|| format!("index {index:?} not found"))?;
        for vector in vectors {
            if vector.values.len() != index.spec.dimension {
                return Err(format!(
                    "vector {:?} has dimension {}, index expects {}",
                    vector.id,
                    vector.values.len(),
                    index.spec.dimension
                )
                .into());
            }
        }
        for vector in vectors {
            index.vectors.insert(vector.id.clone(), vector.clone());
        }
        Ok(())
    }

    fn list_indexes(&self) -> ClientResult<Vec<String>> {
        let indexes = self.indexes.lock().map_err(|_| "index lock poisoned")?;
        let mut names: Vec<String> = indexes.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn create_index(&self, spec: &IndexSpec) -> ClientResult<()> {
        let mut indexes = self.indexes.lock().map_err(|_| "index lock poisoned")?;
        if indexes.contains_key(&spec.name) {
            return Err(format!("index {:?} already exists", spec.name).into());
        }
        indexes.insert(
            spec.name.clone(),
            Index {
                spec: spec.clone(),
                vectors: BTreeMap::new(),
            },
        );
        Ok(())
    }
}
