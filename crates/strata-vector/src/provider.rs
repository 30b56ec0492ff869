use std::sync::Arc;

use strata_provider::StoreProvider;
use strata_store::{StoreError, StoreResult};
use tracing::info;

use crate::index::{IndexSpec, IndexVectorStore, Metric, VectorIndexClient};
use crate::layered::LayeredVectorStore;
use crate::object::ObjectVectorStore;
use crate::record::VectorRecord;
use crate::store::VectorStore;

/// Opens the vector store for a collection whose vectors have `dimension`
/// components, e.g. [`CachedEmbedder::dimension`](strata_memo::CachedEmbedder::dimension).
pub trait VectorStoreProvider: Send + Sync {
    fn get_vector_store(&self, collection: &str, dimension: usize) -> StoreResult<Arc<dyn VectorStore>>;
}

/// Vector records as typed objects in a [`StoreProvider`] collection.
pub struct ObjectVectorProvider {
    stores: Arc<StoreProvider>,
}

impl ObjectVectorProvider {
    pub fn new(stores: Arc<StoreProvider>) -> Self {
        Self { stores }
    }
}

impl VectorStoreProvider for ObjectVectorProvider {
    fn get_vector_store(&self, collection: &str, dimension: usize) -> StoreResult<Arc<dyn VectorStore>> {
        let records = self.stores.get_object_store::<VectorRecord>(collection)?;
        Ok(Arc::new(ObjectVectorStore::new(records).with_dimension(dimension)))
    }
}

/// One service index per collection, created on first use.
pub struct IndexVectorProvider {
    client: Arc<dyn VectorIndexClient>,
    cloud: String,
    region: String,
}

impl IndexVectorProvider {
    /// Indexes are created in `aws` / `us-east-1`.
    pub fn new(client: Arc<dyn VectorIndexClient>) -> Self {
        Self::with_location(client, "aws", "us-east-1")
    }

    pub fn with_location(client: Arc<dyn VectorIndexClient>, cloud: &str, region: &str) -> Self {
        Self {
            client,
            cloud: cloud.to_string(),
            region: region.to_string(),
        }
    }
}

impl VectorStoreProvider for IndexVectorProvider {
    fn get_vector_store(&self, collection: &str, dimension: usize) -> StoreResult<Arc<dyn VectorStore>> {
        let existing = self
            .client
            .list_indexes()
            .map_err(|e| StoreError::backend(collection, "list_indexes", &[], e))?;
        if !existing.iter().any(|name| name == collection) {
            let spec = IndexSpec {
                name: collection.to_string(),
                dimension,
                metric: Metric::Cosine,
                cloud: self.cloud.clone(),
                region: self.region.clone(),
            };
            self.client
                .create_index(&spec)
                .map_err(|e| StoreError::backend(collection, "create_index", &[], e))?;
            info!(index = collection, dimension, cloud = %self.cloud, region = %self.region, "created vector index");
        }
        Ok(Arc::new(IndexVectorStore::new(collection, dimension, self.client.clone())))
    }
}

/// Layers the `cache` provider's store over the `base` provider's store.
pub struct LayeredVectorProvider {
    cache: Arc<dyn VectorStoreProvider>,
    base: Arc<dyn VectorStoreProvider>,
}

impl LayeredVectorProvider {
    pub fn new(cache: Arc<dyn VectorStoreProvider>, base: Arc<dyn VectorStoreProvider>) -> Self {
        Self { cache, base }
    }
}

impl VectorStoreProvider for LayeredVectorProvider {
    fn get_vector_store(&self, collection: &str, dimension: usize) -> StoreResult<Arc<dyn VectorStore>> {
        let base = self.base.get_vector_store(collection, dimension)?;
        let cache = self.cache.get_vector_store(collection, dimension)?;
        Ok(Arc::new(LayeredVectorStore::new(cache, base)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryVectorIndex;
    use crate::store::TextEntry;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use strata_memo::{CachedEmbedder, Embedder};
    use strata_provider::{MemoryBackend, SqliteBackend};
    use strata_store::BoxError;
    use strata_types::Document;

    struct LengthEmbedder {
        calls: AtomicUsize,
    }

    impl Embedder for LengthEmbedder {
        fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    fn memory_provider() -> Arc<StoreProvider> {
        Arc::new(StoreProvider::new("app", Arc::new(MemoryBackend::new())).unwrap())
    }

    #[test]
    fn object_provider_registers_typed_collection() {
        let stores = memory_provider();
        let provider = ObjectVectorProvider::new(stores.clone());
        let store = provider.get_vector_store("vectors", 2).unwrap();
        store
            .upsert_vectors(&[VectorRecord::new("a", "alpha", vec![1.0, 2.0])])
            .unwrap();
        assert_eq!(stores.get_collection_names().unwrap(), vec!["vectors"]);
        assert_eq!(stores.validate_all(None).unwrap(), vec![("vectors".to_string(), 0)]);
    }

    #[test]
    fn object_provider_over_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let stores = Arc::new(StoreProvider::new("app", Arc::new(SqliteBackend::new(dir.path()))).unwrap());
        let store = ObjectVectorProvider::new(stores).get_vector_store("vectors", 2).unwrap();
        store
            .upsert_vectors(&[VectorRecord::new("a", "alpha", vec![1.0, 2.0])])
            .unwrap();
        assert!(dir.path().join("app").join("vectors.db").is_file());
        assert_eq!(
            store.get_vectors_by_ids(&["a".to_string()]).unwrap(),
            vec![Some(vec![1.0, 2.0])]
        );
    }

    #[test]
    fn index_provider_creates_missing_index_once() {
        let client = Arc::new(InMemoryVectorIndex::new());
        let provider = IndexVectorProvider::with_location(client.clone(), "gcp", "europe-west4");
        provider.get_vector_store("docs", 3).unwrap();
        provider.get_vector_store("docs", 3).unwrap();
        assert_eq!(client.list_indexes().unwrap(), vec!["docs"]);
        let spec = client.spec("docs").unwrap();
        assert_eq!(spec.dimension, 3);
        assert_eq!(spec.metric, Metric::Cosine);
        assert_eq!((spec.cloud.as_str(), spec.region.as_str()), ("gcp", "europe-west4"));
    }

    #[test]
    fn add_texts_through_layered_provider() {
        let index = Arc::new(InMemoryVectorIndex::new());
        let provider = LayeredVectorProvider::new(
            Arc::new(ObjectVectorProvider::new(memory_provider())),
            Arc::new(IndexVectorProvider::new(index.clone())),
        );
        let store = provider.get_vector_store("docs", 2).unwrap();

        let model = Arc::new(LengthEmbedder { calls: AtomicUsize::new(0) });
        let cache = Arc::new(strata_store::InMemoryStore::<Document>::new("embeddings").unwrap());
        let embedder = CachedEmbedder::with_dimension("length", 2, model.clone(), Some(cache));

        let ids = store
            .add_texts(
                &embedder,
                vec![TextEntry::new("hello").with_id("greeting"), TextEntry::new("bye")],
            )
            .unwrap();
        assert_eq!(ids[0], "greeting");
        assert_eq!(ids.len(), 2);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);

        assert_eq!(
            store.get_vectors_by_ids(&ids).unwrap(),
            vec![Some(vec![5.0, 1.0]), Some(vec![3.0, 1.0])]
        );
        assert!(index.vector("docs", "greeting").is_some());
        assert!(index.vector("docs", &ids[1]).is_some());

        // Re-adding the same text is served from the embedding cache.
        store
            .add_texts(&embedder, vec![TextEntry::new("hello").with_id("greeting")])
            .unwrap();
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }
}
