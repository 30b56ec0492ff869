//! Backends: how a `(database, collection)` pair becomes a concrete store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use strata_remote::{
    normalize_bucket_name, DocumentDatabaseClient, DocumentDbStore, ObjectStorageBytesStore,
    ObjectStorageClient,
};
use strata_sqlite::{SqliteBytesStore, SqliteDocumentStore};
use strata_store::{
    BytesStore, DiskBytesStore, DocumentStore, InMemoryStore, JsonDocumentStore, LayeredStore,
    StoreError, StoreResult,
};
use strata_types::Document;
use tracing::debug;

/// Opens stores for one storage system.
///
/// Implementations must be cheap to call repeatedly for the same
/// collection; [`StoreProvider`](crate::StoreProvider) does not cache the
/// handles it returns.
pub trait Backend: Send + Sync {
    /// Short name used in logs, e.g. `"sqlite"`.
    fn kind(&self) -> &'static str;

    fn open_bytes_store(&self, database: &str, collection: &str) -> StoreResult<Arc<dyn BytesStore>>;

    fn open_document_store(
        &self,
        database: &str,
        collection: &str,
    ) -> StoreResult<Arc<dyn DocumentStore>>;
}

type Shared<V> = Mutex<HashMap<(String, String), Arc<InMemoryStore<V>>>>;

/// Process-local stores. Handles for the same collection share contents.
#[derive(Default)]
pub struct MemoryBackend {
    bytes: Shared<Vec<u8>>,
    documents: Shared<Document>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn open<V>(map: &Shared<V>, database: &str, collection: &str) -> StoreResult<Arc<InMemoryStore<V>>> {
        let mut stores = map
            .lock()
            .map_err(|_| StoreError::LockPoisoned(collection.to_string()))?;
        let id = (database.to_string(), collection.to_string());
        if let Some(store) = stores.get(&id) {
            return Ok(store.clone());
        }
        let store = Arc::new(InMemoryStore::new(collection)?);
        stores.insert(id, store.clone());
        Ok(store)
    }
}

impl Backend for MemoryBackend {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn open_bytes_store(&self, database: &str, collection: &str) -> StoreResult<Arc<dyn BytesStore>> {
        Ok(Self::open(&self.bytes, database, collection)?)
    }

    fn open_document_store(
        &self,
        database: &str,
        collection: &str,
    ) -> StoreResult<Arc<dyn DocumentStore>> {
        Ok(Self::open(&self.documents, database, collection)?)
    }
}

/// One directory per collection at `root/database/collection`. Documents
/// are JSON files.
pub struct DiskBackend {
    root: PathBuf,
}

impl DiskBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn open(&self, database: &str, collection: &str) -> StoreResult<DiskBytesStore> {
        DiskBytesStore::open(self.root.join(database), collection)
    }
}

impl Backend for DiskBackend {
    fn kind(&self) -> &'static str {
        "disk"
    }

    fn open_bytes_store(&self, database: &str, collection: &str) -> StoreResult<Arc<dyn BytesStore>> {
        Ok(Arc::new(self.open(database, collection)?))
    }

    fn open_document_store(
        &self,
        database: &str,
        collection: &str,
    ) -> StoreResult<Arc<dyn DocumentStore>> {
        let bytes = Arc::new(self.open(database, collection)?);
        Ok(Arc::new(JsonDocumentStore::new(bytes)))
    }
}

/// One SQLite file per collection at `root/database/collection.db`.
///
/// A collection is either a bytes table or a document table. Opening the
/// same collection both ways points both handles at one file with
/// incompatible columns.
pub struct SqliteBackend {
    root: PathBuf,
}

impl SqliteBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Database file for a collection.
    pub fn path_for(&self, database: &str, collection: &str) -> PathBuf {
        self.root.join(database).join(format!("{collection}.db"))
    }
}

impl Backend for SqliteBackend {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    fn open_bytes_store(&self, database: &str, collection: &str) -> StoreResult<Arc<dyn BytesStore>> {
        let store = SqliteBytesStore::open(collection, self.path_for(database, collection))?;
        Ok(Arc::new(store))
    }

    fn open_document_store(
        &self,
        database: &str,
        collection: &str,
    ) -> StoreResult<Arc<dyn DocumentStore>> {
        let store = SqliteDocumentStore::open(collection, self.path_for(database, collection))?;
        Ok(Arc::new(store))
    }
}

/// Object storage. Every database maps to the same bucket; collections are
/// key prefixes inside it. Documents are JSON objects.
pub struct ObjectStorageBackend {
    bucket: String,
    client: Arc<dyn ObjectStorageClient>,
}

impl ObjectStorageBackend {
    /// `bucket` is normalized to the service's naming rules.
    pub fn new(bucket: &str, client: Arc<dyn ObjectStorageClient>) -> Self {
        Self {
            bucket: normalize_bucket_name(bucket),
            client,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

impl Backend for ObjectStorageBackend {
    fn kind(&self) -> &'static str {
        "object_storage"
    }

    fn open_bytes_store(&self, _database: &str, collection: &str) -> StoreResult<Arc<dyn BytesStore>> {
        let store = ObjectStorageBytesStore::new(collection, &self.bucket, self.client.clone())?;
        Ok(Arc::new(store))
    }

    fn open_document_store(
        &self,
        _database: &str,
        collection: &str,
    ) -> StoreResult<Arc<dyn DocumentStore>> {
        let bytes = Arc::new(ObjectStorageBytesStore::new(
            collection,
            &self.bucket,
            self.client.clone(),
        )?);
        Ok(Arc::new(JsonDocumentStore::new(bytes)))
    }
}

/// Native documents in a document database. Has no bytes layout.
pub struct DocumentDbBackend {
    client: Arc<dyn DocumentDatabaseClient>,
}

impl DocumentDbBackend {
    pub fn new(client: Arc<dyn DocumentDatabaseClient>) -> Self {
        Self { client }
    }
}

impl Backend for DocumentDbBackend {
    fn kind(&self) -> &'static str {
        "document_db"
    }

    fn open_bytes_store(&self, _database: &str, collection: &str) -> StoreResult<Arc<dyn BytesStore>> {
        Err(StoreError::not_supported(collection, "open_bytes_store"))
    }

    fn open_document_store(
        &self,
        database: &str,
        collection: &str,
    ) -> StoreResult<Arc<dyn DocumentStore>> {
        Ok(Arc::new(DocumentDbStore::new(database, collection, self.client.clone())?))
    }
}

/// Every store is a [`LayeredStore`] of the `cache` backend's store over
/// the `base` backend's store for the same collection.
pub struct LayeredBackend {
    cache: Arc<dyn Backend>,
    base: Arc<dyn Backend>,
}

impl LayeredBackend {
    pub fn new(cache: Arc<dyn Backend>, base: Arc<dyn Backend>) -> Self {
        Self { cache, base }
    }
}

impl Backend for LayeredBackend {
    fn kind(&self) -> &'static str {
        "layered"
    }

    fn open_bytes_store(&self, database: &str, collection: &str) -> StoreResult<Arc<dyn BytesStore>> {
        let cache = self.cache.open_bytes_store(database, collection)?;
        let base = self.base.open_bytes_store(database, collection)?;
        debug!(
            collection,
            cache = self.cache.kind(),
            base = self.base.kind(),
            "layered bytes store"
        );
        Ok(Arc::new(LayeredStore::new(cache, base)?))
    }

    fn open_document_store(
        &self,
        database: &str,
        collection: &str,
    ) -> StoreResult<Arc<dyn DocumentStore>> {
        let cache = self.cache.open_document_store(database, collection)?;
        let base = self.base.open_document_store(database, collection)?;
        debug!(
            collection,
            cache = self.cache.kind(),
            base = self.base.kind(),
            "layered document store"
        );
        Ok(Arc::new(LayeredStore::new(cache, base)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_remote::{InMemoryDocumentDatabase, InMemoryObjectStorage};
    use strata_store::Store;
    use strata_types::into_document;

    fn doc(value: serde_json::Value) -> Document {
        into_document(value).unwrap()
    }

    #[test]
    fn memory_handles_share_contents() {
        let backend = MemoryBackend::new();
        let a = backend.open_bytes_store("db", "blobs").unwrap();
        let b = backend.open_bytes_store("db", "blobs").unwrap();
        a.set("k", b"v".to_vec()).unwrap();
        assert_eq!(b.get("k").unwrap(), Some(b"v".to_vec()));

        let other_db = backend.open_bytes_store("db2", "blobs").unwrap();
        assert_eq!(other_db.get("k").unwrap(), None);
    }

    #[test]
    fn disk_layout() {
        let dir = tempfile::tempdir().unwrap();
        let backend = DiskBackend::new(dir.path());
        let docs = backend.open_document_store("db", "users").unwrap();
        docs.set("alice", doc(json!({"age": 30}))).unwrap();
        assert!(dir.path().join("db").join("users").join("alice").is_file());
        assert_eq!(backend.root(), dir.path());
    }

    #[test]
    fn sqlite_layout() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SqliteBackend::new(dir.path());
        let docs = backend.open_document_store("db", "users").unwrap();
        docs.set("alice", doc(json!({"age": 30}))).unwrap();
        let path = backend.path_for("db", "users");
        assert_eq!(path, dir.path().join("db").join("users.db"));
        assert!(path.is_file());

        let reopened = backend.open_document_store("db", "users").unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
    }

    #[test]
    fn object_storage_normalizes_bucket() {
        let client = Arc::new(InMemoryObjectStorage::new());
        let backend = ObjectStorageBackend::new("My_Bucket", client.clone());
        assert_eq!(backend.bucket(), "my-bucket");
        let bytes = backend.open_bytes_store("ignored", "blobs").unwrap();
        bytes.set("k", b"v".to_vec()).unwrap();
        assert_eq!(client.object("my-bucket", "blobs/k"), Some(b"v".to_vec()));
    }

    #[test]
    fn document_db_has_no_bytes_layout() {
        let backend = DocumentDbBackend::new(Arc::new(InMemoryDocumentDatabase::new()));
        assert!(matches!(
            backend.open_bytes_store("db", "blobs"),
            Err(StoreError::NotSupported { .. })
        ));
        let docs = backend.open_document_store("db", "users").unwrap();
        docs.set("alice", doc(json!({"age": 30}))).unwrap();
        assert_eq!(docs.count().unwrap(), 1);
    }

    #[test]
    fn layered_reads_through_without_backfill() {
        let cache = Arc::new(MemoryBackend::new());
        let base = Arc::new(MemoryBackend::new());
        let backend = LayeredBackend::new(cache.clone(), base.clone());

        base.open_document_store("db", "users")
            .unwrap()
            .set("bob", doc(json!({"age": 40})))
            .unwrap();

        let layered = backend.open_document_store("db", "users").unwrap();
        assert_eq!(layered.get("bob").unwrap(), Some(doc(json!({"age": 40}))));
        let cache_store = cache.open_document_store("db", "users").unwrap();
        assert_eq!(cache_store.get("bob").unwrap(), None);

        layered.set("carol", doc(json!({"age": 50}))).unwrap();
        assert!(cache_store.get("carol").unwrap().is_some());
    }
}
