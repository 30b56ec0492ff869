use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use strata_store::{
    BytesStore, CancelFlag, DocumentStore, MigrationScan, ScanConfig, StoreError, StoreResult,
    TypedStore,
};
use strata_types::validate_collection_name;
use tracing::info;

use crate::backend::Backend;

#[derive(Default)]
struct Registry {
    bytes: Vec<String>,
    documents: Vec<String>,
    typed: Vec<(String, Arc<dyn MigrationScan>)>,
}

fn remember(names: &mut Vec<String>, collection: &str) {
    if !names.iter().any(|n| n == collection) {
        names.push(collection.to_string());
    }
}

/// Hands out stores for one database and remembers which collections were
/// requested, so typed collections can be migration-scanned later.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use strata_provider::{MemoryBackend, StoreProvider};
/// # #[derive(serde::Serialize, serde::Deserialize)] struct User { name: String }
/// let provider = StoreProvider::new("app", Arc::new(MemoryBackend::new()))?;
/// let users = provider.get_object_store::<User>("users")?;
/// let rewritten = provider.validate_all(None)?;
/// # Ok::<(), strata_store::StoreError>(())
/// ```
pub struct StoreProvider {
    database: String,
    backend: Arc<dyn Backend>,
    scan: ScanConfig,
    registry: Mutex<Registry>,
}

impl StoreProvider {
    pub fn new(database: &str, backend: Arc<dyn Backend>) -> StoreResult<Self> {
        validate_collection_name(database)?;
        info!(database, backend = backend.kind(), "store provider ready");
        Ok(Self {
            database: database.to_string(),
            backend,
            scan: ScanConfig::default(),
            registry: Mutex::new(Registry::default()),
        })
    }

    /// Override the batching used by [`validate_collection`](Self::validate_collection).
    pub fn with_scan_config(mut self, scan: ScanConfig) -> Self {
        self.scan = scan;
        self
    }

    pub fn database_name(&self) -> &str {
        &self.database
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn scan_config(&self) -> &ScanConfig {
        &self.scan
    }

    fn registry(&self) -> StoreResult<MutexGuard<'_, Registry>> {
        self.registry
            .lock()
            .map_err(|_| StoreError::LockPoisoned(self.database.clone()))
    }

    pub fn get_bytes_store(&self, collection: &str) -> StoreResult<Arc<dyn BytesStore>> {
        let store = self.backend.open_bytes_store(&self.database, collection)?;
        remember(&mut self.registry()?.bytes, collection);
        Ok(store)
    }

    pub fn get_document_store(&self, collection: &str) -> StoreResult<Arc<dyn DocumentStore>> {
        let store = self.backend.open_document_store(&self.database, collection)?;
        remember(&mut self.registry()?.documents, collection);
        Ok(store)
    }

    /// A typed store over the collection's document store. The collection
    /// becomes eligible for [`validate_all`](Self::validate_all); requesting
    /// it again with another record type replaces the earlier registration.
    pub fn get_object_store<T>(&self, collection: &str) -> StoreResult<Arc<TypedStore<T>>>
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        let documents = self.backend.open_document_store(&self.database, collection)?;
        let store = Arc::new(TypedStore::<T>::new(documents));
        let scan: Arc<dyn MigrationScan> = store.clone();
        let mut registry = self.registry()?;
        match registry.typed.iter_mut().find(|(name, _)| name == collection) {
            Some(entry) => entry.1 = scan,
            None => registry.typed.push((collection.to_string(), scan)),
        }
        Ok(store)
    }

    /// Every collection requested so far: bytes, then documents, then typed,
    /// each in first-request order.
    pub fn get_collection_names(&self) -> StoreResult<Vec<String>> {
        let registry = self.registry()?;
        Ok(registry
            .bytes
            .iter()
            .chain(registry.documents.iter())
            .chain(registry.typed.iter().map(|(name, _)| name))
            .cloned()
            .collect())
    }

    /// Run the migration scan for one typed collection.
    pub fn validate_collection(&self, collection: &str, cancel: Option<&CancelFlag>) -> StoreResult<usize> {
        let scan = self
            .registry()?
            .typed
            .iter()
            .find(|(name, _)| name == collection)
            .map(|(_, scan)| scan.clone())
            .ok_or_else(|| {
                StoreError::Configuration(format!(
                    "no typed collection {collection:?} has been requested from database {:?}",
                    self.database
                ))
            })?;
        scan.validate_all(&self.scan, cancel)
    }

    /// Run the migration scan for every typed collection, in request order.
    pub fn validate_all(&self, cancel: Option<&CancelFlag>) -> StoreResult<Vec<(String, usize)>> {
        let scans: Vec<(String, Arc<dyn MigrationScan>)> = self.registry()?.typed.clone();
        let mut results = Vec::with_capacity(scans.len());
        for (collection, scan) in scans {
            info!(database = %self.database, collection = %collection, "validating collection");
            let rewritten = scan.validate_all(&self.scan, cancel)?;
            results.push((collection, rewritten));
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, SqliteBackend};
    use serde::Deserialize;
    use serde_json::json;
    use strata_store::Store;
    use strata_types::into_document;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        name: String,
        #[serde(default)]
        active: bool,
    }

    fn provider() -> StoreProvider {
        StoreProvider::new("app", Arc::new(MemoryBackend::new())).unwrap()
    }

    #[test]
    fn rejects_invalid_database_name() {
        assert!(StoreProvider::new("bad name", Arc::new(MemoryBackend::new())).is_err());
    }

    #[test]
    fn collection_names_in_request_order() {
        let p = provider();
        p.get_object_store::<User>("users").unwrap();
        p.get_bytes_store("blobs").unwrap();
        p.get_document_store("events").unwrap();
        p.get_bytes_store("blobs").unwrap();
        p.get_bytes_store("images").unwrap();
        assert_eq!(
            p.get_collection_names().unwrap(),
            vec!["blobs", "images", "events", "users"]
        );
    }

    #[test]
    fn typed_store_round_trip() {
        let p = provider();
        let users = p.get_object_store::<User>("users").unwrap();
        let alice = User { name: "alice".into(), active: true };
        users.set("alice", alice.clone()).unwrap();
        assert_eq!(users.get("alice").unwrap(), Some(alice));
        // The typed store shares the document collection.
        let docs = p.get_document_store("users").unwrap();
        assert_eq!(docs.get("alice").unwrap().unwrap()["name"], json!("alice"));
    }

    #[test]
    fn validate_all_rewrites_outdated_records() {
        let p = provider();
        let docs = p.get_document_store("users").unwrap();
        docs.mset(&[
            ("a".to_string(), into_document(json!({"name": "a"})).unwrap()),
            ("b".to_string(), into_document(json!({"name": "b", "active": true})).unwrap()),
        ])
        .unwrap();
        p.get_object_store::<User>("users").unwrap();

        assert_eq!(p.validate_all(None).unwrap(), vec![("users".to_string(), 1)]);
        assert_eq!(p.validate_collection("users", None).unwrap(), 0);
        assert_eq!(docs.get("a").unwrap().unwrap()["active"], json!(false));
    }

    #[test]
    fn validate_unknown_collection() {
        let p = provider();
        p.get_document_store("events").unwrap();
        assert!(matches!(
            p.validate_collection("events", None),
            Err(StoreError::Configuration(_))
        ));
    }

    #[test]
    fn validate_respects_cancel_and_batch_size() {
        let p = provider().with_scan_config(ScanConfig { batch_size: 1 });
        let docs = p.get_document_store("users").unwrap();
        docs.set("a", into_document(json!({"name": "a"})).unwrap()).unwrap();
        p.get_object_store::<User>("users").unwrap();

        let cancel = CancelFlag::new();
        cancel.cancel();
        assert!(matches!(
            p.validate_all(Some(&cancel)),
            Err(StoreError::Cancelled { completed: 0, .. })
        ));
        assert_eq!(p.scan_config().batch_size, 1);
    }

    #[test]
    fn sqlite_provider_paths() {
        let dir = tempfile::tempdir().unwrap();
        let p = StoreProvider::new("app", Arc::new(SqliteBackend::new(dir.path()))).unwrap();
        p.get_bytes_store("blobs").unwrap().set("k", vec![1, 2, 3]).unwrap();
        assert!(dir.path().join("app").join("blobs.db").is_file());
        assert_eq!(p.backend().kind(), "sqlite");
        assert_eq!(p.database_name(), "app");
    }
}
