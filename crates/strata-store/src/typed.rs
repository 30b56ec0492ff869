//! Typed-object stores and the migration scan.
//!
//! A typed object's canonical form is its document serialization. Reading
//! reconstructs the object through `serde`, which is where schema
//! validation happens: a document that does not deserialize into `T` is a
//! [`StoreError::SchemaValidation`], never a silently coerced value.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strata_query::{Filter, OrderBy, Page};
use strata_types::Document;
use tracing::{debug, info};

use crate::cancel::CancelFlag;
use crate::error::{StoreError, StoreResult};
use crate::traits::{DocumentStore, KeyStream, Queryable, Store};

/// Batching for [`TypedStore::validate_all`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// Keys read and rewritten per batch.
    pub batch_size: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self { batch_size: 1000 }
    }
}

/// A collection that can upgrade its stored records to the current schema.
///
/// Object-safe so a provider can hold scans for collections of different
/// record types side by side.
pub trait MigrationScan: Send + Sync {
    /// Rewrite every record whose canonical form changed. Returns the number
    /// of records rewritten.
    fn validate_all(&self, config: &ScanConfig, cancel: Option<&CancelFlag>) -> StoreResult<usize>;
}

/// Stores records of type `T` as documents in an underlying document store.
pub struct TypedStore<T> {
    documents: Arc<dyn DocumentStore>,
    _record: PhantomData<fn() -> T>,
}

impl<T> TypedStore<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            documents,
            _record: PhantomData,
        }
    }

    /// The underlying document store.
    pub fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.documents
    }

    /// Serialize `record` to its canonical document.
    pub fn to_document(&self, key: Option<&str>, record: &T) -> StoreResult<Document> {
        let fail = |reason: String| StoreError::Serialization {
            collection: self.documents.collection_name().to_string(),
            key: key.map(str::to_string),
            reason,
        };
        match serde_json::to_value(record).map_err(|e| fail(e.to_string()))? {
            Value::Object(document) => Ok(document),
            other => Err(fail(format!(
                "record serialized to {}, expected an object",
                strata_types::value_kind(&other)
            ))),
        }
    }

    /// Reconstruct a record from a stored document.
    pub fn from_document(&self, key: Option<&str>, document: Document) -> StoreResult<T> {
        serde_json::from_value(Value::Object(document)).map_err(|e| StoreError::SchemaValidation {
            collection: self.documents.collection_name().to_string(),
            key: key.map(str::to_string),
            reason: e.to_string(),
        })
    }

    /// Reconstruct and re-serialize the records under `keys`, writing back
    /// only those whose canonical document differs from what is stored.
    ///
    /// Absent keys are skipped. Returns the number of records rewritten.
    pub fn mvalidate(&self, keys: &[String]) -> StoreResult<usize> {
        let stored = self.documents.mget(keys)?;
        let mut changed = Vec::new();
        for (key, document) in keys.iter().zip(stored) {
            let Some(document) = document else { continue };
            let record = self.from_document(Some(key), document.clone())?;
            let canonical = self.to_document(Some(key), &record)?;
            if canonical != document {
                changed.push((key.clone(), canonical));
            }
        }
        if !changed.is_empty() {
            self.documents.mset(&changed)?;
        }
        Ok(changed.len())
    }
}

impl<T> MigrationScan for TypedStore<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Runs [`mvalidate`](TypedStore::mvalidate) over every key in batches of
    /// `config.batch_size`. The key list is collected up front so that
    /// rewrites never disturb an in-flight listing.
    ///
    /// `cancel` is checked before each batch. A cancelled scan returns
    /// [`StoreError::Cancelled`] after the batches already written.
    fn validate_all(&self, config: &ScanConfig, cancel: Option<&CancelFlag>) -> StoreResult<usize> {
        if config.batch_size == 0 {
            return Err(StoreError::InvalidArgument(
                "scan batch_size must be positive".into(),
            ));
        }
        let collection = self.documents.collection_name();
        info!(collection, "validating all records");
        let keys = self.documents.keys(None)?;
        info!(collection, records = keys.len(), "retrieved keys");

        let mut rewritten = 0;
        for (index, batch) in keys.chunks(config.batch_size).enumerate() {
            if cancel.is_some_and(CancelFlag::is_cancelled) {
                info!(collection, rewritten, "validation cancelled");
                return Err(StoreError::Cancelled {
                    collection: collection.to_string(),
                    completed: index * config.batch_size,
                });
            }
            let count = self.mvalidate(batch)?;
            debug!(collection, batch = index, size = batch.len(), rewritten = count, "validated batch");
            rewritten += count;
        }
        info!(collection, rewritten, "validation finished");
        Ok(rewritten)
    }
}

impl<T> Store for TypedStore<T>
where
    T: Serialize + DeserializeOwned,
{
    type Value = T;

    fn collection_name(&self) -> &str {
        self.documents.collection_name()
    }

    fn mset(&self, pairs: &[(String, T)]) -> StoreResult<()> {
        let documents = pairs
            .iter()
            .map(|(k, record)| Ok((k.clone(), self.to_document(Some(k), record)?)))
            .collect::<StoreResult<Vec<_>>>()?;
        self.documents.mset(&documents)
    }

    fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<T>>> {
        self.documents
            .mget(keys)?
            .into_iter()
            .zip(keys)
            .map(|(doc, key)| doc.map(|d| self.from_document(Some(key.as_str()), d)).transpose())
            .collect()
    }

    fn mdelete(&self, keys: &[String]) -> StoreResult<()> {
        self.documents.mdelete(keys)
    }

    fn yield_keys(&self, prefix: Option<&str>) -> StoreResult<KeyStream<'_>> {
        self.documents.yield_keys(prefix)
    }

    fn count(&self) -> StoreResult<usize> {
        self.documents.count()
    }

    fn sample(&self, count: usize) -> StoreResult<Vec<T>> {
        self.documents
            .sample(count)?
            .into_iter()
            .map(|d| self.from_document(None, d))
            .collect()
    }
}

impl<T> Queryable for TypedStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn query(&self, filter: &Filter, order: &[OrderBy], page: Page) -> StoreResult<Vec<T>> {
        self.documents
            .query(filter, order, page)?
            .into_iter()
            .map(|d| self.from_document(None, d))
            .collect()
    }

    fn count_query(&self, filter: &Filter) -> StoreResult<usize> {
        self.documents.count_query(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use serde_json::json;
    use strata_types::into_document;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Product {
        name: String,
        size: u32,
        #[serde(default)]
        tags: Vec<String>,
    }

    fn setup() -> (Arc<InMemoryStore<Document>>, TypedStore<Product>) {
        let docs = Arc::new(InMemoryStore::new("products").unwrap());
        let typed = TypedStore::new(docs.clone() as Arc<dyn DocumentStore>);
        (docs, typed)
    }

    fn product(name: &str, size: u32) -> Product {
        Product {
            name: name.into(),
            size,
            tags: vec![],
        }
    }

    #[test]
    fn round_trip() {
        let (docs, typed) = setup();
        typed.set("p1", product("chair", 40)).unwrap();
        assert_eq!(typed.get("p1").unwrap(), Some(product("chair", 40)));
        assert_eq!(
            docs.get("p1").unwrap().unwrap(),
            into_document(json!({"name": "chair", "size": 40, "tags": []})).unwrap()
        );
    }

    #[test]
    fn reconstruction_failure_is_schema_error() {
        let (docs, typed) = setup();
        docs.set("bad", into_document(json!({"name": 7})).unwrap()).unwrap();
        match typed.get("bad") {
            Err(StoreError::SchemaValidation { key: Some(k), .. }) => assert_eq!(k, "bad"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn typed_query() {
        let (_, typed) = setup();
        for (k, size) in [("a", 100), ("b", 200), ("c", 300)] {
            typed.set(k, product(k, size)).unwrap();
        }
        let filter = Filter::from_json(&json!({"size": {"$lte": 250}})).unwrap();
        let order = OrderBy::from_pairs(&[("size", false)]).unwrap();
        let found = typed.query(&filter, &order, Page::all()).unwrap();
        assert_eq!(found, vec![product("b", 200), product("a", 100)]);
        assert_eq!(typed.count_query(&filter).unwrap(), 2);
    }

    #[test]
    fn migration_scan_rewrites_only_changed() {
        let (docs, typed) = setup();
        // current shape
        typed.set("new", product("lamp", 10)).unwrap();
        // prior shape: no `tags` field
        docs.set("old1", into_document(json!({"name": "desk", "size": 90})).unwrap())
            .unwrap();
        docs.set("old2", into_document(json!({"name": "rug", "size": 200})).unwrap())
            .unwrap();

        let config = ScanConfig { batch_size: 2 };
        assert_eq!(typed.validate_all(&config, None).unwrap(), 2);
        assert_eq!(docs.get("old1").unwrap().unwrap()["tags"], json!([]));
        assert_eq!(typed.validate_all(&config, None).unwrap(), 0);
    }

    #[test]
    fn migration_scan_fails_on_invalid_record() {
        let (docs, typed) = setup();
        docs.set("broken", into_document(json!({"size": "big"})).unwrap()).unwrap();
        let err = typed.validate_all(&ScanConfig::default(), None).unwrap_err();
        assert!(matches!(err, StoreError::SchemaValidation { .. }));
        // nothing was rewritten
        assert_eq!(docs.get("broken").unwrap().unwrap()["size"], json!("big"));
    }

    #[test]
    fn cancelled_scan_stops_between_batches() {
        let (docs, typed) = setup();
        for i in 0..5 {
            docs.set(&format!("k{i}"), into_document(json!({"name": "x", "size": i})).unwrap())
                .unwrap();
        }
        let flag = CancelFlag::new();
        flag.cancel();
        let err = typed.validate_all(&ScanConfig { batch_size: 2 }, Some(&flag)).unwrap_err();
        assert!(matches!(err, StoreError::Cancelled { completed: 0, .. }));
        assert!(docs.get("k0").unwrap().unwrap().get("tags").is_none());
    }

    #[test]
    fn zero_batch_size_rejected() {
        let (_, typed) = setup();
        let err = typed.validate_all(&ScanConfig { batch_size: 0 }, None).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn scan_config_defaults() {
        let config: ScanConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config.batch_size, 1000);
    }
}
