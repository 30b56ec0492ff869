use std::sync::Arc;

use serde_json::Value;
use strata_query::{Filter, OrderBy, Page};
use strata_types::{into_document, Document};

use crate::error::{StoreError, StoreResult};
use crate::traits::{BytesStore, KeyStream, Queryable, Store};

/// Document store derived from a bytes store.
///
/// Each document is encoded as UTF-8 JSON before delegating to the bytes
/// store's batch operations and decoded on read. Bytes that do not decode to
/// a JSON object fail with [`StoreError::Serialization`].
///
/// Bytes backends have no query engine, so `query` and `count_query` fail
/// with [`StoreError::NotSupported`].
pub struct JsonDocumentStore<B: ?Sized = dyn BytesStore> {
    bytes: Arc<B>,
}

impl<B: BytesStore + ?Sized> JsonDocumentStore<B> {
    pub fn new(bytes: Arc<B>) -> Self {
        Self { bytes }
    }

    /// The underlying bytes store.
    pub fn inner(&self) -> &Arc<B> {
        &self.bytes
    }

    fn encode(&self, key: &str, document: &Document) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(document).map_err(|e| StoreError::Serialization {
            collection: self.collection_name().to_string(),
            key: Some(key.to_string()),
            reason: e.to_string(),
        })
    }

    fn decode(&self, key: Option<&str>, bytes: &[u8]) -> StoreResult<Document> {
        let fail = |reason: String| StoreError::Serialization {
            collection: self.collection_name().to_string(),
            key: key.map(str::to_string),
            reason,
        };
        let value: Value = serde_json::from_slice(bytes).map_err(|e| fail(e.to_string()))?;
        into_document(value).map_err(|e| fail(e.to_string()))
    }
}

impl<B: BytesStore + ?Sized> Store for JsonDocumentStore<B> {
    type Value = Document;

    fn collection_name(&self) -> &str {
        self.bytes.collection_name()
    }

    fn mset(&self, pairs: &[(String, Document)]) -> StoreResult<()> {
        let encoded = pairs
            .iter()
            .map(|(k, d)| Ok((k.clone(), self.encode(k, d)?)))
            .collect::<StoreResult<Vec<_>>>()?;
        self.bytes.mset(&encoded)
    }

    fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<Document>>> {
        self.bytes
            .mget(keys)?
            .into_iter()
            .zip(keys)
            .map(|(bytes, key)| bytes.map(|b| self.decode(Some(key.as_str()), &b)).transpose())
            .collect()
    }

    fn mdelete(&self, keys: &[String]) -> StoreResult<()> {
        self.bytes.mdelete(keys)
    }

    fn yield_keys(&self, prefix: Option<&str>) -> StoreResult<KeyStream<'_>> {
        self.bytes.yield_keys(prefix)
    }

    fn count(&self) -> StoreResult<usize> {
        self.bytes.count()
    }

    fn sample(&self, count: usize) -> StoreResult<Vec<Document>> {
        self.bytes
            .sample(count)?
            .iter()
            .map(|b| self.decode(None, b))
            .collect()
    }
}

impl<B: BytesStore + ?Sized> Queryable for JsonDocumentStore<B> {
    fn query(&self, _filter: &Filter, _order: &[OrderBy], _page: Page) -> StoreResult<Vec<Document>> {
        Err(StoreError::not_supported(self.collection_name(), "query"))
    }

    fn count_query(&self, _filter: &Filter) -> StoreResult<usize> {
        Err(StoreError::not_supported(self.collection_name(), "count_query"))
    }
}
