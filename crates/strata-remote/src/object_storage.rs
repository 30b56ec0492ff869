use std::collections::VecDeque;
use std::sync::Arc;

use strata_store::{sample_keys, BoxError, KeyStream, Store, StoreError, StoreResult};
use strata_types::{validate_collection_name, validate_key, validate_keys, TypeError};
use tracing::debug;

/// Result type for client calls. Errors are opaque to the store and wrapped
/// in [`StoreError::Backend`] with operation context.
pub type ClientResult<T> = Result<T, BoxError>;

/// One page of a prefix listing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Full object keys (including any prefix).
    pub keys: Vec<String>,
    /// Token for the next page, `None` on the last page.
    pub continuation: Option<String>,
}

/// The object-storage SDK surface a bytes store needs.
///
/// Implementations map the service's "no such key" condition to `Ok(None)`
/// and every other failure to `Err`.
pub trait ObjectStorageClient: Send + Sync {
    fn get_object(&self, bucket: &str, key: &str) -> ClientResult<Option<Vec<u8>>>;

    fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> ClientResult<()>;

    /// Deleting a missing object succeeds.
    fn delete_object(&self, bucket: &str, key: &str) -> ClientResult<()>;

    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> ClientResult<ListPage>;
}

/// Normalize a bucket name to the service's rules: lowercase, `-` instead
/// of `_`.
pub fn normalize_bucket_name(name: &str) -> String {
    name.to_ascii_lowercase().replace('_', "-")
}

/// Bytes store over a bucket, one object per key under `"{collection}/"`.
///
/// The service has no batch get or put, so batch calls issue one request
/// per key. Listing pages through the service lazily; objects written while
/// a listing is in flight appear only if the service returns them on a later
/// page.
pub struct ObjectStorageBytesStore {
    collection: String,
    bucket: String,
    prefix: String,
    client: Arc<dyn ObjectStorageClient>,
}

impl std::fmt::Debug for ObjectStorageBytesStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStorageBytesStore")
            .field("collection", &self.collection)
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl ObjectStorageBytesStore {
    /// Collection names may not contain `/`: the collection is the first
    /// segment of every object key, and a nested name would make one
    /// collection's listing include another's objects.
    pub fn new(
        collection: &str,
        bucket: &str,
        client: Arc<dyn ObjectStorageClient>,
    ) -> StoreResult<Self> {
        validate_collection_name(collection)?;
        if collection.contains('/') {
            return Err(TypeError::InvalidCollectionName {
                name: collection.to_string(),
                reason: "object storage collections may not contain '/'".to_string(),
            }
            .into());
        }
        Ok(Self {
            collection: collection.to_string(),
            bucket: bucket.to_string(),
            prefix: format!("{collection}/"),
            client,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object_key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    fn fail(&self, operation: &'static str, key: &str, e: BoxError) -> StoreError {
        StoreError::backend(&self.collection, operation, &[key.to_string()], e)
    }
}

impl Store for ObjectStorageBytesStore {
    type Value = Vec<u8>;

    fn collection_name(&self) -> &str {
        &self.collection
    }

    /// Not atomic across keys: on failure, keys before the failing one have
    /// been written. The error names the failing key.
    fn mset(&self, pairs: &[(String, Vec<u8>)]) -> StoreResult<()> {
        validate_keys(&pairs.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>())?;
        for (key, value) in pairs {
            self.client
                .put_object(&self.bucket, &self.object_key(key), value)
                .map_err(|e| self.fail("mset", key, e))?;
        }
        debug!(collection = %self.collection, bucket = %self.bucket, count = pairs.len(), "mset");
        Ok(())
    }

    fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        validate_keys(keys)?;
        keys.iter()
            .map(|key| {
                self.client
                    .get_object(&self.bucket, &self.object_key(key))
                    .map_err(|e| self.fail("mget", key, e))
            })
            .collect()
    }

    fn mdelete(&self, keys: &[String]) -> StoreResult<()> {
        validate_keys(keys)?;
        for key in keys {
            self.client
                .delete_object(&self.bucket, &self.object_key(key))
                .map_err(|e| self.fail("mdelete", key, e))?;
        }
        debug!(collection = %self.collection, bucket = %self.bucket, count = keys.len(), "mdelete");
        Ok(())
    }

    fn yield_keys(&self, prefix: Option<&str>) -> StoreResult<KeyStream<'_>> {
        let search = match prefix.filter(|p| !p.is_empty()) {
            Some(p) => {
                validate_key(p)?;
                self.object_key(p)
            }
            None => self.prefix.clone(),
        };
        Ok(Box::new(Listing {
            store: self,
            search,
            buffer: VecDeque::new(),
            continuation: None,
            exhausted: false,
        }))
    }

    /// Objects deleted between listing and fetching are dropped, so a
    /// concurrent delete can make the result shorter than `count`.
    fn sample(&self, count: usize) -> StoreResult<Vec<Vec<u8>>> {
        let chosen = sample_keys(&self.collection, self.keys(None)?, count)?;
        Ok(self.mget(&chosen)?.into_iter().flatten().collect())
    }
}

/// Lazy paginated listing.
struct Listing<'a> {
    store: &'a ObjectStorageBytesStore,
    search: String,
    buffer: VecDeque<String>,
    continuation: Option<String>,
    exhausted: bool,
}

impl Iterator for Listing<'_> {
    type Item = StoreResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(full) = self.buffer.pop_front() {
                match full.strip_prefix(&self.store.prefix) {
                    Some(key) => return Some(Ok(key.to_string())),
                    None => continue,
                }
            }
            if self.exhausted {
                return None;
            }
            let page = match self.store.client.list_objects(
                &self.store.bucket,
                &self.search,
                self.continuation.as_deref(),
            ) {
                Ok(page) => page,
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(StoreError::backend(
                        &self.store.collection,
                        "yield_keys",
                        &[],
                        e,
                    )));
                }
            };
            self.exhausted = page.continuation.is_none();
            self.continuation = page.continuation;
            self.buffer.extend(page.keys);
        }
    }
}
