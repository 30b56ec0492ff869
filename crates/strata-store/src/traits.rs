use strata_query::{Filter, OrderBy, Page};
use strata_types::Document;

use crate::error::{StoreError, StoreResult};

/// A lazy, single-pass sequence of keys.
///
/// Consuming it twice means calling [`Store::yield_keys`] twice, which performs
/// two independent scans. Whether a mutation made mid-iteration is visible is
/// documented per backend.
pub type KeyStream<'a> = Box<dyn Iterator<Item = StoreResult<String>> + 'a>;

/// Batch-oriented keyed storage for one collection.
///
/// All implementations must satisfy these invariants:
/// - `mget` returns exactly one slot per input key, in input order. Absent
///   keys map to `None`; duplicates and unknown keys are allowed.
/// - `mset` fully replaces each value (no merge) and is visible to the next
///   `mget` on the same instance.
/// - `mdelete` of an absent key is a no-op.
/// - Keys are validated before any backend call.
/// - Backend failures are propagated, never silently ignored.
pub trait Store: Send + Sync {
    /// The record value this store holds.
    type Value;

    /// The collection this instance is bound to.
    fn collection_name(&self) -> &str;

    /// Upsert every pair.
    fn mset(&self, pairs: &[(String, Self::Value)]) -> StoreResult<()>;

    /// Fetch values for `keys`, preserving order and length.
    fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<Self::Value>>>;

    /// Delete every key. Absent keys are ignored.
    fn mdelete(&self, keys: &[String]) -> StoreResult<()>;

    /// Stream keys in backend-defined order, optionally restricted to keys
    /// starting with `prefix`.
    fn yield_keys(&self, prefix: Option<&str>) -> StoreResult<KeyStream<'_>>;

    /// Draw `count` values uniformly at random without replacement.
    ///
    /// Fails with [`StoreError::InvalidArgument`] when `count` exceeds the
    /// collection size.
    fn sample(&self, count: usize) -> StoreResult<Vec<Self::Value>>;

    /// Number of keys in the collection.
    ///
    /// Default implementation drains [`yield_keys`](Store::yield_keys).
    /// Backends with a native count should override it.
    fn count(&self) -> StoreResult<usize> {
        let mut total = 0;
        for key in self.yield_keys(None)? {
            key?;
            total += 1;
        }
        Ok(total)
    }

    /// Collect every key (optionally under `prefix`) into a vector.
    fn keys(&self, prefix: Option<&str>) -> StoreResult<Vec<String>> {
        self.yield_keys(prefix)?.collect()
    }

    fn set(&self, key: &str, value: Self::Value) -> StoreResult<()> {
        self.mset(&[(key.to_string(), value)])
    }

    fn get(&self, key: &str) -> StoreResult<Option<Self::Value>> {
        Ok(self.mget(&[key.to_string()])?.pop().flatten())
    }

    /// Like [`get`](Store::get) but absence is a [`StoreError::KeyNotFound`].
    fn get_or_fail(&self, key: &str) -> StoreResult<Self::Value> {
        self.get(key)?.ok_or_else(|| StoreError::KeyNotFound {
            collection: self.collection_name().to_string(),
            key: key.to_string(),
        })
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.mdelete(&[key.to_string()])
    }

    /// Delete every key in the collection and return how many were removed.
    fn delete_all(&self) -> StoreResult<usize> {
        let keys = self.keys(None)?;
        if !keys.is_empty() {
            self.mdelete(&keys)?;
        }
        tracing::info!(
            collection = self.collection_name(),
            deleted = keys.len(),
            "delete_all"
        );
        Ok(keys.len())
    }
}

/// Declarative querying over stored documents.
///
/// Every field path is validated when the [`Filter`] and [`OrderBy`] values
/// are built, before any backend sees them.
pub trait Queryable: Store {
    /// Documents matching `filter`, sorted by `order`, windowed by `page`.
    fn query(&self, filter: &Filter, order: &[OrderBy], page: Page)
        -> StoreResult<Vec<Self::Value>>;

    /// Number of documents matching `filter`.
    fn count_query(&self, filter: &Filter) -> StoreResult<usize>;
}

/// Raw byte storage.
pub trait BytesStore: Store<Value = Vec<u8>> {}

impl<S: Store<Value = Vec<u8>> + ?Sized> BytesStore for S {}

/// JSON document storage with querying.
pub trait DocumentStore: Queryable + Store<Value = Document> {}

impl<S: Queryable + Store<Value = Document> + ?Sized> DocumentStore for S {}

/// Check a requested sample size against the collection size.
pub fn check_sample_size(collection: &str, requested: usize, available: usize) -> StoreResult<()> {
    if requested > available {
        return Err(StoreError::InvalidArgument(format!(
            "cannot sample {requested} records from collection {collection:?} holding {available}"
        )));
    }
    Ok(())
}

/// Pick `count` distinct items uniformly at random.
pub fn sample_keys(collection: &str, keys: Vec<String>, count: usize) -> StoreResult<Vec<String>> {
    check_sample_size(collection, count, keys.len())?;
    let mut rng = rand::thread_rng();
    let chosen = rand::seq::index::sample(&mut rng, keys.len(), count);
    let mut keys: Vec<Option<String>> = keys.into_iter().map(Some).collect();
    Ok(chosen.into_iter().filter_map(|i| keys[i].take()).collect())
}
