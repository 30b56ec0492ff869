use std::sync::Arc;

use strata_query::{Filter, OrderBy, Page};
use strata_types::validate_keys;
use tracing::{debug, warn};

use crate::error::{DualWriteFailure, StoreError, StoreResult};
use crate::traits::{KeyStream, Queryable, Store};

/// Cache-aside composition of two stores over the same collection.
///
/// - Reads check `cache` in one batch, then fetch the misses from `base` in
///   one batch. A value found only in `base` is **not** written back into
///   `cache`; callers that want backfill populate the cache themselves.
/// - Writes and deletes go to `cache` first, then `base`. The base write is
///   attempted even if the cache write failed, so a
///   [`StoreError::DualWrite`] tells the caller exactly which layer holds
///   the change. Nothing is rolled back.
/// - Listing, sampling and querying are answered by `base` alone.
pub struct LayeredStore<S: ?Sized> {
    cache: Arc<S>,
    base: Arc<S>,
}

impl<S: Store + ?Sized> LayeredStore<S> {
    /// Compose `cache` over `base`.
    ///
    /// Fails with [`StoreError::Configuration`] if the collection names differ.
    pub fn new(cache: Arc<S>, base: Arc<S>) -> StoreResult<Self> {
        if cache.collection_name() != base.collection_name() {
            return Err(StoreError::Configuration(format!(
                "cannot layer collection {:?} over collection {:?}",
                cache.collection_name(),
                base.collection_name()
            )));
        }
        Ok(Self { cache, base })
    }

    pub fn cache(&self) -> &Arc<S> {
        &self.cache
    }

    pub fn base(&self) -> &Arc<S> {
        &self.base
    }

    fn dual_write(
        &self,
        operation: &'static str,
        keys: usize,
        cache: StoreResult<()>,
        base: StoreResult<()>,
    ) -> StoreResult<()> {
        let Some(failure) = DualWriteFailure::from_outcomes(cache, base) else {
            return Ok(());
        };
        warn!(
            collection = self.collection_name(),
            operation,
            keys,
            failure = %failure,
            "layers diverged"
        );
        Err(StoreError::DualWrite {
            collection: self.collection_name().to_string(),
            operation,
            failure,
        })
    }
}

impl<S: Store + ?Sized> Store for LayeredStore<S> {
    type Value = S::Value;

    fn collection_name(&self) -> &str {
        self.base.collection_name()
    }

    fn mset(&self, pairs: &[(String, S::Value)]) -> StoreResult<()> {
        validate_keys(&pairs.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>())?;
        let cache = self.cache.mset(pairs);
        let base = self.base.mset(pairs);
        self.dual_write("mset", pairs.len(), cache, base)
    }

    fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<S::Value>>> {
        validate_keys(keys)?;
        let mut results = self.cache.mget(keys)?;
        let missing: Vec<usize> = results
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.is_none().then_some(i))
            .collect();
        debug!(
            collection = self.collection_name(),
            requested = keys.len(),
            cache_hits = keys.len() - missing.len(),
            "layered mget"
        );
        if missing.is_empty() {
            return Ok(results);
        }
        let missing_keys: Vec<String> = missing.iter().map(|&i| keys[i].clone()).collect();
        let from_base = self.base.mget(&missing_keys)?;
        for (i, value) in missing.into_iter().zip(from_base) {
            results[i] = value;
        }
        Ok(results)
    }

    fn mdelete(&self, keys: &[String]) -> StoreResult<()> {
        validate_keys(keys)?;
        let cache = self.cache.mdelete(keys);
        let base = self.base.mdelete(keys);
        self.dual_write("mdelete", keys.len(), cache, base)
    }

    fn yield_keys(&self, prefix: Option<&str>) -> StoreResult<KeyStream<'_>> {
        self.base.yield_keys(prefix)
    }

    fn count(&self) -> StoreResult<usize> {
        self.base.count()
    }

    fn sample(&self, count: usize) -> StoreResult<Vec<S::Value>> {
        self.base.sample(count)
    }
}

impl<S: Queryable + ?Sized> Queryable for LayeredStore<S> {
    fn query(&self, filter: &Filter, order: &[OrderBy], page: Page) -> StoreResult<Vec<S::Value>> {
        self.base.query(filter, order, page)
    }

    fn count_query(&self, filter: &Filter) -> StoreResult<usize> {
        self.base.count_query(filter)
    }
}
