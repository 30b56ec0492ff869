use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use strata_query::{eval, Filter, OrderBy, Page};
use strata_types::{validate_collection_name, validate_keys, Document};

use crate::error::{StoreError, StoreResult};
use crate::traits::{sample_keys, KeyStream, Queryable, Store};

/// In-memory, `BTreeMap`-based store.
///
/// Intended for tests, embedding and as a cache layer. Values are held
/// behind a `RwLock` and cloned on read/write. `yield_keys` iterates over a
/// snapshot taken when the stream is created, so mutations made while
/// iterating are never visible to that stream.
pub struct InMemoryStore<V> {
    collection: String,
    entries: RwLock<BTreeMap<String, V>>,
}

impl<V> InMemoryStore<V> {
    /// Create an empty store for `collection`.
    pub fn new(collection: &str) -> StoreResult<Self> {
        validate_collection_name(collection)?;
        Ok(Self {
            collection: collection.to_string(),
            entries: RwLock::new(BTreeMap::new()),
        })
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, BTreeMap<String, V>>> {
        self.entries
            .read()
            .map_err(|_| StoreError::LockPoisoned(self.collection.clone()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, BTreeMap<String, V>>> {
        self.entries
            .write()
            .map_err(|_| StoreError::LockPoisoned(self.collection.clone()))
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.read()?.is_empty())
    }

    /// Remove every entry.
    pub fn clear(&self) -> StoreResult<()> {
        self.write()?.clear();
        Ok(())
    }
}

impl<V: Clone + Send + Sync> Store for InMemoryStore<V> {
    type Value = V;

    fn collection_name(&self) -> &str {
        &self.collection
    }

    fn mset(&self, pairs: &[(String, V)]) -> StoreResult<()> {
        validate_keys(&pairs.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>())?;
        let mut map = self.write()?;
        for (key, value) in pairs {
            map.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<V>>> {
        validate_keys(keys)?;
        let map = self.read()?;
        Ok(keys.iter().map(|k| map.get(k).cloned()).collect())
    }

    fn mdelete(&self, keys: &[String]) -> StoreResult<()> {
        validate_keys(keys)?;
        let mut map = self.write()?;
        for key in keys {
            map.remove(key);
        }
        Ok(())
    }

    fn yield_keys(&self, prefix: Option<&str>) -> StoreResult<KeyStream<'_>> {
        let map = self.read()?;
        let snapshot: Vec<String> = match prefix {
            Some(prefix) => map
                .range(prefix.to_string()..)
                .map(|(k, _)| k)
                .take_while(|k| k.starts_with(prefix))
                .cloned()
                .collect(),
            None => map.keys().cloned().collect(),
        };
        Ok(Box::new(snapshot.into_iter().map(Ok)))
    }

    fn count(&self) -> StoreResult<usize> {
        self.len()
    }

    fn sample(&self, count: usize) -> StoreResult<Vec<V>> {
        let map = self.read()?;
        let chosen = sample_keys(&self.collection, map.keys().cloned().collect(), count)?;
        Ok(chosen.iter().filter_map(|k| map.get(k).cloned()).collect())
    }
}

impl Queryable for InMemoryStore<Document> {
    fn query(&self, filter: &Filter, order: &[OrderBy], page: Page) -> StoreResult<Vec<Document>> {
        let map = self.read()?;
        Ok(eval::run(map.values(), filter, order, page))
    }

    fn count_query(&self, filter: &Filter) -> StoreResult<usize> {
        Ok(eval::count(self.read()?.values(), filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use strata_types::into_document;

    fn keys(ks: &[&str]) -> Vec<String> {
        ks.iter().map(|k| k.to_string()).collect()
    }

    fn bytes_store() -> InMemoryStore<Vec<u8>> {
        InMemoryStore::new("blobs").unwrap()
    }

    #[test]
    fn round_trip_and_absence() {
        let store = bytes_store();
        store
            .mset(&[("a".into(), vec![0, 255, 7]), ("b".into(), vec![])])
            .unwrap();
        let got = store.mget(&keys(&["a", "missing", "b"])).unwrap();
        assert_eq!(got, vec![Some(vec![0, 255, 7]), None, Some(vec![])]);
    }

    #[test]
    fn mset_replaces() {
        let store = bytes_store();
        store.set("k", b"one".to_vec()).unwrap();
        store.set("k", b"two".to_vec()).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn delete_is_idempotent() {
        let store = bytes_store();
        store.set("k", b"v".to_vec()).unwrap();
        store.mdelete(&keys(&["k"])).unwrap();
        store.mdelete(&keys(&["k"])).unwrap();
        store.delete("never-written").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn get_or_fail_reports_key() {
        let store = bytes_store();
        match store.get_or_fail("nope") {
            Err(StoreError::KeyNotFound { collection, key }) => {
                assert_eq!(collection, "blobs");
                assert_eq!(key, "nope");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn invalid_keys_rejected() {
        let store = bytes_store();
        let err = store.mset(&[("bad key".into(), vec![1])]).unwrap_err();
        assert!(matches!(err, StoreError::KeyValidation(_)));
        assert!(store.mget(&keys(&[""])).is_err());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn prefix_listing() {
        let store = bytes_store();
        for k in ["user/1", "user/2", "users", "team/1"] {
            store.set(k, vec![1]).unwrap();
        }
        assert_eq!(store.keys(Some("user/")).unwrap(), keys(&["user/1", "user/2"]));
        assert_eq!(store.keys(None).unwrap().len(), 4);
    }

    #[test]
    fn sample_without_replacement() {
        let store = bytes_store();
        for i in 0..10u8 {
            store.set(&format!("k{i}"), vec![i]).unwrap();
        }
        let mut sampled = store.sample(10).unwrap();
        sampled.sort();
        assert_eq!(sampled, (0..10u8).map(|i| vec![i]).collect::<Vec<_>>());
        assert_eq!(store.sample(3).unwrap().len(), 3);
        assert!(matches!(store.sample(11), Err(StoreError::InvalidArgument(_))));
    }

    #[test]
    fn delete_all_empties_collection() {
        let store = bytes_store();
        store.set("a", vec![1]).unwrap();
        store.set("b/c", vec![2]).unwrap();
        assert_eq!(store.delete_all().unwrap(), 2);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn document_query() {
        let store: InMemoryStore<Document> = InMemoryStore::new("items").unwrap();
        for (k, size) in [("a", 100), ("b", 200), ("c", 300)] {
            store
                .set(k, into_document(json!({"size": size})).unwrap())
                .unwrap();
        }
        let filter = Filter::from_json(&json!({"size": {"$lte": 250}})).unwrap();
        let mut sizes: Vec<i64> = store
            .query(&filter, &[], Page::all())
            .unwrap()
            .iter()
            .map(|d| d["size"].as_i64().unwrap())
            .collect();
        sizes.sort();
        assert_eq!(sizes, vec![100, 200]);
        assert_eq!(store.count_query(&filter).unwrap(), 2);
    }

    #[test]
    fn invalid_collection_name() {
        assert!(InMemoryStore::<Vec<u8>>::new("no spaces").is_err());
    }

    proptest! {
        #[test]
        fn mget_preserves_order(
            stored in proptest::collection::btree_set("[a-e]{1,2}", 0..8),
            lookup in proptest::collection::vec("[a-e]{1,2}", 0..16),
        ) {
            let store = bytes_store();
            let pairs: Vec<(String, Vec<u8>)> =
                stored.iter().map(|k| (k.clone(), k.as_bytes().to_vec())).collect();
            store.mset(&pairs).unwrap();
            let got = store.mget(&lookup).unwrap();
            prop_assert_eq!(got.len(), lookup.len());
            for (key, value) in lookup.iter().zip(got) {
                if stored.contains(key) {
                    prop_assert_eq!(value, Some(key.as_bytes().to_vec()));
                } else {
                    prop_assert_eq!(value, None);
                }
            }
        }
    }
}
