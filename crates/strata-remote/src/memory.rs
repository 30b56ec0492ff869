//! In-process client implementations.
//!
//! They behave like the real services closely enough to exercise the
//! stores: listings paginate, deletes of missing ids succeed, filters use
//! the same comparison rules as the in-memory query evaluator. Useful for
//! tests and local development.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde_json::{json, Value};
use strata_query::{eval, DocumentDbQuery, Filter, OrderBy, DOCUMENT_FIELD};
use strata_store::sample_keys;
use strata_types::{into_document, Document};

use crate::document_db::{DocumentDatabaseClient, IdCursor, Namespace, ID_FIELD};
use crate::object_storage::{ClientResult, ListPage, ObjectStorageClient};

fn lock<T>(mutex: &Mutex<T>) -> ClientResult<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| "client state lock poisoned".into())
}

/// Object storage held in a `BTreeMap`, listing in key order.
pub struct InMemoryObjectStorage {
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    page_size: usize,
    list_calls: AtomicUsize,
    fail_next: Mutex<Option<String>>,
}

impl InMemoryObjectStorage {
    pub fn new() -> Self {
        Self::with_page_size(1000)
    }

    /// Listings return at most `page_size` keys per page.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            page_size: page_size.max(1),
            list_calls: AtomicUsize::new(0),
            fail_next: Mutex::new(None),
        }
    }

    /// Raw object, bypassing any store prefixing.
    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        lock(&self.objects)
            .ok()?
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Number of `list_objects` calls served so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::Relaxed)
    }

    /// Make the next call fail with `message`.
    pub fn fail_next(&self, message: &str) {
        if let Ok(mut slot) = self.fail_next.lock() {
            *slot = Some(message.to_string());
        }
    }

    fn check_failure(&self) -> ClientResult<()> {
        match lock(&self.fail_next)?.take() {
            Some(message) => Err(message.into()),
            None => Ok(()),
        }
    }
}

impl Default for InMemoryObjectStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStorageClient for InMemoryObjectStorage {
    fn get_object(&self, bucket: &str, key: &str) -> ClientResult<Option<Vec<u8>>> {
        self.check_failure()?;
        Ok(lock(&self.objects)?
            .get(&(bucket.to_string(), key.to_string()))
            .cloned())
    }

    fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> ClientResult<()> {
        self.check_failure()?;
        lock(&self.objects)?.insert((bucket.to_string(), key.to_string()), body.to_vec());
        Ok(())
    }

    fn delete_object(&self, bucket: &str, key: &str) -> ClientResult<()> {
        self.check_failure()?;
        lock(&self.objects)?.remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> ClientResult<ListPage> {
        self.check_failure()?;
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        let objects = lock(&self.objects)?;
        let mut matching = objects
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k)
            .filter(|k| continuation.map_or(true, |after| k.as_str() > after));
        let keys: Vec<String> = matching.by_ref().take(self.page_size).cloned().collect();
        let more = matching.next().is_some();
        Ok(ListPage {
            continuation: if more { keys.last().cloned() } else { None },
            keys,
        })
    }
}

/// Document database held in memory, one `BTreeMap` of envelopes per
/// namespace.
///
/// Understands the filter shapes the document store emits: `$and`, `_id`
/// with `$in` or an anchored `$regex` prefix, and `document.<path>` clauses
/// with the comparison operators.
pub struct InMemoryDocumentDatabase {
    collections: Mutex<HashMap<Namespace, BTreeMap<String, Value>>>,
    bulk_writes: AtomicUsize,
}

impl InMemoryDocumentDatabase {
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            bulk_writes: AtomicUsize::new(0),
        }
    }

    /// Raw envelope stored under `id`.
    pub fn envelope(&self, ns: &Namespace, id: &str) -> Option<Value> {
        lock(&self.collections).ok()?.get(ns)?.get(id).cloned()
    }

    /// Number of bulk writes served so far.
    pub fn bulk_writes(&self) -> usize {
        self.bulk_writes.load(Ordering::Relaxed)
    }

    fn matching(&self, ns: &Namespace, filter: &Value) -> ClientResult<Vec<Value>> {
        let collections = lock(&self.collections)?;
        let Some(envelopes) = collections.get(ns) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for envelope in envelopes.values() {
            if envelope_matches(envelope, filter)? {
                out.push(envelope.clone());
            }
        }
        Ok(out)
    }
}

impl Default for InMemoryDocumentDatabase {
    fn default() -> Self {
        Self::new()
    }
}

fn inner_document(envelope: &Value) -> Document {
    envelope
        .get(DOCUMENT_FIELD)
        .cloned()
        .and_then(|d| into_document(d).ok())
        .unwrap_or_default()
}

fn id_matches(id: Option<&str>, condition: &Value) -> bool {
    let Some(id) = id else { return false };
    if let Some(list) = condition.get("$in").and_then(Value::as_array) {
        return list.iter().any(|v| v.as_str() == Some(id));
    }
    if let Some(pattern) = condition.get("$regex").and_then(Value::as_str) {
        let literal: String = pattern.trim_start_matches('^').replace('\\', "");
        return id.starts_with(&literal);
    }
    condition.as_str() == Some(id)
}

fn envelope_matches(envelope: &Value, filter: &Value) -> ClientResult<bool> {
    let Value::Object(clauses) = filter else {
        return Err("filter must be an object".into());
    };
    for (field, condition) in clauses {
        let ok = if field == "$and" {
            let subs = condition.as_array().ok_or("$and takes a list")?;
            let mut all = true;
            for sub in subs {
                all &= envelope_matches(envelope, sub)?;
            }
            all
        } else if field == ID_FIELD {
            id_matches(envelope.get(ID_FIELD).and_then(Value::as_str), condition)
        } else {
            let path = field
                .strip_prefix(DOCUMENT_FIELD)
                .and_then(|p| p.strip_prefix('.'))
                .ok_or_else(|| format!("unsupported filter field {field:?}"))?;
            let inner = Filter::from_json(&json!({ path: condition }))?;
            eval::matches(&inner, &inner_document(envelope))
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

impl DocumentDatabaseClient for InMemoryDocumentDatabase {
    fn bulk_replace(&self, ns: &Namespace, envelopes: &[Value]) -> ClientResult<()> {
        let mut collections = lock(&self.collections)?;
        let target = collections.entry(ns.clone()).or_default();
        for envelope in envelopes {
            let id = envelope
                .get(ID_FIELD)
                .and_then(Value::as_str)
                .ok_or("envelope without string _id")?;
            target.insert(id.to_string(), envelope.clone());
        }
        self.bulk_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn find(&self, ns: &Namespace, query: &DocumentDbQuery) -> ClientResult<Vec<Value>> {
        let mut found = self.matching(ns, &query.filter)?;
        if !query.sort.is_empty() {
            let pairs: Vec<(&str, bool)> = query
                .sort
                .iter()
                .map(|(path, dir)| {
                    let inner = path
                        .strip_prefix(DOCUMENT_FIELD)
                        .and_then(|p| p.strip_prefix('.'))
                        .unwrap_or(path);
                    (inner, *dir >= 0)
                })
                .collect();
            let order = OrderBy::from_pairs(&pairs)?;
            found.sort_by(|a, b| eval::compare(&order, &inner_document(a), &inner_document(b)));
        }
        let page = strata_query::Page {
            limit: query.limit,
            offset: query.skip,
        };
        Ok(page.apply(found.into_iter()))
    }

    fn find_ids(&self, ns: &Namespace, filter: &Value) -> ClientResult<IdCursor<'_>> {
        let ids: Vec<String> = self
            .matching(ns, filter)?
            .iter()
            .filter_map(|e| e.get(ID_FIELD).and_then(Value::as_str).map(str::to_string))
            .collect();
        Ok(Box::new(ids.into_iter().map(Ok)))
    }

    fn delete_many(&self, ns: &Namespace, filter: &Value) -> ClientResult<()> {
        let doomed: Vec<String> = self
            .matching(ns, filter)?
            .iter()
            .filter_map(|e| e.get(ID_FIELD).and_then(Value::as_str).map(str::to_string))
            .collect();
        let mut collections = lock(&self.collections)?;
        if let Some(target) = collections.get_mut(ns) {
            for id in doomed {
                target.remove(&id);
            }
        }
        Ok(())
    }

    fn sample(&self, ns: &Namespace, size: usize) -> ClientResult<Vec<Value>> {
        let collections = lock(&self.collections)?;
        let Some(envelopes) = collections.get(ns) else {
            return Ok(Vec::new());
        };
        let ids: Vec<String> = envelopes.keys().cloned().collect();
        let take = size.min(ids.len());
        let chosen = sample_keys(&ns.collection, ids, take)?;
        Ok(chosen.iter().filter_map(|id| envelopes.get(id).cloned()).collect())
    }

    fn count_documents(&self, ns: &Namespace, filter: &Value) -> ClientResult<u64> {
        Ok(self.matching(ns, filter)?.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_paginates_in_key_order() {
        let client = InMemoryObjectStorage::with_page_size(2);
        for k in ["p/c", "p/a", "p/b", "q/z"] {
            client.put_object("b", k, b"").unwrap();
        }
        let first = client.list_objects("b", "p/", None).unwrap();
        assert_eq!(first.keys, vec!["p/a", "p/b"]);
        let second = client
            .list_objects("b", "p/", first.continuation.as_deref())
            .unwrap();
        assert_eq!(second.keys, vec!["p/c"]);
        assert_eq!(second.continuation, None);
    }

    #[test]
    fn envelope_filters() {
        let db = InMemoryDocumentDatabase::new();
        let ns = Namespace {
            database: "d".into(),
            collection: "c".into(),
        };
        db.bulk_replace(
            &ns,
            &[
                json!({"_id": "x1", "document": {"n": 1}}),
                json!({"_id": "x2", "document": {"n": 2}}),
                json!({"_id": "y1", "document": {}}),
            ],
        )
        .unwrap();
        let count = |f: Value| db.count_documents(&ns, &f).unwrap();
        assert_eq!(count(json!({})), 3);
        assert_eq!(count(json!({"_id": {"$regex": "^x"}})), 2);
        assert_eq!(count(json!({"_id": {"$in": ["x2", "nope"]}})), 1);
        assert_eq!(count(json!({"document.n": {"$gte": 2}})), 1);
        assert_eq!(count(json!({"document.n": {"$ne": 2}})), 2);
        assert!(db.count_documents(&ns, &json!({"other": 1})).is_err());
    }
}
