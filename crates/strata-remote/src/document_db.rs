use std::sync::Arc;

use serde_json::{json, Value};
use strata_query::{DocumentDbQuery, Filter, OrderBy, Page, DOCUMENT_FIELD};
use strata_store::{check_sample_size, BoxError, KeyStream, Queryable, Store, StoreError, StoreResult};
use strata_types::{into_document, validate_collection_name, validate_key, validate_keys, Document};
use tracing::debug;

use crate::object_storage::ClientResult;

/// Envelope field holding the record key.
pub const ID_FIELD: &str = "_id";

/// A database/collection pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

/// A lazily drained cursor of record ids.
pub type IdCursor<'a> = Box<dyn Iterator<Item = ClientResult<String>> + 'a>;

/// The document-database driver surface a document store needs.
///
/// Records are envelopes `{ "_id": key, "document": {...} }`; filters and
/// sorts are already translated to the database's own query language.
pub trait DocumentDatabaseClient: Send + Sync {
    /// Replace-or-insert every envelope by `_id`, as one bulk write.
    fn bulk_replace(&self, ns: &Namespace, envelopes: &[Value]) -> ClientResult<()>;

    /// Envelopes matching `query.filter`, sorted and windowed.
    fn find(&self, ns: &Namespace, query: &DocumentDbQuery) -> ClientResult<Vec<Value>>;

    /// `_id`s of envelopes matching `filter`, projected to the id only.
    fn find_ids(&self, ns: &Namespace, filter: &Value) -> ClientResult<IdCursor<'_>>;

    fn delete_many(&self, ns: &Namespace, filter: &Value) -> ClientResult<()>;

    /// Up to `size` random envelopes (a `$sample` aggregation).
    fn sample(&self, ns: &Namespace, size: usize) -> ClientResult<Vec<Value>>;

    fn count_documents(&self, ns: &Namespace, filter: &Value) -> ClientResult<u64>;
}

/// Escape a key prefix for an anchored regular expression.
///
/// Allow-listed keys only contain alphanumerics and `_ . - /`; every
/// non-alphanumeric character is escaped.
pub fn regex_prefix(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + 8);
    out.push('^');
    for ch in prefix.chars() {
        if !ch.is_ascii_alphanumeric() && ch != '_' {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Native document store over a document database.
///
/// `mget` and `mdelete` are single `$in` round trips; `mset` is one bulk
/// write. Field paths in filters and sorts are rewritten under the
/// `document.` envelope field. `yield_keys` drains a server cursor, so
/// writes made while iterating may or may not appear.
pub struct DocumentDbStore {
    ns: Namespace,
    client: Arc<dyn DocumentDatabaseClient>,
}

impl DocumentDbStore {
    pub fn new(
        database: &str,
        collection: &str,
        client: Arc<dyn DocumentDatabaseClient>,
    ) -> StoreResult<Self> {
        validate_collection_name(collection)?;
        Ok(Self {
            ns: Namespace {
                database: database.to_string(),
                collection: collection.to_string(),
            },
            client,
        })
    }

    pub fn namespace(&self) -> &Namespace {
        &self.ns
    }

    /// Delete every record in the collection.
    pub fn clear(&self) -> StoreResult<()> {
        self.client
            .delete_many(&self.ns, &json!({}))
            .map_err(|e| self.fail("clear", &[], e))
    }

    fn fail(&self, operation: &'static str, keys: &[String], e: BoxError) -> StoreError {
        StoreError::backend(&self.ns.collection, operation, keys, e)
    }

    fn ids_filter(keys: &[String]) -> Value {
        json!({ ID_FIELD: { "$in": keys } })
    }

    /// Split an envelope into its id and document.
    fn open_envelope(&self, envelope: Value) -> StoreResult<(Option<String>, Document)> {
        let fail = |key: Option<String>, reason: String| StoreError::Serialization {
            collection: self.ns.collection.clone(),
            key,
            reason,
        };
        let Value::Object(mut fields) = envelope else {
            return Err(fail(None, "envelope is not an object".into()));
        };
        let id = match fields.remove(ID_FIELD) {
            Some(Value::String(id)) => Some(id),
            _ => None,
        };
        let document = fields
            .remove(DOCUMENT_FIELD)
            .ok_or_else(|| fail(id.clone(), format!("envelope has no {DOCUMENT_FIELD:?} field")))?;
        let document = into_document(document).map_err(|e| fail(id.clone(), e.to_string()))?;
        Ok((id, document))
    }

    fn documents(&self, envelopes: Vec<Value>) -> StoreResult<Vec<Document>> {
        envelopes
            .into_iter()
            .map(|e| self.open_envelope(e).map(|(_, d)| d))
            .collect()
    }
}

impl Store for DocumentDbStore {
    type Value = Document;

    fn collection_name(&self) -> &str {
        &self.ns.collection
    }

    fn mset(&self, pairs: &[(String, Document)]) -> StoreResult<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = pairs.iter().map(|(k, _)| k.clone()).collect();
        validate_keys(&keys)?;
        let envelopes: Vec<Value> = pairs
            .iter()
            .map(|(k, d)| json!({ ID_FIELD: k, DOCUMENT_FIELD: d }))
            .collect();
        self.client
            .bulk_replace(&self.ns, &envelopes)
            .map_err(|e| self.fail("mset", &keys, e))?;
        debug!(collection = %self.ns.collection, count = pairs.len(), "mset");
        Ok(())
    }

    fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<Document>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        validate_keys(keys)?;
        let query = DocumentDbQuery {
            filter: Self::ids_filter(keys),
            sort: Vec::new(),
            limit: 0,
            skip: 0,
        };
        let envelopes = self
            .client
            .find(&self.ns, &query)
            .map_err(|e| self.fail("mget", keys, e))?;
        let mut found = std::collections::HashMap::with_capacity(envelopes.len());
        for envelope in envelopes {
            if let (Some(id), document) = self.open_envelope(envelope)? {
                found.insert(id, document);
            }
        }
        Ok(keys.iter().map(|k| found.get(k).cloned()).collect())
    }

    fn mdelete(&self, keys: &[String]) -> StoreResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        validate_keys(keys)?;
        self.client
            .delete_many(&self.ns, &Self::ids_filter(keys))
            .map_err(|e| self.fail("mdelete", keys, e))
    }

    fn yield_keys(&self, prefix: Option<&str>) -> StoreResult<KeyStream<'_>> {
        let filter = match prefix.filter(|p| !p.is_empty()) {
            Some(p) => {
                validate_key(p)?;
                json!({ ID_FIELD: { "$regex": regex_prefix(p) } })
            }
            None => json!({}),
        };
        let cursor = self
            .client
            .find_ids(&self.ns, &filter)
            .map_err(|e| self.fail("yield_keys", &[], e))?;
        Ok(Box::new(
            cursor.map(move |id| id.map_err(|e| self.fail("yield_keys", &[], e))),
        ))
    }

    fn count(&self) -> StoreResult<usize> {
        let n = self
            .client
            .count_documents(&self.ns, &json!({}))
            .map_err(|e| self.fail("count", &[], e))?;
        Ok(usize::try_from(n).unwrap_or(usize::MAX))
    }

    fn sample(&self, count: usize) -> StoreResult<Vec<Document>> {
        check_sample_size(&self.ns.collection, count, self.count()?)?;
        let envelopes = self
            .client
            .sample(&self.ns, count)
            .map_err(|e| self.fail("sample", &[], e))?;
        self.documents(envelopes)
    }
}

impl Queryable for DocumentDbStore {
    fn query(&self, filter: &Filter, order: &[OrderBy], page: Page) -> StoreResult<Vec<Document>> {
        let query = DocumentDbQuery::new(filter, order, page);
        debug!(collection = %self.ns.collection, filter = %query.filter, "query");
        let envelopes = self
            .client
            .find(&self.ns, &query)
            .map_err(|e| self.fail("query", &[], e))?;
        self.documents(envelopes)
    }

    fn count_query(&self, filter: &Filter) -> StoreResult<usize> {
        let translated = strata_query::document_db::translate_filter(filter);
        let n = self
            .client
            .count_documents(&self.ns, &translated)
            .map_err(|e| self.fail("count_query", &[], e))?;
        Ok(usize::try_from(n).unwrap_or(usize::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryDocumentDatabase;

    fn doc(value: Value) -> Document {
        into_document(value).unwrap()
    }

    fn setup() -> (Arc<InMemoryDocumentDatabase>, DocumentDbStore) {
        let client = Arc::new(InMemoryDocumentDatabase::new());
        let store = DocumentDbStore::new("app", "items", client.clone()).unwrap();
        (client, store)
    }

    fn seeded() -> (Arc<InMemoryDocumentDatabase>, DocumentDbStore) {
        let (client, store) = setup();
        store
            .mset(&[
                ("a".into(), doc(json!({"size": 100, "user": {"name": "Alice"}}))),
                ("b".into(), doc(json!({"size": 200}))),
                ("c".into(), doc(json!({"size": 300, "user": {"name": "Carol"}}))),
            ])
            .unwrap();
        (client, store)
    }

    #[test]
    fn stores_envelopes() {
        let (client, store) = setup();
        store.set("k", doc(json!({"x": 1}))).unwrap();
        let ns = store.namespace().clone();
        assert_eq!(
            client.envelope(&ns, "k"),
            Some(json!({"_id": "k", "document": {"x": 1}}))
        );
        assert_eq!(client.bulk_writes(), 1);
    }

    #[test]
    fn mget_preserves_order_with_duplicates() {
        let (_, store) = seeded();
        let keys: Vec<String> = ["c", "zz", "a", "c"].iter().map(|s| s.to_string()).collect();
        let got = store.mget(&keys).unwrap();
        assert_eq!(got.len(), 4);
        assert_eq!(got[0].as_ref().unwrap()["size"], json!(300));
        assert!(got[1].is_none());
        assert_eq!(got[2].as_ref().unwrap()["size"], json!(100));
        assert_eq!(got[3], got[0]);
    }

    #[test]
    fn query_and_count_query() {
        let (_, store) = seeded();
        let filter = Filter::from_json(&json!({"size": {"$lte": 250}})).unwrap();
        let order = OrderBy::from_pairs(&[("size", true)]).unwrap();
        let found = store.query(&filter, &order, Page::all()).unwrap();
        assert_eq!(found.iter().map(|d| d["size"].clone()).collect::<Vec<_>>(), vec![json!(100), json!(200)]);
        assert_eq!(store.count_query(&filter).unwrap(), 2);
    }

    #[test]
    fn ne_includes_missing_field() {
        let (_, store) = seeded();
        let filter = Filter::from_json(&json!({"user.name": {"$ne": "Alice"}})).unwrap();
        assert_eq!(store.count_query(&filter).unwrap(), 2);
    }

    #[test]
    fn prefix_scan_escapes_regex() {
        let (_, store) = setup();
        for k in ["a.b/1", "axb/2", "a.b/3"] {
            store.set(k, Document::new()).unwrap();
        }
        let mut found = store.keys(Some("a.b/")).unwrap();
        found.sort();
        assert_eq!(found, vec!["a.b/1".to_string(), "a.b/3".to_string()]);
        assert_eq!(regex_prefix("a.b-c/"), r"^a\.b\-c\/");
    }

    #[test]
    fn delete_count_and_sample() {
        let (_, store) = seeded();
        store.mdelete(&["a".to_string(), "missing".to_string()]).unwrap();
        store.delete("a").unwrap();
        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(store.sample(2).unwrap().len(), 2);
        assert!(matches!(store.sample(3), Err(StoreError::InvalidArgument(_))));
        store.clear().unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn malformed_envelope_is_serialization_error() {
        let (client, store) = setup();
        client
            .bulk_replace(store.namespace(), &[json!({"_id": "bad", "payload": 1})])
            .unwrap();
        assert!(matches!(store.get("bad"), Err(StoreError::Serialization { .. })));
    }

    #[test]
    fn empty_batches_skip_round_trips() {
        let (client, store) = setup();
        store.mset(&[]).unwrap();
        assert_eq!(store.mget(&[]).unwrap(), Vec::<Option<Document>>::new());
        assert_eq!(client.bulk_writes(), 0);
    }
}
