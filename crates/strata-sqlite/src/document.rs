use std::collections::HashMap;
use std::path::Path;

use rusqlite::params;
use serde_json::Value;
use strata_query::{sql, Filter, OrderBy, Page};
use strata_store::{check_sample_size, KeyStream, Queryable, Store, StoreError, StoreResult};
use strata_types::{into_document, validate_collection_name, validate_keys, Document};
use tracing::debug;

use crate::table::{bind, Table, KEY_CHUNK, TABLE};

const COLUMN: &str = "document";

/// Document store backed by one SQLite file, one JSON document per row.
///
/// Filters compile to `json_extract` predicates with every literal and
/// JSON path bound as a parameter. Keys are listed from a snapshot taken
/// when `yield_keys` is called.
pub struct SqliteDocumentStore {
    table: Table,
}

impl SqliteDocumentStore {
    /// Open (creating if absent) the database file at `path`.
    pub fn open(collection: &str, path: impl AsRef<Path>) -> StoreResult<Self> {
        validate_collection_name(collection)?;
        Ok(Self {
            table: Table::open(collection, path.as_ref(), COLUMN)?,
        })
    }

    /// A private in-memory database, for tests.
    pub fn in_memory(collection: &str) -> StoreResult<Self> {
        validate_collection_name(collection)?;
        Ok(Self {
            table: Table::in_memory(collection, COLUMN)?,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.table.path()
    }

    /// Delete every row.
    pub fn clear(&self) -> StoreResult<()> {
        self.table.clear()
    }

    fn decode(&self, key: Option<&str>, text: &str) -> StoreResult<Document> {
        let fail = |reason: String| StoreError::Serialization {
            collection: self.table.collection().to_string(),
            key: key.map(str::to_string),
            reason,
        };
        let value: Value = serde_json::from_str(text).map_err(|e| fail(e.to_string()))?;
        into_document(value).map_err(|e| fail(e.to_string()))
    }

    fn select_texts(&self, operation: &'static str, query: &sql::SqlQuery) -> StoreResult<Vec<String>> {
        let bound: Vec<_> = query.params.iter().map(bind).collect();
        self.table.with_conn(operation, &[], |conn| {
            let mut stmt = conn.prepare(&query.sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(bound.iter()), |row| row.get(0))?;
            rows.collect()
        })
    }
}

impl Store for SqliteDocumentStore {
    type Value = Document;

    fn collection_name(&self) -> &str {
        self.table.collection()
    }

    /// Writes the whole batch in one transaction.
    fn mset(&self, pairs: &[(String, Document)]) -> StoreResult<()> {
        validate_keys(&pairs.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>())?;
        let encoded = pairs
            .iter()
            .map(|(k, d)| {
                serde_json::to_string(d)
                    .map(|text| (k, text))
                    .map_err(|e| StoreError::Serialization {
                        collection: self.collection_name().to_string(),
                        key: Some(k.clone()),
                        reason: e.to_string(),
                    })
            })
            .collect::<StoreResult<Vec<_>>>()?;
        let keys: Vec<String> = pairs.iter().map(|(k, _)| k.clone()).collect();
        self.table.with_conn("mset", &keys, |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(&format!(
                    "REPLACE INTO {TABLE} (key, {COLUMN}) VALUES (?1, ?2)"
                ))?;
                for (key, text) in &encoded {
                    stmt.execute(params![key, text])?;
                }
            }
            tx.commit()
        })?;
        debug!(collection = self.collection_name(), count = pairs.len(), "mset");
        Ok(())
    }

    fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<Document>>> {
        validate_keys(keys)?;
        let mut found: HashMap<String, Document> = HashMap::new();
        for chunk in keys.chunks(KEY_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let rows: Vec<(String, String)> = self.table.with_conn("mget", chunk, |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT key, {COLUMN} FROM {TABLE} WHERE key IN ({placeholders})"
                ))?;
                let rows = stmt.query_map(rusqlite::params_from_iter(chunk), |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?;
                rows.collect()
            })?;
            for (key, text) in rows {
                let document = self.decode(Some(key.as_str()), &text)?;
                found.insert(key, document);
            }
        }
        Ok(keys.iter().map(|k| found.get(k).cloned()).collect())
    }

    fn mdelete(&self, keys: &[String]) -> StoreResult<()> {
        validate_keys(keys)?;
        self.table.delete(keys)
    }

    fn yield_keys(&self, prefix: Option<&str>) -> StoreResult<KeyStream<'_>> {
        Ok(Box::new(self.table.keys(prefix)?.into_iter().map(Ok)))
    }

    fn count(&self) -> StoreResult<usize> {
        self.table.count()
    }

    fn sample(&self, count: usize) -> StoreResult<Vec<Document>> {
        check_sample_size(self.collection_name(), count, self.count()?)?;
        let limit = i64::try_from(count).unwrap_or(i64::MAX);
        let texts: Vec<String> = self.table.with_conn("sample", &[], |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMN} FROM {TABLE} ORDER BY RANDOM() LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit], |row| row.get(0))?;
            rows.collect()
        })?;
        texts.iter().map(|t| self.decode(None, t)).collect()
    }
}

impl Queryable for SqliteDocumentStore {
    fn query(&self, filter: &Filter, order: &[OrderBy], page: Page) -> StoreResult<Vec<Document>> {
        let query = sql::select_documents(TABLE, COLUMN, filter, order, page);
        debug!(collection = self.collection_name(), sql = %query.sql, "query");
        self.select_texts("query", &query)?
            .iter()
            .map(|t| self.decode(None, t))
            .collect()
    }

    fn count_query(&self, filter: &Filter) -> StoreResult<usize> {
        let query = sql::count_documents(TABLE, COLUMN, filter);
        let bound: Vec<_> = query.params.iter().map(bind).collect();
        let n: i64 = self.table.with_conn("count_query", &[], |conn| {
            conn.query_row(&query.sql, rusqlite::params_from_iter(bound.iter()), |row| row.get(0))
        })?;
        Ok(usize::try_from(n).unwrap_or(0))
    }
}
