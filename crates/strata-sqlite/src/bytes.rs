use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use rusqlite::params;
use strata_store::{check_sample_size, KeyStream, Store, StoreError, StoreResult};
use strata_types::{validate_collection_name, validate_keys};
use tracing::debug;

use crate::table::{Table, KEY_CHUNK, TABLE};

/// Bytes store backed by one SQLite file.
///
/// Values are zlib-compressed on write and decompressed on read. Keys are
/// listed from a snapshot taken when `yield_keys` is called.
pub struct SqliteBytesStore {
    table: Table,
}

impl SqliteBytesStore {
    /// Open (creating if absent) the database file at `path`.
    pub fn open(collection: &str, path: impl AsRef<Path>) -> StoreResult<Self> {
        validate_collection_name(collection)?;
        Ok(Self {
            table: Table::open(collection, path.as_ref(), "value")?,
        })
    }

    /// A private in-memory database, for tests.
    pub fn in_memory(collection: &str) -> StoreResult<Self> {
        validate_collection_name(collection)?;
        Ok(Self {
            table: Table::in_memory(collection, "value")?,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.table.path()
    }

    /// Delete every row.
    pub fn clear(&self) -> StoreResult<()> {
        self.table.clear()
    }

    fn decompress(&self, key: &str, data: &[u8]) -> StoreResult<Vec<u8>> {
        let mut out = Vec::new();
        ZlibDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| StoreError::Serialization {
                collection: self.table.collection().to_string(),
                key: Some(key.to_string()),
                reason: format!("corrupt compressed value: {e}"),
            })?;
        Ok(out)
    }
}

fn compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

impl Store for SqliteBytesStore {
    type Value = Vec<u8>;

    fn collection_name(&self) -> &str {
        self.table.collection()
    }

    /// Writes the whole batch in one transaction.
    fn mset(&self, pairs: &[(String, Vec<u8>)]) -> StoreResult<()> {
        validate_keys(&pairs.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>())?;
        let compressed = pairs
            .iter()
            .map(|(k, v)| {
                compress(v).map(|c| (k, c)).map_err(|e| {
                    StoreError::backend(self.collection_name(), "mset", std::slice::from_ref(k), e)
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;
        let keys: Vec<String> = pairs.iter().map(|(k, _)| k.clone()).collect();
        self.table.with_conn("mset", &keys, |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt =
                    tx.prepare_cached(&format!("REPLACE INTO {TABLE} (key, value) VALUES (?1, ?2)"))?;
                for (key, value) in &compressed {
                    stmt.execute(params![key, value])?;
                }
            }
            tx.commit()
        })?;
        debug!(collection = self.collection_name(), count = pairs.len(), "mset");
        Ok(())
    }

    fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        validate_keys(keys)?;
        let mut found: HashMap<String, Vec<u8>> = HashMap::new();
        for chunk in keys.chunks(KEY_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let rows: Vec<(String, Vec<u8>)> = self.table.with_conn("mget", chunk, |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT key, value FROM {TABLE} WHERE key IN ({placeholders})"
                ))?;
                let rows = stmt.query_map(rusqlite::params_from_iter(chunk), |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?;
                rows.collect()
            })?;
            for (key, data) in rows {
                let value = self.decompress(&key, &data)?;
                found.insert(key, value);
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

    fn sample(&self, count: usize) -> StoreResult<Vec<Vec<u8>>> {
        check_sample_size(self.collection_name(), count, self.count()?)?;
        let limit = i64::try_from(count).unwrap_or(i64::MAX);
        let rows: Vec<(String, Vec<u8>)> = self.table.with_conn("sample", &[], |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT key, value FROM {TABLE} ORDER BY RANDOM() LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect()
        })?;
        rows.iter().map(|(k, v)| self.decompress(k, v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(ks: &[&str]) -> Vec<String> {
        ks.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn round_trip_on_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/dir/blobs.db");
        let store = SqliteBytesStore::open("blobs", &path).unwrap();
        assert!(path.exists());
        let data: Vec<u8> = (0..=255).cycle().take(4096).collect();
        store.mset(&[("a".into(), data.clone()), ("b".into(), vec![])]).unwrap();
        assert_eq!(
            store.mget(&keys(&["b", "zz", "a", "a"])).unwrap(),
            vec![Some(vec![]), None, Some(data.clone()), Some(data)]
        );

        // reopen sees the same rows
        drop(store);
        let reopened = SqliteBytesStore::open("blobs", &path).unwrap();
        assert_eq!(reopened.count().unwrap(), 2);
    }

    #[test]
    fn values_are_compressed() {
        let store = SqliteBytesStore::in_memory("blobs").unwrap();
        let data = vec![b'x'; 10_000];
        store.set("big", data.clone()).unwrap();
        let stored: Vec<u8> = store
            .table
            .with_conn("test", &[], |conn| {
                conn.query_row("SELECT value FROM store WHERE key = 'big'", [], |r| r.get(0))
            })
            .unwrap();
        assert!(stored.len() < data.len() / 10);
        assert_eq!(store.get("big").unwrap(), Some(data));
    }

    #[test]
    fn corrupt_value_is_serialization_error() {
        let store = SqliteBytesStore::in_memory("blobs").unwrap();
        store
            .table
            .with_conn("test", &[], |conn| {
                conn.execute("INSERT INTO store (key, value) VALUES ('bad', x'0102')", [])
            })
            .unwrap();
        assert!(matches!(store.get("bad"), Err(StoreError::Serialization { .. })));
    }

    #[test]
    fn delete_idempotent_and_clear() {
        let store = SqliteBytesStore::in_memory("blobs").unwrap();
        store.set("k", vec![1]).unwrap();
        store.mdelete(&keys(&["k", "missing"])).unwrap();
        store.mdelete(&keys(&["k"])).unwrap();
        assert_eq!(store.count().unwrap(), 0);
        store.set("a", vec![1]).unwrap();
        store.clear().unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn prefix_listing_is_exact() {
        let store = SqliteBytesStore::in_memory("blobs").unwrap();
        for k in ["a_1", "ab", "a_2", "A_3"] {
            store.set(k, vec![0]).unwrap();
        }
        // `_` is literal and matching is case-sensitive
        assert_eq!(store.keys(Some("a_")).unwrap(), keys(&["a_1", "a_2"]));
        assert_eq!(store.keys(None).unwrap().len(), 4);
        assert!(matches!(
            store.keys(Some("a*")),
            Err(StoreError::KeyValidation(_))
        ));
    }

    #[test]
    fn sampling() {
        let store = SqliteBytesStore::in_memory("blobs").unwrap();
        for i in 0..5u8 {
            store.set(&format!("k{i}"), vec![i]).unwrap();
        }
        let mut all = store.sample(5).unwrap();
        all.sort();
        assert_eq!(all, (0..5u8).map(|i| vec![i]).collect::<Vec<_>>());
        assert!(matches!(store.sample(6), Err(StoreError::InvalidArgument(_))));
    }

    #[test]
    fn invalid_key_never_reaches_database() {
        let store = SqliteBytesStore::in_memory("blobs").unwrap();
        assert!(matches!(
            store.set("x'; DROP TABLE store; --", vec![1]),
            Err(StoreError::KeyValidation(_))
        ));
        assert_eq!(store.count().unwrap(), 0);
    }
}
