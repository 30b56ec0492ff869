//! Connection handling and the operations shared by both table layouts.
//!
//! Every store owns one `store` table in its own database file, with a
//! `key TEXT PRIMARY KEY` column and one value column.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection};
use strata_query::SqlParam;
use strata_store::{StoreError, StoreResult};
use strata_types::validate_key;
use tracing::debug;

/// Table name used by every store file.
pub const TABLE: &str = "store";

/// SQLite's default bound-parameter limit is far above this; batching keeps
/// `IN (...)` lists short.
pub(crate) const KEY_CHUNK: usize = 500;

pub(crate) struct Table {
    collection: String,
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl Table {
    /// Open the database file, creating parent directories and the table.
    pub(crate) fn open(collection: &str, path: &Path, value_column: &str) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| StoreError::backend(collection, "open", &[], e))?;
        Self::init(collection, Some(path.to_path_buf()), conn, value_column)
    }

    /// Open a private in-memory database.
    pub(crate) fn in_memory(collection: &str, value_column: &str) -> StoreResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::backend(collection, "open", &[], e))?;
        Self::init(collection, None, conn, value_column)
    }

    fn init(
        collection: &str,
        path: Option<PathBuf>,
        conn: Connection,
        value_column: &str,
    ) -> StoreResult<Self> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {TABLE} (key TEXT PRIMARY KEY, {value_column} {})",
            if value_column == "document" { "JSON" } else { "BLOB" }
        );
        conn.execute_batch(&ddl)
            .map_err(|e| StoreError::backend(collection, "create_table", &[], e))?;
        debug!(collection, path = ?path, "opened sqlite table");
        Ok(Self {
            collection: collection.to_string(),
            path,
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn collection(&self) -> &str {
        &self.collection
    }

    pub(crate) fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::LockPoisoned(self.collection.clone()))
    }

    /// Run `f` with exclusive access to the connection, attaching operation
    /// context to any SQLite error.
    pub(crate) fn with_conn<T>(
        &self,
        operation: &'static str,
        keys: &[String],
        f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> StoreResult<T> {
        let mut conn = self.lock()?;
        f(&mut conn).map_err(|e| StoreError::backend(&self.collection, operation, keys, e))
    }

    pub(crate) fn delete(&self, keys: &[String]) -> StoreResult<()> {
        self.with_conn("mdelete", keys, |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(&format!("DELETE FROM {TABLE} WHERE key = ?1"))?;
                for key in keys {
                    stmt.execute(params![key])?;
                }
            }
            tx.commit()
        })?;
        debug!(collection = %self.collection, count = keys.len(), "mdelete");
        Ok(())
    }

    /// Keys matching `prefix`, collected when called.
    ///
    /// Uses `GLOB`, which is case-sensitive. A validated prefix never
    /// contains a glob metacharacter, so it needs no escaping.
    pub(crate) fn keys(&self, prefix: Option<&str>) -> StoreResult<Vec<String>> {
        let prefix = prefix.filter(|p| !p.is_empty());
        if let Some(p) = prefix {
            validate_key(p)?;
        }
        self.with_conn("yield_keys", &[], |conn| match prefix {
            Some(p) => {
                let mut stmt =
                    conn.prepare(&format!("SELECT key FROM {TABLE} WHERE key GLOB ?1 ORDER BY key"))?;
                let rows = stmt.query_map(params![format!("{p}*")], |row| row.get(0))?;
                rows.collect()
            }
            None => {
                let mut stmt = conn.prepare(&format!("SELECT key FROM {TABLE} ORDER BY key"))?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect()
            }
        })
    }

    pub(crate) fn count(&self) -> StoreResult<usize> {
        let n: i64 = self.with_conn("count", &[], |conn| {
            conn.query_row(&format!("SELECT COUNT(*) FROM {TABLE}"), [], |row| row.get(0))
        })?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    pub(crate) fn clear(&self) -> StoreResult<()> {
        self.with_conn("clear", &[], |conn| {
            conn.execute(&format!("DELETE FROM {TABLE}"), []).map(|_| ())
        })
    }
}

/// Convert a driver-independent parameter into a rusqlite value.
pub(crate) fn bind(param: &SqlParam) -> SqlValue {
    match param {
        SqlParam::Null => SqlValue::Null,
        SqlParam::Integer(i) => SqlValue::Integer(*i),
        SqlParam::Real(f) => SqlValue::Real(*f),
        SqlParam::Text(s) => SqlValue::Text(s.clone()),
    }
}
