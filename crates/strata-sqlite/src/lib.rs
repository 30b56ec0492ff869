//! SQLite backend for strata.
//!
//! Each collection lives in its own database file with a two-column
//! `store` table. The bytes layout compresses values with zlib; the document
//! layout keeps one JSON text per row and answers queries through SQLite's
//! JSON functions.
//!
//! - [`SqliteBytesStore`] -- `store(key TEXT PRIMARY KEY, value BLOB)`
//! - [`SqliteDocumentStore`] -- `store(key TEXT PRIMARY KEY, document JSON)`
//!
//! Each batch write runs in a single transaction, so a failed `mset` leaves
//! no partial batch behind.

pub mod bytes;
pub mod document;
mod table;

pub use bytes::SqliteBytesStore;
pub use document::SqliteDocumentStore;
pub use table::TABLE;
