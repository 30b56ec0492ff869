//! Remote backends for strata.
//!
//! The service SDKs are kept behind two narrow client traits so the stores
//! can be built, tested and reasoned about without a network:
//!
//! - [`ObjectStorageClient`] -- get/put/delete by path and paginated prefix
//!   listing; wrapped by [`ObjectStorageBytesStore`]
//! - [`DocumentDatabaseClient`] -- bulk replace, `$in` fetch, id scans,
//!   `$sample` and counting; wrapped by [`DocumentDbStore`]
//!
//! In-process implementations of both live in [`memory`].
//!
//! A document store over object storage is built the usual way, by wrapping
//! the bytes store in a `JsonDocumentStore`. The document database has no
//! bytes layout.

pub mod document_db;
pub mod memory;
pub mod object_storage;

pub use document_db::{regex_prefix, DocumentDatabaseClient, DocumentDbStore, IdCursor, Namespace, ID_FIELD};
pub use memory::{InMemoryDocumentDatabase, InMemoryObjectStorage};
pub use object_storage::{
    normalize_bucket_name, ClientResult, ListPage, ObjectStorageBytesStore, ObjectStorageClient,
};
