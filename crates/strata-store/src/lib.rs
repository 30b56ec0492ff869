//! Keyed storage for strata.
//!
//! A store holds values of one kind for one named collection and exposes a
//! small batch-first contract ([`Store`]). Richer stores are built by
//! wrapping simpler ones rather than by implementing each backend twice:
//!
//! - [`JsonDocumentStore`] -- documents as UTF-8 JSON over any [`BytesStore`]
//! - [`TypedStore`] -- `serde` records over any [`DocumentStore`], with a
//!   batched [`MigrationScan`]
//! - [`LayeredStore`] -- a fast cache store in front of an authoritative base
//!
//! # Backends in this crate
//!
//! - [`InMemoryStore`] -- `BTreeMap` behind a `RwLock`; bytes or documents
//! - [`DiskBytesStore`] -- one file per key under the collection directory
//!
//! Relational, object-storage and document-database backends live in their
//! own crates and implement the same traits.
//!
//! # Design Rules
//!
//! 1. Keys are validated before any backend call.
//! 2. `mget` returns one slot per input key, in input order.
//! 3. Deleting an absent key is not an error.
//! 4. A layered miss is never backfilled into the cache.
//! 5. All backend errors are propagated with collection, operation and keys.

pub mod cancel;
pub mod disk;
pub mod error;
pub mod json;
pub mod layered;
pub mod memory;
pub mod traits;
pub mod typed;

pub use cancel::CancelFlag;
pub use disk::DiskBytesStore;
pub use error::{BoxError, DualWriteFailure, StoreError, StoreResult};
pub use json::JsonDocumentStore;
pub use layered::LayeredStore;
pub use memory::InMemoryStore;
pub use traits::{
    check_sample_size, sample_keys, BytesStore, DocumentStore, KeyStream, Queryable, Store,
};
pub use typed::{MigrationScan, ScanConfig, TypedStore};
