//! Store providers for strata.
//!
//! A [`StoreProvider`] is the entry point applications use: it binds a
//! database name to a [`Backend`] and hands out bytes, document and typed
//! stores by collection name. It remembers every typed collection it has
//! handed out so they can all be migration-scanned with
//! [`StoreProvider::validate_all`].
//!
//! # Backends
//!
//! | kind             | layout                                          |
//! |------------------|-------------------------------------------------|
//! | `memory`         | process-local maps, shared per collection       |
//! | `disk`           | `root/database/collection/<key>` files          |
//! | `sqlite`         | `root/database/collection.db`                   |
//! | `object_storage` | `bucket/collection/<key>` objects               |
//! | `document_db`    | `database.collection` documents (no bytes)      |
//! | `layered`        | a cache backend in front of a base backend      |
//!
//! Providers are built in code or from TOML through [`ProviderConfig`].

pub mod backend;
pub mod config;
pub mod provider;

pub use backend::{
    Backend, DiskBackend, DocumentDbBackend, LayeredBackend, MemoryBackend, ObjectStorageBackend,
    SqliteBackend,
};
pub use config::{BackendConfig, ConfigError, ProviderConfig, RemoteClients};
pub use provider::StoreProvider;
