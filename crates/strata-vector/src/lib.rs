//! Embedding vector stores for strata.
//!
//! A [`VectorStore`] maps ids to embedding vectors. Three implementations
//! share the contract:
//!
//! - [`ObjectVectorStore`] -- [`VectorRecord`]s in any keyed store
//! - [`IndexVectorStore`] -- a managed vector-index service behind
//!   [`VectorIndexClient`]
//! - [`LayeredVectorStore`] -- a cache vector store in front of a base one
//!
//! [`VectorStoreProvider`]s open stores by collection name and dimension.
//! [`VectorStore::add_texts`] embeds and upserts in one step with any
//! [`Embedder`](strata_memo::Embedder), cached or not.

pub mod index;
pub mod layered;
pub mod memory;
pub mod object;
pub mod provider;
pub mod record;
pub mod store;

pub use index::{ClientResult, IndexSpec, IndexVectorStore, IndexedVector, Metric, VectorIndexClient, TEXT_FIELD};
pub use layered::LayeredVectorStore;
pub use memory::InMemoryVectorIndex;
pub use object::ObjectVectorStore;
pub use provider::{IndexVectorProvider, LayeredVectorProvider, ObjectVectorProvider, VectorStoreProvider};
pub use record::VectorRecord;
pub use store::{check_dimensions, TextEntry, VectorStore};
