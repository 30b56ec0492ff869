//! Content-addressed memoization for expensive, deterministic model calls.
//!
//! A [`CachedEmbedder`] or [`CachedChatModel`] wraps a model and a
//! [`DocumentStore`](strata_store::DocumentStore) side cache. The cache key is
//! a [`MemoKeyer`] digest of the model identity and the canonical input, so
//! any process using the same model name shares entries.
//!
//! # Design Rules
//!
//! 1. Key derivation is a pure function of `(domain, identity, input)`.
//! 2. A batch issues one cache read, at most one model call and one write.
//! 3. Without a cache store every call goes to the model.
//! 4. Entries never expire. Change the model name to invalidate.

pub mod chat;
pub mod embed;
pub mod error;
pub mod key;

pub use chat::{CachedChatModel, ChatGeneration, ChatMessage, ChatModel, ChatResult};
pub use embed::{embedding_dimension, CachedEmbedder, Embedder};
pub use error::{MemoError, MemoResult};
pub use key::MemoKeyer;
