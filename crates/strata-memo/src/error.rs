use strata_store::{BoxError, StoreError};

/// Errors from memoized computations.
#[derive(Debug, thiserror::Error)]
pub enum MemoError {
    /// The cache store failed.
    #[error("cache error: {0}")]
    Store(#[from] StoreError),

    /// The wrapped model failed.
    #[error("model {model:?} failed: {source}")]
    Model {
        model: String,
        #[source]
        source: BoxError,
    },

    /// A cache entry exists but does not have the expected shape.
    #[error("corrupt cache entry {key}: {reason}")]
    CorruptEntry { key: String, reason: String },

    /// The model returned a different number of results than inputs.
    #[error("model {model:?} returned {found} results for {expected} inputs")]
    LengthMismatch {
        model: String,
        expected: usize,
        found: usize,
    },

    /// No embedding dimension is known for this model name.
    #[error("unknown embedding model: {0}")]
    UnknownModel(String),

    /// A computed result could not be serialized for the cache.
    #[error("cannot serialize result for cache entry {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The computation input could not be canonicalized.
    #[error("cannot canonicalize input: {0}")]
    Canonicalization(String),
}

/// Result alias for memoized computations.
pub type MemoResult<T> = Result<T, MemoError>;
