use std::fmt;

use strata_query::QueryError;
use strata_types::TypeError;

/// Boxed source error from a backend client.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A key, collection name or field path failed validation. Raised before
    /// any backend call.
    #[error("key validation failed: {0}")]
    KeyValidation(#[from] TypeError),

    /// A get-or-fail lookup found no value.
    #[error("key {key:?} not found in collection {collection:?}")]
    KeyNotFound { collection: String, key: String },

    /// Stored bytes could not be decoded as a JSON document, or a value could
    /// not be encoded.
    #[error("serialization error in {collection:?}{}: {reason}", fmt_key(.key))]
    Serialization {
        collection: String,
        key: Option<String>,
        reason: String,
    },

    /// A decoded document does not reconstruct into the declared schema.
    #[error("schema validation failed in {collection:?}{}: {reason}", fmt_key(.key))]
    SchemaValidation {
        collection: String,
        key: Option<String>,
        reason: String,
    },

    /// A malformed query: unsupported operator, empty `in`, negative page,
    /// invalid field path.
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// A malformed non-query argument, e.g. a sample larger than the collection.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Mismatched collections in a composition, or missing backend settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Any failure surfaced by the underlying backend client.
    #[error("{operation} failed on collection {collection:?} (keys: {keys:?}): {source}")]
    Backend {
        collection: String,
        operation: &'static str,
        keys: Vec<String>,
        #[source]
        source: BoxError,
    },

    /// The backend does not implement this capability.
    #[error("{operation} is not supported by collection {collection:?}")]
    NotSupported {
        collection: String,
        operation: &'static str,
    },

    /// A layered write reached one layer but not the other (or neither).
    #[error("dual write {operation} on {collection:?} failed: {failure}")]
    DualWrite {
        collection: String,
        operation: &'static str,
        failure: DualWriteFailure,
    },

    /// A long-running scan stopped because the caller asked it to.
    #[error("operation cancelled on collection {collection:?} after {completed} records")]
    Cancelled { collection: String, completed: usize },

    /// An in-process lock was poisoned by a panicking writer.
    #[error("lock poisoned in collection {0:?}")]
    LockPoisoned(String),

    /// I/O error outside a specific collection operation (e.g. provider setup).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn fmt_key(key: &Option<String>) -> String {
    key.as_ref().map(|k| format!(" at key {k:?}")).unwrap_or_default()
}

impl StoreError {
    /// Wrap a backend client failure with its operation context.
    pub fn backend<E>(collection: &str, operation: &'static str, keys: &[String], source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Backend {
            collection: collection.to_string(),
            operation,
            keys: keys.to_vec(),
            source: source.into(),
        }
    }

    pub fn not_supported(collection: &str, operation: &'static str) -> Self {
        Self::NotSupported {
            collection: collection.to_string(),
            operation,
        }
    }

    /// Returns `true` for errors raised by local validation, which are never
    /// worth retrying.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::KeyValidation(_) | Self::Query(_) | Self::InvalidArgument(_)
        )
    }
}

/// Which layer(s) of a layered write failed.
///
/// The cache layer is always written first. A base failure after a cache
/// success leaves the layers diverged until the caller retries.
#[derive(Debug)]
pub enum DualWriteFailure {
    /// Cache write failed; base write succeeded.
    CacheOnly(Box<StoreError>),
    /// Cache write succeeded; base write failed.
    BaseOnly(Box<StoreError>),
    /// Both writes failed.
    Both {
        cache: Box<StoreError>,
        base: Box<StoreError>,
    },
}

impl DualWriteFailure {
    /// Classify the outcomes of a cache write and a base write. `None` when
    /// both succeeded.
    pub fn from_outcomes(cache: StoreResult<()>, base: StoreResult<()>) -> Option<Self> {
        match (cache, base) {
            (Ok(()), Ok(())) => None,
            (Err(c), Ok(())) => Some(Self::CacheOnly(Box::new(c))),
            (Ok(()), Err(b)) => Some(Self::BaseOnly(Box::new(b))),
            (Err(c), Err(b)) => Some(Self::Both {
                cache: Box::new(c),
                base: Box::new(b),
            }),
        }
    }

    /// The base (authoritative) layer holds the write.
    pub fn base_succeeded(&self) -> bool {
        matches!(self, Self::CacheOnly(_))
    }

    /// The cache layer holds the write.
    pub fn cache_succeeded(&self) -> bool {
        matches!(self, Self::BaseOnly(_))
    }
}

impl fmt::Display for DualWriteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CacheOnly(e) => write!(f, "cache failed, base succeeded: {e}"),
            Self::BaseOnly(e) => write!(f, "cache succeeded, base failed: {e}"),
            Self::Both { cache, base } => write!(f, "both failed: cache: {cache}; base: {base}"),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
