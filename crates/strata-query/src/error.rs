use strata_types::TypeError;
use thiserror::Error;

/// Errors from building or compiling a query. All are raised before I/O.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryError {
    /// A filter or order-by field path failed the allow-list check.
    #[error("invalid field path: {0}")]
    InvalidFieldPath(#[from] TypeError),

    /// An operator clause named an operator outside the supported set.
    #[error("unsupported operator {operator:?}; use one of {allowed}")]
    UnsupportedOperator {
        operator: String,
        allowed: &'static str,
    },

    /// A structurally malformed query (empty `in` list, negative limit, ...).
    #[error("invalid query argument: {0}")]
    InvalidArgument(String),
}

/// Result alias for query operations.
pub type QueryResult<T> = Result<T, QueryError>;
