use thiserror::Error;

/// Errors produced by type validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    /// A key contains characters outside `[A-Za-z0-9_.\-/]` or is empty.
    #[error("key {key:?} is invalid: {reason}")]
    InvalidKey { key: String, reason: String },

    /// A collection name is empty or contains disallowed characters.
    #[error("collection name {name:?} is invalid: {reason}")]
    InvalidCollectionName { name: String, reason: String },

    /// A document field path is empty or contains disallowed characters.
    #[error("field path {path:?} is invalid: {reason}")]
    InvalidFieldPath { path: String, reason: String },

    /// A JSON value was expected to be an object.
    #[error("expected a JSON object, found {found}")]
    NotAnObject { found: &'static str },
}
