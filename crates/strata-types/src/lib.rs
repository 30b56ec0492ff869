//! Foundation types for strata.
//!
//! Every other strata crate depends on `strata-types`. It defines what a key
//! is, what a document is, and the character allow-list that keeps keys and
//! field paths safe to embed in file paths and query text.
//!
//! # Key Types
//!
//! - [`Document`] -- a JSON object, the record shape of document stores
//! - [`FieldPath`] -- a validated dot-separated path into a document
//! - [`validate_key`] -- the allow-list check run before any backend call

pub mod document;
pub mod error;
pub mod key;

pub use document::{into_document, lookup_path, value_kind, Document};
pub use error::TypeError;
pub use key::{
    is_allowed_char, validate_collection_name, validate_key, validate_keys, FieldPath,
};
