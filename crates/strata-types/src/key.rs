//! Key, collection-name and field-path validation.
//!
//! Valid keys:
//! - Must be non-empty
//! - Must only contain ASCII letters, digits, `_`, `.`, `-` and `/`
//!
//! The same allow-list applies to collection names and to document field
//! paths, because all three end up embedded in file paths, object-storage
//! prefixes or generated query text.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Returns `true` if `ch` is in the key allow-list `[A-Za-z0-9_.\-/]`.
pub fn is_allowed_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-' | '/')
}

fn first_disallowed(s: &str) -> Option<char> {
    s.chars().find(|ch| !is_allowed_char(*ch))
}

/// Validate a record key, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use strata_types::validate_key;
///
/// assert!(validate_key("user/42.json").is_ok());
/// assert!(validate_key("").is_err());
/// assert!(validate_key("has space").is_err());
/// ```
pub fn validate_key(key: &str) -> Result<(), TypeError> {
    if key.is_empty() {
        return Err(TypeError::InvalidKey {
            key: key.to_string(),
            reason: "key must not be empty".into(),
        });
    }
    if let Some(ch) = first_disallowed(key) {
        return Err(TypeError::InvalidKey {
            key: key.to_string(),
            reason: format!("contains disallowed character: {ch:?}"),
        });
    }
    Ok(())
}

/// Validate every key in a batch. Fails on the first invalid key.
pub fn validate_keys<S: AsRef<str>>(keys: &[S]) -> Result<(), TypeError> {
    keys.iter().try_for_each(|k| validate_key(k.as_ref()))
}

/// Validate a collection name. Same allow-list as keys.
pub fn validate_collection_name(name: &str) -> Result<(), TypeError> {
    validate_key(name).map_err(|e| match e {
        TypeError::InvalidKey { reason, .. } => TypeError::InvalidCollectionName {
            name: name.to_string(),
            reason,
        },
        other => other,
    })
}

/// A validated dot-separated path into a document, e.g. `user.name`.
///
/// Construction is the only place the allow-list is checked, so any
/// `FieldPath` in hand is safe to embed in generated query text.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath(String);

impl FieldPath {
    /// Parse and validate a field path.
    pub fn parse(path: &str) -> Result<Self, TypeError> {
        let invalid = |reason: String| TypeError::InvalidFieldPath {
            path: path.to_string(),
            reason,
        };
        if path.is_empty() {
            return Err(invalid("field path must not be empty".into()));
        }
        if let Some(ch) = first_disallowed(path) {
            return Err(invalid(format!("contains disallowed character: {ch:?}")));
        }
        if path.split('.').any(str::is_empty) {
            return Err(invalid("path segments must not be empty".into()));
        }
        Ok(Self(path.to_string()))
    }

    /// The path as written, e.g. `user.name`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the dot-separated segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// JSON-path form used by relational JSON functions: `user.name` -> `$.user.name`.
    pub fn json_path(&self) -> String {
        format!("$.{}", self.0)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for FieldPath {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.0
    }
}
