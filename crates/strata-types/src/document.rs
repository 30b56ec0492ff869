//! The document record shape.

use serde_json::{Map, Value};

use crate::error::TypeError;
use crate::key::FieldPath;

/// A JSON object. Key order is not semantically significant.
pub type Document = Map<String, Value>;

/// Convert an arbitrary JSON value into a [`Document`].
///
/// Fails with [`TypeError::NotAnObject`] for arrays, scalars and null.
pub fn into_document(value: Value) -> Result<Document, TypeError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(TypeError::NotAnObject {
            found: value_kind(&other),
        }),
    }
}

/// Resolve a field path inside a document.
///
/// Returns `None` when any segment is missing or when an intermediate value
/// is not an object.
pub fn lookup_path<'a>(document: &'a Document, path: &FieldPath) -> Option<&'a Value> {
    let mut segments = path.segments();
    let first = segments.next()?;
    let mut current = document.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Short name of a JSON value's kind, used in error messages.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        into_document(value).unwrap()
    }

    #[test]
    fn lookup_nested_field() {
        let d = doc(json!({"user": {"name": "Alice", "age": 30}}));
        let path = FieldPath::parse("user.name").unwrap();
        assert_eq!(lookup_path(&d, &path), Some(&json!("Alice")));
    }

    #[test]
    fn lookup_missing_field() {
        let d = doc(json!({"user": {"name": "Alice"}}));
        assert!(lookup_path(&d, &FieldPath::parse("user.email").unwrap()).is_none());
        assert!(lookup_path(&d, &FieldPath::parse("user.name.first").unwrap()).is_none());
        assert!(lookup_path(&d, &FieldPath::parse("account").unwrap()).is_none());
    }

    #[test]
    fn non_objects_are_rejected() {
        assert_eq!(
            into_document(json!([1, 2])),
            Err(TypeError::NotAnObject { found: "array" })
        );
        assert_eq!(
            into_document(Value::Null),
            Err(TypeError::NotAnObject { found: "null" })
        );
    }
}
