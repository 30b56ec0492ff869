//! In-memory evaluation of filters, ordering and pages.
//!
//! Used by backends without a native query engine. Values are compared the
//! way SQLite compares `json_extract` results so that the in-memory and
//! relational backends agree:
//!
//! - missing fields and JSON `null` are SQL `NULL`: never equal, never
//!   ordered, but always "not equal" for `ne` when the field is absent
//! - booleans compare as the integers `1`/`0`
//! - every number sorts before every string
//! - arrays and objects compare as their compact JSON text

use std::cmp::Ordering;

use serde_json::Value;
use strata_types::{lookup_path, Document};

use crate::filter::{Comparison, Filter};
use crate::order::{OrderBy, Page};

#[derive(Debug, PartialEq)]
enum Scalar {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Scalar {
    fn of(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self::Null,
            Some(Value::Bool(b)) => Self::Integer(i64::from(*b)),
            Some(Value::Number(n)) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Real(n.as_f64().unwrap_or(f64::MAX)),
            },
            Some(Value::String(s)) => Self::Text(s.clone()),
            Some(composite) => Self::Text(composite.to_string()),
        }
    }

    fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Integer(_) | Self::Real(_) => 1,
            Self::Text(_) => 2,
        }
    }

    /// Total order used for sorting: NULL < numbers < text.
    fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Integer(a), Self::Real(b)) => (*a as f64).total_cmp(b),
            (Self::Real(a), Self::Integer(b)) => a.total_cmp(&(*b as f64)),
            (Self::Real(a), Self::Real(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }

    /// Three-valued comparison: `None` when either side is NULL.
    fn sql_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.is_null() || other.is_null() {
            None
        } else {
            Some(self.sort_cmp(other))
        }
    }
}

fn comparison_matches(field: Option<&Value>, comparison: &Comparison) -> bool {
    let actual = Scalar::of(field);
    let against = |literal: &Value| actual.sql_cmp(&Scalar::of(Some(literal)));
    match comparison {
        Comparison::Eq(v) => against(v) == Some(Ordering::Equal),
        Comparison::Ne(v) => {
            actual.is_null() || matches!(against(v), Some(Ordering::Less | Ordering::Greater))
        }
        Comparison::Lt(v) => against(v) == Some(Ordering::Less),
        Comparison::Lte(v) => matches!(against(v), Some(Ordering::Less | Ordering::Equal)),
        Comparison::Gt(v) => against(v) == Some(Ordering::Greater),
        Comparison::Gte(v) => matches!(against(v), Some(Ordering::Greater | Ordering::Equal)),
        Comparison::In(values) => values.iter().any(|v| against(v) == Some(Ordering::Equal)),
    }
}

/// Returns `true` if `document` satisfies every condition of `filter`.
pub fn matches(filter: &Filter, document: &Document) -> bool {
    filter
        .conditions()
        .iter()
        .all(|c| comparison_matches(lookup_path(document, &c.field), &c.comparison))
}

/// Compare two documents under a multi-key ordering.
pub fn compare(order: &[OrderBy], a: &Document, b: &Document) -> Ordering {
    for key in order {
        let left = Scalar::of(lookup_path(a, &key.field));
        let right = Scalar::of(lookup_path(b, &key.field));
        let ord = left.sort_cmp(&right);
        let ord = if key.ascending { ord } else { ord.reverse() };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Filter, stably sort and page a set of documents.
pub fn run<'a, I>(documents: I, filter: &Filter, order: &[OrderBy], page: Page) -> Vec<Document>
where
    I: IntoIterator<Item = &'a Document>,
{
    let mut matched: Vec<&Document> = documents
        .into_iter()
        .filter(|d| matches(filter, d))
        .collect();
    if !order.is_empty() {
        matched.sort_by(|a, b| compare(order, a, b));
    }
    page.apply(matched.into_iter().cloned())
}

/// Count documents satisfying `filter`.
pub fn count<'a, I>(documents: I, filter: &Filter) -> usize
where
    I: IntoIterator<Item = &'a Document>,
{
    documents.into_iter().filter(|d| matches(filter, d)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use strata_types::into_document;

    fn doc(value: Value) -> Document {
        into_document(value).unwrap()
    }

    fn f(value: Value) -> Filter {
        Filter::from_json(&value).unwrap()
    }

    fn sizes() -> Vec<Document> {
        vec![
            doc(json!({"size": 100, "brand": "a"})),
            doc(json!({"size": 200, "brand": "a"})),
            doc(json!({"size": 300, "brand": "b"})),
        ]
    }

    #[test]
    fn lte_filter() {
        let docs = sizes();
        let result = run(&docs, &f(json!({"size": {"$lte": 250}})), &[], Page::all());
        assert_eq!(result.len(), 2);
        assert_eq!(count(&docs, &f(json!({"size": {"$lte": 250}}))), 2);
        assert_eq!(count(&docs, &f(json!({"size": {"$lte": 100}}))), 1);
    }

    #[test]
    fn eq_never_matches_absent() {
        let docs = vec![doc(json!({"a": 1})), doc(json!({"b": 1}))];
        assert_eq!(count(&docs, &f(json!({"a": 1}))), 1);
        assert_eq!(count(&docs, &f(json!({"a": null}))), 0);
    }

    #[test]
    fn ne_always_matches_absent() {
        let docs = vec![doc(json!({"a": 1})), doc(json!({"a": 2})), doc(json!({"b": 1}))];
        assert_eq!(count(&docs, &f(json!({"a": {"$ne": 1}}))), 2);
    }

    #[test]
    fn in_membership() {
        let docs = sizes();
        assert_eq!(count(&docs, &f(json!({"size": {"$in": [100, 300, 999]}}))), 2);
    }

    #[test]
    fn nested_paths() {
        let docs = vec![
            doc(json!({"user": {"name": "Alice"}})),
            doc(json!({"user": {"name": "Bob"}})),
        ];
        assert_eq!(count(&docs, &f(json!({"user.name": "Bob"}))), 1);
    }

    #[test]
    fn numbers_sort_before_text() {
        let docs = vec![
            doc(json!({"v": "10"})),
            doc(json!({"v": 9})),
            doc(json!({"w": 1})),
        ];
        let order = OrderBy::from_pairs(&[("v", true)]).unwrap();
        let sorted = run(&docs, &Filter::all(), &order, Page::all());
        assert!(sorted[0].get("v").is_none());
        assert_eq!(sorted[1]["v"], json!(9));
        assert_eq!(sorted[2]["v"], json!("10"));
        // Strings never satisfy a numeric range on the number side.
        assert_eq!(count(&docs, &f(json!({"v": {"$lt": 100}}))), 1);
    }

    #[test]
    fn bool_compares_as_integer() {
        let docs = vec![doc(json!({"flag": true})), doc(json!({"flag": false}))];
        assert_eq!(count(&docs, &f(json!({"flag": 1}))), 1);
        assert_eq!(count(&docs, &f(json!({"flag": true}))), 1);
    }

    #[test]
    fn multi_key_sort_and_page() {
        let docs = sizes();
        let order = OrderBy::from_pairs(&[("brand", false), ("size", true)]).unwrap();
        let result = run(&docs, &Filter::all(), &order, Page { limit: 2, offset: 1 });
        assert_eq!(result.len(), 2);
        assert_eq!(result[0]["size"], json!(100));
        assert_eq!(result[1]["size"], json!(200));
    }

    proptest! {
        #[test]
        fn ne_is_complement_of_eq_for_present_fields(values in proptest::collection::vec(0i64..5, 0..20), pivot in 0i64..5) {
            let docs: Vec<Document> = values.iter().map(|v| doc(json!({"n": v}))).collect();
            let eq = count(&docs, &f(json!({"n": pivot})));
            let ne = count(&docs, &f(json!({"n": {"$ne": pivot}})));
            prop_assert_eq!(eq + ne, docs.len());
        }
    }
}
