//! Translation to a document-database filter document.
//!
//! Documents are stored in an envelope `{ "_id": key, "document": {...} }`,
//! so every field path is prefixed with [`DOCUMENT_FIELD`]. For non-null
//! literals the database's own `$ne` already matches documents missing the
//! field and its `$eq` never does, matching the relational backends.
//!
//! A `null` literal is different: the database treats `null` as equal to a
//! missing field, while a relational `NULL` never compares. Null literals are
//! therefore rewritten: `eq`/ordering against `null` matches nothing, `ne null`
//! matches only null or missing fields, and nulls are dropped from `in` lists.
//!
//! Comparisons between literals of different types still follow the
//! database's type bracketing rather than the relational cross-type order.

use serde_json::{json, Map, Value};

use crate::filter::{Comparison, Condition, Filter};
use crate::order::{OrderBy, Page};

/// Envelope field holding the stored document.
pub const DOCUMENT_FIELD: &str = "document";

/// A translated query ready for a document-database `find`.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentDbQuery {
    /// Filter document, e.g. `{"document.size": {"$lte": 250}}`.
    pub filter: Value,
    /// Sort keys: `(path, 1)` ascending, `(path, -1)` descending.
    pub sort: Vec<(String, i32)>,
    pub limit: u64,
    pub skip: u64,
}

impl DocumentDbQuery {
    pub fn new(filter: &Filter, order: &[OrderBy], page: Page) -> Self {
        Self {
            filter: translate_filter(filter),
            sort: translate_order(order),
            limit: page.limit,
            skip: page.offset,
        }
    }
}

fn envelope_path(condition: &Condition) -> String {
    format!("{DOCUMENT_FIELD}.{}", condition.field)
}

/// Clause that no stored value satisfies.
fn match_nothing() -> Value {
    json!({ "$in": [] })
}

fn translate_condition(condition: &Condition) -> Value {
    let clause = match &condition.comparison {
        Comparison::Ne(Value::Null) => json!({ "$eq": null }),
        Comparison::Eq(Value::Null)
        | Comparison::Lt(Value::Null)
        | Comparison::Lte(Value::Null)
        | Comparison::Gt(Value::Null)
        | Comparison::Gte(Value::Null) => match_nothing(),
        Comparison::In(values) => {
            let present: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();
            json!({ "$in": present })
        }
        Comparison::Eq(v) => json!({ "$eq": v }),
        Comparison::Ne(v) => json!({ "$ne": v }),
        Comparison::Lt(v) => json!({ "$lt": v }),
        Comparison::Lte(v) => json!({ "$lte": v }),
        Comparison::Gt(v) => json!({ "$gt": v }),
        Comparison::Gte(v) => json!({ "$gte": v }),
    };
    let mut entry = Map::new();
    entry.insert(envelope_path(condition), clause);
    Value::Object(entry)
}

/// Translate a filter. A single condition stays flat; several are wrapped in
/// `$and` so repeated operators on one field never collide.
pub fn translate_filter(filter: &Filter) -> Value {
    match filter.conditions() {
        [] => Value::Object(Map::new()),
        [single] => translate_condition(single),
        many => json!({ "$and": many.iter().map(translate_condition).collect::<Vec<_>>() }),
    }
}

pub fn translate_order(order: &[OrderBy]) -> Vec<(String, i32)> {
    order
        .iter()
        .map(|o| {
            (
                format!("{DOCUMENT_FIELD}.{}", o.field),
                if o.ascending { 1 } else { -1 },
            )
        })
        .collect()
}
