//! Compilation to parameterized SQL over a JSON document column.
//!
//! Target: an embedded relational engine that stores one JSON document per
//! row and exposes `json_extract(column, path)`. Literal values and JSON
//! paths in filters are always bound as parameters. The only text built into
//! the statement is the table/column names chosen by the backend and the
//! order-by JSON paths, which come from already-validated [`FieldPath`]s.
//!
//! [`FieldPath`]: strata_types::FieldPath

use serde_json::Value;

use crate::filter::{Comparison, Condition, Filter};
use crate::order::{OrderBy, Page};

/// A bound SQL parameter, independent of any driver.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlParam {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlParam {
    /// Map a JSON literal to the value `json_extract` would produce for it.
    ///
    /// Booleans become `1`/`0`; arrays and objects become compact JSON text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Integer(i64::from(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Real(n.as_f64().unwrap_or(f64::MAX)),
            },
            Value::String(s) => Self::Text(s.clone()),
            composite => Self::Text(composite.to_string()),
        }
    }
}

fn clamp_u64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// A complete statement with its positional parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

/// Compile a filter into a `WHERE` predicate (without the keyword).
///
/// The empty filter compiles to `1=1`.
pub fn compile_where(filter: &Filter, column: &str) -> (String, Vec<SqlParam>) {
    if filter.is_empty() {
        return ("1=1".to_string(), Vec::new());
    }
    let mut params = Vec::new();
    let clauses: Vec<String> = filter
        .conditions()
        .iter()
        .map(|c| compile_condition(c, column, &mut params))
        .collect();
    (clauses.join(" AND "), params)
}

fn compile_condition(condition: &Condition, column: &str, params: &mut Vec<SqlParam>) -> String {
    let path = SqlParam::Text(condition.field.json_path());
    let extract = format!("json_extract({column}, ?)");
    let binary = |op: &str, value: &Value, params: &mut Vec<SqlParam>| {
        params.push(path.clone());
        params.push(SqlParam::from_json(value));
        format!("{extract} {op} ?")
    };
    match &condition.comparison {
        Comparison::Eq(v) => binary("=", v, params),
        Comparison::Lt(v) => binary("<", v, params),
        Comparison::Lte(v) => binary("<=", v, params),
        Comparison::Gt(v) => binary(">", v, params),
        Comparison::Gte(v) => binary(">=", v, params),
        Comparison::Ne(v) => {
            // Absent (NULL) paths count as not-equal.
            params.push(path.clone());
            params.push(path.clone());
            params.push(SqlParam::from_json(v));
            format!("({extract} IS NULL OR {extract} != ?)")
        }
        Comparison::In(values) => {
            params.push(path.clone());
            params.extend(values.iter().map(SqlParam::from_json));
            let placeholders = vec!["?"; values.len()].join(", ");
            format!("{extract} IN ({placeholders})")
        }
    }
}

/// Compile an ordering into an `ORDER BY` clause, or `""` when empty.
pub fn compile_order_by(order: &[OrderBy], column: &str) -> String {
    if order.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = order
        .iter()
        .map(|o| {
            let direction = if o.ascending { "ASC" } else { "DESC" };
            format!("json_extract({column}, '{}') {direction}", o.field.json_path())
        })
        .collect();
    format!(" ORDER BY {}", parts.join(", "))
}

/// Compile a page window. SQLite requires `LIMIT` before `OFFSET`, so an
/// offset without a limit uses `LIMIT -1`.
pub fn compile_page(page: Page) -> (String, Vec<SqlParam>) {
    match (page.limit, page.offset) {
        (0, 0) => (String::new(), Vec::new()),
        (limit, 0) => (" LIMIT ?".into(), vec![SqlParam::Integer(clamp_u64(limit))]),
        (0, offset) => (
            " LIMIT -1 OFFSET ?".into(),
            vec![SqlParam::Integer(clamp_u64(offset))],
        ),
        (limit, offset) => (
            " LIMIT ? OFFSET ?".into(),
            vec![
                SqlParam::Integer(clamp_u64(limit)),
                SqlParam::Integer(clamp_u64(offset)),
            ],
        ),
    }
}

/// `SELECT column FROM table WHERE ... ORDER BY ... LIMIT ... OFFSET ...`
pub fn select_documents(
    table: &str,
    column: &str,
    filter: &Filter,
    order: &[OrderBy],
    page: Page,
) -> SqlQuery {
    let (where_clause, mut params) = compile_where(filter, column);
    let order_clause = compile_order_by(order, column);
    let (page_clause, page_params) = compile_page(page);
    params.extend(page_params);
    SqlQuery {
        sql: format!("SELECT {column} FROM {table} WHERE {where_clause}{order_clause}{page_clause}"),
        params,
    }
}

/// `SELECT COUNT(*) FROM table WHERE ...` over the same filter compilation.
pub fn count_documents(table: &str, column: &str, filter: &Filter) -> SqlQuery {
    let (where_clause, params) = compile_where(filter, column);
    SqlQuery {
        sql: format!("SELECT COUNT(*) FROM {table} WHERE {where_clause}"),
        params,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filter(value: Value) -> Filter {
        Filter::from_json(&value).unwrap()
    }

    #[test]
    fn empty_filter_matches_all() {
        let q = select_documents("store", "document", &Filter::all(), &[], Page::all());
        assert_eq!(q.sql, "SELECT document FROM store WHERE 1=1");
        assert!(q.params.is_empty());
    }

    #[test]
    fn equality_binds_path_and_value() {
        let (sql, params) = compile_where(&filter(json!({"user.name": "Alice"})), "document");
        assert_eq!(sql, "json_extract(document, ?) = ?");
        assert_eq!(
            params,
            vec![SqlParam::Text("$.user.name".into()), SqlParam::Text("Alice".into())]
        );
    }

    #[test]
    fn ne_matches_absent_paths() {
        let (sql, params) = compile_where(&filter(json!({"status": {"$ne": "done"}})), "document");
        assert_eq!(
            sql,
            "(json_extract(document, ?) IS NULL OR json_extract(document, ?) != ?)"
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn in_expands_placeholders() {
        let (sql, params) = compile_where(&filter(json!({"tier": {"$in": [1, 2, 3]}})), "document");
        assert_eq!(sql, "json_extract(document, ?) IN (?, ?, ?)");
        assert_eq!(params.len(), 4);
        assert_eq!(params[3], SqlParam::Integer(3));
    }

    #[test]
    fn conditions_are_anded() {
        let (sql, _) = compile_where(
            &filter(json!({"a": 1, "b": {"$gt": 2}})),
            "document",
        );
        assert_eq!(sql, "json_extract(document, ?) = ? AND json_extract(document, ?) > ?");
    }

    #[test]
    fn order_and_page() {
        let order = OrderBy::from_pairs(&[("size", true), ("user.name", false)]).unwrap();
        let q = select_documents("store", "document", &Filter::all(), &order, Page::new(5, 10).unwrap());
        assert_eq!(
            q.sql,
            "SELECT document FROM store WHERE 1=1 ORDER BY json_extract(document, '$.size') ASC, \
             json_extract(document, '$.user.name') DESC LIMIT ? OFFSET ?"
        );
        assert_eq!(q.params, vec![SqlParam::Integer(5), SqlParam::Integer(10)]);
    }

    #[test]
    fn offset_without_limit() {
        let (sql, params) = compile_page(Page { limit: 0, offset: 4 });
        assert_eq!(sql, " LIMIT -1 OFFSET ?");
        assert_eq!(params, vec![SqlParam::Integer(4)]);
    }

    #[test]
    fn count_shares_filter_compilation() {
        let f = filter(json!({"size": {"$lte": 250}}));
        let q = count_documents("store", "document", &f);
        assert_eq!(q.sql, "SELECT COUNT(*) FROM store WHERE json_extract(document, ?) <= ?");
        assert_eq!(q.params, compile_where(&f, "document").1);
    }

    #[test]
    fn literal_mapping() {
        assert_eq!(SqlParam::from_json(&json!(true)), SqlParam::Integer(1));
        assert_eq!(SqlParam::from_json(&json!(1.5)), SqlParam::Real(1.5));
        assert_eq!(SqlParam::from_json(&json!(null)), SqlParam::Null);
        assert_eq!(SqlParam::from_json(&json!({"a": 1})), SqlParam::Text("{\"a\":1}".into()));
    }
}
