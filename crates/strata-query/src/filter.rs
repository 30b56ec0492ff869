//! Filter AST and its JSON form.
//!
//! The JSON form maps a field path to either a literal (implicit equality)
//! or an operator clause:
//!
//! ```json
//! { "brand": "Acme", "size": { "$gte": 100, "$lt": 300 }, "tier": { "$in": [1, 2] } }
//! ```
//!
//! Every entry is ANDed. A clause object may carry several operators; each
//! becomes its own condition.

use std::fmt;

use serde_json::Value;
use strata_types::FieldPath;

use crate::error::{QueryError, QueryResult};

/// Human-readable list of the supported operators, used in error messages.
pub const ALLOWED_OPERATORS: &str = "{eq, ne, lt, lte, gt, gte, in}";

/// A comparison operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
}

impl Operator {
    /// Parse an operator name. The `$` prefix is optional: `$lte` and `lte`
    /// are the same operator.
    pub fn parse(name: &str) -> QueryResult<Self> {
        let bare = name.strip_prefix('$').unwrap_or(name);
        match bare {
            "eq" => Ok(Self::Eq),
            "ne" => Ok(Self::Ne),
            "lt" => Ok(Self::Lt),
            "lte" => Ok(Self::Lte),
            "gt" => Ok(Self::Gt),
            "gte" => Ok(Self::Gte),
            "in" => Ok(Self::In),
            _ => Err(QueryError::UnsupportedOperator {
                operator: name.to_string(),
                allowed: ALLOWED_OPERATORS,
            }),
        }
    }

    /// Bare operator name, e.g. `lte`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::In => "in",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.name())
    }
}

/// An operator together with its literal operand(s).
#[derive(Clone, Debug, PartialEq)]
pub enum Comparison {
    Eq(Value),
    Ne(Value),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    /// Membership in a non-empty, ordered list of literals.
    In(Vec<Value>),
}

impl Comparison {
    /// Build a comparison from an operator and its JSON operand.
    ///
    /// `in` requires a non-empty array.
    pub fn from_operator(op: Operator, operand: Value) -> QueryResult<Self> {
        Ok(match op {
            Operator::Eq => Self::Eq(operand),
            Operator::Ne => Self::Ne(operand),
            Operator::Lt => Self::Lt(operand),
            Operator::Lte => Self::Lte(operand),
            Operator::Gt => Self::Gt(operand),
            Operator::Gte => Self::Gte(operand),
            Operator::In => match operand {
                Value::Array(values) if !values.is_empty() => Self::In(values),
                Value::Array(_) => {
                    return Err(QueryError::InvalidArgument(
                        "$in requires a non-empty list".into(),
                    ))
                }
                other => {
                    return Err(QueryError::InvalidArgument(format!(
                        "$in requires a list, found {}",
                        strata_types::value_kind(&other)
                    )))
                }
            },
        })
    }

    pub fn operator(&self) -> Operator {
        match self {
            Self::Eq(_) => Operator::Eq,
            Self::Ne(_) => Operator::Ne,
            Self::Lt(_) => Operator::Lt,
            Self::Lte(_) => Operator::Lte,
            Self::Gt(_) => Operator::Gt,
            Self::Gte(_) => Operator::Gte,
            Self::In(_) => Operator::In,
        }
    }
}

/// A single `(field, comparison)` entry of a filter.
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub field: FieldPath,
    pub comparison: Comparison,
}

impl Condition {
    /// Validate `field` and pair it with `comparison`.
    pub fn new(field: &str, comparison: Comparison) -> QueryResult<Self> {
        if let Comparison::In(values) = &comparison {
            if values.is_empty() {
                return Err(QueryError::InvalidArgument(
                    "$in requires a non-empty list".into(),
                ));
            }
        }
        Ok(Self {
            field: FieldPath::parse(field)?,
            comparison,
        })
    }
}

/// A conjunction of conditions. The empty filter matches every document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// The filter that matches everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Add a condition (logical AND).
    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Shorthand for an equality condition.
    pub fn where_eq(self, field: &str, value: impl Into<Value>) -> QueryResult<Self> {
        Ok(self.and(Condition::new(field, Comparison::Eq(value.into()))?))
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Parse the JSON filter form.
    ///
    /// A non-empty object value is an operator clause; any other value,
    /// including `{}`, is an equality literal.
    pub fn from_json(query: &Value) -> QueryResult<Self> {
        let entries = match query {
            Value::Object(entries) => entries,
            Value::Null => return Ok(Self::all()),
            other => {
                return Err(QueryError::InvalidArgument(format!(
                    "a filter must be a JSON object, found {}",
                    strata_types::value_kind(other)
                )))
            }
        };

        let mut filter = Self::all();
        for (field, value) in entries {
            match value {
                Value::Object(clause) if !clause.is_empty() => {
                    for (op_name, operand) in clause {
                        let op = Operator::parse(op_name)?;
                        let comparison = Comparison::from_operator(op, operand.clone())?;
                        filter = filter.and(Condition::new(field, comparison)?);
                    }
                }
                literal => {
                    filter = filter.and(Condition::new(field, Comparison::Eq(literal.clone()))?);
                }
            }
        }
        Ok(filter)
    }
}
