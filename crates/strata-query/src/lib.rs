//! Declarative document queries.
//!
//! A query is a conjunction of field conditions, an optional multi-key
//! ordering and a page window. There is no expression language: a filter is a
//! list of tagged `(field, comparison)` variants which each backend compiles
//! into its native form.
//!
//! # Modules
//!
//! - [`filter`] -- [`Filter`], [`Condition`], [`Comparison`], [`Operator`]
//! - [`order`] -- [`OrderBy`] and [`Page`]
//! - [`sql`] -- compilation to parameterized SQL over a JSON column
//! - [`document_db`] -- translation to a document-database filter document
//! - [`eval`] -- in-memory evaluation with the same semantics as [`sql`]
//!
//! # Absence semantics
//!
//! A condition on a missing (or null) field never matches `eq`, `lt`, `lte`,
//! `gt`, `gte` or `in`, and always matches `ne`. Every compiler preserves
//! this asymmetry.

pub mod document_db;
pub mod error;
pub mod eval;
pub mod filter;
pub mod order;
pub mod sql;

pub use document_db::{DocumentDbQuery, DOCUMENT_FIELD};
pub use error::{QueryError, QueryResult};
pub use filter::{Comparison, Condition, Filter, Operator};
pub use order::{OrderBy, Page};
pub use sql::{SqlParam, SqlQuery};
