//! Ordering and pagination.

use strata_types::FieldPath;

use crate::error::{QueryError, QueryResult};

/// One key of a multi-key sort.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub field: FieldPath,
    pub ascending: bool,
}

impl OrderBy {
    pub fn asc(field: &str) -> QueryResult<Self> {
        Ok(Self {
            field: FieldPath::parse(field)?,
            ascending: true,
        })
    }

    pub fn desc(field: &str) -> QueryResult<Self> {
        Ok(Self {
            field: FieldPath::parse(field)?,
            ascending: false,
        })
    }

    /// Build an ordering from `(field, ascending)` pairs, validating each field.
    pub fn from_pairs(pairs: &[(&str, bool)]) -> QueryResult<Vec<Self>> {
        pairs
            .iter()
            .map(|(field, ascending)| {
                Ok(Self {
                    field: FieldPath::parse(field)?,
                    ascending: *ascending,
                })
            })
            .collect()
    }
}

/// A `limit`/`offset` window. Zero means "no limit" and "no skip".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Page {
    pub limit: u64,
    pub offset: u64,
}

impl Page {
    /// Build a page from caller-supplied signed values.
    ///
    /// Negative values fail with [`QueryError::InvalidArgument`].
    pub fn new(limit: i64, offset: i64) -> QueryResult<Self> {
        if limit < 0 {
            return Err(QueryError::InvalidArgument(format!(
                "limit must not be negative, got {limit}"
            )));
        }
        if offset < 0 {
            return Err(QueryError::InvalidArgument(format!(
                "offset must not be negative, got {offset}"
            )));
        }
        Ok(Self {
            limit: limit as u64,
            offset: offset as u64,
        })
    }

    /// No limit, no skip.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn limit(limit: u64) -> Self {
        Self { limit, offset: 0 }
    }

    pub fn is_unbounded(&self) -> bool {
        self.limit == 0 && self.offset == 0
    }

    /// Apply the window to an already-ordered iterator.
    pub fn apply<I: Iterator>(&self, items: I) -> Vec<I::Item> {
        let skipped = items.skip(self.offset as usize);
        if self.limit == 0 {
            skipped.collect()
        } else {
            skipped.take(self.limit as usize).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_values_rejected() {
        assert!(matches!(Page::new(-1, 0), Err(QueryError::InvalidArgument(_))));
        assert!(matches!(Page::new(0, -5), Err(QueryError::InvalidArgument(_))));
        assert_eq!(Page::new(10, 2).unwrap(), Page { limit: 10, offset: 2 });
    }

    #[test]
    fn zero_means_unbounded() {
        let page = Page::new(0, 0).unwrap();
        assert!(page.is_unbounded());
        assert_eq!(page.apply(1..=5), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn apply_window() {
        assert_eq!(Page { limit: 2, offset: 1 }.apply(1..=5), vec![2, 3]);
        assert_eq!(Page { limit: 0, offset: 3 }.apply(1..=5), vec![4, 5]);
        assert_eq!(Page { limit: 10, offset: 10 }.apply(1..=5), Vec::<i32>::new());
    }

    #[test]
    fn order_pairs_validated() {
        let order = OrderBy::from_pairs(&[("size", true), ("user.name", false)]).unwrap();
        assert_eq!(order.len(), 2);
        assert!(!order[1].ascending);
        assert!(OrderBy::from_pairs(&[("size desc", true)]).is_err());
    }
}
