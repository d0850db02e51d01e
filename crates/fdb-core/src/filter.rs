//! Parser seam and query results
//!
//! The store keeps only raw rule text. Turning a line into a structured
//! filter is delegated to a [`RuleParser`], which is consulted on ingestion
//! and again whenever a lookup has to be rebuilt.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// A parsed network filter, as far as the store needs to see it.
pub trait StructuredFilter {
    /// Whether this is an exception (`@@`) rule.
    fn is_exception(&self) -> bool;

    /// Domains the rule is anchored to. Empty means globally applicable.
    fn applicable_domains(&self) -> &BTreeSet<String>;
}

/// Turns one trimmed line of filter-list text into a structured filter.
///
/// Parsing must be deterministic: stored text is re-parsed on every cache
/// rebuild and is expected to produce the same filter each time.
pub trait RuleParser {
    type Filter: StructuredFilter;
    type Error: fmt::Display;

    fn parse(&self, raw_line: &str, category_id: i16) -> Result<Self::Filter, Self::Error>;
}

/// Materialized result of one domain query.
///
/// Cloning shares the underlying list, so a cached result can be handed out
/// and iterated any number of times.
#[derive(Debug, PartialEq, Eq)]
pub struct FilterList<F> {
    filters: Arc<[F]>,
}

impl<F> FilterList<F> {
    pub fn iter(&self) -> std::slice::Iter<'_, F> {
        self.filters.iter()
    }

    /// Whether two lists share the same allocation (i.e. one cached result).
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.filters, &b.filters)
    }
}

impl<F> Clone for FilterList<F> {
    fn clone(&self) -> Self {
        Self {
            filters: Arc::clone(&self.filters),
        }
    }
}

impl<F> Default for FilterList<F> {
    fn default() -> Self {
        Self::from(Vec::new())
    }
}

impl<F> From<Vec<F>> for FilterList<F> {
    fn from(filters: Vec<F>) -> Self {
        Self {
            filters: filters.into(),
        }
    }
}

impl<F> FromIterator<F> for FilterList<F> {
    fn from_iter<I: IntoIterator<Item = F>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl<F> Deref for FilterList<F> {
    type Target = [F];

    fn deref(&self) -> &[F] {
        &self.filters
    }
}

impl<'a, F> IntoIterator for &'a FilterList<F> {
    type Item = &'a F;
    type IntoIter = std::slice::Iter<'a, F>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
