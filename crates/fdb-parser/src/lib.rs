//! filterdb Filter Parser
//!
//! This crate parses ABP/uBO network filters and plugs them into the
//! `fdb-core` rule collection.

pub mod parser;

use fdb_core::{CacheConfig, FilterCollection};

pub use parser::{parse_rule, AbpRuleParser, AnchorType, ParseError, UrlFilter};

/// A rule collection over ABP/uBO filter syntax.
pub type AbpFilterCollection = FilterCollection<AbpRuleParser>;

/// Create an empty ABP collection with the given cache configuration.
pub fn new_collection(config: CacheConfig) -> AbpFilterCollection {
    FilterCollection::new(AbpRuleParser, config)
}
