//! filterdb Core Library
//!
//! This crate provides a domain-indexed store of content-filtering rules and
//! answers, for any domain, which blocking and exception rules apply to it or
//! to any of its parent domains.
//!
//! # Architecture
//!
//! Rules are kept as their original text, filed per partition (blocking or
//! exception) and per anchored domain. A query walks the domain's suffixes,
//! re-parses the stored text of every entry it finds and caches the result
//! until the next ingestion. Rule syntax is owned by a [`RuleParser`]
//! implementation supplied by the caller.
//!
//! # Modules
//!
//! - `domain`: Subdomain expansion
//! - `store`: Two-partition, domain-keyed rule storage
//! - `cache`: Generational lookup cache
//! - `collection`: Ingestion and lookup over store and cache
//! - `filter`: Parser seam and query result list
//! - `config`: Cache configuration
//! - `types`: Shared type definitions

pub mod cache;
pub mod collection;
pub mod config;
pub mod domain;
pub mod filter;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use collection::{CollectionError, FilterCollection, Lifecycle, LoadStats};
pub use config::CacheConfig;
pub use domain::{expand_subdomains, walk_subdomains};
pub use filter::{FilterList, RuleParser, StructuredFilter};
pub use store::RuleStore;
pub use types::{Partition, RuleEntry, GLOBAL_DOMAIN};
