//! Filter Collection
//!
//! Ingests raw filter-list text into a [`RuleStore`] and answers per-domain
//! queries for blocking and exception rules, walking every parent domain of
//! the query. Query results are re-parsed from the stored text on a cache miss
//! and memoized until the next ingestion.
//!
//! A collection starts [`Lifecycle::Open`]. Ingestion takes `&mut self`, so
//! there is exactly one writer at a time. Once [`FilterCollection::finalize_for_read`]
//! seals it, the collection can be shared and queried from many threads.

use std::io::BufRead;
use std::sync::Arc;

use crate::cache::LookupCache;
use crate::config::CacheConfig;
use crate::domain::walk_subdomains;
use crate::filter::{FilterList, RuleParser, StructuredFilter};
use crate::store::RuleStore;
use crate::types::{Partition, RuleEntry, GLOBAL_DOMAIN};

/// Error type for collection operations.
#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error("Collection is sealed for reading, ingestion is not permitted")]
    Sealed,
    #[error("Failed to read rule source: {0}")]
    Io(#[from] std::io::Error),
}

/// Write phase of a collection. Sealing is irreversible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Open,
    Sealed,
}

/// Outcome of one ingestion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadStats {
    /// Lines that parsed into a filter
    pub loaded: usize,
    /// Lines rejected by the parser
    pub failed: usize,
}

impl LoadStats {
    pub fn total(&self) -> usize {
        self.loaded + self.failed
    }
}

/// Domain-indexed rule collection with a lookup cache.
pub struct FilterCollection<P: RuleParser> {
    parser: P,
    store: RuleStore,
    lifecycle: Lifecycle,
    config: CacheConfig,
    cache: LookupCache<P::Filter>,
}

impl<P> FilterCollection<P>
where
    P: RuleParser,
    P::Filter: Send + Sync + 'static,
{
    /// Create an empty, open collection.
    pub fn new(parser: P, config: CacheConfig) -> Self {
        let cache = LookupCache::new(&config, 0);
        Self {
            parser,
            store: RuleStore::new(),
            lifecycle: Lifecycle::Open,
            config,
            cache,
        }
    }

    /// Create an empty collection with the default cache configuration.
    pub fn with_parser(parser: P) -> Self {
        Self::new(parser, CacheConfig::default())
    }

    pub fn parser(&self) -> &P {
        &self.parser
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    pub fn cache_config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_sealed(&self) -> bool {
        self.lifecycle == Lifecycle::Sealed
    }

    /// Generation of the current lookup cache; bumped by every ingestion.
    pub fn cache_generation(&self) -> u64 {
        self.cache.generation()
    }

    /// Seal the collection. Further ingestion fails with [`CollectionError::Sealed`].
    pub fn finalize_for_read(&mut self) {
        if self.lifecycle == Lifecycle::Open {
            log::info!(
                "filter collection sealed with {} entries ({} blocking domains, {} exception domains)",
                self.store.len(),
                self.store.domain_count(Partition::Blacklist),
                self.store.domain_count(Partition::Whitelist),
            );
        }
        self.lifecycle = Lifecycle::Sealed;
    }

    /// Every mutating operation passes through here before touching the store.
    fn ensure_open(&self) -> Result<(), CollectionError> {
        match self.lifecycle {
            Lifecycle::Open => Ok(()),
            Lifecycle::Sealed => Err(CollectionError::Sealed),
        }
    }

    // =========================================================================
    // Ingestion
    // =========================================================================

    /// Parse and store every line of an in-memory list.
    pub fn ingest<I>(&mut self, lines: I, category_id: i16) -> Result<LoadStats, CollectionError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.ensure_open()?;

        let mut stats = LoadStats::default();
        for (index, line) in lines.into_iter().enumerate() {
            let line = line.as_ref();
            let line = if index == 0 { strip_bom(line) } else { line };
            self.ingest_line(line, category_id, &mut stats);
        }

        self.finish_ingest(category_id, stats);
        Ok(stats)
    }

    /// Parse and store a newline-delimited source, one line at a time.
    ///
    /// A byte-order mark at the start of the source is skipped. Lines that
    /// are not valid UTF-8 count as failed. A read error aborts the call;
    /// lines already stored are kept.
    pub fn ingest_reader<R: BufRead>(
        &mut self,
        mut reader: R,
        category_id: i16,
    ) -> Result<LoadStats, CollectionError> {
        self.ensure_open()?;

        let mut stats = LoadStats::default();
        let mut buf = Vec::with_capacity(256);
        let mut first = true;
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => match std::str::from_utf8(&buf) {
                    Ok(line) => {
                        let line = if first { strip_bom(line) } else { line };
                        self.ingest_line(line, category_id, &mut stats);
                    }
                    Err(e) => {
                        stats.failed += 1;
                        log::debug!("rejected non-UTF-8 rule line in category {}: {}", category_id, e);
                    }
                },
                Err(e) => {
                    self.reset_cache();
                    log::warn!(
                        "rule source for category {} failed after {} lines: {}",
                        category_id,
                        stats.total(),
                        e
                    );
                    return Err(e.into());
                }
            }
            first = false;
        }

        self.finish_ingest(category_id, stats);
        Ok(stats)
    }

    fn ingest_line(&mut self, raw_line: &str, category_id: i16, stats: &mut LoadStats) {
        let line = raw_line.trim();
        let filter = match self.parser.parse(line, category_id) {
            Ok(filter) => filter,
            Err(e) => {
                stats.failed += 1;
                log::debug!("rejected rule {:?}: {}", line, e);
                return;
            }
        };
        stats.loaded += 1;

        let partition = Partition::from_exception(filter.is_exception());
        let source_text: Arc<str> = Arc::from(line);
        let domains = filter.applicable_domains();

        if domains.is_empty() {
            self.store
                .add(RuleEntry::new(GLOBAL_DOMAIN, category_id, partition, source_text));
            return;
        }

        for domain in domains {
            self.store.add(RuleEntry::new(
                domain.as_str(),
                category_id,
                partition,
                Arc::clone(&source_text),
            ));
        }
    }

    fn finish_ingest(&mut self, category_id: i16, stats: LoadStats) {
        self.reset_cache();
        log::info!(
            "loaded {} rules ({} failed) for category {}",
            stats.loaded,
            stats.failed,
            category_id
        );
    }

    /// Drop every cached lookup by replacing the cache with a new generation.
    fn reset_cache(&mut self) {
        let generation = self.cache.generation() + 1;
        self.cache = LookupCache::new(&self.config, generation);
        log::debug!("lookup cache reset to generation {}", generation);
    }
}

/// `str::trim` leaves U+FEFF in place, which would hide a leading `||`.
fn strip_bom(line: &str) -> &str {
    line.strip_prefix('\u{feff}').unwrap_or(line)
}

impl<P> Default for FilterCollection<P>
where
    P: RuleParser + Default,
    P::Filter: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::with_parser(P::default())
    }
}

impl<P> FilterCollection<P>
where
    P: RuleParser,
    P::Filter: Send + Sync + 'static,
{
    // =========================================================================
    // Lookup
    // =========================================================================

    /// Blocking rules applying to `domain` or any of its parent domains.
    pub fn query_blocking(&self, domain: &str) -> FilterList<P::Filter> {
        self.query(domain, Partition::Blacklist)
    }

    /// Exception rules applying to `domain` or any of its parent domains.
    pub fn query_whitelist(&self, domain: &str) -> FilterList<P::Filter> {
        self.query(domain, Partition::Whitelist)
    }

    /// Blocking rules with no domain anchor.
    pub fn query_global_blocking(&self) -> FilterList<P::Filter> {
        self.query(GLOBAL_DOMAIN, Partition::Blacklist)
    }

    /// Exception rules with no domain anchor.
    pub fn query_global_whitelist(&self) -> FilterList<P::Filter> {
        self.query(GLOBAL_DOMAIN, Partition::Whitelist)
    }

    /// Filters stored under `domain` and each of its parent domains, most
    /// specific first. Unanchored rules are only returned for [`GLOBAL_DOMAIN`].
    pub fn query(&self, domain: &str, partition: Partition) -> FilterList<P::Filter> {
        if let Some(hit) = self.cache.try_get(domain, partition) {
            return hit;
        }

        let filters = self.materialize(domain, partition);
        self.cache.set(domain, partition, filters.clone());
        filters
    }

    fn materialize(&self, domain: &str, partition: Partition) -> FilterList<P::Filter> {
        let mut filters = Vec::new();
        for suffix in walk_subdomains(domain) {
            for entry in self.store.get(suffix, partition) {
                match self.parser.parse(&entry.source_text, entry.category_id) {
                    Ok(filter) => filters.push(filter),
                    Err(e) => log::warn!(
                        "stored rule {:?} under {} no longer parses: {}",
                        entry.source_text,
                        entry.domain_key,
                        e
                    ),
                }
            }
        }

        log::trace!(
            "materialized {} {} filters for {}",
            filters.len(),
            partition,
            domain
        );
        filters.into()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::io::{self, BufReader, Cursor, Read};
    use std::time::Duration;

    use super::*;

    /// Minimal grammar: `[@@]body[$d1|d2...]`. Blank lines and `!` comments
    /// are rejected, as is any body equal to `bad`.
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestFilter {
        text: String,
        category_id: i16,
        is_exception: bool,
        domains: BTreeSet<String>,
    }

    impl StructuredFilter for TestFilter {
        fn is_exception(&self) -> bool {
            self.is_exception
        }

        fn applicable_domains(&self) -> &BTreeSet<String> {
            &self.domains
        }
    }

    struct TestParser;

    impl RuleParser for TestParser {
        type Filter = TestFilter;
        type Error = &'static str;

        fn parse(&self, raw_line: &str, category_id: i16) -> Result<TestFilter, &'static str> {
            if raw_line.is_empty() || raw_line.starts_with('!') {
                return Err("not a rule");
            }
            let (is_exception, rest) = match raw_line.strip_prefix("@@") {
                Some(rest) => (true, rest),
                None => (false, raw_line),
            };
            let (body, domains) = match rest.split_once('$') {
                Some((body, domains)) => (body, domains.split('|').map(str::to_string).collect()),
                None => (rest, BTreeSet::new()),
            };
            if body == "bad" {
                return Err("bad rule");
            }
            Ok(TestFilter {
                text: raw_line.to_string(),
                category_id,
                is_exception,
                domains,
            })
        }
    }

    fn collection() -> FilterCollection<TestParser> {
        FilterCollection::with_parser(TestParser)
    }

    fn texts(list: &FilterList<TestFilter>) -> Vec<&str> {
        list.iter().map(|f| f.text.as_str()).collect()
    }

    #[test]
    fn unknown_domain_yields_empty() {
        let c = collection();
        assert!(c.query_blocking("nothing.test").is_empty());
        assert!(c.query_whitelist("nothing.test").is_empty());
        assert!(c.query_global_blocking().is_empty());
    }

    #[test]
    fn counts_loaded_and_failed() {
        let mut c = collection();
        let stats = c
            .ingest(["ads$a.com", "bad", "", "! comment", "@@ok$a.com"], 1)
            .unwrap();
        assert_eq!(stats, LoadStats { loaded: 2, failed: 3 });
        assert_eq!(stats.total(), 5);
    }

    #[test]
    fn stores_trimmed_text_with_category() {
        let mut c = collection();
        c.ingest(["   ads$example.com \t"], 7).unwrap();

        let bucket = c.store().get("example.com", Partition::Blacklist);
        let entry = bucket.iter().next().unwrap();
        assert_eq!(&*entry.source_text, "ads$example.com");
        assert_eq!(entry.category_id, 7);

        let found = c.query_blocking("example.com");
        assert_eq!(texts(&found), vec!["ads$example.com"]);
        assert_eq!(found[0].category_id, 7);
    }

    #[test]
    fn files_one_entry_per_domain() {
        let mut c = collection();
        c.ingest(["ads$a.com|b.com"], 1).unwrap();
        assert_eq!(c.store().len(), 2);
        assert_eq!(texts(&c.query_blocking("a.com")), vec!["ads$a.com|b.com"]);
        assert_eq!(texts(&c.query_blocking("b.com")), vec!["ads$a.com|b.com"]);
        assert!(c.query_global_blocking().is_empty());
    }

    #[test]
    fn parent_domains_apply_to_subdomains() {
        let mut c = collection();
        c.ingest(["ads$example.com"], 1).unwrap();

        for domain in ["example.com", "a.example.com", "b.a.example.com"] {
            assert_eq!(c.query_blocking(domain).len(), 1, "{domain}");
        }
        assert!(c.query_blocking("other.com").is_empty());
        assert!(c.query_blocking("com").is_empty());
    }

    #[test]
    fn results_are_ordered_most_specific_first() {
        let mut c = collection();
        c.ingest(["top$example.com", "mid$a.example.com", "leaf$b.a.example.com"], 1)
            .unwrap();
        assert_eq!(
            texts(&c.query_blocking("b.a.example.com")),
            vec!["leaf$b.a.example.com", "mid$a.example.com", "top$example.com"]
        );
    }

    #[test]
    fn global_rules_only_for_global_query() {
        let mut c = collection();
        c.ingest(["/banner/"], 1).unwrap();
        assert!(c.query_blocking("example.com").is_empty());
        assert_eq!(texts(&c.query_global_blocking()), vec!["/banner/"]);
        assert_eq!(texts(&c.query_blocking(GLOBAL_DOMAIN)), vec!["/banner/"]);
    }

    #[test]
    fn exceptions_only_in_whitelist() {
        let mut c = collection();
        c.ingest(["@@ok$example.com"], 1).unwrap();
        assert!(c.query_blocking("example.com").is_empty());
        assert_eq!(texts(&c.query_whitelist("example.com")), vec!["@@ok$example.com"]);
    }

    #[test]
    fn duplicate_rules_are_absorbed() {
        let mut c = collection();
        c.ingest(["ads$a.com", "ads$a.com"], 1).unwrap();
        c.ingest(["ads$a.com"], 1).unwrap();
        assert_eq!(c.query_blocking("a.com").len(), 1);

        c.ingest(["ads$a.com"], 2).unwrap();
        assert_eq!(c.query_blocking("a.com").len(), 2);
    }

    #[test]
    fn repeated_queries_hit_the_cache() {
        let mut c = collection();
        c.ingest(["ads$a.com", "more$a.com"], 1).unwrap();

        let first = c.query_blocking("x.a.com");
        let second = c.query_blocking("x.a.com");
        assert_eq!(first, second);
        assert!(FilterList::ptr_eq(&first, &second));
    }

    #[test]
    fn ingestion_discards_cached_results() {
        let mut c = collection();
        assert!(c.query_blocking("a.com").is_empty());
        let generation = c.cache_generation();

        c.ingest(["ads$a.com"], 1).unwrap();
        assert!(c.cache_generation() > generation);
        assert_eq!(c.query_blocking("a.com").len(), 1);
    }

    #[test]
    fn empty_ingestion_still_resets_cache() {
        let mut c = collection();
        let before = c.query_blocking("a.com");
        let generation = c.cache_generation();

        let stats = c.ingest(Vec::<String>::new(), 1).unwrap();
        assert_eq!(stats, LoadStats::default());
        assert_eq!(c.cache_generation(), generation + 1);
        assert!(!FilterList::ptr_eq(&before, &c.query_blocking("a.com")));
    }

    #[test]
    fn sealed_collection_rejects_ingestion() {
        let mut c = collection();
        c.ingest(["ads$a.com"], 1).unwrap();
        let before = c.query_blocking("a.com");
        let generation = c.cache_generation();

        c.finalize_for_read();
        c.finalize_for_read();
        assert!(c.is_sealed());
        assert_eq!(c.lifecycle(), Lifecycle::Sealed);

        assert!(matches!(c.ingest(["more$a.com"], 1), Err(CollectionError::Sealed)));
        assert!(matches!(
            c.ingest_reader(Cursor::new("more$a.com\n"), 1),
            Err(CollectionError::Sealed)
        ));

        assert_eq!(c.cache_generation(), generation);
        assert_eq!(c.store().len(), 1);
        assert_eq!(c.query_blocking("a.com"), before);
    }

    #[test]
    fn reader_ingests_line_by_line() {
        let mut c = collection();
        let source = "ads$a.com\r\n\n@@ok$a.com\nbad\ntrailing$b.com";
        let stats = c.ingest_reader(Cursor::new(source), 3).unwrap();
        assert_eq!(stats, LoadStats { loaded: 3, failed: 2 });
        assert_eq!(texts(&c.query_blocking("a.com")), vec!["ads$a.com"]);
        assert_eq!(texts(&c.query_whitelist("a.com")), vec!["@@ok$a.com"]);
        assert_eq!(texts(&c.query_blocking("b.com")), vec!["trailing$b.com"]);
    }

    #[test]
    fn reader_counts_invalid_utf8_as_failed() {
        let mut c = collection();
        let source: &[u8] = b"ads$a.com\n\xff\xfe$b.com\nok$c.com\n";
        let stats = c.ingest_reader(source, 1).unwrap();
        assert_eq!(stats, LoadStats { loaded: 2, failed: 1 });
    }

    #[test]
    fn leading_byte_order_mark_is_skipped() {
        let mut c = collection();
        let stats = c
            .ingest_reader(Cursor::new("\u{feff}ads$example.com\nmore$other.com\n"), 1)
            .unwrap();
        assert_eq!(stats, LoadStats { loaded: 2, failed: 0 });
        assert_eq!(texts(&c.query_blocking("example.com")), vec!["ads$example.com"]);
        assert!(c.query_global_blocking().is_empty());

        c.ingest(["\u{feff}list$a.com"], 2).unwrap();
        assert_eq!(texts(&c.query_blocking("a.com")), vec!["list$a.com"]);
    }

    #[test]
    fn byte_order_mark_only_stripped_from_first_line() {
        let mut c = collection();
        c.ingest_reader(Cursor::new("ads$a.com\n\u{feff}x\n"), 1).unwrap();
        assert_eq!(texts(&c.query_global_blocking()), vec!["\u{feff}x"]);
    }

    struct BrokenSource {
        served: bool,
    }

    impl Read for BrokenSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.served {
                return Err(io::Error::new(io::ErrorKind::Other, "connection reset"));
            }
            self.served = true;
            let data = b"ads$a.com\n";
            buf[..data.len()].copy_from_slice(data);
            Ok(data.len())
        }
    }

    #[test]
    fn reader_error_keeps_stored_lines_and_resets_cache() {
        let mut c = collection();
        assert!(c.query_blocking("a.com").is_empty());
        let generation = c.cache_generation();

        let result = c.ingest_reader(BufReader::new(BrokenSource { served: false }), 1);
        assert!(matches!(result, Err(CollectionError::Io(_))));
        assert!(c.cache_generation() > generation);
        assert_eq!(c.query_blocking("a.com").len(), 1);
    }

    #[test]
    fn sealed_collection_serves_concurrent_readers() {
        let mut c = FilterCollection::new(
            TestParser,
            CacheConfig::default().with_expiration_scan_interval(Duration::ZERO),
        );
        c.ingest(["ads$example.com", "@@ok$a.example.com"], 1).unwrap();
        c.finalize_for_read();

        let c = Arc::new(c);
        std::thread::scope(|s| {
            for _ in 0..8 {
                let c = Arc::clone(&c);
                s.spawn(move || {
                    assert_eq!(c.query_blocking("b.a.example.com").len(), 1);
                    assert_eq!(c.query_whitelist("b.a.example.com").len(), 1);
                });
            }
        });
    }

    #[test]
    fn sealed_cache_entries_expire() {
        let mut c = FilterCollection::new(
            TestParser,
            CacheConfig::default().with_expiration_scan_interval(Duration::from_millis(200)),
        );
        c.ingest(["ads$a.com"], 1).unwrap();
        c.finalize_for_read();

        let first = c.query_blocking("x.a.com");
        std::thread::sleep(Duration::from_millis(400));
        let second = c.query_blocking("x.a.com");
        assert_eq!(first, second);
        assert!(!FilterList::ptr_eq(&first, &second));
    }

    #[test]
    fn sealed_error_names_the_state() {
        assert!(CollectionError::Sealed.to_string().contains("sealed"));
    }
}
