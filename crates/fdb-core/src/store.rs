//! Domain-keyed rule storage
//!
//! Rules are filed per partition, then per domain key. Each bucket is a set,
//! so re-adding an identical entry is a no-op.

use std::collections::{BTreeSet, HashMap};

use crate::types::{Partition, RuleEntry};

/// Shared result for lookups that hit no bucket.
static EMPTY_BUCKET: BTreeSet<RuleEntry> = BTreeSet::new();

/// Two-partition, domain-keyed set of rule entries.
#[derive(Debug, Default)]
pub struct RuleStore {
    partitions: [HashMap<String, BTreeSet<RuleEntry>>; 2],
    len: usize,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// File an entry under its own domain key and partition.
    ///
    /// Returns `true` if the entry was not already present.
    pub fn add(&mut self, entry: RuleEntry) -> bool {
        let inserted = self.partitions[entry.partition.index()]
            .entry(entry.domain_key.clone())
            .or_default()
            .insert(entry);
        if inserted {
            self.len += 1;
        }
        inserted
    }

    /// Entries filed under exactly `domain_key`. Never allocates on a miss.
    #[inline]
    pub fn get(&self, domain_key: &str, partition: Partition) -> &BTreeSet<RuleEntry> {
        self.partitions[partition.index()]
            .get(domain_key)
            .unwrap_or(&EMPTY_BUCKET)
    }

    /// Total number of distinct entries across both partitions.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of domain keys holding at least one entry in `partition`.
    pub fn domain_count(&self, partition: Partition) -> usize {
        self.partitions[partition.index()].len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::types::GLOBAL_DOMAIN;

    fn entry(domain: &str, category: i16, partition: Partition, text: &str) -> RuleEntry {
        RuleEntry::new(domain, category, partition, Arc::from(text))
    }

    #[test]
    fn add_then_get() {
        let mut store = RuleStore::new();
        assert!(store.add(entry("example.com", 1, Partition::Blacklist, "||example.com^")));

        let bucket = store.get("example.com", Partition::Blacklist);
        assert_eq!(bucket.len(), 1);
        assert_eq!(&*bucket.iter().next().unwrap().source_text, "||example.com^");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn duplicates_are_absorbed() {
        let mut store = RuleStore::new();
        assert!(store.add(entry("example.com", 1, Partition::Blacklist, "||example.com^")));
        assert!(!store.add(entry("example.com", 1, Partition::Blacklist, "||example.com^")));
        assert_eq!(store.get("example.com", Partition::Blacklist).len(), 1);
        assert_eq!(store.len(), 1);

        // A different category is a different entry.
        assert!(store.add(entry("example.com", 2, Partition::Blacklist, "||example.com^")));
        assert_eq!(store.get("example.com", Partition::Blacklist).len(), 2);
    }

    #[test]
    fn partitions_are_isolated() {
        let mut store = RuleStore::new();
        store.add(entry("example.com", 1, Partition::Whitelist, "@@||example.com^"));

        assert!(store.get("example.com", Partition::Blacklist).is_empty());
        assert_eq!(store.get("example.com", Partition::Whitelist).len(), 1);
        assert_eq!(store.domain_count(Partition::Whitelist), 1);
        assert_eq!(store.domain_count(Partition::Blacklist), 0);
    }

    #[test]
    fn missing_bucket_is_shared_empty_set() {
        let store = RuleStore::new();
        let a = store.get("nowhere.test", Partition::Blacklist);
        let b = store.get(GLOBAL_DOMAIN, Partition::Whitelist);
        assert!(a.is_empty());
        assert!(std::ptr::eq(a, b));
        assert!(store.is_empty());
    }

    #[test]
    fn entries_stay_in_their_bucket() {
        let mut store = RuleStore::new();
        store.add(entry("a.com", 1, Partition::Blacklist, "||a.com^"));
        store.add(entry("b.com", 1, Partition::Blacklist, "||b.com^"));
        store.add(entry(GLOBAL_DOMAIN, 1, Partition::Blacklist, "/ads/"));

        for key in ["a.com", "b.com", GLOBAL_DOMAIN] {
            for e in store.get(key, Partition::Blacklist) {
                assert_eq!(e.domain_key, key);
                assert_eq!(e.partition, Partition::Blacklist);
            }
        }
        assert_eq!(store.domain_count(Partition::Blacklist), 3);
    }
}
