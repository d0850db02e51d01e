//! Lookup result cache
//!
//! Memoizes materialized query results per (domain, partition). A cache is
//! never invalidated entry by entry: ingestion replaces the whole generation.

use std::fmt;
use std::time::{Duration, Instant};

use moka::sync::Cache;
use parking_lot::Mutex;

use crate::config::CacheConfig;
use crate::filter::FilterList;
use crate::types::Partition;

type CacheKey = (String, Partition);

/// One generation of cached lookups.
pub struct LookupCache<F> {
    generation: u64,
    entries: Cache<CacheKey, FilterList<F>>,
    scan_interval: Duration,
    last_scan: Mutex<Instant>,
}

impl<F> LookupCache<F>
where
    F: Send + Sync + 'static,
{
    /// Build an empty cache for `generation` from `config`.
    pub fn new(config: &CacheConfig, generation: u64) -> Self {
        let mut builder =
            Cache::<CacheKey, FilterList<F>>::builder().time_to_live(config.entry_lifetime());
        if let Some(capacity) = config.max_capacity {
            builder = builder.max_capacity(capacity);
        }

        Self {
            generation,
            entries: builder.build(),
            scan_interval: config.expiration_scan_interval,
            last_scan: Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn try_get(&self, domain: &str, partition: Partition) -> Option<FilterList<F>> {
        self.sweep_if_due();
        self.entries.get(&(domain.to_owned(), partition))
    }

    pub fn set(&self, domain: &str, partition: Partition, filters: FilterList<F>) {
        self.entries.insert((domain.to_owned(), partition), filters);
    }

    /// Number of cached lookups, after applying any pending maintenance.
    #[cfg(test)]
    fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    /// Run the backing cache's expiry sweep if the scan interval has elapsed.
    /// A sweep already in progress on another thread is not waited for.
    fn sweep_if_due(&self) {
        let Some(mut last_scan) = self.last_scan.try_lock() else {
            return;
        };
        if last_scan.elapsed() >= self.scan_interval {
            self.entries.run_pending_tasks();
            *last_scan = Instant::now();
            log::trace!("lookup cache generation {} swept", self.generation);
        }
    }
}

impl<F> fmt::Debug for LookupCache<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookupCache")
            .field("generation", &self.generation)
            .field("scan_interval", &self.scan_interval)
            .finish_non_exhaustive()
    }
}
