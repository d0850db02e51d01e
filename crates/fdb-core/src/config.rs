//! Lookup cache configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default interval between passive expiry sweeps of the lookup cache.
pub const DEFAULT_EXPIRATION_SCAN_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Options for the lookup cache backing a collection.
///
/// Durations are expressed in whole seconds when (de)serialized:
///
/// ```
/// use fdb_core::CacheConfig;
///
/// let config: CacheConfig = serde_json::from_str(r#"{ "expiration_scan_interval_secs": 30 }"#).unwrap();
/// assert_eq!(config.expiration_scan_interval.as_secs(), 30);
/// assert_eq!(config.time_to_live, None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How often expired entries are swept out of the cache. Also the entry
    /// lifetime when `time_to_live` is unset.
    #[serde(rename = "expiration_scan_interval_secs", with = "duration_secs")]
    pub expiration_scan_interval: Duration,
    /// Lifetime of a cached lookup. `None` means one scan interval.
    #[serde(rename = "time_to_live_secs", with = "option_duration_secs")]
    pub time_to_live: Option<Duration>,
    /// Upper bound on cached lookups. `None` is unbounded.
    pub max_capacity: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            expiration_scan_interval: DEFAULT_EXPIRATION_SCAN_INTERVAL,
            time_to_live: None,
            max_capacity: None,
        }
    }
}

impl CacheConfig {
    pub fn with_expiration_scan_interval(mut self, interval: Duration) -> Self {
        self.expiration_scan_interval = interval;
        self
    }

    pub fn with_time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }

    pub fn with_max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = Some(capacity);
        self
    }

    /// How long a cached lookup survives. A sealed collection never swaps
    /// its cache, so entries always expire.
    pub fn entry_lifetime(&self) -> Duration {
        self.time_to_live.unwrap_or(self.expiration_scan_interval)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod option_duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|secs| secs.map(Duration::from_secs))
    }
}
