//! Cache store trait and statistics.
//!
//! This module defines the contract the proxy relies on from a key/value
//! cache: point reads, multi reads, TTL-bounded writes and deletes. Stores
//! give no transactional guarantees; last write wins per key.

use std::collections::HashMap;
use std::time::Duration;

use dbmc_core::{CacheError, CacheValue};

/// Result type for cache store calls.
pub type CacheResult<T> = Result<T, CacheError>;

/// Key/value cache with per-key TTL.
///
/// Implementations must be thread-safe: one store is typically shared by
/// many connections. A `ttl` of `None` means "no expiry" (or the store's
/// own default).
pub trait CacheStore: Send + Sync {
    /// Get one value; `Ok(None)` when absent or expired.
    fn get(&self, key: &str) -> CacheResult<Option<CacheValue>>;

    /// Get many values. Absent keys are simply missing from the map.
    fn get_multi(&self, keys: &[String]) -> CacheResult<HashMap<String, CacheValue>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(key)? {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    /// Store one value.
    fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> CacheResult<()>;

    /// Store many values with one TTL.
    fn set_multi(&self, entries: Vec<(String, CacheValue)>, ttl: Option<Duration>) -> CacheResult<()> {
        for (key, value) in entries {
            self.set(&key, value, ttl)?;
        }
        Ok(())
    }

    /// Delete keys, returning how many existed.
    fn delete(&self, keys: &[String]) -> CacheResult<u64>;

    /// Usage statistics.
    fn stats(&self) -> CacheStats;
}

impl<S: CacheStore + ?Sized> CacheStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> CacheResult<Option<CacheValue>> {
        (**self).get(key)
    }

    fn get_multi(&self, keys: &[String]) -> CacheResult<HashMap<String, CacheValue>> {
        (**self).get_multi(keys)
    }

    fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> CacheResult<()> {
        (**self).set(key, value, ttl)
    }

    fn set_multi(&self, entries: Vec<(String, CacheValue)>, ttl: Option<Duration>) -> CacheResult<()> {
        (**self).set_multi(entries, ttl)
    }

    fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        (**self).delete(keys)
    }

    fn stats(&self) -> CacheStats {
        (**self).stats()
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses (absent or expired).
    pub misses: u64,
    /// Number of live entries.
    pub entry_count: u64,
    /// Number of entries dropped because their TTL elapsed.
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
