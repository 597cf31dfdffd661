//! In-process cache store.
//!
//! A `HashMap` behind a `RwLock`, with lazy TTL expiry on read. Used as the
//! default store for single-process deployments and throughout the tests.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dbmc_core::{CacheError, CacheValue};

use super::traits::{CacheResult, CacheStats, CacheStore};

#[derive(Debug, Clone)]
struct Entry {
    value: CacheValue,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-memory [`CacheStore`].
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, Entry>>,
    stats: RwLock<CacheStats>,
}

impl InMemoryCacheStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a live value without touching hit/miss statistics.
    pub fn peek(&self, key: &str) -> Option<CacheValue> {
        let entries = self.entries.read().ok()?;
        entries
            .get(key)
            .filter(|e| !e.is_expired(Utc::now()))
            .map(|e| e.value.clone())
    }

    /// Whether a live entry exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.peek(key).is_some()
    }

    /// Live keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = Utc::now();
        let mut keys: Vec<String> = match self.entries.read() {
            Ok(entries) => entries
                .iter()
                .filter(|(_, e)| !e.is_expired(now))
                .map(|(k, _)| k.clone())
                .collect(),
            Err(_) => Vec::new(),
        };
        keys.sort();
        keys
    }

    /// Remove everything.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    fn record(&self, hit: bool) {
        if let Ok(mut stats) = self.stats.write() {
            if hit {
                stats.hits += 1;
            } else {
                stats.misses += 1;
            }
        }
    }

    fn record_expiration(&self) {
        if let Ok(mut stats) = self.stats.write() {
            stats.expirations += 1;
        }
    }
}

fn poisoned() -> CacheError {
    CacheError::Backend("cache lock poisoned".to_string())
}

/// Expiry instant for a TTL. A TTL past the representable range never
/// expires.
fn expiry(ttl: Option<Duration>) -> Option<DateTime<Utc>> {
    ttl.and_then(|d| chrono::Duration::from_std(d).ok())
        .and_then(|d| Utc::now().checked_add_signed(d))
}

impl CacheStore for InMemoryCacheStore {
    fn get(&self, key: &str) -> CacheResult<Option<CacheValue>> {
        let now = Utc::now();
        let found = {
            let entries = self.entries.read().map_err(|_| poisoned())?;
            entries.get(key).cloned()
        };

        match found {
            Some(entry) if entry.is_expired(now) => {
                let mut entries = self.entries.write().map_err(|_| poisoned())?;
                entries.remove(key);
                drop(entries);
                self.record_expiration();
                self.record(false);
                Ok(None)
            }
            Some(entry) => {
                self.record(true);
                Ok(Some(entry.value))
            }
            None => {
                self.record(false);
                Ok(None)
            }
        }
    }

    fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> CacheResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: expiry(ttl),
            },
        );
        Ok(())
    }

    fn set_multi(&self, entries: Vec<(String, CacheValue)>, ttl: Option<Duration>) -> CacheResult<()> {
        let expires_at = expiry(ttl);
        let mut map = self.entries.write().map_err(|_| poisoned())?;
        for (key, value) in entries {
            map.insert(key, Entry { value, expires_at });
        }
        Ok(())
    }

    fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        Ok(keys.iter().filter(|k| entries.remove(k.as_str()).is_some()).count() as u64)
    }

    fn stats(&self) -> CacheStats {
        let mut stats = self.stats.read().map(|s| s.clone()).unwrap_or_default();
        stats.entry_count = self.keys().len() as u64;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbmc_core::{row, Value};

    #[test]
    fn test_set_get_delete() {
        let store = InMemoryCacheStore::new();
        store
            .set("user_1", CacheValue::Row(row([("id", 1)])), None)
            .unwrap();

        assert!(matches!(store.get("user_1").unwrap(), Some(CacheValue::Row(_))));
        assert_eq!(store.get("user_2").unwrap(), None);

        assert_eq!(store.delete(&["user_1".to_string(), "user_2".to_string()]).unwrap(), 1);
        assert_eq!(store.get("user_1").unwrap(), None);
    }

    #[test]
    fn test_get_multi_omits_absent_keys() {
        let store = InMemoryCacheStore::new();
        store
            .set_multi(
                vec![
                    ("a".to_string(), CacheValue::Scalar(Value::Int(1))),
                    ("b".to_string(), CacheValue::Empty),
                ],
                None,
            )
            .unwrap();

        let found = store
            .get_multi(&["a".to_string(), "b".to_string(), "c".to_string()])
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["b"], CacheValue::Empty);
        assert!(!found.contains_key("c"));
    }

    #[test]
    fn test_ttl_expiry_is_a_miss() {
        let store = InMemoryCacheStore::new();
        store
            .set("short", CacheValue::Token(1), Some(Duration::from_millis(1)))
            .unwrap();
        store
            .set("long", CacheValue::Token(2), Some(Duration::from_secs(3600)))
            .unwrap();
        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(store.get("short").unwrap(), None);
        assert_eq!(store.get("long").unwrap(), Some(CacheValue::Token(2)));

        let stats = store.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_out_of_range_ttl_never_expires() {
        let store = InMemoryCacheStore::new();
        store
            .set("k", CacheValue::Empty, Some(Duration::from_secs(9_000_000_000_000)))
            .unwrap();
        store
            .set_multi(vec![("m".to_string(), CacheValue::Token(1))], Some(Duration::MAX))
            .unwrap();

        assert_eq!(store.get("k").unwrap(), Some(CacheValue::Empty));
        assert_eq!(store.get("m").unwrap(), Some(CacheValue::Token(1)));
    }

    #[test]
    fn test_peek_does_not_count() {
        let store = InMemoryCacheStore::new();
        store.set("k", CacheValue::Empty, None).unwrap();
        assert!(store.contains("k"));
        assert_eq!(store.stats().hits, 0);
        assert_eq!(store.keys(), vec!["k".to_string()]);
        store.clear();
        assert!(store.keys().is_empty());
    }
}
