//! Version tokens for whole-result cache keys.
//!
//! A whole-result read may name version keys. Each version key holds a
//! token in the cache store; the read's key becomes
//! `key_<token>` (several tokens are joined with `:` in sorted version key
//! order). Bumping a token makes every key built from it miss, without
//! deleting the stale entries, which expire through their TTL.
//!
//! A missing token is created lazily from the current time in
//! microseconds.

use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use dbmc_core::{CacheValue, DbmcError, DbmcResult};
use dbmc_storage::{CacheStore, DatabaseDriver};

use crate::connection::CachedDb;

fn now_token() -> i64 {
    Utc::now().timestamp_micros()
}

impl<D: DatabaseDriver, C: CacheStore> CachedDb<D, C> {
    /// Append the current version tokens to a base key.
    pub(crate) fn versioned_key(&self, base: String, version_keys: &[String], ttl: Option<Duration>) -> String {
        if version_keys.is_empty() {
            return base;
        }

        let mut keys: Vec<&String> = version_keys.iter().collect();
        keys.sort();
        keys.dedup();

        let tokens: Vec<String> = keys
            .into_iter()
            .map(|k| self.version_token(k, ttl).to_string())
            .collect();
        format!("{}_{}", base, tokens.join(":"))
    }

    /// Current token of a version key, created if absent.
    fn version_token(&self, version_key: &str, ttl: Option<Duration>) -> i64 {
        if let Some(CacheValue::Token(token)) = self.cache_get(version_key) {
            return token;
        }
        let token = now_token();
        debug!(version_key, token, "version token created");
        self.cache_set(version_key, CacheValue::Token(token), ttl);
        token
    }

    /// Replace a version token with a strictly greater one.
    ///
    /// Returns the new token. Unlike reads, a cache failure here is an
    /// error: the caller asked for invalidation and it did not happen.
    pub fn bump_version(&mut self, version_key: &str, ttl: Option<Duration>) -> DbmcResult<i64> {
        self.reset_last_error();
        let outcome = self.bump_version_inner(version_key, ttl);
        self.settle(outcome)
    }

    fn bump_version_inner(&mut self, version_key: &str, ttl: Option<Duration>) -> DbmcResult<i64> {
        let previous = match self.cache.get(version_key)? {
            Some(CacheValue::Token(token)) => Some(token),
            _ => None,
        };
        let token = match previous {
            Some(p) => now_token().max(p.saturating_add(1)),
            None => now_token(),
        };
        self.cache
            .set(version_key, CacheValue::Token(token), self.effective_ttl(ttl))
            .map_err(DbmcError::from)?;
        debug!(version_key, ?previous, token, "version token bumped");
        Ok(token)
    }

    /// Current token of a version key without creating one.
    pub fn version_of(&self, version_key: &str) -> Option<i64> {
        match self.cache_get(version_key) {
            Some(CacheValue::Token(token)) => Some(token),
            _ => None,
        }
    }
}
