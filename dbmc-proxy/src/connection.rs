//! The proxied connection: driver, cache store and per-connection state.
//!
//! Everything that is scoped to one database session lives on
//! [`CachedDb`]: the transaction depth, the last-error slot, the last read
//! and the query collector. Two connections never share any of it, so they
//! may run on different threads without coordination. The cache store is
//! the only shared resource and is reached through [`CacheStore`].
//!
//! # Error channel
//!
//! Every public operation clears the last-error slot on entry. Failures are
//! returned as `Err` (reads, transactions) or as a failed
//! [`ResultEnvelope`] (writes) and are also recorded in the slot.
//!
//! Cache store failures never fail an operation: reads treat them as misses
//! and skipped write-backs leave existing entries untouched.

use std::collections::HashMap;
use std::time::Duration;

use dbmc_core::{
    CacheValue, DbmcError, DbmcResult, DriverError, ExecOutcome, ProxyConfig, ResultEnvelope,
    Row, Value,
};
use dbmc_storage::{CacheStats, CacheStore, DatabaseDriver};
use tracing::{debug, warn};

use crate::history::{CollectedQuery, LastError, LastFetch};
use crate::transaction::TransactionState;

/// A database connection wrapped with result caching and nested transactions.
///
/// # Example
///
/// ```ignore
/// let cache = Arc::new(InMemoryCacheStore::new());
/// let mut db = CachedDb::new(SqliteDriver::open_in_memory()?, cache);
///
/// let users = db.fetch_array(&QueryRequest::lookup(
///     "SELECT * FROM users WHERE",
///     [1, 2, 3],
///     ReadOptions::per_row("user_"),
/// ))?;
/// ```
pub struct CachedDb<D, C> {
    pub(crate) driver: D,
    pub(crate) cache: C,
    pub(crate) config: ProxyConfig,
    pub(crate) transaction: TransactionState,
    pub(crate) last_fetch: Option<LastFetch>,
    last_error: Option<LastError>,
    collector: Option<Vec<CollectedQuery>>,
}

impl<D: DatabaseDriver, C: CacheStore> CachedDb<D, C> {
    /// Wrap a driver with the default configuration.
    pub fn new(driver: D, cache: C) -> Self {
        Self::build(driver, cache, ProxyConfig::default())
    }

    /// Wrap a driver with an explicit configuration.
    pub fn with_config(driver: D, cache: C, config: ProxyConfig) -> DbmcResult<Self> {
        config.validate()?;
        Ok(Self::build(driver, cache, config))
    }

    fn build(driver: D, cache: C, config: ProxyConfig) -> Self {
        let collector = config.collect_queries.then(Vec::new);
        Self {
            driver,
            cache,
            config,
            transaction: TransactionState::default(),
            last_fetch: None,
            last_error: None,
            collector,
        }
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Release the connection. Fails while a transaction is open, since the
    /// depth counter would be lost with it.
    pub fn into_driver(self) -> Result<D, Self> {
        if self.transaction.depth() > 0 {
            return Err(self);
        }
        Ok(self.driver)
    }

    /// Hit/miss statistics of the cache store.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Diagnostics of the last failed call, if the last call failed.
    pub fn last_error(&self) -> Option<&LastError> {
        self.last_error.as_ref()
    }

    /// Message of the last failure; empty when the last call succeeded.
    pub fn last_error_message(&self) -> &str {
        self.last_error.as_ref().map_or("", |e| e.message.as_str())
    }

    /// Code of the last failure; empty when the last call succeeded.
    pub fn last_error_code(&self) -> &str {
        self.last_error.as_ref().map_or("", |e| e.code.as_str())
    }

    /// The last `fetch_array` / `fetch_row` / `fetch_column` request.
    pub fn last_fetch(&self) -> Option<&LastFetch> {
        self.last_fetch.as_ref()
    }

    // ========================================================================
    // QUERY COLLECTION
    // ========================================================================

    /// Turn statement collection on or off. Turning it off drops what was
    /// collected so far.
    pub fn set_collect_queries(&mut self, enabled: bool) {
        match (enabled, self.collector.is_some()) {
            (true, false) => self.collector = Some(Vec::new()),
            (false, true) => self.collector = None,
            _ => {}
        }
    }

    /// Statements sent to the driver, or `None` when collection is off.
    pub fn query_collection(&self) -> Option<&[CollectedQuery]> {
        self.collector.as_deref()
    }

    /// Empty the collection without turning it off.
    pub fn clear_query_collection(&mut self) {
        if let Some(collected) = self.collector.as_mut() {
            collected.clear();
        }
    }

    pub(crate) fn collect(&mut self, sql: &str, params: &[Value]) {
        if let Some(collected) = self.collector.as_mut() {
            collected.push(CollectedQuery {
                sql: sql.to_string(),
                params: params.to_vec(),
            });
        }
    }

    // ========================================================================
    // ERROR SLOT
    // ========================================================================

    pub(crate) fn reset_last_error(&mut self) {
        self.last_error = None;
    }

    pub(crate) fn record_error(&mut self, err: &DbmcError) {
        debug!(code = err.code(), message = %err.message(), "operation failed");
        self.last_error = Some(LastError::from(err));
    }

    /// Record the error of a finished operation, if any, and hand it back.
    pub(crate) fn settle<T>(&mut self, outcome: DbmcResult<T>) -> DbmcResult<T> {
        if let Err(err) = &outcome {
            self.record_error(err);
        }
        outcome
    }

    // ========================================================================
    // DRIVER CALLS
    // ========================================================================

    pub(crate) fn db_execute(&mut self, sql: &str, params: &[Value]) -> Result<ExecOutcome, DriverError> {
        self.collect(sql, params);
        self.driver.execute(sql, params)
    }

    pub(crate) fn db_fetch_rows(&mut self, sql: &str, params: &[Value]) -> DbmcResult<Vec<Row>> {
        self.collect(sql, params);
        Ok(self.driver.fetch_rows(sql, params)?)
    }

    pub(crate) fn db_fetch_row(&mut self, sql: &str, params: &[Value]) -> DbmcResult<Option<Row>> {
        self.collect(sql, params);
        Ok(self.driver.fetch_row(sql, params)?)
    }

    pub(crate) fn db_fetch_scalar(&mut self, sql: &str, params: &[Value]) -> DbmcResult<Option<Value>> {
        self.collect(sql, params);
        Ok(self.driver.fetch_scalar(sql, params)?)
    }

    // ========================================================================
    // WRITE PATH
    // ========================================================================

    /// Execute a statement and describe the outcome in a [`ResultEnvelope`].
    pub fn query(&mut self, sql: &str, params: &[Value]) -> ResultEnvelope {
        self.reset_last_error();

        if sql.trim().is_empty() {
            let err = DbmcError::invalid_request("empty query text");
            self.record_error(&err);
            return ResultEnvelope::rejected(err.message(), err.code());
        }

        match self.db_execute(sql, params) {
            Ok(outcome) => ResultEnvelope::success(outcome),
            Err(e) => {
                let envelope = ResultEnvelope::failure(&e);
                self.record_error(&DbmcError::Driver(e));
                envelope
            }
        }
    }

    /// Execute a statement, reporting only whether it succeeded.
    pub fn exec(&mut self, sql: &str, params: &[Value]) -> bool {
        self.query(sql, params).is_ok()
    }

    /// Execute a statement and, if it succeeded, delete the given cache keys.
    pub fn query_invalidating(&mut self, sql: &str, params: &[Value], keys: &[String]) -> ResultEnvelope {
        let envelope = self.query(sql, params);
        if envelope.is_ok() && !keys.is_empty() {
            if let Err(e) = self.cache.delete(keys) {
                warn!(error = %e, keys = keys.len(), "cache invalidation failed after write");
            }
        }
        envelope
    }

    /// Delete cache keys, returning how many existed.
    pub fn invalidate(&mut self, keys: &[String]) -> DbmcResult<u64> {
        self.reset_last_error();
        let outcome = self.cache.delete(keys).map_err(DbmcError::from);
        if let Ok(deleted) = &outcome {
            debug!(requested = keys.len(), deleted, "cache keys invalidated");
        }
        self.settle(outcome)
    }

    // ========================================================================
    // FAIL-OPEN CACHE ACCESS
    // ========================================================================

    /// TTL for entries written by a read.
    pub(crate) fn effective_ttl(&self, requested: Option<Duration>) -> Option<Duration> {
        requested.or(self.config.default_ttl)
    }

    pub(crate) fn cache_get(&self, key: &str) -> Option<CacheValue> {
        match self.cache.get(key) {
            Ok(found) => found,
            Err(e) => {
                warn!(key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    pub(crate) fn cache_get_multi(&self, keys: &[String]) -> HashMap<String, CacheValue> {
        match self.cache.get_multi(keys) {
            Ok(found) => found,
            Err(e) => {
                warn!(keys = keys.len(), error = %e, "cache multi-read failed, treating as miss");
                HashMap::new()
            }
        }
    }

    pub(crate) fn cache_set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) {
        if let Err(e) = self.cache.set(key, value, ttl) {
            warn!(key, error = %e, "cache write-back skipped");
        }
    }

    pub(crate) fn cache_set_multi(&self, entries: Vec<(String, CacheValue)>, ttl: Option<Duration>) {
        if entries.is_empty() {
            return;
        }
        let count = entries.len();
        match self.cache.set_multi(entries, ttl) {
            Ok(()) => debug!(count, "cache write-back"),
            Err(e) => warn!(count, error = %e, "cache write-back skipped"),
        }
    }
}

impl<D, C> std::fmt::Debug for CachedDb<D, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedDb")
            .field("config", &self.config)
            .field("transaction_depth", &self.transaction.depth())
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbmc_storage::{InMemoryCacheStore, SqliteDriver};
    use std::sync::Arc;

    fn db() -> CachedDb<SqliteDriver, Arc<InMemoryCacheStore>> {
        let mut driver = SqliteDriver::open_in_memory().unwrap();
        driver
            .execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT UNIQUE)")
            .unwrap();
        CachedDb::new(driver, Arc::new(InMemoryCacheStore::new()))
    }

    #[test]
    fn test_query_success_envelope() {
        let mut db = db();
        let env = db.query("INSERT INTO t (name) VALUES (?)", &[Value::from("a")]);
        assert!(env.is_ok());
        assert_eq!(env.affected_rows, Some(1));
        assert_eq!(env.insert_id, Some(1));
        assert!(db.last_error().is_none());
    }

    #[test]
    fn test_query_failure_records_last_error_and_next_call_clears_it() {
        let mut db = db();
        assert!(db.exec("INSERT INTO t (name) VALUES ('a')", &[]));
        let env = db.query("INSERT INTO t (name) VALUES ('a')", &[]);
        assert!(!env.is_ok());
        assert!(!env.error_code.is_empty());
        assert_eq!(db.last_error_code(), env.error_code);
        assert_eq!(db.last_error_message(), env.message);

        assert!(db.exec("INSERT INTO t (name) VALUES ('b')", &[]));
        assert_eq!(db.last_error_message(), "");
        assert_eq!(db.last_error_code(), "");
    }

    #[test]
    fn test_empty_statement_is_rejected_without_driver_call() {
        let mut db = db();
        db.set_collect_queries(true);
        let env = db.query("  ", &[]);
        assert!(!env.is_ok());
        assert_eq!(env.error_code, "invalid_request");
        assert_eq!(db.query_collection().map(|q| q.len()), Some(0));
    }

    #[test]
    fn test_query_collection_toggle() {
        let mut db = db();
        assert!(db.query_collection().is_none());

        db.set_collect_queries(true);
        db.exec("INSERT INTO t (name) VALUES (?)", &[Value::from("a")]);
        let collected = db.query_collection().unwrap();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].params, vec![Value::from("a")]);

        db.clear_query_collection();
        assert_eq!(db.query_collection().map(|q| q.len()), Some(0));

        db.set_collect_queries(false);
        assert!(db.query_collection().is_none());
    }

    #[test]
    fn test_query_invalidating_deletes_only_after_success() {
        let mut db = db();
        db.cache().set("t_list", CacheValue::Rows(vec![]), None).unwrap();

        let env = db.query_invalidating("INSERT INTO missing VALUES (1)", &[], &["t_list".to_string()]);
        assert!(!env.is_ok());
        assert!(db.cache().contains("t_list"));

        let env = db.query_invalidating("INSERT INTO t (name) VALUES ('x')", &[], &["t_list".to_string()]);
        assert!(env.is_ok());
        assert!(!db.cache().contains("t_list"));
    }

    #[test]
    fn test_with_config_validates() {
        let driver = SqliteDriver::open_in_memory().unwrap();
        let config = ProxyConfig::default().with_lookup_column("");
        let err = CachedDb::with_config(driver, Arc::new(InMemoryCacheStore::new()), config).unwrap_err();
        assert!(matches!(err, DbmcError::Config(_)));
    }

    #[test]
    fn test_invalidate_counts_deleted_keys() {
        let mut db = db();
        db.cache().set("a", CacheValue::Empty, None).unwrap();
        assert_eq!(db.invalidate(&["a".to_string(), "b".to_string()]).unwrap(), 1);
    }
}
