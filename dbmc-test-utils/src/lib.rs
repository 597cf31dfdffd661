//! DBMC Test Utilities
//!
//! Shared test infrastructure for the DBMC workspace:
//! - Driver doubles that script responses or count round-trips
//! - A cache store that fails on demand
//! - Proptest generators
//! - Fixtures (seeded SQLite databases)
//! - Custom assertions

use std::collections::VecDeque;
use std::time::Duration;

pub use dbmc_core::{
    row, CacheError, CacheValue, DbmcError, DbmcResult, DriverError, ExecOutcome, Row, Value,
};
pub use dbmc_storage::{
    CacheResult, CacheStats, CacheStore, DatabaseDriver, DriverResult, InMemoryCacheStore,
    SqliteDriver,
};

// ============================================================================
// DRIVER DOUBLES
// ============================================================================

/// One call received by a [`ScriptedDriver`].
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Execute { sql: String, params: Vec<Value> },
    Fetch { sql: String, params: Vec<Value> },
    Begin,
    Commit,
    Rollback,
}

impl DriverCall {
    /// SQL text of the call (`BEGIN` / `COMMIT` / `ROLLBACK` for boundaries).
    pub fn sql(&self) -> &str {
        match self {
            DriverCall::Execute { sql, .. } | DriverCall::Fetch { sql, .. } => sql,
            DriverCall::Begin => "BEGIN",
            DriverCall::Commit => "COMMIT",
            DriverCall::Rollback => "ROLLBACK",
        }
    }
}

/// Driver that records every call and answers fetches from a queue.
///
/// Fetches pop the next queued row set (empty when the queue is drained).
/// Failures can be injected for the next call or for every call whose SQL
/// contains a pattern.
#[derive(Debug, Default)]
pub struct ScriptedDriver {
    calls: Vec<DriverCall>,
    responses: VecDeque<Vec<Row>>,
    fail_next: Option<DriverError>,
    fail_matching: Vec<(String, DriverError)>,
    next_insert_id: i64,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the rows returned by the next fetch.
    pub fn push_rows(&mut self, rows: Vec<Row>) -> &mut Self {
        self.responses.push_back(rows);
        self
    }

    /// Fail the next call of any kind.
    pub fn fail_next(&mut self, error: DriverError) -> &mut Self {
        self.fail_next = Some(error);
        self
    }

    /// Fail every call whose SQL contains `pattern`.
    pub fn fail_when(&mut self, pattern: impl Into<String>, error: DriverError) -> &mut Self {
        self.fail_matching.push((pattern.into(), error));
        self
    }

    pub fn clear_failures(&mut self) {
        self.fail_next = None;
        self.fail_matching.clear();
    }

    pub fn calls(&self) -> &[DriverCall] {
        &self.calls
    }

    /// SQL of every call, in order.
    pub fn statements(&self) -> Vec<String> {
        self.calls.iter().map(|c| c.sql().to_string()).collect()
    }

    /// Number of fetch calls.
    pub fn fetch_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, DriverCall::Fetch { .. }))
            .count()
    }

    fn check(&mut self, call: DriverCall) -> DriverResult<()> {
        let failure = self.fail_next.take().or_else(|| {
            self.fail_matching
                .iter()
                .find(|(pattern, _)| call.sql().contains(pattern.as_str()))
                .map(|(_, e)| e.clone())
        });
        self.calls.push(call);
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl DatabaseDriver for ScriptedDriver {
    fn execute(&mut self, sql: &str, params: &[Value]) -> DriverResult<ExecOutcome> {
        self.check(DriverCall::Execute {
            sql: sql.to_string(),
            params: params.to_vec(),
        })?;
        let insert_id = if sql.trim_start().to_ascii_uppercase().starts_with("INSERT") {
            self.next_insert_id += 1;
            Some(self.next_insert_id)
        } else {
            None
        };
        Ok(ExecOutcome {
            affected_rows: u64::from(insert_id.is_some()),
            insert_id,
        })
    }

    fn fetch_rows(&mut self, sql: &str, params: &[Value]) -> DriverResult<Vec<Row>> {
        self.check(DriverCall::Fetch {
            sql: sql.to_string(),
            params: params.to_vec(),
        })?;
        Ok(self.responses.pop_front().unwrap_or_default())
    }

    fn begin(&mut self) -> DriverResult<()> {
        self.check(DriverCall::Begin)
    }

    fn commit(&mut self) -> DriverResult<()> {
        self.check(DriverCall::Commit)
    }

    fn rollback(&mut self) -> DriverResult<()> {
        self.check(DriverCall::Rollback)
    }
}

/// Wrapper that counts database round-trips of another driver.
#[derive(Debug)]
pub struct CountingDriver<D> {
    inner: D,
    statements: Vec<String>,
}

impl<D: DatabaseDriver> CountingDriver<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            statements: Vec::new(),
        }
    }

    /// Calls forwarded to the inner driver.
    pub fn round_trips(&self) -> usize {
        self.statements.len()
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn reset(&mut self) {
        self.statements.clear();
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut D {
        &mut self.inner
    }
}

impl<D: DatabaseDriver> DatabaseDriver for CountingDriver<D> {
    fn execute(&mut self, sql: &str, params: &[Value]) -> DriverResult<ExecOutcome> {
        self.statements.push(sql.to_string());
        self.inner.execute(sql, params)
    }

    fn fetch_rows(&mut self, sql: &str, params: &[Value]) -> DriverResult<Vec<Row>> {
        self.statements.push(sql.to_string());
        self.inner.fetch_rows(sql, params)
    }

    fn begin(&mut self) -> DriverResult<()> {
        self.statements.push("BEGIN".to_string());
        self.inner.begin()
    }

    fn commit(&mut self) -> DriverResult<()> {
        self.statements.push("COMMIT".to_string());
        self.inner.commit()
    }

    fn rollback(&mut self) -> DriverResult<()> {
        self.statements.push("ROLLBACK".to_string());
        self.inner.rollback()
    }

    fn quote_identifier(&self, name: &str) -> String {
        self.inner.quote_identifier(name)
    }
}

// ============================================================================
// CACHE DOUBLES
// ============================================================================

/// In-memory store whose reads and/or writes fail.
#[derive(Debug, Default)]
pub struct FailingCacheStore {
    inner: InMemoryCacheStore,
    fail_reads: bool,
    fail_writes: bool,
}

impl FailingCacheStore {
    /// Every call fails.
    pub fn unavailable() -> Self {
        Self {
            fail_reads: true,
            fail_writes: true,
            ..Self::default()
        }
    }

    /// Reads fail, writes succeed.
    pub fn failing_reads() -> Self {
        Self {
            fail_reads: true,
            ..Self::default()
        }
    }

    /// Writes fail, reads succeed.
    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    /// The backing store, bypassing the injected failures.
    pub fn inner(&self) -> &InMemoryCacheStore {
        &self.inner
    }

    fn down() -> CacheError {
        CacheError::Backend("cache unavailable".to_string())
    }
}

impl CacheStore for FailingCacheStore {
    fn get(&self, key: &str) -> CacheResult<Option<CacheValue>> {
        if self.fail_reads {
            return Err(Self::down());
        }
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> CacheResult<()> {
        if self.fail_writes {
            return Err(Self::down());
        }
        self.inner.set(key, value, ttl)
    }

    fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        if self.fail_writes {
            return Err(Self::down());
        }
        self.inner.delete(keys)
    }

    fn stats(&self) -> CacheStats {
        self.inner.stats()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for DBMC values and scenarios.

    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    /// Generate any non-float [`Value`] (floats excluded so equality holds).
    pub fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            "[a-z0-9 ]{0,12}".prop_map(Value::Text),
            prop::collection::vec(any::<u8>(), 0..8).prop_map(Value::Bytes),
        ]
    }

    /// Generate lookup keys as a caller would pass them, repeats allowed.
    pub fn arb_lookup_keys() -> impl Strategy<Value = Vec<i64>> {
        prop::collection::vec(1i64..40, 0..16)
    }

    /// Generate the set of ids present in the database.
    pub fn arb_stored_ids() -> impl Strategy<Value = BTreeSet<i64>> {
        prop::collection::btree_set(1i64..40, 0..20)
    }

    /// Generate how nested levels end: `true` commits, `false` rolls back.
    pub fn arb_level_endings() -> impl Strategy<Value = Vec<bool>> {
        prop::collection::vec(any::<bool>(), 1..8)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built databases and stores.

    use super::*;
    use std::sync::Arc;

    /// Schema of the `users` table used across the tests.
    pub const USERS_SCHEMA: &str =
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, team_id INTEGER)";

    /// Fixed name of a seeded user.
    pub fn user_name(id: i64) -> String {
        format!("user{}", id)
    }

    /// Team of a seeded user.
    pub fn team_of(id: i64) -> i64 {
        id % 3
    }

    /// In-memory SQLite with a `users` row for each id.
    pub fn users_db<I: IntoIterator<Item = i64>>(ids: I) -> SqliteDriver {
        let mut driver = match SqliteDriver::open_in_memory() {
            Ok(d) => d,
            Err(e) => panic!("in-memory sqlite should open: {}", e),
        };
        if let Err(e) = driver.execute_batch(USERS_SCHEMA) {
            panic!("schema should apply: {}", e);
        }
        for id in ids {
            let params = [Value::Int(id), Value::Text(user_name(id)), Value::Int(team_of(id))];
            if let Err(e) = driver.execute("INSERT INTO users (id, name, team_id) VALUES (?, ?, ?)", &params) {
                panic!("seed row {} should insert: {}", id, e);
            }
        }
        driver
    }

    /// `users_db` wrapped in a round-trip counter.
    pub fn counting_users_db<I: IntoIterator<Item = i64>>(ids: I) -> CountingDriver<SqliteDriver> {
        CountingDriver::new(users_db(ids))
    }

    /// Fresh shared in-memory cache.
    pub fn memory_cache() -> Arc<InMemoryCacheStore> {
        Arc::new(InMemoryCacheStore::new())
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for DBMC results.

    use super::*;

    /// Assert that a DbmcResult is an InvalidRequest error.
    #[track_caller]
    pub fn assert_invalid_request<T: std::fmt::Debug>(result: &DbmcResult<T>) {
        match result {
            Err(DbmcError::InvalidRequest { .. }) => {}
            other => panic!("Expected InvalidRequest, got: {:?}", other),
        }
    }

    /// Assert that a DbmcResult is a driver error, optionally with a code.
    #[track_caller]
    pub fn assert_driver_error<T: std::fmt::Debug>(result: &DbmcResult<T>, code: Option<&str>) {
        match result {
            Err(DbmcError::Driver(e)) => {
                if let Some(code) = code {
                    assert_eq!(e.code, code, "Wrong driver error code");
                }
            }
            other => panic!("Expected Driver error, got: {:?}", other),
        }
    }

    /// Assert that a DbmcResult is a TransactionState error for `operation`.
    #[track_caller]
    pub fn assert_transaction_state<T: std::fmt::Debug>(result: &DbmcResult<T>, operation: &str) {
        match result {
            Err(DbmcError::TransactionState { operation: op, .. }) => {
                assert_eq!(*op, operation, "Wrong operation in TransactionState error");
            }
            other => panic!("Expected TransactionState error, got: {:?}", other),
        }
    }

    /// Assert the integer values of `column` across rows, in order.
    #[track_caller]
    pub fn assert_column_ints(rows: &[Row], column: &str, expected: &[i64]) {
        let got: Vec<Option<i64>> = rows
            .iter()
            .map(|r| r.get(column).and_then(Value::as_i64))
            .collect();
        let expected: Vec<Option<i64>> = expected.iter().copied().map(Some).collect();
        assert_eq!(got, expected, "Wrong values in column {}", column);
    }
}
