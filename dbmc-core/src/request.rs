//! Query requests and the read options that steer caching.
//!
//! A [`QueryRequest`] is what the query compiler hands to the proxy: SQL
//! text, bound parameters, and a [`ReadOptions`] describing how the result
//! may be cached. The three cache modes are mutually exclusive and modelled
//! as the [`CacheDirective`] enum rather than a bag of optional keys.
//!
//! # Per-row mode
//!
//! Per-row caching rewrites the query: the proxy appends
//! `<lookup column> IN (?, ?, ...)` for the keys that missed the cache. That
//! only works if the SQL ends where a predicate may be appended (typically
//! right after `WHERE` or `AND`). The request states this explicitly via
//! [`QueryRequest::appendable_predicate`]; per-row reads of a request without
//! the flag are rejected instead of producing a corrupted query.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::{DbmcError, DbmcResult, Value};

// ============================================================================
// CACHE DIRECTIVES
// ============================================================================

/// Grouping of per-row results by the lookup column.
///
/// With grouping enabled every lookup value maps to a list of items instead
/// of a single row. The group column is always the per-row lookup column,
/// which is what keeps database groups and cached groups from colliding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupBy {
    /// Columns to keep from each row. Empty keeps the full row.
    pub selection: Vec<String>,
    /// Store the first selected column's value directly instead of a row.
    /// Only meaningful with a non-empty selection.
    pub direct_value: bool,
}

impl GroupBy {
    /// Group full rows.
    pub fn full_rows() -> Self {
        Self::default()
    }

    /// Group rows reduced to the given columns.
    pub fn select<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selection: columns.into_iter().map(Into::into).collect(),
            direct_value: false,
        }
    }

    /// Group bare values of a single column.
    pub fn values_of(column: impl Into<String>) -> Self {
        Self {
            selection: vec![column.into()],
            direct_value: true,
        }
    }
}

/// Per-row cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerRowCache {
    /// Key prefix; each row is cached under `prefix + lookup value`.
    pub prefix: String,
    /// Column whose value identifies a row. `None` uses the configured default.
    pub lookup_column: Option<String>,
    /// SQL expression used on the left of `IN (...)`, e.g. `` `t`.`id` ``.
    /// Inserted verbatim; never build it from user input.
    pub lookup_sql: Option<String>,
    /// SQL appended after the `IN (...)` clause, e.g. `ORDER BY id`.
    pub trailing_sql: Option<String>,
    /// Group rows by the lookup column.
    pub group: Option<GroupBy>,
}

impl PerRowCache {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            lookup_column: None,
            lookup_sql: None,
            trailing_sql: None,
            group: None,
        }
    }

    /// Cache key for one lookup key.
    pub fn cache_key(&self, lookup_key: &str) -> String {
        format!("{}{}", self.prefix, lookup_key)
    }
}

/// Shape of a whole-result read, part of every derived key.
///
/// The same SQL read as a list, a single row, a scalar or a page caches a
/// different value, so each shape gets its own derived key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadShape {
    Rows,
    Row,
    Scalar,
    Page,
}

impl ReadShape {
    pub fn tag(&self) -> &'static str {
        match self {
            ReadShape::Rows => "rows",
            ReadShape::Row => "row",
            ReadShape::Scalar => "scalar",
            ReadShape::Page => "page",
        }
    }
}

/// Whole-result cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WholeResultCache {
    /// Explicit key. `None` derives a key from the SQL and parameters.
    pub key: Option<String>,
    /// Version keys whose tokens are appended to the key.
    pub version_keys: Vec<String>,
}

impl WholeResultCache {
    /// Base key before versioning: the explicit key, or `<shape>_<hash>`
    /// derived from the query text and its parameters. Explicit keys are
    /// used as given.
    pub fn base_key(&self, sql: &str, params: &[Value], shape: ReadShape) -> String {
        match &self.key {
            Some(key) => key.clone(),
            None => format!("{}_{}", shape.tag(), derive_cache_key(sql, params)),
        }
    }
}

/// How (and whether) a read is cached.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CacheDirective {
    /// No caching.
    #[default]
    Disabled,
    /// Cache each row under its own key.
    PerRow(PerRowCache),
    /// Cache the complete result under one key.
    WholeResult(WholeResultCache),
}

impl CacheDirective {
    pub fn is_disabled(&self) -> bool {
        matches!(self, CacheDirective::Disabled)
    }
}

// ============================================================================
// READ OPTIONS
// ============================================================================

/// Options recognized by the read operations.
///
/// | option     | default           | meaning                                     |
/// |------------|-------------------|---------------------------------------------|
/// | `cache`    | `Disabled`        | cache mode                                  |
/// | `ttl`      | config default    | TTL for every entry written by this read    |
/// | `renew`    | `false`           | skip cache lookups but still write back     |
/// | `index_by` | none              | re-index list results by this column        |
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadOptions {
    pub cache: CacheDirective,
    pub ttl: Option<Duration>,
    pub renew: bool,
    pub index_by: Option<String>,
}

impl ReadOptions {
    /// No caching.
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-row caching under `prefix + value`.
    pub fn per_row(prefix: impl Into<String>) -> Self {
        Self {
            cache: CacheDirective::PerRow(PerRowCache::new(prefix)),
            ..Self::default()
        }
    }

    /// Whole-result caching under an explicit key.
    pub fn whole_result(key: impl Into<String>) -> Self {
        Self {
            cache: CacheDirective::WholeResult(WholeResultCache {
                key: Some(key.into()),
                version_keys: Vec::new(),
            }),
            ..Self::default()
        }
    }

    /// Whole-result caching under a key derived from the query.
    pub fn derived_key() -> Self {
        Self {
            cache: CacheDirective::WholeResult(WholeResultCache::default()),
            ..Self::default()
        }
    }

    /// Set the TTL for written entries.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Bypass cache lookups (entries are still written back).
    pub fn renew(mut self) -> Self {
        self.renew = true;
        self
    }

    /// Re-index list results by a column.
    pub fn index_by(mut self, column: impl Into<String>) -> Self {
        self.index_by = Some(column.into());
        self
    }

    /// Add a version key (whole-result mode only; ignored otherwise).
    pub fn versioned(mut self, version_key: impl Into<String>) -> Self {
        if let CacheDirective::WholeResult(whole) = &mut self.cache {
            whole.version_keys.push(version_key.into());
        }
        self
    }

    /// Set the per-row lookup column (per-row mode only).
    pub fn lookup_column(mut self, column: impl Into<String>) -> Self {
        if let CacheDirective::PerRow(per_row) = &mut self.cache {
            per_row.lookup_column = Some(column.into());
        }
        self
    }

    /// Set the SQL expression placed before `IN (...)` (per-row mode only).
    pub fn lookup_sql(mut self, expr: impl Into<String>) -> Self {
        if let CacheDirective::PerRow(per_row) = &mut self.cache {
            per_row.lookup_sql = Some(expr.into());
        }
        self
    }

    /// Set SQL appended after the `IN (...)` clause (per-row mode only).
    pub fn trailing_sql(mut self, sql: impl Into<String>) -> Self {
        if let CacheDirective::PerRow(per_row) = &mut self.cache {
            per_row.trailing_sql = Some(sql.into());
        }
        self
    }

    /// Group per-row results by the lookup column (per-row mode only).
    pub fn grouped(mut self, group: GroupBy) -> Self {
        if let CacheDirective::PerRow(per_row) = &mut self.cache {
            per_row.group = Some(group);
        }
        self
    }
}

// ============================================================================
// QUERY REQUEST
// ============================================================================

/// A compiled query as produced by the query compiler.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub sql: String,
    pub params: Vec<Value>,
    pub options: ReadOptions,
    /// The SQL ends where a predicate can be appended.
    pub appendable_predicate: bool,
}

impl QueryRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            options: ReadOptions::default(),
            appendable_predicate: false,
        }
    }

    /// A per-row lookup: `sql` must end where `column IN (...)` can follow,
    /// and `keys` are the lookup values to resolve.
    pub fn lookup<I, V>(sql: impl Into<String>, keys: I, options: ReadOptions) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            sql: sql.into(),
            params: keys.into_iter().map(Into::into).collect(),
            options,
            appendable_predicate: true,
        }
    }

    pub fn with_params<I, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_options(mut self, options: ReadOptions) -> Self {
        self.options = options;
        self
    }

    /// Mark the SQL as ending in an appendable predicate position.
    pub fn with_appendable_predicate(mut self) -> Self {
        self.appendable_predicate = true;
        self
    }

    /// Structural checks that do not depend on the cache contents.
    pub fn validate(&self) -> DbmcResult<()> {
        if self.sql.trim().is_empty() {
            return Err(DbmcError::invalid_request("empty query text"));
        }
        if let CacheDirective::PerRow(per_row) = &self.options.cache {
            if !self.appendable_predicate {
                return Err(DbmcError::invalid_request(
                    "per-row caching requires a query ending in an appendable predicate position",
                ));
            }
            if per_row.prefix.is_empty() {
                return Err(DbmcError::invalid_request("per-row cache prefix is empty"));
            }
        }
        Ok(())
    }
}

/// Derive a cache key from query text and parameters.
///
/// SHA-256 of `sql`, followed by `__` and the JSON-encoded parameters when
/// there are any, hex encoded.
pub fn derive_cache_key(sql: &str, params: &[Value]) -> String {
    let mut draft = sql.to_string();
    if !params.is_empty() {
        draft.push_str("__");
        draft.push_str(&params_json(params));
    }
    let mut hasher = Sha256::new();
    hasher.update(draft.as_bytes());
    hex::encode(hasher.finalize())
}

fn params_json(params: &[Value]) -> String {
    #[derive(Serialize)]
    #[serde(untagged)]
    enum Plain<'a> {
        Null(Option<()>),
        Bool(bool),
        Int(i64),
        Float(f64),
        Text(&'a str),
        Bytes(String),
    }

    let plain: Vec<Plain<'_>> = params
        .iter()
        .map(|v| match v {
            Value::Null => Plain::Null(None),
            Value::Bool(b) => Plain::Bool(*b),
            Value::Int(i) => Plain::Int(*i),
            Value::Float(f) => Plain::Float(*f),
            Value::Text(s) => Plain::Text(s),
            Value::Bytes(b) => Plain::Bytes(hex::encode(b)),
        })
        .collect();
    serde_json::to_string(&plain).unwrap_or_default()
}
