//! Per-row cache reconciliation.
//!
//! A per-row read names its rows by lookup value. Each value is looked up
//! in the cache under `prefix + value`; the values that miss are fetched
//! with one query that appends `<column> IN (?, ...)` to the request's SQL.
//! The fetched rows are merged with the cache hits and written back, with
//! an empty placeholder for every missed value the database did not
//! return, so a repeated read resolves entirely from the cache.
//!
//! # Invariants
//!
//! - Every requested value lands in exactly one of hits or misses.
//! - The database is queried only for misses, and never when there are none.
//! - Placeholders count as hits but never appear in results.
//! - Rows without a usable lookup value are returned but never cached.
//! - No placeholder is written when the database answered in a lookup form
//!   that was not requested.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use tracing::{debug, warn};

use dbmc_core::{
    CacheValue, DbmcError, DbmcResult, GroupItem, PerRowCache, QueryRequest, ReadShape, Row, RowSet,
    Value,
};
use dbmc_storage::{CacheStore, DatabaseDriver};

use crate::connection::CachedDb;
use crate::history::LastFetch;
use crate::shaping::{group_rows, row_key, shape_list};

/// Outcome of partitioning the requested lookup keys against the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationState {
    /// Requested lookup keys, de-duplicated, in request order.
    pub requested: Vec<String>,
    /// Keys resolved by the cache, in request order.
    pub hits: IndexMap<String, CacheValue>,
    /// Keys the database must resolve, in request order.
    pub missing: Vec<String>,
}

impl ReconciliationState {
    /// Split `requested` into hits and misses.
    ///
    /// `lookup` returns the cached value for a key; values rejected by
    /// `accept` (wrong shape for the read) count as misses.
    pub fn partition<L, A>(requested: Vec<String>, mut lookup: L, accept: A) -> Self
    where
        L: FnMut(&str) -> Option<CacheValue>,
        A: Fn(&CacheValue) -> bool,
    {
        let mut hits = IndexMap::new();
        let mut missing = Vec::new();

        for key in &requested {
            match lookup(key) {
                Some(value) if accept(&value) => {
                    hits.insert(key.clone(), value);
                }
                _ => missing.push(key.clone()),
            }
        }

        Self {
            requested,
            hits,
            missing,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Append `<lhs> IN (?, ...)` and optional trailing SQL to a query.
pub fn append_in_clause(sql: &str, lhs: &str, count: usize, trailing: Option<&str>) -> String {
    let placeholders = vec!["?"; count].join(",");
    let mut out = format!("{} {} IN ({})", sql.trim_end(), lhs, placeholders);
    if let Some(extra) = trailing.filter(|s| !s.trim().is_empty()) {
        out.push(' ');
        out.push_str(extra.trim());
    }
    out
}

/// Map request params to lookup keys, dropping repeats (first one wins).
fn lookup_params(params: &[Value]) -> DbmcResult<IndexMap<String, Value>> {
    let mut by_key = IndexMap::with_capacity(params.len());
    for param in params {
        let key = param
            .lookup_key()
            .ok_or_else(|| DbmcError::invalid_request("per-row lookup values must not be NULL"))?;
        by_key.entry(key).or_insert_with(|| param.clone());
    }
    Ok(by_key)
}

impl<D: DatabaseDriver, C: CacheStore> CachedDb<D, C> {
    pub(crate) fn fetch_per_row(&mut self, request: &QueryRequest, per_row: &PerRowCache) -> DbmcResult<RowSet> {
        let lookup_column = per_row
            .lookup_column
            .clone()
            .unwrap_or_else(|| self.config.default_lookup_column.clone());
        let lhs = per_row
            .lookup_sql
            .clone()
            .unwrap_or_else(|| self.driver.quote_identifier(&lookup_column));
        let trailing = per_row.trailing_sql.as_deref();
        let grouped = per_row.group.is_some();
        let ttl = self.effective_ttl(request.options.ttl);

        let params_by_key = lookup_params(&request.params)?;
        let requested: Vec<String> = params_by_key.keys().cloned().collect();

        self.last_fetch = Some(LastFetch {
            sql: append_in_clause(&request.sql, &lhs, requested.len(), trailing),
            params: params_by_key.values().cloned().collect(),
            options: request.options.clone(),
            shape: ReadShape::Rows,
        });

        if requested.is_empty() {
            debug!(prefix = %per_row.prefix, "per-row read without keys");
            return Ok(if grouped {
                RowSet::Grouped(IndexMap::new())
            } else {
                RowSet::List(Vec::new())
            });
        }

        let mut cached: HashMap<String, CacheValue> = if request.options.renew {
            HashMap::new()
        } else {
            let cache_keys: Vec<String> = requested.iter().map(|k| per_row.cache_key(k)).collect();
            self.cache_get_multi(&cache_keys)
        };

        let state = ReconciliationState::partition(
            requested,
            |key| cached.remove(&per_row.cache_key(key)),
            |value| match value {
                CacheValue::Empty => true,
                CacheValue::Group(_) => grouped,
                CacheValue::Row(_) => !grouped,
                _ => false,
            },
        );

        debug!(
            prefix = %per_row.prefix,
            hits = state.hits.len(),
            missing = state.missing.len(),
            renew = request.options.renew,
            "per-row cache reconciliation"
        );

        let db_rows = if state.is_complete() {
            Vec::new()
        } else {
            let sql = append_in_clause(&request.sql, &lhs, state.missing.len(), trailing);
            let params: Vec<Value> = state
                .missing
                .iter()
                .filter_map(|k| params_by_key.get(k).cloned())
                .collect();
            self.db_fetch_rows(&sql, &params)?
        };

        let (result, write_back) = match &per_row.group {
            Some(group) => {
                let groups = group_rows(db_rows, &lookup_column, group);
                let found = groups
                    .iter()
                    .map(|(key, items)| (key.clone(), CacheValue::Group(items.clone())))
                    .collect();
                let write_back = plan_write_back(per_row, &state.missing, found);
                (RowSet::Grouped(merge_groups(groups, state.hits)), write_back)
            }
            None => {
                let mut found: HashMap<String, CacheValue> = HashMap::new();
                for row in &db_rows {
                    if let Some(key) = row_key(row, &lookup_column) {
                        found.entry(key).or_insert_with(|| CacheValue::Row(row.clone()));
                    }
                }
                let write_back = plan_write_back(per_row, &state.missing, found);
                let rows = merge_rows(db_rows, state.hits);
                (shape_list(rows, request.options.index_by.as_deref()), write_back)
            }
        };

        self.cache_set_multi(write_back, ttl);
        Ok(result)
    }
}

/// Cache entries for the missed keys.
///
/// A key the database answered under the same lookup value gets that value;
/// the others get an `Empty` placeholder. If the database returned a lookup
/// value that was not requested, it matched keys in another form (collation,
/// type coercion) and any missed key may have been answered, so no
/// placeholders are written.
fn plan_write_back(
    per_row: &PerRowCache,
    missing: &[String],
    mut found: HashMap<String, CacheValue>,
) -> Vec<(String, CacheValue)> {
    let requested: HashSet<&str> = missing.iter().map(String::as_str).collect();
    let unmatched = found.keys().filter(|k| !requested.contains(k.as_str())).count();
    if unmatched > 0 {
        warn!(
            prefix = %per_row.prefix,
            unmatched,
            "database returned lookup values that were not requested, skipping placeholders"
        );
    }

    missing
        .iter()
        .filter_map(|key| match found.remove(key) {
            Some(value) => Some((per_row.cache_key(key), value)),
            None if unmatched > 0 => None,
            None => Some((per_row.cache_key(key), CacheValue::Empty)),
        })
        .collect()
}

/// Database rows first, then cached rows in request order.
fn merge_rows(mut db_rows: Vec<Row>, hits: IndexMap<String, CacheValue>) -> Vec<Row> {
    db_rows.extend(hits.into_values().filter_map(|value| match value {
        CacheValue::Row(row) => Some(row),
        _ => None,
    }));
    db_rows
}

/// Database groups first, then cached groups, keyed by lookup value.
fn merge_groups(
    mut groups: IndexMap<String, Vec<GroupItem>>,
    hits: IndexMap<String, CacheValue>,
) -> IndexMap<String, Vec<GroupItem>> {
    for (key, value) in hits {
        if let CacheValue::Group(items) = value {
            groups.entry(key).or_insert(items);
        }
    }
    groups
}
