//! Row counting for paged reads.
//!
//! [`count_query`] turns a list query into a `COUNT(*)` over the same rows:
//! a trailing `LIMIT`/`OFFSET` (literal or bound with `?`) and a trailing
//! `ORDER BY` are dropped and the rest is wrapped as a derived table. The
//! parameters bound to a dropped `LIMIT`/`OFFSET` are the last ones of the
//! query and are dropped with it.
//!
//! Paging the rewrite cannot remove (named parameters, expressions) is
//! rejected, since counting inside the page would return the page size.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use dbmc_core::{
    CacheDirective, CountAndItems, DbmcError, DbmcResult, QueryRequest, ReadOptions, RowSet,
    Value, WholeResultCache,
};
use dbmc_storage::{CacheStore, DatabaseDriver};

use crate::connection::CachedDb;

/// Suffix appended to an inherited whole-result key.
pub const COUNT_KEY_SUFFIX: &str = "_count";

static TRAILING_LIMIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\s+LIMIT\s+(?:\d+|\?)(?:\s*(?:,|OFFSET)\s*(?:\d+|\?))?\s*$")
        .expect("valid LIMIT regex")
});

static TRAILING_OFFSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\s+OFFSET\s+(?:\d+|\?)\s*$").expect("valid OFFSET regex"));

static LEFTOVER_PAGING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\s(?:LIMIT|OFFSET)\s+[^()]*$").expect("valid paging regex"));

static TRAILING_ORDER_BY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\s+ORDER\s+BY\s+[^()]*$").expect("valid ORDER BY regex"));

/// A `COUNT(*)` rewrite with the parameters it still binds.
#[derive(Debug, Clone, PartialEq)]
pub struct CountQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Remove a trailing match, returning how many placeholders it held.
fn strip_trailing(sql: &mut String, pattern: &Regex) -> usize {
    let Some((start, placeholders)) = pattern
        .find(sql)
        .map(|m| (m.start(), m.as_str().matches('?').count()))
    else {
        return 0;
    };
    sql.truncate(start);
    placeholders
}

/// Rewrite a list query as a count of its matching rows.
///
/// Fails with `InvalidRequest` when the query pages in a form that cannot be
/// stripped, or binds fewer parameters than the dropped paging clauses use.
pub fn count_query(sql: &str, params: &[Value]) -> DbmcResult<CountQuery> {
    let mut inner = sql.trim().trim_end_matches(';').trim_end().to_string();

    let mut dropped = strip_trailing(&mut inner, &TRAILING_LIMIT);
    dropped += strip_trailing(&mut inner, &TRAILING_OFFSET);

    if LEFTOVER_PAGING.is_match(&inner) {
        return Err(DbmcError::invalid_request(
            "cannot count a query paged with a non-literal LIMIT or OFFSET",
        ));
    }

    // An ORDER BY with bound values keeps them; ordering does not change a count.
    let order_by = TRAILING_ORDER_BY
        .find(&inner)
        .filter(|m| !m.as_str().contains('?'))
        .map(|m| m.start());
    if let Some(start) = order_by {
        inner.truncate(start);
    }

    let kept = params.len().checked_sub(dropped).ok_or_else(|| {
        DbmcError::invalid_request(format!(
            "paging clauses use {} parameters but only {} are bound",
            dropped,
            params.len()
        ))
    })?;

    Ok(CountQuery {
        sql: format!("SELECT COUNT(*) FROM ({}) AS dbmc_count", inner),
        params: params[..kept].to_vec(),
    })
}

impl<D: DatabaseDriver, C: CacheStore> CachedDb<D, C> {
    /// Count the rows a list query would return without paging.
    ///
    /// The request's whole-result settings apply to the count itself.
    pub fn fetch_count(&mut self, request: &QueryRequest) -> DbmcResult<i64> {
        self.reset_last_error();
        let outcome = self.fetch_count_inner(request);
        self.settle(outcome)
    }

    fn fetch_count_inner(&mut self, request: &QueryRequest) -> DbmcResult<i64> {
        request.validate()?;
        let count = count_query(&request.sql, &request.params)?;
        let counting = QueryRequest {
            sql: count.sql,
            params: count.params,
            options: request.options.clone(),
            appendable_predicate: false,
        };
        let total = self.scalar_read(&counting)?;
        Ok(total.and_then(|v| v.as_i64()).unwrap_or(0))
    }

    /// Count the rows matched by the last read, ignoring its paging.
    ///
    /// With `inherit_cache` and a whole-result cached last read, the count
    /// is cached under the last key plus `_count`, with the last TTL or the
    /// configured count TTL. Otherwise `options` decides caching.
    pub fn calc_found_rows(&mut self, inherit_cache: bool, options: ReadOptions) -> DbmcResult<i64> {
        self.reset_last_error();
        let outcome = self.calc_found_rows_inner(inherit_cache, options);
        self.settle(outcome)
    }

    fn calc_found_rows_inner(&mut self, inherit_cache: bool, mut options: ReadOptions) -> DbmcResult<i64> {
        let last = self
            .last_fetch
            .clone()
            .ok_or_else(|| DbmcError::invalid_request("no previous read to count"))?;

        if inherit_cache {
            if let CacheDirective::WholeResult(whole) = &last.options.cache {
                options.cache = CacheDirective::WholeResult(WholeResultCache {
                    key: Some(format!(
                        "{}{}",
                        whole.base_key(&last.sql, &last.params, last.shape),
                        COUNT_KEY_SUFFIX
                    )),
                    version_keys: whole.version_keys.clone(),
                });
                options.ttl = Some(last.options.ttl.unwrap_or(self.config.count_cache_ttl));
                debug!("count inherits cache settings of last read");
            }
        }

        let count = count_query(&last.sql, &last.params)?;
        let counting = QueryRequest {
            sql: count.sql,
            params: count.params,
            options,
            appendable_predicate: false,
        };
        let total = self.scalar_read(&counting)?;
        Ok(total.and_then(|v| v.as_i64()).unwrap_or(0))
    }

    /// Pair a list result with the count of the last read.
    pub fn format_count_and_items(
        &mut self,
        items: RowSet,
        inherit_cache: bool,
        options: ReadOptions,
    ) -> DbmcResult<CountAndItems> {
        let count = self.calc_found_rows(inherit_cache, options)?;
        Ok(CountAndItems { count, items })
    }
}
