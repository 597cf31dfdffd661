//! Read operations.
//!
//! | operation                | per-row | whole-result value   |
//! |--------------------------|---------|----------------------|
//! | `fetch_array`            | yes     | `CacheValue::Rows`   |
//! | `fetch_row`              | no      | `CacheValue::Row`    |
//! | `fetch_column`           | no      | `CacheValue::Scalar` |
//! | `fetch_array_with_count` | no      | `CacheValue::Page`   |
//!
//! Absent rows and scalars are cached as `CacheValue::Empty` so they are
//! not queried again. A cached value of the wrong shape is a miss.

use std::time::Duration;

use tracing::debug;

use dbmc_core::{
    CacheDirective, CacheValue, DbmcError, DbmcResult, QueryRequest, ReadShape, Row, RowSet,
    RowsWithCount, Value, WholeResultCache,
};
use dbmc_storage::{CacheStore, DatabaseDriver};

use crate::connection::CachedDb;
use crate::count::count_query;
use crate::history::LastFetch;
use crate::shaping::shape_list;

fn reject_per_row(request: &QueryRequest, operation: &str) -> DbmcResult<()> {
    if let CacheDirective::PerRow(_) = request.options.cache {
        return Err(DbmcError::invalid_request(format!(
            "per-row caching is not supported by {}",
            operation
        )));
    }
    Ok(())
}

impl<D: DatabaseDriver, C: CacheStore> CachedDb<D, C> {
    /// Fetch all rows.
    ///
    /// Per-row reads return `RowSet::Grouped` when grouping is requested.
    /// Otherwise the result is a list, or `RowSet::Indexed` with `index_by`.
    pub fn fetch_array(&mut self, request: &QueryRequest) -> DbmcResult<RowSet> {
        self.reset_last_error();
        let outcome = self.fetch_array_inner(request);
        self.settle(outcome)
    }

    /// Fetch the first row, `None` when the query matches nothing.
    pub fn fetch_row(&mut self, request: &QueryRequest) -> DbmcResult<Option<Row>> {
        self.reset_last_error();
        let outcome = self.fetch_row_inner(request);
        self.settle(outcome)
    }

    /// Fetch the first column of the first row.
    pub fn fetch_column(&mut self, request: &QueryRequest) -> DbmcResult<Option<Value>> {
        self.reset_last_error();
        let outcome = request
            .validate()
            .and_then(|()| reject_per_row(request, "fetch_column"))
            .and_then(|()| {
                self.remember_fetch(request, ReadShape::Scalar);
                self.scalar_read(request)
            });
        self.settle(outcome)
    }

    /// Fetch all rows plus the number of rows matching without paging.
    ///
    /// The total comes from a `COUNT(*)` rewrite of the same query, without
    /// its paging clauses and their parameters. Only whole-result caching
    /// applies.
    pub fn fetch_array_with_count(&mut self, request: &QueryRequest) -> DbmcResult<RowsWithCount> {
        self.reset_last_error();
        let outcome = self.fetch_array_with_count_inner(request);
        self.settle(outcome)
    }

    fn remember_fetch(&mut self, request: &QueryRequest, shape: ReadShape) {
        self.last_fetch = Some(LastFetch {
            sql: request.sql.clone(),
            params: request.params.clone(),
            options: request.options.clone(),
            shape,
        });
    }

    fn fetch_array_inner(&mut self, request: &QueryRequest) -> DbmcResult<RowSet> {
        request.validate()?;
        let index_by = request.options.index_by.as_deref();

        match &request.options.cache {
            CacheDirective::PerRow(per_row) => self.fetch_per_row(request, per_row),
            CacheDirective::WholeResult(whole) => {
                self.remember_fetch(request, ReadShape::Rows);
                let rows = self.whole_result(
                    request,
                    whole,
                    ReadShape::Rows,
                    |value| match value {
                        CacheValue::Rows(rows) => Some(rows),
                        CacheValue::Empty => Some(Vec::new()),
                        _ => None,
                    },
                    |db| db.db_fetch_rows(&request.sql, &request.params),
                    |rows| CacheValue::Rows(rows.clone()),
                )?;
                Ok(shape_list(rows, index_by))
            }
            CacheDirective::Disabled => {
                self.remember_fetch(request, ReadShape::Rows);
                let rows = self.db_fetch_rows(&request.sql, &request.params)?;
                Ok(shape_list(rows, index_by))
            }
        }
    }

    fn fetch_row_inner(&mut self, request: &QueryRequest) -> DbmcResult<Option<Row>> {
        request.validate()?;
        reject_per_row(request, "fetch_row")?;
        self.remember_fetch(request, ReadShape::Row);

        match &request.options.cache {
            CacheDirective::WholeResult(whole) => self.whole_result(
                request,
                whole,
                ReadShape::Row,
                |value| match value {
                    CacheValue::Row(row) => Some(Some(row)),
                    CacheValue::Empty => Some(None),
                    _ => None,
                },
                |db| db.db_fetch_row(&request.sql, &request.params),
                |row| row.clone().map_or(CacheValue::Empty, CacheValue::Row),
            ),
            _ => self.db_fetch_row(&request.sql, &request.params),
        }
    }

    /// Scalar read without touching the last-fetch record.
    pub(crate) fn scalar_read(&mut self, request: &QueryRequest) -> DbmcResult<Option<Value>> {
        request.validate()?;
        reject_per_row(request, "fetch_column")?;

        match &request.options.cache {
            CacheDirective::WholeResult(whole) => self.whole_result(
                request,
                whole,
                ReadShape::Scalar,
                |value| match value {
                    CacheValue::Scalar(v) => Some(Some(v)),
                    CacheValue::Empty => Some(None),
                    _ => None,
                },
                |db| db.db_fetch_scalar(&request.sql, &request.params),
                |v| v.clone().map_or(CacheValue::Empty, CacheValue::Scalar),
            ),
            _ => self.db_fetch_scalar(&request.sql, &request.params),
        }
    }

    fn fetch_array_with_count_inner(&mut self, request: &QueryRequest) -> DbmcResult<RowsWithCount> {
        request.validate()?;
        reject_per_row(request, "fetch_array_with_count")?;

        let count = count_query(&request.sql, &request.params)?;
        let load = |db: &mut Self| -> DbmcResult<RowsWithCount> {
            let rows = db.db_fetch_rows(&request.sql, &request.params)?;
            let total = db
                .db_fetch_scalar(&count.sql, &count.params)?
                .and_then(|v| v.as_i64())
                .unwrap_or(0);
            Ok(RowsWithCount { rows, total })
        };

        match &request.options.cache {
            CacheDirective::WholeResult(whole) => self.whole_result(
                request,
                whole,
                ReadShape::Page,
                |value| match value {
                    CacheValue::Page(page) => Some(page),
                    _ => None,
                },
                load,
                |page| CacheValue::Page(page.clone()),
            ),
            _ => load(self),
        }
    }

    /// Whole-result read: versioned key, cache lookup, load and write-back.
    fn whole_result<T, Dec, Load, Enc>(
        &mut self,
        request: &QueryRequest,
        whole: &WholeResultCache,
        shape: ReadShape,
        decode: Dec,
        load: Load,
        encode: Enc,
    ) -> DbmcResult<T>
    where
        Dec: FnOnce(CacheValue) -> Option<T>,
        Load: FnOnce(&mut Self) -> DbmcResult<T>,
        Enc: FnOnce(&T) -> CacheValue,
    {
        let ttl: Option<Duration> = self.effective_ttl(request.options.ttl);
        let base = whole.base_key(&request.sql, &request.params, shape);
        let key = self.versioned_key(base, &whole.version_keys, ttl);

        if !request.options.renew {
            match self.cache_get(&key).map(decode) {
                Some(Some(value)) => {
                    debug!(key = %key, "whole-result cache hit");
                    return Ok(value);
                }
                Some(None) => debug!(key = %key, "cached value has wrong shape, treating as miss"),
                None => debug!(key = %key, "whole-result cache miss"),
            }
        }

        let value = load(self)?;
        self.cache_set(&key, encode(&value), ttl);
        debug!(key = %key, "whole-result write-back");
        Ok(value)
    }
}
