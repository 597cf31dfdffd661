//! DBMC Core - Data Types
//!
//! Pure data structures shared by the proxy, the driver and the cache
//! store. This crate performs no I/O.

pub mod config;
pub mod envelope;
pub mod error;
pub mod request;
pub mod result;
pub mod value;

pub use config::{ProxyConfig, DEFAULT_COUNT_CACHE_TTL_SECS, DEFAULT_LOOKUP_COLUMN};
pub use envelope::{ExecOutcome, ResultEnvelope};
pub use error::{CacheError, ConfigError, DbmcError, DbmcResult, DriverError};
pub use request::{
    derive_cache_key, CacheDirective, GroupBy, PerRowCache, QueryRequest, ReadOptions,
    ReadShape, WholeResultCache,
};
pub use result::{CacheValue, CountAndItems, GroupItem, RowSet, RowsWithCount};
pub use value::{row, Row, Value};
