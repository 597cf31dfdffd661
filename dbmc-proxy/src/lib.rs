//! DBMC Proxy - Cached Reads and Nested Transactions
//!
//! [`CachedDb`] wraps one database connection ([`DatabaseDriver`]) and a
//! shared cache store ([`CacheStore`]):
//!
//! - **Reads** (`fetch_array`, `fetch_row`, `fetch_column`,
//!   `fetch_array_with_count`) are served from the cache, the database, or
//!   a merge of both. Per-row caching resolves partial hits with a single
//!   `IN (...)` query for the misses; whole-result caching stores a
//!   complete result under one (optionally versioned) key.
//! - **Writes** (`query`, `exec`) return a [`ResultEnvelope`].
//! - **Transactions** (`start`, `commit`, `rollback`, `transaction`) nest
//!   through savepoints named `dbmc_<depth>`.
//!
//! All state besides the cache store is scoped to the connection.
//!
//! [`DatabaseDriver`]: dbmc_storage::DatabaseDriver
//! [`CacheStore`]: dbmc_storage::CacheStore
//! [`ResultEnvelope`]: dbmc_core::ResultEnvelope

pub mod connection;
pub mod count;
pub mod guard;
pub mod history;
pub mod read;
pub mod reconcile;
pub mod shaping;
pub mod transaction;
pub mod version;

pub use connection::CachedDb;
pub use count::{count_query, CountQuery, COUNT_KEY_SUFFIX};
pub use guard::TransactionGuard;
pub use history::{CollectedQuery, LastError, LastFetch};
pub use reconcile::{append_in_clause, ReconciliationState};
pub use shaping::{group_rows, index_rows};
pub use transaction::{savepoint_name, Boundary, TransactionState, SAVEPOINT_PREFIX};

pub use dbmc_core::{
    CacheValue, CountAndItems, DbmcError, DbmcResult, GroupBy, GroupItem, ProxyConfig,
    QueryRequest, ReadOptions, ReadShape, ResultEnvelope, Row, RowSet, RowsWithCount, Value,
};
