//! Cache store abstraction and implementations.
//!
//! The proxy treats the cache as a shared, weakly consistent key/value
//! store: no locking across connections, last write wins per key. Entries
//! are invalidated by explicit deletion or by bumping a version token,
//! never by coordination.
//!
//! # Implementations
//!
//! - [`InMemoryCacheStore`]: process-local `HashMap`, lazy TTL expiry
//! - [`LmdbCacheStore`]: memory-mapped LMDB environment, shared across
//!   processes on one host and persistent across restarts
//!
//! # Example
//!
//! ```ignore
//! let store = Arc::new(InMemoryCacheStore::new());
//! store.set("user_1", CacheValue::Empty, Some(Duration::from_secs(60)))?;
//! assert!(store.get("user_1")?.is_some());
//! ```

pub mod lmdb_backend;
pub mod memory;
pub mod traits;

pub use lmdb_backend::{LmdbCacheConfig, LmdbCacheError, LmdbCacheStore};
pub use memory::InMemoryCacheStore;
pub use traits::{CacheResult, CacheStats, CacheStore};
