//! DBMC Storage - Driver and Cache Store Seams
//!
//! The two collaborators the proxy depends on, expressed as traits, plus
//! the implementations shipped with the workspace:
//!
//! - [`DatabaseDriver`] with [`SqliteDriver`] (rusqlite)
//! - [`CacheStore`] with [`InMemoryCacheStore`] and [`LmdbCacheStore`] (heed)

pub mod cache;
pub mod driver;
pub mod sqlite;

pub use cache::{
    CacheResult, CacheStats, CacheStore, InMemoryCacheStore, LmdbCacheConfig, LmdbCacheError,
    LmdbCacheStore,
};
pub use driver::{DatabaseDriver, DriverResult};
pub use sqlite::SqliteDriver;
