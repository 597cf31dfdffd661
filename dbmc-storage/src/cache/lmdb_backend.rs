//! LMDB-backed cache store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped
//! key-value store that survives process restarts and can be shared by
//! several processes on one host.
//!
//! # Entry Format
//!
//! Each value is stored as:
//! - Bytes 0-7: expiry as Unix milliseconds, little endian (`i64::MAX` = never)
//! - Bytes 8..: the [`CacheValue`] as JSON
//!
//! LMDB has no native TTL. Expired entries read as misses and are removed by
//! [`LmdbCacheStore::purge_expired`].
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The store uses:
//! - One read transaction per `get` / `get_multi`
//! - One write transaction per `set`, `set_multi`, `delete` and purge

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use chrono::Utc;
use dbmc_core::{CacheError, CacheValue, ConfigError};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use tracing::debug;

use super::traits::{CacheResult, CacheStats, CacheStore};

/// Expiry marker for entries without a TTL.
const NO_EXPIRY: i64 = i64::MAX;

/// Size of the expiry header.
const HEADER_LEN: usize = 8;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for CacheError {
    fn from(e: LmdbCacheError) -> Self {
        match e {
            LmdbCacheError::Serialization(msg) => CacheError::Serialization(msg),
            LmdbCacheError::Deserialization(msg) => CacheError::Deserialization(msg),
            LmdbCacheError::Io(io) => CacheError::Io(io.to_string()),
            other => CacheError::Backend(other.to_string()),
        }
    }
}

fn txn_error(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

/// Location and size of the LMDB environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LmdbCacheConfig {
    /// Directory holding the LMDB files.
    pub path: PathBuf,
    /// Map size in megabytes.
    pub max_size_mb: usize,
}

impl Default for LmdbCacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./dbmc-cache"),
            max_size_mb: 256,
        }
    }
}

impl LmdbCacheConfig {
    /// Create LmdbCacheConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `DBMC_LMDB_PATH`: directory for the LMDB files (default: ./dbmc-cache)
    /// - `DBMC_LMDB_MAX_SIZE_MB`: map size in megabytes (default: 256)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            path: std::env::var("DBMC_LMDB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.path),
            max_size_mb: std::env::var("DBMC_LMDB_MAX_SIZE_MB")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size_mb),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_size_mb".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// LMDB-backed [`CacheStore`].
///
/// # Example
///
/// ```ignore
/// use dbmc_storage::cache::{CacheStore, LmdbCacheStore};
/// use dbmc_core::CacheValue;
///
/// let store = LmdbCacheStore::new("/tmp/dbmc-cache", 64)?;
/// store.set("user_1", CacheValue::Empty, Some(Duration::from_secs(60)))?;
/// let cached = store.get("user_1")?;
/// ```
pub struct LmdbCacheStore {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
    /// Hit/miss statistics.
    stats: RwLock<CacheStats>,
}

impl LmdbCacheStore {
    /// Create a new LMDB cache store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment directory is owned by this store; callers must
        // not open the same path with incompatible flags in this process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_error)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_error)?;

        Ok(Self {
            env,
            db,
            stats: RwLock::new(CacheStats::default()),
        })
    }

    /// Open a store from configuration.
    pub fn open(config: &LmdbCacheConfig) -> Result<Self, LmdbCacheError> {
        config
            .validate()
            .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;
        Self::new(&config.path, config.max_size_mb)
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn purge_expired(&self) -> Result<u64, LmdbCacheError> {
        let now = Utc::now().timestamp_millis();
        let expired: Vec<Vec<u8>> = {
            let rtxn = self.env.read_txn().map_err(txn_error)?;
            let iter = self.db.iter(&rtxn).map_err(txn_error)?;
            let mut keys = Vec::new();
            for item in iter {
                let (key, bytes) = item.map_err(txn_error)?;
                if decode_expiry(bytes).is_some_and(|at| now >= at) {
                    keys.push(key.to_vec());
                }
            }
            keys
        };

        if expired.is_empty() {
            return Ok(0);
        }

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        for key in &expired {
            self.db.delete(&mut wtxn, key).map_err(txn_error)?;
        }
        wtxn.commit().map_err(txn_error)?;

        if let Ok(mut stats) = self.stats.write() {
            stats.expirations += expired.len() as u64;
        }
        debug!(count = expired.len(), "purged expired cache entries");
        Ok(expired.len() as u64)
    }

    fn record(&self, hit: bool) {
        if let Ok(mut stats) = self.stats.write() {
            if hit {
                stats.hits += 1;
            } else {
                stats.misses += 1;
            }
        }
    }

    /// Decode a stored entry, `None` when expired.
    fn decode_live(&self, bytes: &[u8], now: i64) -> Result<Option<CacheValue>, LmdbCacheError> {
        let expires_at = decode_expiry(bytes)
            .ok_or_else(|| LmdbCacheError::Deserialization("truncated entry header".into()))?;
        if now >= expires_at {
            return Ok(None);
        }
        let value = serde_json::from_slice(&bytes[HEADER_LEN..])
            .map_err(|e| LmdbCacheError::Deserialization(e.to_string()))?;
        Ok(Some(value))
    }
}

fn decode_expiry(bytes: &[u8]) -> Option<i64> {
    let header: [u8; HEADER_LEN] = bytes.get(..HEADER_LEN)?.try_into().ok()?;
    Some(i64::from_le_bytes(header))
}

fn encode_entry(value: &CacheValue, ttl: Option<Duration>) -> Result<Vec<u8>, LmdbCacheError> {
    let expires_at = match ttl {
        Some(d) => Utc::now()
            .timestamp_millis()
            .saturating_add(i64::try_from(d.as_millis()).unwrap_or(i64::MAX)),
        None => NO_EXPIRY,
    };
    let json = serde_json::to_vec(value).map_err(|e| LmdbCacheError::Serialization(e.to_string()))?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + json.len());
    bytes.extend_from_slice(&expires_at.to_le_bytes());
    bytes.extend_from_slice(&json);
    Ok(bytes)
}

impl CacheStore for LmdbCacheStore {
    fn get(&self, key: &str) -> CacheResult<Option<CacheValue>> {
        let now = Utc::now().timestamp_millis();
        let rtxn = self.env.read_txn().map_err(txn_error)?;

        let found = match self.db.get(&rtxn, key.as_bytes()).map_err(txn_error)? {
            Some(bytes) => self.decode_live(bytes, now)?,
            None => None,
        };
        self.record(found.is_some());
        Ok(found)
    }

    fn get_multi(&self, keys: &[String]) -> CacheResult<HashMap<String, CacheValue>> {
        let now = Utc::now().timestamp_millis();
        let rtxn = self.env.read_txn().map_err(txn_error)?;

        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            let value = match self.db.get(&rtxn, key.as_bytes()).map_err(txn_error)? {
                Some(bytes) => self.decode_live(bytes, now)?,
                None => None,
            };
            self.record(value.is_some());
            if let Some(value) = value {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> CacheResult<()> {
        let bytes = encode_entry(&value, ttl)?;
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        self.db
            .put(&mut wtxn, key.as_bytes(), &bytes)
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(())
    }

    fn set_multi(&self, entries: Vec<(String, CacheValue)>, ttl: Option<Duration>) -> CacheResult<()> {
        let encoded = entries
            .iter()
            .map(|(key, value)| Ok((key.as_bytes(), encode_entry(value, ttl)?)))
            .collect::<Result<Vec<_>, LmdbCacheError>>()?;

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        for (key, bytes) in &encoded {
            self.db.put(&mut wtxn, key, bytes).map_err(txn_error)?;
        }
        wtxn.commit().map_err(txn_error)?;
        Ok(())
    }

    fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let mut deleted = 0;
        for key in keys {
            if self.db.delete(&mut wtxn, key.as_bytes()).map_err(txn_error)? {
                deleted += 1;
            }
        }
        wtxn.commit().map_err(txn_error)?;
        Ok(deleted)
    }

    fn stats(&self) -> CacheStats {
        let mut stats = self.stats.read().map(|s| s.clone()).unwrap_or_default();
        if let Ok(rtxn) = self.env.read_txn() {
            if let Ok(len) = self.db.len(&rtxn) {
                stats.entry_count = len;
            }
        }
        stats
    }
}
