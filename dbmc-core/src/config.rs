//! Configuration types

use std::time::Duration;

use crate::ConfigError;

/// Default TTL for inherited `_count` cache entries.
pub const DEFAULT_COUNT_CACHE_TTL_SECS: u64 = 1200;

/// Default per-row lookup column.
pub const DEFAULT_LOOKUP_COLUMN: &str = "id";

/// Proxy-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Record every statement sent to the driver.
    pub collect_queries: bool,
    /// TTL used when a read does not set one. `None` defers to the store.
    pub default_ttl: Option<Duration>,
    /// TTL for `_count` entries inherited from a previous read without a TTL.
    pub count_cache_ttl: Duration,
    /// Lookup column for per-row reads that do not name one.
    pub default_lookup_column: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            collect_queries: false,
            default_ttl: None,
            count_cache_ttl: Duration::from_secs(DEFAULT_COUNT_CACHE_TTL_SECS),
            default_lookup_column: DEFAULT_LOOKUP_COLUMN.to_string(),
        }
    }
}

impl ProxyConfig {
    /// Create ProxyConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `DBMC_COLLECT_QUERIES`: record executed statements (default: false)
    /// - `DBMC_DEFAULT_TTL_SECS`: default cache TTL (default: unset)
    /// - `DBMC_COUNT_CACHE_TTL_SECS`: TTL for inherited count entries (default: 1200)
    /// - `DBMC_LOOKUP_COLUMN`: default per-row lookup column (default: id)
    pub fn from_env() -> Self {
        let collect_queries = std::env::var("DBMC_COLLECT_QUERIES")
            .ok()
            .map(|s| matches!(s.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let default_ttl = std::env::var("DBMC_DEFAULT_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs);

        let count_cache_ttl = Duration::from_secs(
            std::env::var("DBMC_COUNT_CACHE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_COUNT_CACHE_TTL_SECS),
        );

        let default_lookup_column = std::env::var("DBMC_LOOKUP_COLUMN")
            .unwrap_or_else(|_| DEFAULT_LOOKUP_COLUMN.to_string());

        Self {
            collect_queries,
            default_ttl,
            count_cache_ttl,
            default_lookup_column,
        }
    }

    /// Enable statement collection.
    pub fn with_collect_queries(mut self, enabled: bool) -> Self {
        self.collect_queries = enabled;
        self
    }

    /// Set the default TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Set the TTL for inherited count entries.
    pub fn with_count_cache_ttl(mut self, ttl: Duration) -> Self {
        self.count_cache_ttl = ttl;
        self
    }

    /// Set the default lookup column.
    pub fn with_lookup_column(mut self, column: impl Into<String>) -> Self {
        self.default_lookup_column = column.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_lookup_column.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "default_lookup_column".to_string(),
                value: self.default_lookup_column.clone(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.count_cache_ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "count_cache_ttl".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}
