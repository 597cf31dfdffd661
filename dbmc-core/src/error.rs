//! Error types for DBMC operations

use thiserror::Error;

/// Failure reported by the raw database driver.
///
/// Carries the driver's message and its native error code (SQLSTATE,
/// vendor code, ...) verbatim so callers can inspect it through the
/// connection's last-error slot.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message} (code {code})")]
pub struct DriverError {
    pub message: String,
    pub code: String,
}

impl DriverError {
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
        }
    }
}

/// Cache store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache backend failure: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all DBMC errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DbmcError {
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Cannot {operation} at transaction depth {depth}")]
    TransactionState { operation: &'static str, depth: u32 },

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl DbmcError {
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        DbmcError::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Stable error code recorded in the last-error slot.
    ///
    /// Driver errors keep the driver's own code; everything else maps to a
    /// fixed identifier.
    pub fn code(&self) -> &str {
        match self {
            DbmcError::InvalidRequest { .. } => "invalid_request",
            DbmcError::Driver(e) => &e.code,
            DbmcError::TransactionState { .. } => "transaction_state",
            DbmcError::Cache(_) => "cache",
            DbmcError::Config(_) => "config",
        }
    }

    /// Human-readable message recorded in the last-error slot.
    pub fn message(&self) -> String {
        match self {
            DbmcError::Driver(e) => e.message.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type alias for DBMC operations.
pub type DbmcResult<T> = Result<T, DbmcError>;

// =============================================================================
// TESTS
// =============================================================================
