//! Per-connection records: last error, last read, collected statements.

use std::fmt;

use dbmc_core::{DbmcError, ReadOptions, ReadShape, Value};

/// Diagnostics of the most recent failed call on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastError {
    pub message: String,
    pub code: String,
}

impl From<&DbmcError> for LastError {
    fn from(err: &DbmcError) -> Self {
        Self {
            message: err.message(),
            code: err.code().to_string(),
        }
    }
}

/// The most recent read, in a form that can be executed again.
///
/// For per-row reads the SQL already carries the `IN (...)` clause over
/// every requested key and `params` holds those keys, so a `COUNT(*)`
/// rewrite of it counts the complete result rather than the cache misses.
#[derive(Debug, Clone, PartialEq)]
pub struct LastFetch {
    pub sql: String,
    pub params: Vec<Value>,
    pub options: ReadOptions,
    pub shape: ReadShape,
}

/// One statement sent to the driver while query collection was on.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

impl fmt::Display for CollectedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)?;
        if !self.params.is_empty() {
            let bound: Vec<String> = self.params.iter().map(ToString::to_string).collect();
            write!(f, " [{}]", bound.join(", "))?;
        }
        Ok(())
    }
}
