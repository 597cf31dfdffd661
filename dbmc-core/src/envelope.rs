//! Uniform result of a mutating statement.

use serde::{Deserialize, Serialize};

use crate::DriverError;

/// What the driver reports for a successfully executed statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecOutcome {
    pub affected_rows: u64,
    /// Generated key for inserts, when the driver reports one.
    pub insert_id: Option<i64>,
}

/// Result of one database call on the write path.
///
/// Created fresh per call and handed to the caller by value; the proxy
/// keeps no reference to it afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub status: bool,
    pub affected_rows: Option<u64>,
    pub insert_id: Option<i64>,
    pub message: String,
    pub error_code: String,
}

impl ResultEnvelope {
    pub fn success(outcome: ExecOutcome) -> Self {
        Self {
            status: true,
            affected_rows: Some(outcome.affected_rows),
            insert_id: outcome.insert_id,
            message: String::new(),
            error_code: String::new(),
        }
    }

    pub fn failure(error: &DriverError) -> Self {
        Self {
            status: false,
            affected_rows: None,
            insert_id: None,
            message: error.message.clone(),
            error_code: error.code.clone(),
        }
    }

    /// Failure that never reached the driver.
    pub fn rejected(message: impl Into<String>, error_code: impl Into<String>) -> Self {
        Self {
            status: false,
            affected_rows: None,
            insert_id: None,
            message: message.into(),
            error_code: error_code.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status
    }
}
