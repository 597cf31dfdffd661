//! Nested transactions on top of one physical transaction.
//!
//! The driver offers a single `BEGIN`/`COMMIT`/`ROLLBACK`. Nesting is
//! emulated with savepoints named after the depth at which they were
//! opened:
//!
//! | call       | depth before | statement                          | depth after |
//! |------------|--------------|------------------------------------|-------------|
//! | `start`    | 0            | `BEGIN`                            | 1           |
//! | `start`    | n > 0        | `SAVEPOINT dbmc_<n>`               | n + 1       |
//! | `commit`   | 1            | `COMMIT`                           | 0           |
//! | `commit`   | n > 1        | `RELEASE SAVEPOINT dbmc_<n-1>`     | n - 1       |
//! | `rollback` | 1            | `ROLLBACK`                         | 0           |
//! | `rollback` | n > 1        | `ROLLBACK TO SAVEPOINT dbmc_<n-1>` | n - 1       |
//!
//! Ending at depth 0 fails with [`DbmcError::TransactionState`] and changes
//! nothing. A failed statement leaves the depth unchanged.
//!
//! Savepoint names carry no scope identity, so nested scopes on one
//! connection must end in strict LIFO order. Callers guarantee this; the
//! counter cannot detect a violation.

use dbmc_core::{DbmcError, DbmcResult};
use dbmc_storage::{CacheStore, DatabaseDriver};
use tracing::debug;

use crate::connection::CachedDb;
use crate::guard::TransactionGuard;

/// Prefix of every savepoint issued by the manager.
pub const SAVEPOINT_PREFIX: &str = "dbmc_";

/// Savepoint name for a depth.
pub fn savepoint_name(depth: u32) -> String {
    format!("{}{}", SAVEPOINT_PREFIX, depth)
}

/// A statement marking a transaction boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Begin,
    Savepoint(u32),
    Commit,
    Release(u32),
    Rollback,
    RollbackTo(u32),
}

impl Boundary {
    /// Whether this touches the physical transaction rather than a savepoint.
    pub fn is_physical(&self) -> bool {
        matches!(self, Boundary::Begin | Boundary::Commit | Boundary::Rollback)
    }

    /// SQL text of the boundary.
    pub fn sql(&self) -> String {
        match self {
            Boundary::Begin => "BEGIN".to_string(),
            Boundary::Commit => "COMMIT".to_string(),
            Boundary::Rollback => "ROLLBACK".to_string(),
            Boundary::Savepoint(n) => format!("SAVEPOINT {}", savepoint_name(*n)),
            Boundary::Release(n) => format!("RELEASE SAVEPOINT {}", savepoint_name(*n)),
            Boundary::RollbackTo(n) => format!("ROLLBACK TO SAVEPOINT {}", savepoint_name(*n)),
        }
    }
}

/// Transaction nesting depth of one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionState {
    depth: u32,
}

impl TransactionState {
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Boundary to issue for a start at the current depth.
    pub fn plan_start(&self) -> Boundary {
        if self.depth == 0 {
            Boundary::Begin
        } else {
            Boundary::Savepoint(self.depth)
        }
    }

    /// Boundary and resulting depth for a commit, `None` at depth 0.
    pub fn plan_commit(&self) -> Option<(Boundary, u32)> {
        let new_depth = self.depth.checked_sub(1)?;
        let boundary = if new_depth == 0 {
            Boundary::Commit
        } else {
            Boundary::Release(new_depth)
        };
        Some((boundary, new_depth))
    }

    /// Boundary and resulting depth for a rollback, `None` at depth 0.
    pub fn plan_rollback(&self) -> Option<(Boundary, u32)> {
        let new_depth = self.depth.checked_sub(1)?;
        let boundary = if new_depth == 0 {
            Boundary::Rollback
        } else {
            Boundary::RollbackTo(new_depth)
        };
        Some((boundary, new_depth))
    }

    fn entered(&mut self) {
        self.depth += 1;
    }

    fn left_to(&mut self, depth: u32) {
        self.depth = depth;
    }
}

impl<D: DatabaseDriver, C: CacheStore> CachedDb<D, C> {
    /// Current nesting depth; 0 outside any transaction.
    pub fn transaction_depth(&self) -> u32 {
        self.transaction.depth()
    }

    /// Begin a transaction, or a savepoint when one is already open.
    pub fn start(&mut self) -> DbmcResult<()> {
        self.reset_last_error();
        let boundary = self.transaction.plan_start();
        let outcome = self.issue(boundary);
        if outcome.is_ok() {
            self.transaction.entered();
            debug!(depth = self.transaction.depth(), statement = %boundary.sql(), "transaction start");
        }
        self.settle(outcome)
    }

    /// Commit the innermost level.
    pub fn commit(&mut self) -> DbmcResult<()> {
        self.reset_last_error();
        let outcome = match self.transaction.plan_commit() {
            Some((boundary, new_depth)) => self.end(boundary, new_depth),
            None => Err(DbmcError::TransactionState {
                operation: "commit",
                depth: 0,
            }),
        };
        self.settle(outcome)
    }

    /// Roll back the innermost level.
    pub fn rollback(&mut self) -> DbmcResult<()> {
        self.reset_last_error();
        let outcome = match self.transaction.plan_rollback() {
            Some((boundary, new_depth)) => self.end(boundary, new_depth),
            None => Err(DbmcError::TransactionState {
                operation: "rollback",
                depth: 0,
            }),
        };
        self.settle(outcome)
    }

    /// Start a transaction scope that rolls back when dropped unfinished.
    pub fn transaction(&mut self) -> TransactionGuard<'_, D, C> {
        TransactionGuard::new(self)
    }

    fn end(&mut self, boundary: Boundary, new_depth: u32) -> DbmcResult<()> {
        self.issue(boundary)?;
        self.transaction.left_to(new_depth);
        debug!(depth = new_depth, statement = %boundary.sql(), "transaction end");
        Ok(())
    }

    fn issue(&mut self, boundary: Boundary) -> DbmcResult<()> {
        let sql = boundary.sql();
        match boundary {
            Boundary::Begin => {
                self.collect(&sql, &[]);
                self.driver.begin()?;
            }
            Boundary::Commit => {
                self.collect(&sql, &[]);
                self.driver.commit()?;
            }
            Boundary::Rollback => {
                self.collect(&sql, &[]);
                self.driver.rollback()?;
            }
            Boundary::Savepoint(_) | Boundary::Release(_) | Boundary::RollbackTo(_) => {
                self.db_execute(&sql, &[])?;
            }
        }
        Ok(())
    }
}
