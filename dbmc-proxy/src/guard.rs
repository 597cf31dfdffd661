//! Scoped transaction handle.

use std::ops::{Deref, DerefMut};

use dbmc_core::{DbmcError, DbmcResult};
use dbmc_storage::{CacheStore, DatabaseDriver};
use tracing::warn;

use crate::connection::CachedDb;

/// One transaction level tied to a lexical scope.
///
/// Creating the guard calls [`CachedDb::start`] and remembers whether it
/// succeeded. A successful [`commit`](Self::commit) or
/// [`rollback`](Self::rollback) ends the level and deactivates the guard;
/// later calls fail without touching the connection. A guard dropped while
/// still active rolls its level back.
///
/// The guard derefs to the connection so statements can be issued inside
/// the scope:
///
/// ```ignore
/// let mut tx = db.transaction();
/// tx.exec("UPDATE accounts SET balance = balance - 10 WHERE id = ?", &[1.into()]);
/// tx.commit()?;
/// ```
pub struct TransactionGuard<'a, D: DatabaseDriver, C: CacheStore> {
    db: &'a mut CachedDb<D, C>,
    active: bool,
}

impl<'a, D: DatabaseDriver, C: CacheStore> TransactionGuard<'a, D, C> {
    pub fn new(db: &'a mut CachedDb<D, C>) -> Self {
        let active = match db.start() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "transaction did not start");
                false
            }
        };
        Self { db, active }
    }

    /// Whether the level was started and has not been ended yet.
    pub fn is_started(&self) -> bool {
        self.active
    }

    /// Commit the level. On failure the guard stays active, so dropping it
    /// still rolls the level back.
    pub fn commit(&mut self) -> DbmcResult<()> {
        self.ensure_active("commit")?;
        self.db.commit()?;
        self.active = false;
        Ok(())
    }

    pub fn rollback(&mut self) -> DbmcResult<()> {
        self.ensure_active("rollback")?;
        self.db.rollback()?;
        self.active = false;
        Ok(())
    }

    fn ensure_active(&self, operation: &'static str) -> DbmcResult<()> {
        if self.active {
            Ok(())
        } else {
            Err(DbmcError::TransactionState {
                operation,
                depth: self.db.transaction_depth(),
            })
        }
    }
}

impl<D: DatabaseDriver, C: CacheStore> Deref for TransactionGuard<'_, D, C> {
    type Target = CachedDb<D, C>;

    fn deref(&self) -> &Self::Target {
        self.db
    }
}

impl<D: DatabaseDriver, C: CacheStore> DerefMut for TransactionGuard<'_, D, C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.db
    }
}

impl<D: DatabaseDriver, C: CacheStore> Drop for TransactionGuard<'_, D, C> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Err(e) = self.db.rollback() {
            warn!(error = %e, "automatic rollback of unfinished transaction failed");
        }
    }
}
