//! Raw database driver seam.
//!
//! The proxy talks to the database only through [`DatabaseDriver`]. A driver
//! wraps exactly one connection: it executes one statement at a time and
//! offers a single level of `BEGIN`/`COMMIT`/`ROLLBACK`. Nesting is layered
//! on top by the proxy using savepoints issued through [`DatabaseDriver::execute`].

use dbmc_core::{DriverError, ExecOutcome, Row, Value};

/// Result type for driver calls.
pub type DriverResult<T> = Result<T, DriverError>;

/// A single database connection.
pub trait DatabaseDriver: Send {
    /// Execute a statement that returns no rows.
    fn execute(&mut self, sql: &str, params: &[Value]) -> DriverResult<ExecOutcome>;

    /// Fetch all rows of a query.
    fn fetch_rows(&mut self, sql: &str, params: &[Value]) -> DriverResult<Vec<Row>>;

    /// Fetch the first row of a query.
    fn fetch_row(&mut self, sql: &str, params: &[Value]) -> DriverResult<Option<Row>> {
        Ok(self.fetch_rows(sql, params)?.into_iter().next())
    }

    /// Fetch the first column of the first row.
    fn fetch_scalar(&mut self, sql: &str, params: &[Value]) -> DriverResult<Option<Value>> {
        Ok(self
            .fetch_row(sql, params)?
            .and_then(|row| row.into_iter().next().map(|(_, v)| v)))
    }

    /// Open the physical transaction.
    fn begin(&mut self) -> DriverResult<()>;

    /// Commit the physical transaction.
    fn commit(&mut self) -> DriverResult<()>;

    /// Roll back the physical transaction.
    fn rollback(&mut self) -> DriverResult<()>;

    /// Quote an identifier for this dialect. ANSI double quotes by default.
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

impl<D: DatabaseDriver + ?Sized> DatabaseDriver for Box<D> {
    fn execute(&mut self, sql: &str, params: &[Value]) -> DriverResult<ExecOutcome> {
        (**self).execute(sql, params)
    }

    fn fetch_rows(&mut self, sql: &str, params: &[Value]) -> DriverResult<Vec<Row>> {
        (**self).fetch_rows(sql, params)
    }

    fn fetch_row(&mut self, sql: &str, params: &[Value]) -> DriverResult<Option<Row>> {
        (**self).fetch_row(sql, params)
    }

    fn fetch_scalar(&mut self, sql: &str, params: &[Value]) -> DriverResult<Option<Value>> {
        (**self).fetch_scalar(sql, params)
    }

    fn begin(&mut self) -> DriverResult<()> {
        (**self).begin()
    }

    fn commit(&mut self) -> DriverResult<()> {
        (**self).commit()
    }

    fn rollback(&mut self) -> DriverResult<()> {
        (**self).rollback()
    }

    fn quote_identifier(&self, name: &str) -> String {
        (**self).quote_identifier(name)
    }
}
