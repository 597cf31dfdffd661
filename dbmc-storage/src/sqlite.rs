//! SQLite driver backed by rusqlite.
//!
//! A complete [`DatabaseDriver`] over a single `rusqlite::Connection`. SQLite
//! supports `SAVEPOINT` / `ROLLBACK TO` / `RELEASE` inside a `BEGIN`, so it
//! exercises the nested transaction manager end to end.

use std::path::Path;

use dbmc_core::{DriverError, ExecOutcome, Row, Value};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use tracing::trace;

use crate::driver::{DatabaseDriver, DriverResult};

/// Code used for rusqlite errors that carry no SQLite result code.
const GENERIC_ERROR_CODE: &str = "HY000";

/// SQLite connection wrapped as a [`DatabaseDriver`].
pub struct SqliteDriver {
    conn: Connection,
}

impl SqliteDriver {
    /// Open (or create) a database file.
    pub fn open<P: AsRef<Path>>(path: P) -> DriverResult<Self> {
        let conn = Connection::open(path).map_err(driver_error)?;
        Ok(Self { conn })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> DriverResult<Self> {
        let conn = Connection::open_in_memory().map_err(driver_error)?;
        Ok(Self { conn })
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Run a batch of statements without parameters (schema setup, seeding).
    pub fn execute_batch(&mut self, sql: &str) -> DriverResult<()> {
        self.conn.execute_batch(sql).map_err(driver_error)
    }

    /// Borrow the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Whether SQLite is currently outside any transaction.
    pub fn is_autocommit(&self) -> bool {
        self.conn.is_autocommit()
    }
}

impl DatabaseDriver for SqliteDriver {
    fn execute(&mut self, sql: &str, params: &[Value]) -> DriverResult<ExecOutcome> {
        trace!(sql, params = params.len(), "sqlite execute");
        let affected = self
            .conn
            .execute(sql, params_from_iter(params.iter().map(to_sql_value)))
            .map_err(driver_error)?;

        let insert_id = if affected > 0 && is_insert(sql) {
            Some(self.conn.last_insert_rowid())
        } else {
            None
        };

        Ok(ExecOutcome {
            affected_rows: affected as u64,
            insert_id,
        })
    }

    fn fetch_rows(&mut self, sql: &str, params: &[Value]) -> DriverResult<Vec<Row>> {
        trace!(sql, params = params.len(), "sqlite fetch");
        let mut stmt = self.conn.prepare(sql).map_err(driver_error)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt
            .query(params_from_iter(params.iter().map(to_sql_value)))
            .map_err(driver_error)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(driver_error)? {
            let mut r = Row::with_capacity(columns.len());
            for (i, name) in columns.iter().enumerate() {
                let value = row.get_ref(i).map_err(driver_error)?;
                r.insert(name.clone(), from_value_ref(value));
            }
            out.push(r);
        }
        Ok(out)
    }

    fn begin(&mut self) -> DriverResult<()> {
        self.conn.execute_batch("BEGIN").map_err(driver_error)
    }

    fn commit(&mut self) -> DriverResult<()> {
        self.conn.execute_batch("COMMIT").map_err(driver_error)
    }

    fn rollback(&mut self) -> DriverResult<()> {
        self.conn.execute_batch("ROLLBACK").map_err(driver_error)
    }
}

fn is_insert(sql: &str) -> bool {
    let head = sql.trim_start();
    let keyword: String = head
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();
    keyword == "INSERT" || keyword == "REPLACE"
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
    }
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

fn driver_error(e: rusqlite::Error) -> DriverError {
    match &e {
        rusqlite::Error::SqliteFailure(failure, message) => DriverError::new(
            message.clone().unwrap_or_else(|| failure.to_string()),
            failure.extended_code.to_string(),
        ),
        other => DriverError::new(other.to_string(), GENERIC_ERROR_CODE),
    }
}
