//! Shapes returned by the read operations and stored in the cache.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{Row, Value};

/// One member of a grouped per-row result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GroupItem {
    /// A full row or a row reduced to the selected columns.
    Row(Row),
    /// A bare column value (direct-value grouping).
    Value(Value),
}

/// Result of a list read.
#[derive(Debug, Clone, PartialEq)]
pub enum RowSet {
    /// Rows in result order.
    List(Vec<Row>),
    /// Rows keyed by the lookup key of an index column.
    Indexed(IndexMap<String, Row>),
    /// Groups keyed by the lookup key of the per-row lookup column.
    Grouped(IndexMap<String, Vec<GroupItem>>),
}

impl RowSet {
    /// Number of top-level entries (rows or groups).
    pub fn len(&self) -> usize {
        match self {
            RowSet::List(rows) => rows.len(),
            RowSet::Indexed(map) => map.len(),
            RowSet::Grouped(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten to rows, dropping keys. Direct-value group items are skipped.
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            RowSet::List(rows) => rows,
            RowSet::Indexed(map) => map.into_values().collect(),
            RowSet::Grouped(map) => map
                .into_values()
                .flatten()
                .filter_map(|item| match item {
                    GroupItem::Row(row) => Some(row),
                    GroupItem::Value(_) => None,
                })
                .collect(),
        }
    }

    /// Borrow the list variant.
    pub fn as_list(&self) -> Option<&[Row]> {
        match self {
            RowSet::List(rows) => Some(rows),
            _ => None,
        }
    }

    /// Borrow the indexed variant.
    pub fn as_indexed(&self) -> Option<&IndexMap<String, Row>> {
        match self {
            RowSet::Indexed(map) => Some(map),
            _ => None,
        }
    }

    /// Borrow the grouped variant.
    pub fn as_grouped(&self) -> Option<&IndexMap<String, Vec<GroupItem>>> {
        match self {
            RowSet::Grouped(map) => Some(map),
            _ => None,
        }
    }
}

/// Rows plus the total number of rows matching the query without paging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowsWithCount {
    pub rows: Vec<Row>,
    pub total: i64,
}

/// A list result paired with the count of all matching rows.
#[derive(Debug, Clone, PartialEq)]
pub struct CountAndItems {
    pub count: i64,
    pub items: RowSet,
}

/// Everything the proxy writes to the cache store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CacheValue {
    /// Present-but-empty marker: the lookup is known to yield nothing.
    Empty,
    /// One row (per-row entry or a whole-result single row).
    Row(Row),
    /// One per-row group.
    Group(Vec<GroupItem>),
    /// A whole list result.
    Rows(Vec<Row>),
    /// A whole scalar result.
    Scalar(Value),
    /// A whole rows-with-count result.
    Page(RowsWithCount),
    /// A version token.
    Token(i64),
}

impl CacheValue {
    pub fn is_empty_marker(&self) -> bool {
        matches!(self, CacheValue::Empty)
    }
}
