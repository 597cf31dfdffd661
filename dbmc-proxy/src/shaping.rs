//! Re-indexing and grouping of result rows.

use indexmap::IndexMap;
use tracing::warn;

use dbmc_core::{GroupBy, GroupItem, Row, RowSet, Value};

/// Lookup key of a row's column, `None` when missing or NULL.
pub fn row_key(row: &Row, column: &str) -> Option<String> {
    row.get(column).and_then(Value::lookup_key)
}

/// Index rows by a column.
///
/// Later rows replace earlier rows with the same key. If any row has no
/// usable value in `column` the rows are returned unindexed.
pub fn index_rows(rows: Vec<Row>, column: &str) -> RowSet {
    if rows.iter().any(|r| row_key(r, column).is_none()) {
        warn!(column, "cannot index rows by column, returning list");
        return RowSet::List(rows);
    }

    let mut indexed = IndexMap::with_capacity(rows.len());
    for row in rows {
        if let Some(key) = row_key(&row, column) {
            indexed.insert(key, row);
        }
    }
    RowSet::Indexed(indexed)
}

/// Apply an optional `index_by` to a list result.
pub fn shape_list(rows: Vec<Row>, index_by: Option<&str>) -> RowSet {
    match index_by {
        Some(column) => index_rows(rows, column),
        None => RowSet::List(rows),
    }
}

/// Group rows by a column, reducing each row per `group`.
///
/// Rows without a usable value in `column` are dropped.
pub fn group_rows(rows: Vec<Row>, column: &str, group: &GroupBy) -> IndexMap<String, Vec<GroupItem>> {
    let mut groups: IndexMap<String, Vec<GroupItem>> = IndexMap::new();
    let mut dropped = 0usize;

    for row in rows {
        match row_key(&row, column) {
            Some(key) => groups.entry(key).or_default().push(group_item(row, group)),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        warn!(column, dropped, "rows without group column dropped");
    }
    groups
}

fn group_item(row: Row, group: &GroupBy) -> GroupItem {
    if group.selection.is_empty() {
        return GroupItem::Row(row);
    }

    if group.direct_value {
        let value = group
            .selection
            .iter()
            .find_map(|col| row.get(col).filter(|v| !v.is_null()).cloned())
            .unwrap_or(Value::Null);
        return GroupItem::Value(value);
    }

    let selected: Row = group
        .selection
        .iter()
        .filter_map(|col| row.get(col).map(|v| (col.clone(), v.clone())))
        .collect();
    GroupItem::Row(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbmc_core::row;

    fn catalog() -> Vec<Row> {
        vec![
            row([("id", Value::Int(100)), ("name", Value::from("foo")), ("catalog_id", Value::Int(1))]),
            row([("id", Value::Int(101)), ("name", Value::from("bar")), ("catalog_id", Value::Int(1))]),
            row([("id", Value::Int(103)), ("name", Value::from("baz")), ("catalog_id", Value::Int(2))]),
        ]
    }

    #[test]
    fn test_index_rows_by_column() {
        let set = index_rows(catalog(), "id");
        let indexed = set.as_indexed().unwrap();
        assert_eq!(indexed.keys().collect::<Vec<_>>(), vec!["100", "101", "103"]);
    }

    #[test]
    fn test_index_rows_falls_back_to_list() {
        let mut rows = catalog();
        rows.push(row([("name", Value::from("no id"))]));
        assert!(matches!(index_rows(rows, "id"), RowSet::List(r) if r.len() == 4));
    }

    #[test]
    fn test_group_full_rows() {
        let groups = group_rows(catalog(), "catalog_id", &GroupBy::full_rows());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["1"].len(), 2);
        assert_eq!(groups["2"].len(), 1);
    }

    #[test]
    fn test_group_selected_columns() {
        let groups = group_rows(catalog(), "catalog_id", &GroupBy::select(["id"]));
        assert_eq!(
            groups["1"],
            vec![
                GroupItem::Row(row([("id", 100)])),
                GroupItem::Row(row([("id", 101)])),
            ]
        );
    }

    #[test]
    fn test_group_direct_values() {
        let groups = group_rows(catalog(), "catalog_id", &GroupBy::values_of("id"));
        assert_eq!(
            groups["1"],
            vec![GroupItem::Value(Value::Int(100)), GroupItem::Value(Value::Int(101))]
        );
        assert_eq!(groups["2"], vec![GroupItem::Value(Value::Int(103))]);
    }

    #[test]
    fn test_group_drops_rows_without_key() {
        let mut rows = catalog();
        rows.insert(0, row([("id", Value::Int(1)), ("catalog_id", Value::Null)]));
        let groups = group_rows(rows, "catalog_id", &GroupBy::full_rows());
        assert_eq!(groups.values().map(Vec::len).sum::<usize>(), 3);
    }
}
