//! Read proxy behaviour against SQLite and the in-memory cache store.

use std::sync::Arc;
use std::time::Duration;

use dbmc_core::{derive_cache_key, ProxyConfig};
use dbmc_proxy::{CacheValue, CachedDb, GroupBy, GroupItem, QueryRequest, ReadOptions, Value};
use dbmc_storage::{CacheStore, InMemoryCacheStore, LmdbCacheStore, SqliteDriver};
use dbmc_test_utils::assertions::{assert_column_ints, assert_driver_error, assert_invalid_request};
use dbmc_test_utils::fixtures::{counting_users_db, memory_cache, user_name};
use dbmc_test_utils::generators::{arb_lookup_keys, arb_stored_ids};
use dbmc_test_utils::{CountingDriver, FailingCacheStore};
use proptest::prelude::*;

type TestDb = CachedDb<CountingDriver<SqliteDriver>, Arc<InMemoryCacheStore>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn setup<I: IntoIterator<Item = i64>>(ids: I) -> (TestDb, Arc<InMemoryCacheStore>) {
    init_tracing();
    let cache = memory_cache();
    let db = CachedDb::new(counting_users_db(ids), cache.clone());
    (db, cache)
}

fn users_by_id(keys: &[i64], options: ReadOptions) -> QueryRequest {
    QueryRequest::lookup("SELECT id, name FROM users WHERE", keys.iter().copied(), options)
}

// ============================================================================
// PER-ROW MODE
// ============================================================================

#[test]
fn test_partial_db_then_full_cache_hit() {
    let (mut db, cache) = setup([1, 3]);
    let request = users_by_id(&[1, 2, 3], ReadOptions::per_row("user_"));

    let first = db.fetch_array(&request).unwrap();
    assert_column_ints(first.as_list().unwrap(), "id", &[1, 3]);
    assert_eq!(db.driver().round_trips(), 1);
    assert_eq!(
        db.driver().statements()[0],
        "SELECT id, name FROM users WHERE \"id\" IN (?,?,?)"
    );

    assert!(matches!(cache.peek("user_1"), Some(CacheValue::Row(_))));
    assert_eq!(cache.peek("user_2"), Some(CacheValue::Empty));
    assert!(matches!(cache.peek("user_3"), Some(CacheValue::Row(_))));

    let second = db.fetch_array(&request).unwrap();
    assert_eq!(db.driver().round_trips(), 1, "second read must not touch the database");
    assert_eq!(second, first);
}

#[test]
fn test_partial_hit_queries_only_missing_keys() {
    let (mut db, _cache) = setup([1, 2, 3]);
    db.fetch_array(&users_by_id(&[1], ReadOptions::per_row("user_")))
        .unwrap();
    db.driver_mut().reset();

    let rows = db
        .fetch_array(&users_by_id(&[1, 3], ReadOptions::per_row("user_")))
        .unwrap()
        .into_rows();

    // Database rows first, then cache hits.
    assert_column_ints(&rows, "id", &[3, 1]);
    assert_eq!(
        db.driver().statements(),
        &["SELECT id, name FROM users WHERE \"id\" IN (?)".to_string()]
    );
}

#[test]
fn test_duplicate_keys_are_requested_once() {
    let (mut db, _cache) = setup([5]);
    let rows = db
        .fetch_array(&users_by_id(&[5, 5, 5], ReadOptions::per_row("user_")))
        .unwrap()
        .into_rows();
    assert_column_ints(&rows, "id", &[5]);

    let last = db.last_fetch().unwrap();
    assert_eq!(last.params, vec![Value::Int(5)]);
    assert!(last.sql.ends_with("IN (?)"));
}

#[test]
fn test_text_and_int_keys_share_cache_entries() {
    let (mut db, _cache) = setup([7]);
    db.fetch_array(&users_by_id(&[7], ReadOptions::per_row("user_")))
        .unwrap();

    let request = QueryRequest::lookup(
        "SELECT id, name FROM users WHERE",
        ["7"],
        ReadOptions::per_row("user_"),
    );
    let rows = db.fetch_array(&request).unwrap().into_rows();
    assert_column_ints(&rows, "id", &[7]);
    assert_eq!(db.driver().round_trips(), 1);
}

#[test]
fn test_renew_bypasses_lookup_but_writes_back() {
    let (mut db, cache) = setup([1]);
    db.fetch_array(&users_by_id(&[1], ReadOptions::per_row("user_")))
        .unwrap();

    assert!(db.exec("UPDATE users SET name = 'renamed' WHERE id = 1", &[]));

    let rows = db
        .fetch_array(&users_by_id(&[1], ReadOptions::per_row("user_").renew()))
        .unwrap()
        .into_rows();
    assert_eq!(rows[0]["name"], Value::from("renamed"));

    match cache.peek("user_1") {
        Some(CacheValue::Row(row)) => assert_eq!(row["name"], Value::from("renamed")),
        other => panic!("expected refreshed row, got {:?}", other),
    }
}

#[test]
fn test_index_by_on_full_hit_and_miss() {
    let (mut db, _cache) = setup([1, 3]);
    let request = users_by_id(&[1, 3], ReadOptions::per_row("user_").index_by("name"));

    for _ in 0..2 {
        let set = db.fetch_array(&request).unwrap();
        let indexed = set.as_indexed().unwrap();
        let mut keys: Vec<&String> = indexed.keys().collect();
        keys.sort();
        assert_eq!(keys, vec![&user_name(1), &user_name(3)]);
    }
    assert_eq!(db.driver().round_trips(), 1);
}

#[test]
fn test_custom_lookup_column_sql_and_trailing_clause() {
    let (mut db, cache) = setup([1, 2, 3]);
    let options = ReadOptions::per_row("uname_")
        .lookup_column("name")
        .lookup_sql("users.name")
        .trailing_sql("ORDER BY users.id DESC");
    let request = QueryRequest::lookup(
        "SELECT id, name FROM users WHERE id > 0 AND",
        ["user1", "user2"],
        options,
    );

    let rows = db.fetch_array(&request).unwrap().into_rows();
    assert_column_ints(&rows, "id", &[2, 1]);
    assert_eq!(
        db.driver().statements()[0],
        "SELECT id, name FROM users WHERE id > 0 AND users.name IN (?,?) ORDER BY users.id DESC"
    );
    assert!(cache.contains("uname_user1"));
    assert!(cache.contains("uname_user2"));
}

#[test]
fn test_grouped_rows_by_lookup_column() {
    // team_of(id) = id % 3: teams 1 -> [1, 4], 2 -> [2, 5]
    let (mut db, cache) = setup(1..=6);
    let request = QueryRequest::lookup(
        "SELECT id, team_id FROM users WHERE",
        [1, 2, 7],
        ReadOptions::per_row("team_")
            .lookup_column("team_id")
            .trailing_sql("ORDER BY id")
            .grouped(GroupBy::values_of("id")),
    );

    let first = db.fetch_array(&request).unwrap();
    let groups = first.as_grouped().unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(
        groups["1"],
        vec![GroupItem::Value(Value::Int(1)), GroupItem::Value(Value::Int(4))]
    );
    assert_eq!(
        groups["2"],
        vec![GroupItem::Value(Value::Int(2)), GroupItem::Value(Value::Int(5))]
    );
    assert_eq!(cache.peek("team_7"), Some(CacheValue::Empty));
    assert!(matches!(cache.peek("team_1"), Some(CacheValue::Group(_))));

    let second = db.fetch_array(&request).unwrap();
    assert_eq!(db.driver().round_trips(), 1);
    let groups = second.as_grouped().unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups["2"].len(), 2);
}

#[test]
fn test_case_folded_lookup_leaves_no_placeholder() {
    init_tracing();
    let mut sqlite = SqliteDriver::open_in_memory().unwrap();
    sqlite
        .execute_batch(
            "CREATE TABLE tags (id INTEGER PRIMARY KEY, slug TEXT COLLATE NOCASE);
             INSERT INTO tags (id, slug) VALUES (5, 'Ada'), (6, 'bob');",
        )
        .unwrap();
    let cache = memory_cache();
    let mut db = CachedDb::new(CountingDriver::new(sqlite), cache.clone());
    let request = QueryRequest::lookup(
        "SELECT id, slug FROM tags WHERE",
        ["ada", "bob", "cyd"],
        ReadOptions::per_row("slug_").lookup_column("slug"),
    );

    let first = db.fetch_array(&request).unwrap().into_rows();
    assert_column_ints(&first, "id", &[5, 6]);
    assert!(!cache.contains("slug_ada"));
    assert!(!cache.contains("slug_cyd"));
    assert!(matches!(cache.peek("slug_bob"), Some(CacheValue::Row(_))));

    let second = db.fetch_array(&request).unwrap().into_rows();
    let mut ids: Vec<i64> = second
        .iter()
        .filter_map(|r| r.get("id").and_then(Value::as_i64))
        .collect();
    ids.sort();
    assert_eq!(ids, vec![5, 6]);
    assert_eq!(db.driver().round_trips(), 2);
    assert_eq!(db.driver().statements()[1], "SELECT id, slug FROM tags WHERE \"slug\" IN (?,?)");
}

#[test]
fn test_grouped_cache_entries_do_not_serve_row_reads() {
    let (mut db, cache) = setup([1]);
    cache
        .set("user_1", CacheValue::Group(vec![GroupItem::Value(Value::Int(9))]), None)
        .unwrap();

    let rows = db
        .fetch_array(&users_by_id(&[1], ReadOptions::per_row("user_")))
        .unwrap()
        .into_rows();
    assert_column_ints(&rows, "id", &[1]);
    assert_eq!(db.driver().round_trips(), 1);
    assert!(matches!(cache.peek("user_1"), Some(CacheValue::Row(_))));
}

#[test]
fn test_empty_key_list_touches_nothing() {
    let (mut db, _cache) = setup([1]);
    let set = db
        .fetch_array(&users_by_id(&[], ReadOptions::per_row("user_")))
        .unwrap();
    assert!(set.is_empty());
    assert_eq!(db.driver().round_trips(), 0);
}

#[test]
fn test_per_row_ttl_is_applied() {
    let (mut db, cache) = setup([1]);
    let options = ReadOptions::per_row("user_").with_ttl(Duration::from_millis(1));
    db.fetch_array(&users_by_id(&[1], options.clone())).unwrap();
    std::thread::sleep(Duration::from_millis(10));

    assert!(!cache.contains("user_1"));
    db.fetch_array(&users_by_id(&[1], options)).unwrap();
    assert_eq!(db.driver().round_trips(), 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: every requested key that exists appears exactly once, and a
    /// repeated read is answered without another database round-trip.
    #[test]
    fn prop_per_row_merge_is_complete_and_idempotent(
        stored in arb_stored_ids(),
        requested in arb_lookup_keys(),
    ) {
        let mut db = CachedDb::new(counting_users_db(stored.iter().copied()), memory_cache());
        let request = users_by_id(&requested, ReadOptions::per_row("user_"));

        let mut expected: Vec<i64> = requested.iter().copied().filter(|id| stored.contains(id)).collect();
        expected.sort();
        expected.dedup();

        for _ in 0..2 {
            let rows = db.fetch_array(&request).unwrap().into_rows();
            let mut ids: Vec<i64> = rows.iter().filter_map(|r| r["id"].as_i64()).collect();
            ids.sort();
            prop_assert_eq!(&ids, &expected);
        }

        let expected_trips = usize::from(!requested.is_empty());
        prop_assert_eq!(db.driver().round_trips(), expected_trips);
    }
}

// ============================================================================
// WHOLE-RESULT MODE
// ============================================================================

#[test]
fn test_version_bump_forces_requery_and_keeps_stale_entry() {
    let (mut db, cache) = setup([1, 2]);
    let request = QueryRequest::new("SELECT id FROM users ORDER BY id").with_options(
        ReadOptions::whole_result("user_list")
            .versioned("users_ver")
            .with_ttl(Duration::from_secs(60)),
    );

    db.fetch_array(&request).unwrap();
    let t0 = db.version_of("users_ver").unwrap();
    assert!(cache.contains(&format!("user_list_{}", t0)));

    db.fetch_array(&request).unwrap();
    assert_eq!(db.driver().round_trips(), 1);

    let t1 = db.bump_version("users_ver", None).unwrap();
    assert!(t1 > t0);

    let rows = db.fetch_array(&request).unwrap().into_rows();
    assert_column_ints(&rows, "id", &[1, 2]);
    assert_eq!(db.driver().round_trips(), 2);
    assert!(cache.contains(&format!("user_list_{}", t0)));
    assert!(cache.contains(&format!("user_list_{}", t1)));
}

#[test]
fn test_derived_key_and_index_by() {
    let (mut db, cache) = setup([4, 8]);
    let sql = "SELECT id, name FROM users WHERE id > ?";
    let request = QueryRequest::new(sql)
        .with_params([0])
        .with_options(ReadOptions::derived_key().index_by("id"));

    let set = db.fetch_array(&request).unwrap();
    assert_eq!(set.as_indexed().unwrap().keys().collect::<Vec<_>>(), vec!["4", "8"]);
    assert!(cache.contains(&format!("rows_{}", derive_cache_key(sql, &[Value::Int(0)]))));

    let again = db.fetch_array(&request).unwrap();
    assert_eq!(again, set);
    assert_eq!(db.driver().round_trips(), 1);
}

#[test]
fn test_derived_keys_are_separate_per_read_shape() {
    let (mut db, _cache) = setup([1, 2, 3]);
    let request = QueryRequest::new("SELECT id, name FROM users ORDER BY id LIMIT 2")
        .with_options(ReadOptions::derived_key());

    for _ in 0..2 {
        let rows = db.fetch_array(&request).unwrap().into_rows();
        assert_column_ints(&rows, "id", &[1, 2]);
        let first = db.fetch_row(&request).unwrap().unwrap();
        assert_eq!(first["id"], Value::Int(1));
        assert_eq!(db.fetch_column(&request).unwrap(), Some(Value::Int(1)));
        assert_eq!(db.fetch_array_with_count(&request).unwrap().total, 3);
    }

    // rows, row, scalar, page (rows + count); the second pass is all hits
    assert_eq!(db.driver().round_trips(), 5);
}

#[test]
fn test_wrong_shape_entry_is_a_miss() {
    let (mut db, cache) = setup([1]);
    cache.set("list", CacheValue::Token(5), None).unwrap();

    let request = QueryRequest::new("SELECT id FROM users").with_options(ReadOptions::whole_result("list"));
    let rows = db.fetch_array(&request).unwrap().into_rows();
    assert_column_ints(&rows, "id", &[1]);
    assert!(matches!(cache.peek("list"), Some(CacheValue::Rows(_))));
}

#[test]
fn test_fetch_row_caches_absent_row_as_placeholder() {
    let (mut db, cache) = setup([1]);
    let request = QueryRequest::new("SELECT * FROM users WHERE id = ?")
        .with_params([42])
        .with_options(ReadOptions::whole_result("user_row_42"));

    assert_eq!(db.fetch_row(&request).unwrap(), None);
    assert_eq!(cache.peek("user_row_42"), Some(CacheValue::Empty));
    assert_eq!(db.fetch_row(&request).unwrap(), None);
    assert_eq!(db.driver().round_trips(), 1);
}

#[test]
fn test_fetch_column_whole_result() {
    let (mut db, cache) = setup([1]);
    let request = QueryRequest::new("SELECT name FROM users WHERE id = ?")
        .with_params([1])
        .with_options(ReadOptions::whole_result("user_name_1"));

    assert_eq!(db.fetch_column(&request).unwrap(), Some(Value::from("user1")));
    assert_eq!(cache.peek("user_name_1"), Some(CacheValue::Scalar(Value::from("user1"))));
    assert_eq!(db.fetch_column(&request).unwrap(), Some(Value::from("user1")));
    assert_eq!(db.driver().round_trips(), 1);
}

#[test]
fn test_fetch_array_with_count() {
    let (mut db, cache) = setup(1..=5);
    let request = QueryRequest::new("SELECT id FROM users ORDER BY id LIMIT 2")
        .with_options(ReadOptions::whole_result("page_1"));

    let page = db.fetch_array_with_count(&request).unwrap();
    assert_column_ints(&page.rows, "id", &[1, 2]);
    assert_eq!(page.total, 5);
    assert_eq!(db.driver().round_trips(), 2);
    assert!(matches!(cache.peek("page_1"), Some(CacheValue::Page(_))));

    assert_eq!(db.fetch_array_with_count(&request).unwrap(), page);
    assert_eq!(db.driver().round_trips(), 2);
}

#[test]
fn test_with_count_ignores_bound_paging() {
    let (mut db, _cache) = setup(1..=5);

    let ordered = QueryRequest::new("SELECT id FROM users WHERE id > ? ORDER BY id LIMIT ?")
        .with_params([1, 2]);
    let page = db.fetch_array_with_count(&ordered).unwrap();
    assert_column_ints(&page.rows, "id", &[2, 3]);
    assert_eq!(page.total, 4);
    assert_eq!(
        db.driver().statements()[1],
        "SELECT COUNT(*) FROM (SELECT id FROM users WHERE id > ?) AS dbmc_count"
    );

    let unordered = QueryRequest::new("SELECT id FROM users LIMIT ? OFFSET ?").with_params([2, 1]);
    let page = db.fetch_array_with_count(&unordered).unwrap();
    assert_eq!(page.rows.len(), 2);
    assert_eq!(page.total, 5);
}

#[test]
fn test_calc_found_rows_after_bound_page() {
    let (mut db, _cache) = setup(1..=5);
    let request = QueryRequest::new("SELECT id FROM users ORDER BY id LIMIT ?").with_params([2]);
    db.fetch_array(&request).unwrap();

    assert_eq!(db.calc_found_rows(false, ReadOptions::new()).unwrap(), 5);
    assert_eq!(db.fetch_count(&request).unwrap(), 5);
}

#[test]
fn test_with_count_rejects_unstrippable_paging() {
    let (mut db, _cache) = setup(1..=5);
    let request = QueryRequest::new("SELECT id FROM users LIMIT :n").with_params([2]);
    assert_invalid_request(&db.fetch_array_with_count(&request));
    assert_eq!(db.driver().round_trips(), 0);
}

#[test]
fn test_reads_without_cache_always_hit_database() {
    let (mut db, cache) = setup([1]);
    let request = QueryRequest::new("SELECT id FROM users");
    db.fetch_array(&request).unwrap();
    db.fetch_array(&request).unwrap();
    assert_eq!(db.driver().round_trips(), 2);
    assert!(cache.keys().is_empty());
}

// ============================================================================
// COUNT HELPERS
// ============================================================================

#[test]
fn test_calc_found_rows_inherits_whole_result_key() {
    let (mut db, cache) = setup(1..=5);
    let request = QueryRequest::new("SELECT id FROM users ORDER BY id LIMIT 2")
        .with_options(ReadOptions::whole_result("page_1"));
    db.fetch_array(&request).unwrap();

    assert_eq!(db.calc_found_rows(true, ReadOptions::new()).unwrap(), 5);
    assert_eq!(cache.peek("page_1_count"), Some(CacheValue::Scalar(Value::Int(5))));

    assert_eq!(db.calc_found_rows(true, ReadOptions::new()).unwrap(), 5);
    assert_eq!(db.driver().round_trips(), 2);
    assert_eq!(
        db.driver().statements()[1],
        "SELECT COUNT(*) FROM (SELECT id FROM users) AS dbmc_count"
    );
}

#[test]
fn test_calc_found_rows_after_per_row_read_counts_all_keys() {
    let (mut db, _cache) = setup([1, 3]);
    db.fetch_array(&users_by_id(&[1, 2, 3], ReadOptions::per_row("user_")))
        .unwrap();
    // Fully cached second read still records the complete lookup.
    db.fetch_array(&users_by_id(&[1, 2, 3], ReadOptions::per_row("user_")))
        .unwrap();

    assert_eq!(db.calc_found_rows(false, ReadOptions::new()).unwrap(), 2);
}

#[test]
fn test_calc_found_rows_without_previous_read() {
    let (mut db, _cache) = setup([1]);
    let result = db.calc_found_rows(true, ReadOptions::new());
    assert_invalid_request(&result);
    assert_eq!(db.last_error_code(), "invalid_request");
}

#[test]
fn test_format_count_and_items_and_fetch_count() {
    let (mut db, _cache) = setup(1..=4);
    let request = QueryRequest::new("SELECT id FROM users ORDER BY id LIMIT 1");
    let items = db.fetch_array(&request).unwrap();

    let page = db.format_count_and_items(items, true, ReadOptions::new()).unwrap();
    assert_eq!(page.count, 4);
    assert_eq!(page.items.len(), 1);

    assert_eq!(db.fetch_count(&request).unwrap(), 4);
}

// ============================================================================
// FAILURES
// ============================================================================

#[test]
fn test_driver_error_is_returned_and_recorded() {
    let (mut db, _cache) = setup([1]);
    let result = db.fetch_array(&QueryRequest::new("SELECT * FROM missing_table"));
    assert_driver_error(&result, None);
    assert!(db.last_error_message().contains("missing_table"));
    assert!(!db.last_error_code().is_empty());

    db.fetch_array(&QueryRequest::new("SELECT id FROM users")).unwrap();
    assert!(db.last_error().is_none());
}

#[test]
fn test_invalid_requests_never_reach_the_driver() {
    let (mut db, _cache) = setup([1]);

    assert_invalid_request(&db.fetch_array(&QueryRequest::new("")));

    let not_appendable = QueryRequest::new("SELECT * FROM users WHERE")
        .with_params([1])
        .with_options(ReadOptions::per_row("user_"));
    assert_invalid_request(&db.fetch_array(&not_appendable));

    let per_row_row = users_by_id(&[1], ReadOptions::per_row("user_"));
    assert_invalid_request(&db.fetch_row(&per_row_row));
    assert_invalid_request(&db.fetch_column(&per_row_row));
    assert_invalid_request(&db.fetch_array_with_count(&per_row_row));

    let null_key = QueryRequest::lookup(
        "SELECT * FROM users WHERE",
        [Value::Int(1), Value::Null],
        ReadOptions::per_row("user_"),
    );
    assert_invalid_request(&db.fetch_array(&null_key));

    assert_eq!(db.driver().round_trips(), 0);
}

#[test]
fn test_unavailable_cache_fails_open() {
    init_tracing();
    let cache = Arc::new(FailingCacheStore::unavailable());
    let mut db = CachedDb::new(counting_users_db([1, 3]), cache);
    let request = users_by_id(&[1, 2, 3], ReadOptions::per_row("user_"));

    for _ in 0..2 {
        let rows = db.fetch_array(&request).unwrap().into_rows();
        assert_column_ints(&rows, "id", &[1, 3]);
        assert!(db.last_error().is_none());
    }
    assert_eq!(db.driver().round_trips(), 2);

    let whole = QueryRequest::new("SELECT id FROM users").with_options(ReadOptions::whole_result("all"));
    assert_eq!(db.fetch_array(&whole).unwrap().len(), 2);
}

#[test]
fn test_failed_write_back_leaves_existing_entries() {
    init_tracing();
    let cache = Arc::new(FailingCacheStore::failing_writes());
    cache
        .inner()
        .set(
            "user_1",
            CacheValue::Row(dbmc_core::row([("id", Value::Int(1)), ("name", Value::from("cached"))])),
            None,
        )
        .unwrap();
    let mut db = CachedDb::new(counting_users_db([1, 2]), cache.clone());

    let rows = db
        .fetch_array(&users_by_id(&[1, 2], ReadOptions::per_row("user_")))
        .unwrap()
        .into_rows();
    assert_column_ints(&rows, "id", &[2, 1]);
    assert_eq!(rows[1]["name"], Value::from("cached"));

    assert!(!cache.inner().contains("user_2"));
    match cache.inner().peek("user_1") {
        Some(CacheValue::Row(row)) => assert_eq!(row["name"], Value::from("cached")),
        other => panic!("cached row should be untouched, got {:?}", other),
    }
}

#[test]
fn test_query_collection_records_rewritten_sql() {
    init_tracing();
    let config = ProxyConfig::default().with_collect_queries(true);
    let mut db = CachedDb::with_config(counting_users_db([1]), memory_cache(), config).unwrap();

    db.fetch_array(&users_by_id(&[1, 2], ReadOptions::per_row("user_")))
        .unwrap();
    db.fetch_array(&users_by_id(&[1, 2], ReadOptions::per_row("user_")))
        .unwrap();

    let collected = db.query_collection().unwrap();
    assert_eq!(collected.len(), 1);
    assert_eq!(collected[0].sql, "SELECT id, name FROM users WHERE \"id\" IN (?,?)");
    assert_eq!(collected[0].params, vec![Value::Int(1), Value::Int(2)]);
}

#[test]
fn test_config_default_ttl_and_lookup_column() {
    init_tracing();
    let config = ProxyConfig::default()
        .with_lookup_column("name")
        .with_default_ttl(Duration::from_millis(1));
    let cache = memory_cache();
    let mut db = CachedDb::with_config(counting_users_db([1]), cache.clone(), config).unwrap();

    let request = QueryRequest::lookup(
        "SELECT id, name FROM users WHERE",
        ["user1"],
        ReadOptions::per_row("by_name_"),
    );
    let rows = db.fetch_array(&request).unwrap().into_rows();
    assert_column_ints(&rows, "id", &[1]);

    std::thread::sleep(Duration::from_millis(10));
    assert!(!cache.contains("by_name_user1"));
}

#[test]
fn test_lmdb_store_serves_per_row_and_versioned_reads() {
    init_tracing();
    let dir = tempfile::TempDir::new().unwrap();
    let cache = Arc::new(LmdbCacheStore::new(dir.path(), 16).unwrap());
    let mut db = CachedDb::new(counting_users_db([1, 2]), cache.clone());

    let request = users_by_id(&[1, 2, 9], ReadOptions::per_row("user_"));
    let first = db.fetch_array(&request).unwrap();
    let second = db.fetch_array(&request).unwrap();
    assert_eq!(second, first);
    assert_eq!(db.driver().round_trips(), 1);
    assert_eq!(cache.get("user_9").unwrap(), Some(CacheValue::Empty));

    let list = QueryRequest::new("SELECT id FROM users ORDER BY id")
        .with_options(ReadOptions::whole_result("all_users").versioned("users"));
    db.fetch_array(&list).unwrap();
    db.fetch_array(&list).unwrap();
    assert_eq!(db.driver().round_trips(), 2);

    db.bump_version("users", None).unwrap();
    db.fetch_array(&list).unwrap();
    assert_eq!(db.driver().round_trips(), 3);
}
