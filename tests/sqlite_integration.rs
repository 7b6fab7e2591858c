//! End-to-end tests against the SQLite driver.

#![cfg(feature = "sqlite")]

use sqldbal::{ColumnType, Db, Driver, Fetch, OpenFlags, Status};
use std::path::PathBuf;

fn open_memory() -> Db {
    let db = Db::open(
        Driver::Sqlite,
        ":memory:",
        "",
        "",
        "",
        "",
        OpenFlags::create_read_write(),
        &[],
    );
    assert_eq!(db.status(), Status::Ok);
    db
}

fn temp_db_path(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("sqldbal_test_{name}.db"));
    let _ = std::fs::remove_file(&path);
    path
}

/// Collect every row a SELECT produces through the exec callback.
fn collect_rows(db: &mut Db, sql: &str) -> Vec<Vec<Option<Vec<u8>>>> {
    let mut rows = Vec::new();
    let mut callback = |cols: &[Option<&[u8]>]| {
        rows.push(cols.iter().map(|c| c.map(<[u8]>::to_vec)).collect());
        true
    };
    assert_eq!(db.exec(sql, Some(&mut callback)), Status::Ok);
    rows
}

#[test]
fn open_close_memory() {
    let db = open_memory();
    assert_eq!(db.driver_type(), Driver::Sqlite);
    assert!(!db.db_handle().is_null());
    assert_eq!(db.errstr(), "Success");
    assert_eq!(db.close(), Status::Ok);
}

#[test]
fn open_invalid_driver_is_safe() {
    let mut db = Db::open(
        Driver::Invalid,
        ".",
        "",
        "",
        "",
        "",
        OpenFlags::default(),
        &[],
    );
    assert_eq!(db.status(), Status::DriverNosupport);
    assert_eq!(db.errstr(), "Driver not supported");
    assert!(db.db_handle().is_null());

    // Chained calls on the failed handle stay safe and keep reporting the
    // stored status.
    assert_eq!(db.exec("SELECT 1", None), Status::DriverNosupport);
    assert_eq!(db.begin_transaction(), Status::DriverNosupport);
    assert_eq!(db.last_insert_id(None), Err(Status::DriverNosupport));

    let mut stmt = db.prepare("SELECT 1");
    assert_eq!(stmt.param_count(), 0);
    assert_eq!(stmt.bind_int64(0, 1), Status::Param);
    assert_eq!(stmt.fetch(), Fetch::Error);
    assert!(stmt.handle().is_null());
    stmt.close();

    assert_eq!(db.close(), Status::Param);
}

#[test]
fn unknown_driver_option_sets_param() {
    let db = Db::open(
        Driver::Sqlite,
        ":memory:",
        "",
        "",
        "",
        "",
        OpenFlags::create_read_write(),
        &[sqldbal::DriverOption::new("NOT_AN_OPTION", "value")],
    );
    assert_eq!(db.status(), Status::Param);
    assert!(db.db_handle().is_null());
}

#[test]
fn insert_and_select_via_prepared_statements() {
    let path = temp_db_path("insert_select");
    let mut db = Db::open(
        Driver::Sqlite,
        path.to_str().unwrap(),
        "",
        "",
        "",
        "",
        OpenFlags::create_read_write().debug(),
        &[],
    );
    assert_eq!(db.status(), Status::Ok);
    assert_eq!(db.exec("CREATE TABLE t(id INTEGER, s TEXT)", None), Status::Ok);

    let mut stmt = db.prepare("INSERT INTO t(id, s) VALUES(?, ?)");
    assert_eq!(stmt.param_count(), 2);
    assert_eq!(stmt.bind_int64(0, 10), Status::Ok);
    assert_eq!(stmt.bind_text(1, "test string"), Status::Ok);
    assert_eq!(stmt.execute(), Status::Ok);
    assert_eq!(stmt.close(), Status::Ok);

    let mut stmt = db.prepare("SELECT id, s FROM t WHERE id = 10");
    assert_eq!(stmt.column_count(), 2);
    assert_eq!(stmt.execute(), Status::Ok);
    assert_eq!(stmt.fetch(), Fetch::Row);
    assert_eq!(stmt.column_int64(0), Ok(10));
    assert_eq!(stmt.column_text(1), Ok(Some("test string")));
    assert_eq!(stmt.fetch(), Fetch::Done);
    assert_eq!(stmt.close(), Status::Ok);

    assert_eq!(db.close(), Status::Ok);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn exec_callback_enumerates_rows_in_insertion_order() {
    let mut db = open_memory();
    assert_eq!(
        db.exec(
            "CREATE TABLE article(id INTEGER, author TEXT, title TEXT, views INTEGER, content BLOB)",
            None,
        ),
        Status::Ok
    );

    let rows: [(i64, &str, &str, i64, &[u8]); 4] = [
        (1, "ada", "Query layers", 100, b"SQL Database Abstraction Library"),
        (2, "grace", "Branch coverage", 9, b"This test framework has full branch coverage"),
        (3, "anonymous", "Test Article", 1, b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXY0123456789"),
        (4, "", "abc", 1, b"test"),
    ];

    for (id, author, title, views, content) in rows {
        let mut stmt =
            db.prepare("INSERT INTO article(id, author, title, views, content) VALUES(?, ?, ?, ?, ?)");
        assert_eq!(stmt.param_count(), 5);
        stmt.bind_int64(0, id);
        stmt.bind_text(1, author);
        stmt.bind_text(2, title);
        stmt.bind_int64(3, views);
        stmt.bind_blob(4, content);
        assert_eq!(stmt.execute(), Status::Ok);
        assert_eq!(stmt.close(), Status::Ok);
    }

    let seen = collect_rows(&mut db, "SELECT id, author, title, views, content FROM article");
    assert_eq!(seen.len(), rows.len());
    for ((id, author, title, views, content), cols) in rows.iter().zip(&seen) {
        assert_eq!(cols.len(), 5);
        assert_eq!(cols[0].as_deref(), Some(id.to_string().as_bytes()));
        assert_eq!(cols[1].as_deref(), Some(author.as_bytes()));
        assert_eq!(cols[2].as_deref(), Some(title.as_bytes()));
        assert_eq!(cols[3].as_deref(), Some(views.to_string().as_bytes()));
        assert_eq!(cols[4].as_deref(), Some(*content));
    }
}

#[test]
fn exec_callback_abort_sets_exec_status() {
    let mut db = open_memory();
    db.exec("CREATE TABLE t(n INTEGER)", None);
    db.exec("INSERT INTO t VALUES (1), (2), (3)", None);

    let mut calls = 0;
    let mut callback = |_cols: &[Option<&[u8]>]| {
        calls += 1;
        false
    };
    assert_eq!(db.exec("SELECT n FROM t", Some(&mut callback)), Status::Exec);
    assert_eq!(calls, 1);
}

#[test]
fn transaction_rollback_and_commit() {
    let mut db = open_memory();
    assert_eq!(
        db.exec("CREATE TABLE simple(simple_id INTEGER, test TEXT)", None),
        Status::Ok
    );

    assert_eq!(db.begin_transaction(), Status::Ok);
    assert_eq!(
        db.exec("INSERT INTO simple(simple_id, test) VALUES(1, '1')", None),
        Status::Ok
    );
    assert_eq!(
        collect_rows(&mut db, "SELECT simple_id, test FROM simple").len(),
        1
    );
    assert_eq!(db.rollback(), Status::Ok);
    assert_eq!(
        collect_rows(&mut db, "SELECT simple_id, test FROM simple").len(),
        0
    );

    assert_eq!(db.begin_transaction(), Status::Ok);
    db.exec("INSERT INTO simple(simple_id, test) VALUES(1, '1')", None);
    db.exec("INSERT INTO simple(simple_id, test) VALUES(2, '2')", None);
    assert_eq!(db.commit(), Status::Ok);
    assert_eq!(
        collect_rows(&mut db, "SELECT simple_id, test FROM simple").len(),
        2
    );
}

#[test]
fn null_binding_and_extraction() {
    let mut db = open_memory();
    db.exec("CREATE TABLE t(v INTEGER)", None);

    let mut stmt = db.prepare("INSERT INTO t(v) VALUES(?)");
    assert_eq!(stmt.bind_null(0), Status::Ok);
    assert_eq!(stmt.execute(), Status::Ok);
    stmt.close();

    let mut stmt = db.prepare("SELECT v FROM t");
    assert_eq!(stmt.execute(), Status::Ok);
    assert_eq!(stmt.fetch(), Fetch::Row);
    assert_eq!(stmt.column_type(0), ColumnType::Null);
    assert_eq!(stmt.column_int64(0), Ok(0));
    assert_eq!(stmt.column_text(0), Ok(None));
    assert_eq!(stmt.column_blob(0), Ok(None));
    stmt.close();

    // The exec callback reports the NULL as an absent value.
    let rows = collect_rows(&mut db, "SELECT v FROM t");
    assert_eq!(rows, vec![vec![None]]);
}

#[test]
fn null_cleared_by_rebinding() {
    let mut db = open_memory();
    db.exec("CREATE TABLE t(v INTEGER)", None);

    let mut stmt = db.prepare("INSERT INTO t(v) VALUES(?)");
    stmt.bind_null(0);
    stmt.bind_int64(0, 7);
    assert_eq!(stmt.execute(), Status::Ok);
    stmt.close();

    let mut stmt = db.prepare("SELECT v FROM t");
    stmt.execute();
    assert_eq!(stmt.fetch(), Fetch::Row);
    assert_eq!(stmt.column_type(0), ColumnType::Int);
    assert_eq!(stmt.column_int64(0), Ok(7));
    stmt.close();
}

#[test]
fn prepare_invalid_sql_sets_prepare_status() {
    let mut db = open_memory();
    let stmt = db.prepare("INVALID SQL COMMAND");
    stmt.close();
    assert_eq!(db.status(), Status::Prepare);
    assert_ne!(db.errstr(), "Success");
}

#[test]
fn prepare_invalid_sql_returns_safe_statement() {
    let mut db = open_memory();
    let mut stmt = db.prepare("INVALID SQL COMMAND");
    assert_eq!(stmt.param_count(), 0);
    assert_eq!(stmt.column_count(), 0);
    assert_eq!(stmt.bind_int64(0, 1), Status::Param);
    assert_eq!(stmt.fetch(), Fetch::Error);
    assert_eq!(stmt.close(), Status::Param);

    assert_eq!(db.clear_status(), Status::Param);
    assert_ne!(db.errstr(), "Success");
}

#[test]
fn bind_and_column_indices_are_range_checked() {
    let mut db = open_memory();
    db.exec("CREATE TABLE t(a INTEGER, b INTEGER)", None);

    let mut stmt = db.prepare("INSERT INTO t(a, b) VALUES(?, ?)");
    assert_eq!(stmt.param_count(), 2);
    assert_eq!(stmt.bind_int64(2, 1), Status::Param);
    stmt.close();
    db.clear_status();

    db.exec("INSERT INTO t(a, b) VALUES(1, 2)", None);
    let mut stmt = db.prepare("SELECT a, b FROM t");
    assert_eq!(stmt.column_count(), 2);
    stmt.execute();
    assert_eq!(stmt.fetch(), Fetch::Row);
    assert_eq!(stmt.column_int64(2), Err(Status::Param));
    assert_eq!(stmt.column_type(2), ColumnType::Error);
    stmt.close();
}

#[test]
fn rebinding_replaces_previous_value() {
    let mut db = open_memory();
    db.exec("CREATE TABLE t(s TEXT)", None);

    let mut stmt = db.prepare("INSERT INTO t(s) VALUES(?)");
    stmt.bind_text(0, "first");
    stmt.bind_text(0, "second");
    assert_eq!(stmt.execute(), Status::Ok);
    stmt.close();

    let rows = collect_rows(&mut db, "SELECT s FROM t");
    assert_eq!(rows, vec![vec![Some(b"second".to_vec())]]);
}

#[test]
fn bound_parameters_persist_across_executes() {
    let mut db = open_memory();
    db.exec("CREATE TABLE t(n INTEGER)", None);

    let mut stmt = db.prepare("INSERT INTO t(n) VALUES(?)");
    stmt.bind_int64(0, 42);
    assert_eq!(stmt.execute(), Status::Ok);
    assert_eq!(stmt.execute(), Status::Ok);
    stmt.close();

    let rows = collect_rows(&mut db, "SELECT n FROM t");
    assert_eq!(
        rows,
        vec![vec![Some(b"42".to_vec())], vec![Some(b"42".to_vec())]]
    );
}

#[test]
fn last_insert_id_is_monotone() {
    let mut db = open_memory();
    db.exec("CREATE TABLE t(id INTEGER PRIMARY KEY, s TEXT)", None);

    let mut previous = 0;
    for _ in 0..3 {
        assert_eq!(db.exec("INSERT INTO t(s) VALUES('x')", None), Status::Ok);
        let id = db.last_insert_id(None).unwrap();
        assert!(id > previous);
        previous = id;
    }
}

#[test]
fn status_clear_returns_prior_value() {
    let mut db = open_memory();
    assert_eq!(db.exec("NOT VALID SQL", None), Status::Exec);
    assert_eq!(db.status(), Status::Exec);
    assert_ne!(db.errstr(), "Success");
    assert_eq!(db.clear_status(), Status::Exec);
    assert_eq!(db.status(), Status::Ok);
}

#[test]
fn column_types_report_native_storage_classes() {
    let mut db = open_memory();
    db.exec("CREATE TABLE t(i INTEGER, s TEXT, b BLOB, r REAL, n INTEGER)", None);
    db.exec(
        "INSERT INTO t VALUES (1, 'text', x'00ff', 1.5, NULL)",
        None,
    );

    let mut stmt = db.prepare("SELECT i, s, b, r, n FROM t");
    stmt.execute();
    assert_eq!(stmt.fetch(), Fetch::Row);
    assert_eq!(stmt.column_type(0), ColumnType::Int);
    assert_eq!(stmt.column_type(1), ColumnType::Text);
    assert_eq!(stmt.column_type(2), ColumnType::Blob);
    assert_eq!(stmt.column_type(3), ColumnType::Other);
    assert_eq!(stmt.column_type(4), ColumnType::Null);
    assert_eq!(stmt.column_blob(2), Ok(Some(&[0x00u8, 0xff][..])));
    stmt.close();
}

#[test]
fn int64_round_trip_extremes() {
    let mut db = open_memory();
    db.exec("CREATE TABLE t(n INTEGER)", None);

    for value in [i64::MIN, -1, 0, 1, i64::MAX] {
        db.exec("DELETE FROM t", None);
        let mut stmt = db.prepare("INSERT INTO t(n) VALUES(?)");
        stmt.bind_int64(0, value);
        assert_eq!(stmt.execute(), Status::Ok);
        stmt.close();

        let mut stmt = db.prepare("SELECT n FROM t");
        stmt.execute();
        assert_eq!(stmt.fetch(), Fetch::Row);
        assert_eq!(stmt.column_int64(0), Ok(value));
        stmt.close();
    }
}

#[test]
fn blob_round_trip_arbitrary_bytes() {
    let mut db = open_memory();
    db.exec("CREATE TABLE t(b BLOB)", None);

    let payload: Vec<u8> = (0..=255).collect();
    let mut stmt = db.prepare("INSERT INTO t(b) VALUES(?)");
    stmt.bind_blob(0, &payload);
    assert_eq!(stmt.execute(), Status::Ok);
    stmt.close();

    let mut stmt = db.prepare("SELECT b FROM t");
    stmt.execute();
    assert_eq!(stmt.fetch(), Fetch::Row);
    assert_eq!(stmt.column_blob(0), Ok(Some(payload.as_slice())));
    stmt.close();
}

#[test]
fn read_only_flag_rejects_writes() {
    let path = temp_db_path("read_only");
    let mut db = Db::open(
        Driver::Sqlite,
        path.to_str().unwrap(),
        "",
        "",
        "",
        "",
        OpenFlags::create_read_write(),
        &[],
    );
    assert_eq!(db.exec("CREATE TABLE t(n INTEGER)", None), Status::Ok);
    assert_eq!(db.close(), Status::Ok);

    let mut db = Db::open(
        Driver::Sqlite,
        path.to_str().unwrap(),
        "",
        "",
        "",
        "",
        OpenFlags::read_only(),
        &[],
    );
    assert_eq!(db.status(), Status::Ok);
    assert_eq!(collect_rows(&mut db, "SELECT n FROM t").len(), 0);
    assert_eq!(db.exec("INSERT INTO t VALUES (1)", None), Status::Exec);
    drop(db);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn placeholder_text_follows_driver_dialect() {
    let db = open_memory();
    assert_eq!(db.placeholder(0), "?");
    assert_eq!(db.placeholder(5), "?");

    let pg = Db::open(
        Driver::Postgresql,
        "",
        "",
        "",
        "",
        "",
        OpenFlags::default(),
        &[],
    );
    assert_eq!(pg.placeholder(0), "$1");
    assert_eq!(pg.placeholder(4), "$5");
}

#[test]
fn mysql_family_tags_stay_distinct() {
    // Both tags route to the same adapter but the application can still
    // tell them apart on the handle.
    let db = Db::open(
        Driver::Mariadb,
        "",
        "",
        "",
        "",
        "",
        OpenFlags::default(),
        &[],
    );
    assert_eq!(db.driver_type(), Driver::Mariadb);
    let db = Db::open(Driver::Mysql, "", "", "", "", "", OpenFlags::default(), &[]);
    assert_eq!(db.driver_type(), Driver::Mysql);
}

#[test]
fn statement_handle_exposed_for_escape_hatch() {
    let mut db = open_memory();
    let mut stmt = db.prepare("SELECT 1");
    assert!(!stmt.handle().is_null());
    stmt.close();
}

#[test]
fn dropping_handles_releases_resources() {
    let path = temp_db_path("drop_releases");
    {
        let mut db = Db::open(
            Driver::Sqlite,
            path.to_str().unwrap(),
            "",
            "",
            "",
            "",
            OpenFlags::create_read_write(),
            &[],
        );
        db.exec("CREATE TABLE t(n INTEGER)", None);
        let _stmt = db.prepare("SELECT n FROM t");
        // Neither handle is closed explicitly; Drop must release both.
    }
    let db = Db::open(
        Driver::Sqlite,
        path.to_str().unwrap(),
        "",
        "",
        "",
        "",
        OpenFlags::create_read_write(),
        &[],
    );
    assert_eq!(db.status(), Status::Ok);
    drop(db);
    let _ = std::fs::remove_file(&path);
}
