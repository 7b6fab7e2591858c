//! End-to-end tests against a live MariaDB/MySQL server.
//!
//! Set `SQLDBAL_TEST_MYSQL_HOST` (and optionally `_PORT`, `_USER`,
//! `_PASSWORD`, `_DB`) to run; the suite skips silently otherwise.

#![cfg(feature = "mysql")]

use sqldbal::{ColumnType, Db, Driver, Fetch, OpenFlags, Status};

fn connect() -> Option<Db> {
    let host = std::env::var("SQLDBAL_TEST_MYSQL_HOST").ok()?;
    let port = std::env::var("SQLDBAL_TEST_MYSQL_PORT").unwrap_or_default();
    let user = std::env::var("SQLDBAL_TEST_MYSQL_USER").unwrap_or_default();
    let password = std::env::var("SQLDBAL_TEST_MYSQL_PASSWORD").unwrap_or_default();
    let database = std::env::var("SQLDBAL_TEST_MYSQL_DB").unwrap_or_default();

    let db = Db::open(
        Driver::Mariadb,
        &host,
        &port,
        &user,
        &password,
        &database,
        OpenFlags::default(),
        &[],
    );
    assert_eq!(db.status(), Status::Ok, "connect failed: {}", db.errstr());
    Some(db)
}

macro_rules! connect_or_skip {
    () => {
        match connect() {
            Some(db) => db,
            None => {
                eprintln!("skipping MySQL integration test: SQLDBAL_TEST_MYSQL_HOST not set");
                return;
            }
        }
    };
}

fn count_rows(db: &mut Db, sql: &str) -> usize {
    let mut rows = 0;
    let mut callback = |_cols: &[Option<&[u8]>]| {
        rows += 1;
        true
    };
    assert_eq!(db.exec(sql, Some(&mut callback)), Status::Ok);
    rows
}

#[test]
fn round_trip_int_text_blob() {
    let mut db = connect_or_skip!();
    db.exec("DROP TABLE IF EXISTS sqldbal_rt", None);
    assert_eq!(
        db.exec(
            "CREATE TABLE sqldbal_rt(id BIGINT, s VARCHAR(100), b BLOB)",
            None
        ),
        Status::Ok
    );

    let payload: Vec<u8> = (0..=255).collect();
    let mut stmt = db.prepare("INSERT INTO sqldbal_rt(id, s, b) VALUES(?, ?, ?)");
    assert_eq!(stmt.param_count(), 3);
    stmt.bind_int64(0, -12345);
    stmt.bind_text(1, "test string");
    stmt.bind_blob(2, &payload);
    assert_eq!(stmt.execute(), Status::Ok);
    assert_eq!(stmt.close(), Status::Ok);

    let mut stmt = db.prepare("SELECT id, s, b FROM sqldbal_rt");
    assert_eq!(stmt.execute(), Status::Ok);
    assert_eq!(stmt.fetch(), Fetch::Row);
    assert_eq!(stmt.column_int64(0), Ok(-12345));
    assert_eq!(stmt.column_text(1), Ok(Some("test string")));
    assert_eq!(stmt.column_blob(2), Ok(Some(payload.as_slice())));
    // The MySQL-family adapter collapses non-null columns to blob.
    assert_eq!(stmt.column_type(0), ColumnType::Blob);
    assert_eq!(stmt.fetch(), Fetch::Done);
    assert_eq!(stmt.close(), Status::Ok);

    db.exec("DROP TABLE sqldbal_rt", None);
    assert_eq!(db.close(), Status::Ok);
}

#[test]
fn null_round_trip() {
    let mut db = connect_or_skip!();
    db.exec("DROP TABLE IF EXISTS sqldbal_null", None);
    db.exec("CREATE TABLE sqldbal_null(v BIGINT)", None);

    let mut stmt = db.prepare("INSERT INTO sqldbal_null(v) VALUES(?)");
    stmt.bind_null(0);
    assert_eq!(stmt.execute(), Status::Ok);
    stmt.close();

    let mut stmt = db.prepare("SELECT v FROM sqldbal_null");
    stmt.execute();
    assert_eq!(stmt.fetch(), Fetch::Row);
    assert_eq!(stmt.column_type(0), ColumnType::Null);
    assert_eq!(stmt.column_int64(0), Ok(0));
    assert_eq!(stmt.column_text(0), Ok(None));
    assert_eq!(stmt.column_blob(0), Ok(None));
    stmt.close();

    db.exec("DROP TABLE sqldbal_null", None);
    db.close();
}

#[test]
fn transactions_toggle_autocommit() {
    let mut db = connect_or_skip!();
    db.exec("DROP TABLE IF EXISTS sqldbal_tx", None);
    db.exec("CREATE TABLE sqldbal_tx(n BIGINT)", None);

    assert_eq!(db.begin_transaction(), Status::Ok);
    db.exec("INSERT INTO sqldbal_tx(n) VALUES(1)", None);
    assert_eq!(db.rollback(), Status::Ok);
    assert_eq!(count_rows(&mut db, "SELECT n FROM sqldbal_tx"), 0);

    assert_eq!(db.begin_transaction(), Status::Ok);
    db.exec("INSERT INTO sqldbal_tx(n) VALUES(1)", None);
    db.exec("INSERT INTO sqldbal_tx(n) VALUES(2)", None);
    assert_eq!(db.commit(), Status::Ok);
    assert_eq!(count_rows(&mut db, "SELECT n FROM sqldbal_tx"), 2);

    db.exec("DROP TABLE sqldbal_tx", None);
    db.close();
}

#[test]
fn last_insert_id_is_monotone() {
    let mut db = connect_or_skip!();
    db.exec("DROP TABLE IF EXISTS sqldbal_ids", None);
    db.exec(
        "CREATE TABLE sqldbal_ids(id BIGINT PRIMARY KEY AUTO_INCREMENT, s VARCHAR(10))",
        None,
    );

    let mut previous = 0;
    for _ in 0..3 {
        assert_eq!(
            db.exec("INSERT INTO sqldbal_ids(s) VALUES('x')", None),
            Status::Ok
        );
        let id = db.last_insert_id(None).unwrap();
        assert!(id > previous);
        previous = id;
    }

    db.exec("DROP TABLE sqldbal_ids", None);
    db.close();
}
