//! SQL Database Abstraction Library.
//!
//! A thin, fully synchronous abstraction over three SQL client libraries:
//! libsqlite3, the MariaDB/MySQL client library, and libpq. One
//! handle-oriented API covers connection management, direct execution with a
//! per-row callback, prepared statements with positional placeholders, typed
//! column extraction, and transactions, with a single status-code discipline
//! across all backends.
//!
//! Each backend is consumed through hand-written FFI bindings and selected
//! with a cargo feature: `sqlite` (default), `mysql`, `postgres`. At least
//! one driver feature must be enabled.
//!
//! # Example
//!
//! ```rust,no_run
//! use sqldbal::{Db, Driver, Fetch, OpenFlags, Status};
//!
//! let mut db = Db::open(
//!     Driver::Sqlite,
//!     "example.db",
//!     "",
//!     "",
//!     "",
//!     "",
//!     OpenFlags::create_read_write(),
//!     &[],
//! );
//! assert_eq!(db.status(), Status::Ok);
//!
//! db.exec("CREATE TABLE t(id INTEGER, s TEXT)", None);
//!
//! let mut stmt = db.prepare("INSERT INTO t(id, s) VALUES(?, ?)");
//! stmt.bind_int64(0, 10);
//! stmt.bind_text(1, "test string");
//! stmt.execute();
//! stmt.close();
//!
//! let mut stmt = db.prepare("SELECT id, s FROM t WHERE id = 10");
//! stmt.execute();
//! while stmt.fetch() == Fetch::Row {
//!     let id = stmt.column_int64(0).unwrap();
//!     let s = stmt.column_text(1).unwrap().map(str::to_owned);
//!     println!("{id}: {s:?}");
//! }
//! stmt.close();
//! db.close();
//! ```
//!
//! # Placeholders
//!
//! Placeholder indices on this surface are always 0-based. Placeholder
//! *syntax* is the backend's own (`?` for SQLite and the MySQL family, `$1`
//! for PostgreSQL); SQL is never rewritten. [`Db::placeholder`] returns the
//! right text for portable query construction.
//!
//! # Recognized option keys
//!
//! | Key | Drivers | Effect |
//! |-----|---------|--------|
//! | `CONNECT_TIMEOUT` | mysql, postgres | seconds (at most 1000 for mysql) |
//! | `TLS_KEY` / `TLS_CERT` / `TLS_CA` | mysql, postgres | file paths |
//! | `TLS_CAPATH` / `TLS_CIPHER` | mysql | CA directory / cipher list |
//! | `TLS_MODE` | postgres | `disable`, `allow`, `prefer`, `require`, `verify-ca`, `verify-full` |
//! | `VFS` | sqlite | named virtual filesystem |
//!
//! Unknown keys report [`Status::Param`] and the session is not established.
//!
//! # Thread safety
//!
//! Everything here is synchronous and blocking, and a connection is a
//! single-threaded object: statements borrow their connection mutably, so
//! the borrow checker serializes all use. Nothing is shared between
//! connections.

#[cfg(not(any(feature = "sqlite", feature = "mysql", feature = "postgres")))]
compile_error!("at least one driver feature must be enabled: sqlite, mysql, postgres");

mod convert;
mod db;
#[cfg_attr(not(feature = "postgres"), allow(dead_code))]
mod hex;
mod status;
mod stmt;

#[cfg(feature = "mysql")]
mod mysql;
#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use db::{Db, Driver, DriverOption, ExecCallback, OpenFlags};
pub use status::{ColumnType, Fetch, Status};
pub use stmt::Stmt;
