//! Prepared statement handle.
//!
//! A [`Stmt`] mutably borrows its connection, so it can neither outlive it
//! nor race with other operations on it. The façade validates placeholder
//! and column indices against the counts established at prepare/execute
//! time, then forwards to the driver adapter.

use crate::db::{Backend, Db};
use crate::status::{ColumnType, Fetch, Status};
use std::ffi::c_void;
use std::mem;

#[cfg(feature = "mysql")]
use crate::mysql;
#[cfg(feature = "postgres")]
use crate::postgres;
#[cfg(feature = "sqlite")]
use crate::sqlite;

/// Driver-specific statement state.
///
/// `Invalid` stands in when the backend prepare failed; the statement then
/// has zero parameters and columns, and every operation on it is a safe
/// no-op.
pub(crate) enum StmtInner {
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite::SqliteStmt),
    #[cfg(feature = "mysql")]
    Mysql(mysql::MysqlStmt),
    #[cfg(feature = "postgres")]
    Postgres(postgres::PgStmt),
    Invalid,
}

/// A prepared statement, created by [`Db::prepare`].
///
/// Placeholder indices on this surface are 0-based regardless of the
/// backend's own convention. Bound parameters persist across repeated
/// executes until rebound or the statement is closed; rebinding an index
/// releases the previously bound buffer.
pub struct Stmt<'db> {
    db: &'db mut Db,
    inner: StmtInner,
    num_params: usize,
    num_cols_result: usize,
}

impl<'db> Stmt<'db> {
    pub(crate) fn new(
        db: &'db mut Db,
        inner: StmtInner,
        num_params: usize,
        num_cols_result: usize,
    ) -> Self {
        Self {
            db,
            inner,
            num_params,
            num_cols_result,
        }
    }

    /// Number of placeholders in the statement.
    pub fn param_count(&self) -> usize {
        self.num_params
    }

    /// Number of columns in the result set.
    ///
    /// Populated at prepare time for SQLite and the MySQL family; the
    /// PostgreSQL adapter populates it when the statement executes.
    pub fn column_count(&self) -> usize {
        self.num_cols_result
    }

    /// The raw backend statement handle, for driver-specific code.
    ///
    /// Cast according to the connection's driver: `sqlite3_stmt *`,
    /// `MYSQL_STMT *`, or `const char *` (the PostgreSQL statement name).
    /// Do not free it; use [`Stmt::close`].
    pub fn handle(&self) -> *mut c_void {
        match &self.inner {
            #[cfg(feature = "sqlite")]
            StmtInner::Sqlite(st) => st.handle(),
            #[cfg(feature = "mysql")]
            StmtInner::Mysql(st) => st.handle(),
            #[cfg(feature = "postgres")]
            StmtInner::Postgres(st) => st.handle(),
            StmtInner::Invalid => std::ptr::null_mut(),
        }
    }

    fn bind_in_range(&mut self, col_idx: usize) -> bool {
        if col_idx >= self.num_params {
            self.db.core.set_status(Status::Param);
            return false;
        }
        true
    }

    fn column_in_range(&mut self, col_idx: usize) -> bool {
        if col_idx >= self.num_cols_result {
            self.db.core.set_status(Status::Param);
            return false;
        }
        true
    }

    /// Bind binary data to placeholder `col_idx`.
    ///
    /// The adapter copies the bytes into a buffer it owns.
    pub fn bind_blob(&mut self, col_idx: usize, blob: &[u8]) -> Status {
        if self.bind_in_range(col_idx) {
            let Stmt { db, inner, .. } = self;
            let core = &mut db.core;
            match inner {
                #[cfg(feature = "sqlite")]
                StmtInner::Sqlite(st) => sqlite::stmt_bind_blob(core, st, col_idx, blob),
                #[cfg(feature = "mysql")]
                StmtInner::Mysql(st) => mysql::stmt_bind_blob(core, st, col_idx, blob),
                #[cfg(feature = "postgres")]
                StmtInner::Postgres(st) => postgres::stmt_bind_blob(core, st, col_idx, blob),
                StmtInner::Invalid => {}
            }
        }
        self.db.core.status
    }

    /// Bind a 64-bit integer to placeholder `col_idx`.
    pub fn bind_int64(&mut self, col_idx: usize, i64: i64) -> Status {
        if self.bind_in_range(col_idx) {
            let Stmt { db, inner, .. } = self;
            let core = &mut db.core;
            match inner {
                #[cfg(feature = "sqlite")]
                StmtInner::Sqlite(st) => sqlite::stmt_bind_int64(core, st, col_idx, i64),
                #[cfg(feature = "mysql")]
                StmtInner::Mysql(st) => mysql::stmt_bind_int64(core, st, col_idx, i64),
                #[cfg(feature = "postgres")]
                StmtInner::Postgres(st) => postgres::stmt_bind_int64(core, st, col_idx, i64),
                StmtInner::Invalid => {}
            }
        }
        self.db.core.status
    }

    /// Bind a text string to placeholder `col_idx`.
    pub fn bind_text(&mut self, col_idx: usize, s: &str) -> Status {
        if self.bind_in_range(col_idx) {
            let Stmt { db, inner, .. } = self;
            let core = &mut db.core;
            match inner {
                #[cfg(feature = "sqlite")]
                StmtInner::Sqlite(st) => sqlite::stmt_bind_text(core, st, col_idx, s),
                #[cfg(feature = "mysql")]
                StmtInner::Mysql(st) => mysql::stmt_bind_text(core, st, col_idx, s),
                #[cfg(feature = "postgres")]
                StmtInner::Postgres(st) => postgres::stmt_bind_text(core, st, col_idx, s),
                StmtInner::Invalid => {}
            }
        }
        self.db.core.status
    }

    /// Bind NULL to placeholder `col_idx`, clearing any previous value.
    pub fn bind_null(&mut self, col_idx: usize) -> Status {
        if self.bind_in_range(col_idx) {
            let Stmt { db, inner, .. } = self;
            let core = &mut db.core;
            match inner {
                #[cfg(feature = "sqlite")]
                StmtInner::Sqlite(st) => sqlite::stmt_bind_null(core, st, col_idx),
                #[cfg(feature = "mysql")]
                StmtInner::Mysql(st) => mysql::stmt_bind_null(core, st, col_idx),
                #[cfg(feature = "postgres")]
                StmtInner::Postgres(st) => postgres::stmt_bind_null(core, st, col_idx),
                StmtInner::Invalid => {}
            }
        }
        self.db.core.status
    }

    /// Run the statement with the currently bound parameters.
    pub fn execute(&mut self) -> Status {
        let Stmt {
            db,
            inner,
            num_cols_result,
            ..
        } = self;
        let Db { core, backend } = &mut **db;
        match (backend, inner) {
            #[cfg(feature = "postgres")]
            (Backend::Postgres(pg), StmtInner::Postgres(st)) => {
                postgres::stmt_execute(core, pg, st, num_cols_result);
            }
            #[cfg(feature = "sqlite")]
            (_, StmtInner::Sqlite(st)) => sqlite::stmt_execute(core, st),
            #[cfg(feature = "mysql")]
            (_, StmtInner::Mysql(st)) => mysql::stmt_execute(core, st, *num_cols_result),
            _ => {}
        }
        self.db.core.status
    }

    /// Advance the cursor to the next result row.
    pub fn fetch(&mut self) -> Fetch {
        let Stmt { db, inner, .. } = self;
        let core = &mut db.core;
        match inner {
            #[cfg(feature = "sqlite")]
            StmtInner::Sqlite(st) => sqlite::stmt_fetch(core, st),
            #[cfg(feature = "mysql")]
            StmtInner::Mysql(st) => mysql::stmt_fetch(core, st),
            #[cfg(feature = "postgres")]
            StmtInner::Postgres(st) => postgres::stmt_fetch(core, st),
            StmtInner::Invalid => Fetch::Error,
        }
    }

    /// The current row's column `col_idx` as binary data.
    ///
    /// A NULL column yields `Ok(None)`. The returned slice is owned by the
    /// adapter and lives until the next fetch, execute, or close.
    pub fn column_blob(&mut self, col_idx: usize) -> Result<Option<&[u8]>, Status> {
        if !self.column_in_range(col_idx) {
            return Err(Status::Param);
        }
        let Stmt { db, inner, .. } = self;
        let Db { core, backend } = &mut **db;
        match (backend, inner) {
            #[cfg(feature = "postgres")]
            (Backend::Postgres(pg), StmtInner::Postgres(st)) => {
                postgres::stmt_column_blob(core, pg, st, col_idx)
            }
            #[cfg(feature = "sqlite")]
            (_, StmtInner::Sqlite(st)) => sqlite::stmt_column_blob(core, st, col_idx),
            #[cfg(feature = "mysql")]
            (_, StmtInner::Mysql(st)) => mysql::stmt_column_blob(core, st, col_idx),
            _ => Err(core.status),
        }
    }

    /// The current row's column `col_idx` as a 64-bit integer.
    ///
    /// A NULL column yields 0. Backends that return numbers as text parse
    /// them strictly; failure reports [`Status::ColumnCoerce`].
    pub fn column_int64(&mut self, col_idx: usize) -> Result<i64, Status> {
        if !self.column_in_range(col_idx) {
            return Err(Status::Param);
        }
        let Stmt { db, inner, .. } = self;
        let Db { core, backend } = &mut **db;
        match (backend, inner) {
            #[cfg(feature = "postgres")]
            (Backend::Postgres(pg), StmtInner::Postgres(st)) => {
                postgres::stmt_column_int64(core, pg, st, col_idx)
            }
            #[cfg(feature = "sqlite")]
            (_, StmtInner::Sqlite(st)) => sqlite::stmt_column_int64(core, st, col_idx),
            #[cfg(feature = "mysql")]
            (_, StmtInner::Mysql(st)) => mysql::stmt_column_int64(core, st, col_idx),
            _ => Err(core.status),
        }
    }

    /// The current row's column `col_idx` as text.
    ///
    /// A NULL column yields `Ok(None)`. The returned string is owned by the
    /// adapter and lives until the next fetch, execute, or close.
    pub fn column_text(&mut self, col_idx: usize) -> Result<Option<&str>, Status> {
        if !self.column_in_range(col_idx) {
            return Err(Status::Param);
        }
        let Stmt { db, inner, .. } = self;
        let Db { core, backend } = &mut **db;
        match (backend, inner) {
            #[cfg(feature = "postgres")]
            (Backend::Postgres(pg), StmtInner::Postgres(st)) => {
                postgres::stmt_column_text(core, pg, st, col_idx)
            }
            #[cfg(feature = "sqlite")]
            (_, StmtInner::Sqlite(st)) => sqlite::stmt_column_text(core, st, col_idx),
            #[cfg(feature = "mysql")]
            (_, StmtInner::Mysql(st)) => mysql::stmt_column_text(core, st, col_idx),
            _ => Err(core.status),
        }
    }

    /// The current row's column `col_idx` data type.
    pub fn column_type(&mut self, col_idx: usize) -> ColumnType {
        if !self.column_in_range(col_idx) {
            return ColumnType::Error;
        }
        let Stmt { db, inner, .. } = self;
        let core = &mut db.core;
        match inner {
            #[cfg(feature = "sqlite")]
            StmtInner::Sqlite(st) => sqlite::stmt_column_type(core, st, col_idx),
            #[cfg(feature = "mysql")]
            StmtInner::Mysql(st) => mysql::stmt_column_type(core, st, col_idx),
            #[cfg(feature = "postgres")]
            StmtInner::Postgres(st) => postgres::stmt_column_type(core, st, col_idx),
            StmtInner::Invalid => ColumnType::Error,
        }
    }

    /// Release the statement's backend resources.
    ///
    /// Dropping the statement closes it as well.
    pub fn close(mut self) -> Status {
        self.close_inner();
        self.db.core.status
    }

    fn close_inner(&mut self) {
        match mem::replace(&mut self.inner, StmtInner::Invalid) {
            #[cfg(feature = "sqlite")]
            StmtInner::Sqlite(st) => sqlite::stmt_close(&mut self.db.core, &st),
            #[cfg(feature = "mysql")]
            StmtInner::Mysql(mut st) => mysql::stmt_close(&mut self.db.core, &mut st),
            #[cfg(feature = "postgres")]
            StmtInner::Postgres(mut st) => {
                let Db { core, backend } = &mut *self.db;
                if let Backend::Postgres(pg) = backend {
                    postgres::stmt_close(core, pg, &mut st);
                }
            }
            StmtInner::Invalid => {}
        }
    }
}

impl Drop for Stmt<'_> {
    fn drop(&mut self) {
        self.close_inner();
    }
}
