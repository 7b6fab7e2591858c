//! Database connection handle and driver dispatch.
//!
//! [`Db::open`] selects the driver adapter by tag and forwards every generic
//! operation to it. Adapters communicate failure exclusively by mutating the
//! connection's status and error string; the façade itself only validates
//! arguments and never inspects the opaque backend state.

use crate::status::Status;
use crate::stmt::{Stmt, StmtInner};
use std::ffi::c_void;
use std::mem;

#[cfg(feature = "mysql")]
use crate::mysql;
#[cfg(feature = "postgres")]
use crate::postgres;
#[cfg(feature = "sqlite")]
use crate::sqlite;

/// SQL drivers available to use in this library.
///
/// [`Driver::Mariadb`] and [`Driver::Mysql`] share one adapter; they are
/// distinct tags because an application may need to distinguish the two
/// server families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    /// MariaDB driver using the MySQL-family client library.
    Mariadb,
    /// MySQL driver using the MySQL-family client library.
    Mysql,
    /// PostgreSQL driver using libpq.
    Postgresql,
    /// SQLite driver using libsqlite3.
    Sqlite,
    /// Unknown driver; opening with this tag reports
    /// [`Status::DriverNosupport`].
    Invalid,
}

/// Flags controlling how a connection is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    /// Print backend debug/tracing information to stderr.
    pub debug: bool,
    /// Open the SQLite database in read-only mode.
    pub read_only: bool,
    /// Open the SQLite database in read/write mode.
    pub read_write: bool,
    /// Create the SQLite database if it does not exist yet.
    pub create: bool,
}

impl OpenFlags {
    /// Flags for creating a SQLite database with read/write access.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Self::default()
        }
    }

    /// Flags for read-only SQLite access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    /// Enable backend tracing to stderr.
    pub fn debug(mut self) -> Self {
        self.debug = true;
        self
    }
}

/// Driver-specific option passed to [`Db::open`].
///
/// Keys and values are borrowed for the duration of the open call. Unknown
/// keys set [`Status::Param`] and the session is not established.
#[derive(Debug, Clone, Copy)]
pub struct DriverOption<'a> {
    /// Unique identifier naming the option.
    pub key: &'a str,
    /// Value corresponding to `key`.
    pub value: &'a str,
}

impl<'a> DriverOption<'a> {
    pub fn new(key: &'a str, value: &'a str) -> Self {
        Self { key, value }
    }
}

/// Callback invoked once per result row by [`Db::exec`].
///
/// Receives one entry per column: `None` for NULL, otherwise the column
/// value bytes. Return `true` to continue, `false` to abort the query (which
/// sets [`Status::Exec`]).
pub type ExecCallback<'a> = &'a mut dyn FnMut(&[Option<&[u8]>]) -> bool;

/// Driver-independent connection state.
pub(crate) struct Core {
    pub(crate) driver: Driver,
    pub(crate) flags: OpenFlags,
    pub(crate) status: Status,
    pub(crate) errstr: Option<String>,
}

impl Core {
    /// Record `status` as the connection's current status.
    pub(crate) fn set_status(&mut self, status: Status) -> Status {
        self.status = status;
        status
    }

    /// Record `status` together with a backend-provided error message.
    pub(crate) fn set_error(&mut self, status: Status, message: impl Into<String>) -> Status {
        self.errstr = Some(message.into());
        self.set_status(status)
    }
}

#[cfg(test)]
#[allow(dead_code)]
pub(crate) fn test_core() -> Core {
    Core {
        driver: Driver::Invalid,
        flags: OpenFlags::default(),
        status: Status::Ok,
        errstr: None,
    }
}

/// Driver-specific connection state.
///
/// `Invalid` stands in when no backend session exists: unsupported driver
/// tag, failed open with nothing to release, or an already-closed handle.
/// Every operation on it is a safe no-op that reports the stored status.
pub(crate) enum Backend {
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite::SqliteDb),
    #[cfg(feature = "mysql")]
    Mysql(mysql::MysqlDb),
    #[cfg(feature = "postgres")]
    Postgres(postgres::PgDb),
    Invalid,
}

/// A database connection.
///
/// [`Db::open`] always returns a handle, even when the session could not be
/// established; inspect [`Db::status`] to find out. All further operations
/// on a failed handle are safe and keep reporting the failure, and
/// [`Db::close`] (or drop) releases whatever the backend allocated.
pub struct Db {
    pub(crate) core: Core,
    pub(crate) backend: Backend,
}

impl Db {
    /// Open a new connection.
    ///
    /// * `location`: file path (SQLite), host name, or IP address.
    /// * `port`: server port as a decimal string; empty selects the
    ///   backend's default. Ignored by SQLite.
    /// * `username`/`password`/`database`: empty strings mean "not
    ///   provided".
    /// * `options`: driver-specific key/value options; see the crate docs
    ///   for the recognized keys.
    pub fn open(
        driver: Driver,
        location: &str,
        port: &str,
        username: &str,
        password: &str,
        database: &str,
        flags: OpenFlags,
        options: &[DriverOption<'_>],
    ) -> Db {
        tracing::debug!(?driver, location, "opening database connection");
        let mut core = Core {
            driver,
            flags,
            status: Status::Ok,
            errstr: None,
        };

        let backend = match driver {
            #[cfg(feature = "sqlite")]
            Driver::Sqlite => sqlite::open(&mut core, location, options).map(Backend::Sqlite),
            #[cfg(feature = "mysql")]
            Driver::Mariadb | Driver::Mysql => mysql::open(
                &mut core, location, port, username, password, database, options,
            )
            .map(Backend::Mysql),
            #[cfg(feature = "postgres")]
            Driver::Postgresql => postgres::open(
                &mut core, location, port, username, password, database, options,
            )
            .map(Backend::Postgres),
            _ => {
                core.set_status(Status::DriverNosupport);
                None
            }
        };
        let _ = (port, username, password, database);

        Db {
            core,
            backend: backend.unwrap_or(Backend::Invalid),
        }
    }

    /// Close the connection and release backend resources.
    ///
    /// Returns the connection's status from before the close, or the close
    /// failure when everything up to that point had succeeded. Dropping the
    /// handle closes it as well.
    pub fn close(mut self) -> Status {
        self.close_inner()
    }

    fn close_inner(&mut self) -> Status {
        let prior = self.core.status;
        match mem::replace(&mut self.backend, Backend::Invalid) {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(sq) => sqlite::close(&mut self.core, &sq),
            #[cfg(feature = "mysql")]
            Backend::Mysql(m) => mysql::close(&m),
            #[cfg(feature = "postgres")]
            Backend::Postgres(pg) => postgres::close(&pg),
            Backend::Invalid => {}
        }
        if prior == Status::Ok {
            self.core.status
        } else {
            prior
        }
    }

    /// The status recorded by the most recent operation.
    pub fn status(&self) -> Status {
        self.core.status
    }

    /// Reset the status to [`Status::Ok`], returning the prior value.
    pub fn clear_status(&mut self) -> Status {
        let prior = self.core.status;
        self.core.status = Status::Ok;
        prior
    }

    /// The driver tag this connection was opened with.
    pub fn driver_type(&self) -> Driver {
        self.core.driver
    }

    /// Description of the most recent failure.
    ///
    /// The backend's own message when one was captured, otherwise a default
    /// description of the current status.
    pub fn errstr(&self) -> &str {
        match &self.core.errstr {
            Some(message) => message,
            None => self.core.status.default_message(),
        }
    }

    /// The raw backend connection handle, for driver-specific code.
    ///
    /// Cast according to [`Db::driver_type`]: `sqlite3 *`, `MYSQL *`, or
    /// `PGconn *`. Null when no session exists. Do not free it; use
    /// [`Db::close`].
    pub fn db_handle(&self) -> *mut c_void {
        match &self.backend {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(sq) => sqlite::db_handle(sq),
            #[cfg(feature = "mysql")]
            Backend::Mysql(m) => mysql::db_handle(m),
            #[cfg(feature = "postgres")]
            Backend::Postgres(pg) => postgres::db_handle(pg),
            Backend::Invalid => std::ptr::null_mut(),
        }
    }

    /// The placeholder text for parameter `index` in this connection's SQL
    /// dialect (`?` for the SQLite and MySQL-family drivers, `$N` for
    /// PostgreSQL).
    ///
    /// The library never rewrites SQL; this helps callers build portable
    /// statements at the call site.
    pub fn placeholder(&self, index: usize) -> String {
        match self.core.driver {
            Driver::Postgresql => format!("${}", index.saturating_add(1)),
            _ => "?".to_string(),
        }
    }

    /// Start a new transaction.
    pub fn begin_transaction(&mut self) -> Status {
        let Db { core, backend } = self;
        match backend {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(sq) => sqlite::begin_transaction(core, sq),
            #[cfg(feature = "mysql")]
            Backend::Mysql(m) => mysql::begin_transaction(core, m),
            #[cfg(feature = "postgres")]
            Backend::Postgres(pg) => postgres::begin_transaction(core, pg),
            Backend::Invalid => {}
        }
        self.core.status
    }

    /// Commit the current transaction.
    pub fn commit(&mut self) -> Status {
        let Db { core, backend } = self;
        match backend {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(sq) => sqlite::commit(core, sq),
            #[cfg(feature = "mysql")]
            Backend::Mysql(m) => mysql::commit(core, m),
            #[cfg(feature = "postgres")]
            Backend::Postgres(pg) => postgres::commit(core, pg),
            Backend::Invalid => {}
        }
        self.core.status
    }

    /// Roll back the current transaction.
    pub fn rollback(&mut self) -> Status {
        let Db { core, backend } = self;
        match backend {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(sq) => sqlite::rollback(core, sq),
            #[cfg(feature = "mysql")]
            Backend::Mysql(m) => mysql::rollback(core, m),
            #[cfg(feature = "postgres")]
            Backend::Postgres(pg) => postgres::rollback(core, pg),
            Backend::Invalid => {}
        }
        self.core.status
    }

    /// Execute a self-contained SQL string.
    ///
    /// When `callback` is supplied it is invoked once per result row with
    /// the column values (`None` for NULL columns); returning `false` aborts
    /// the query and sets [`Status::Exec`].
    pub fn exec(&mut self, sql: &str, callback: Option<ExecCallback<'_>>) -> Status {
        let Db { core, backend } = self;
        match backend {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(sq) => sqlite::exec(core, sq, sql, callback),
            #[cfg(feature = "mysql")]
            Backend::Mysql(m) => mysql::exec(core, m, sql, callback),
            #[cfg(feature = "postgres")]
            Backend::Postgres(pg) => postgres::exec(core, pg, sql, callback),
            Backend::Invalid => {}
        }
        self.core.status
    }

    /// Id generated by the last insert statement.
    ///
    /// The PostgreSQL driver requires `name`, the sequence to consult (for a
    /// SERIAL column on table `t` with primary key `id`, pass `t_id_seq`);
    /// the other drivers ignore it.
    pub fn last_insert_id(&mut self, name: Option<&str>) -> Result<u64, Status> {
        #[cfg(feature = "postgres")]
        if matches!(self.backend, Backend::Postgres(_)) {
            return self.pg_last_insert_id(name);
        }
        let _ = name;

        let Db { core, backend } = self;
        let insert_id = match backend {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(sq) => sqlite::last_insert_id(core, sq),
            #[cfg(feature = "mysql")]
            Backend::Mysql(m) => Some(mysql::last_insert_id(core, m)),
            _ => None,
        };
        insert_id.ok_or(self.core.status)
    }

    /// PostgreSQL consults the named sequence through the prepared-statement
    /// path: `SELECT currval($1)`.
    #[cfg(feature = "postgres")]
    fn pg_last_insert_id(&mut self, name: Option<&str>) -> Result<u64, Status> {
        let Some(name) = name else {
            return Err(self.core.set_status(Status::Param));
        };

        let mut stmt = self.prepare("SELECT currval($1)");
        stmt.bind_text(0, name);
        stmt.execute();
        let _ = stmt.fetch();
        let insert_id = stmt.column_int64(0);
        let status = stmt.close();

        match insert_id {
            Ok(id) if status == Status::Ok => crate::convert::int64_to_uint64(id)
                .ok_or_else(|| self.core.set_status(Status::ColumnCoerce)),
            Ok(_) => Err(status),
            Err(status) => Err(status),
        }
    }

    /// Compile a SQL string into a prepared statement.
    ///
    /// Always returns a statement handle; when compilation fails the status
    /// is set (typically [`Status::Prepare`]) and the returned statement has
    /// zero parameters and columns, so every bind and column access reports
    /// [`Status::Param`] and closing it is safe.
    pub fn prepare(&mut self, sql: &str) -> Stmt<'_> {
        let mut num_params = 0;
        let mut num_cols_result = 0;

        let inner = {
            let Db { core, backend } = self;
            match backend {
                #[cfg(feature = "sqlite")]
                Backend::Sqlite(sq) => {
                    sqlite::stmt_prepare(core, sq, sql).map(|(st, params, cols)| {
                        num_params = params;
                        num_cols_result = cols;
                        StmtInner::Sqlite(st)
                    })
                }
                #[cfg(feature = "mysql")]
                Backend::Mysql(m) => mysql::stmt_prepare(core, m, sql).map(|(st, params, cols)| {
                    num_params = params;
                    num_cols_result = cols;
                    StmtInner::Mysql(st)
                }),
                #[cfg(feature = "postgres")]
                Backend::Postgres(pg) => {
                    postgres::stmt_prepare(core, pg, sql).map(|(st, params, cols)| {
                        num_params = params;
                        num_cols_result = cols;
                        StmtInner::Postgres(st)
                    })
                }
                Backend::Invalid => None,
            }
        };

        Stmt::new(
            self,
            inner.unwrap_or(StmtInner::Invalid),
            num_params,
            num_cols_result,
        )
    }
}

impl Drop for Db {
    fn drop(&mut self) {
        let _ = self.close_inner();
    }
}
