//! Low-level FFI bindings to libpq.
//!
//! Manually written; only the subset the driver uses is declared.

#![allow(non_camel_case_types)]

use std::ffi::{c_char, c_int, c_uint, c_void};

/// Opaque connection object.
#[repr(C)]
pub struct PGconn {
    _private: [u8; 0],
}

/// Opaque query result object.
#[repr(C)]
pub struct PGresult {
    _private: [u8; 0],
}

/// Opaque stdio stream, accepted by PQtrace.
#[repr(C)]
pub struct FILE {
    _private: [u8; 0],
}

/// PostgreSQL's internal object/type identifier.
pub type Oid = c_uint;

// ConnStatusType
pub const CONNECTION_OK: c_int = 0;

// ExecStatusType
pub const PGRES_COMMAND_OK: c_int = 1;
pub const PGRES_TUPLES_OK: c_int = 2;

// PGVerbosity
pub const PQERRORS_VERBOSE: c_int = 2;

// PGContextVisibility
pub const PQSHOW_CONTEXT_ALWAYS: c_int = 2;

#[link(name = "pq")]
unsafe extern "C" {
    // Connection management
    pub fn PQconnectdb(conninfo: *const c_char) -> *mut PGconn;
    pub fn PQstatus(conn: *const PGconn) -> c_int;
    pub fn PQfinish(conn: *mut PGconn);

    // Error handling
    pub fn PQerrorMessage(conn: *const PGconn) -> *mut c_char;
    pub fn PQresultErrorMessage(res: *const PGresult) -> *mut c_char;

    // Tracing
    pub fn PQsetErrorVerbosity(conn: *mut PGconn, verbosity: c_int) -> c_int;
    pub fn PQsetErrorContextVisibility(conn: *mut PGconn, show_context: c_int) -> c_int;
    pub fn PQtrace(conn: *mut PGconn, debug_port: *mut FILE);

    // Execution
    pub fn PQexec(conn: *mut PGconn, query: *const c_char) -> *mut PGresult;

    pub fn PQexecParams(
        conn: *mut PGconn,
        command: *const c_char,
        nParams: c_int,
        paramTypes: *const Oid,
        paramValues: *const *const c_char,
        paramLengths: *const c_int,
        paramFormats: *const c_int,
        resultFormat: c_int,
    ) -> *mut PGresult;

    pub fn PQresultStatus(res: *const PGresult) -> c_int;
    pub fn PQclear(res: *mut PGresult);

    // Result inspection
    pub fn PQntuples(res: *const PGresult) -> c_int;
    pub fn PQnfields(res: *const PGresult) -> c_int;
    pub fn PQgetvalue(res: *const PGresult, tup_num: c_int, field_num: c_int) -> *mut c_char;
    pub fn PQgetlength(res: *const PGresult, tup_num: c_int, field_num: c_int) -> c_int;
    pub fn PQgetisnull(res: *const PGresult, tup_num: c_int, field_num: c_int) -> c_int;
    pub fn PQftype(res: *const PGresult, field_num: c_int) -> Oid;

    // Prepared statements
    pub fn PQprepare(
        conn: *mut PGconn,
        stmtName: *const c_char,
        query: *const c_char,
        nParams: c_int,
        paramTypes: *const Oid,
    ) -> *mut PGresult;

    pub fn PQdescribePrepared(conn: *mut PGconn, stmtName: *const c_char) -> *mut PGresult;
    pub fn PQnparams(res: *const PGresult) -> c_int;

    pub fn PQexecPrepared(
        conn: *mut PGconn,
        stmtName: *const c_char,
        nParams: c_int,
        paramValues: *const *const c_char,
        paramLengths: *const c_int,
        paramFormats: *const c_int,
        resultFormat: c_int,
    ) -> *mut PGresult;
}

// Stream plumbing for PQtrace; the trace output goes to stderr like the
// other backends' debug hooks.
unsafe extern "C" {
    pub fn fdopen(fildes: c_int, mode: *const c_char) -> *mut FILE;
}

/// File descriptor of standard error.
pub const STDERR_FILENO: c_int = 2;
