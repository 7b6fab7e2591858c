//! PostgreSQL driver adapter.
//!
//! Wraps connection-string assembly, per-connection unique statement names,
//! `PQprepare`/`PQexecPrepared`, bytea hex decoding driven by an OID→typname
//! cache loaded at connect time, and transactions via literal
//! `BEGIN`/`COMMIT`/`ROLLBACK`.

pub(crate) mod conninfo;
pub(crate) mod ffi;

use crate::convert;
use crate::db::{Core, DriverOption, ExecCallback};
use crate::hex;
use crate::status::{ColumnType, Fetch, Status};
use std::borrow::Cow;
use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::ptr;
use std::slice;

/// Longest typname kept in the OID cache; anything longer is cut off. Only
/// a few built-in type names are ever consulted.
const TYPNAME_MAX: usize = 48;

/// One row of the OID→typname cache.
pub(crate) struct OidTypname {
    oid: ffi::Oid,
    typname: String,
}

/// Backend state owned by the connection.
pub(crate) struct PgDb {
    pub(crate) conn: *mut ffi::PGconn,
    /// Increments for every statement prepared on this connection.
    stmt_counter: u64,
    /// Sorted by oid ascending, as returned by the catalog query.
    oid_typnames: Vec<OidTypname>,
}

/// Backend state owned by a prepared statement.
///
/// Parameter values, lengths, and formats are parallel arrays of exactly
/// the statement's parameter count. `decoded` holds per-column buffers for
/// bytea values, freed on the next fetch or close.
pub(crate) struct PgStmt {
    name: CString,
    param_values: Vec<Option<Box<[u8]>>>,
    param_lengths: Vec<c_int>,
    param_formats: Vec<c_int>,
    exec_result: *mut ffi::PGresult,
    exec_row_count: c_int,
    fetch_row_index: c_int,
    decoded: Vec<Option<Box<[u8]>>>,
}

impl PgStmt {
    /// The statement's unique server-side name.
    pub(crate) fn handle(&self) -> *mut c_void {
        self.name.as_ptr().cast_mut().cast()
    }
}

/// Record the connection's error message for `status`.
fn pq_error(core: &mut Core, conn: *mut ffi::PGconn, status: Status) {
    // SAFETY: conn is a live connection; PQerrorMessage returns a
    // NUL-terminated string owned by the connection.
    let message = unsafe { CStr::from_ptr(ffi::PQerrorMessage(conn)) }
        .to_string_lossy()
        .into_owned();
    core.set_error(status, message);
}

/// Record a result's error message for `status`.
fn result_error(core: &mut Core, result: *mut ffi::PGresult, status: Status) {
    // SAFETY: result is a live PGresult.
    let message = unsafe { CStr::from_ptr(ffi::PQresultErrorMessage(result)) }
        .to_string_lossy()
        .into_owned();
    core.set_error(status, message);
}

/// Check whether `oid` maps to `typname` in the cache.
///
/// Linear scan instead of a binary search: the only oid consulted in
/// practice (bytea) sits near the front of the sorted list.
fn is_oid(list: &[OidTypname], oid: ffi::Oid, typname: &str) -> bool {
    list.iter()
        .find(|entry| entry.oid == oid)
        .is_some_and(|entry| entry.typname == typname)
}

fn truncate_typname(mut typname: String) -> String {
    if typname.len() > TYPNAME_MAX {
        let mut end = TYPNAME_MAX;
        while !typname.is_char_boundary(end) {
            end -= 1;
        }
        typname.truncate(end);
    }
    typname
}

/// Load the OID→typname cache from the server catalog.
fn query_oid_list(core: &mut Core, conn: *mut ffi::PGconn) -> Option<Vec<OidTypname>> {
    // SAFETY: conn is a live connection and the query is NUL-terminated.
    let result =
        unsafe { ffi::PQexec(conn, c"SELECT oid, typname FROM pg_type ORDER BY oid ASC".as_ptr()) };
    if result.is_null() || unsafe { ffi::PQresultStatus(result) } != ffi::PGRES_TUPLES_OK {
        core.set_status(Status::Exec);
        if !result.is_null() {
            // SAFETY: result is freed exactly once.
            unsafe { ffi::PQclear(result) };
        }
        return None;
    }

    // SAFETY: result holds the tuples; row/column indices stay in range.
    let nrows = unsafe { ffi::PQntuples(result) };
    let mut list = Vec::with_capacity(nrows.max(0) as usize);
    for i in 0..nrows {
        let oid_str = unsafe { CStr::from_ptr(ffi::PQgetvalue(result, i, 0)) }.to_string_lossy();
        let Some(oid) = convert::parse_u32_bounded(&oid_str, u32::MAX) else {
            core.set_status(Status::ColumnCoerce);
            unsafe { ffi::PQclear(result) };
            return None;
        };
        let typname = unsafe { CStr::from_ptr(ffi::PQgetvalue(result, i, 1)) }
            .to_string_lossy()
            .into_owned();
        list.push(OidTypname {
            oid,
            typname: truncate_typname(typname),
        });
    }
    unsafe { ffi::PQclear(result) };
    Some(list)
}

/// Connect to the server and load the OID cache.
pub(crate) fn open(
    core: &mut Core,
    location: &str,
    port: &str,
    username: &str,
    password: &str,
    database: &str,
    options: &[DriverOption],
) -> Option<PgDb> {
    let conninfo = conninfo::build(core, location, port, username, password, database, options)?;
    let Ok(c_conninfo) = CString::new(conninfo) else {
        core.set_status(Status::Param);
        return None;
    };

    // SAFETY: the conninfo string is NUL-terminated.
    let conn = unsafe { ffi::PQconnectdb(c_conninfo.as_ptr()) };
    if conn.is_null() {
        core.set_status(Status::Open);
        return None;
    }
    // SAFETY: conn is a live connection object.
    if unsafe { ffi::PQstatus(conn) } != ffi::CONNECTION_OK {
        pq_error(core, conn, Status::Open);
        unsafe { ffi::PQfinish(conn) };
        return None;
    }

    if core.flags.debug {
        // SAFETY: conn is live; the fdopen'd stream wraps stderr and stays
        // open for the life of the process.
        unsafe {
            ffi::PQsetErrorVerbosity(conn, ffi::PQERRORS_VERBOSE);
            ffi::PQsetErrorContextVisibility(conn, ffi::PQSHOW_CONTEXT_ALWAYS);
            let stream = ffi::fdopen(ffi::STDERR_FILENO, c"w".as_ptr());
            if !stream.is_null() {
                ffi::PQtrace(conn, stream);
            }
        }
    }

    let Some(oid_typnames) = query_oid_list(core, conn) else {
        // SAFETY: conn is finished exactly once.
        unsafe { ffi::PQfinish(conn) };
        return None;
    };

    Some(PgDb {
        conn,
        stmt_counter: 1,
        oid_typnames,
    })
}

pub(crate) fn close(pg: &PgDb) {
    // SAFETY: conn is finished exactly once.
    unsafe { ffi::PQfinish(pg.conn) };
}

pub(crate) fn db_handle(pg: &PgDb) -> *mut c_void {
    pg.conn.cast()
}

/// Run a statement whose result rows are not needed.
fn exec_noresult(core: &mut Core, pg: &PgDb, sql: &CStr) {
    // SAFETY: pg.conn is live and sql is NUL-terminated.
    let result = unsafe { ffi::PQexec(pg.conn, sql.as_ptr()) };
    if result.is_null() {
        core.set_status(Status::Nomem);
        return;
    }
    if unsafe { ffi::PQresultStatus(result) } != ffi::PGRES_COMMAND_OK {
        core.set_status(Status::Exec);
    }
    // SAFETY: result is freed exactly once.
    unsafe { ffi::PQclear(result) };
}

pub(crate) fn begin_transaction(core: &mut Core, pg: &PgDb) {
    exec_noresult(core, pg, c"BEGIN");
}

pub(crate) fn commit(core: &mut Core, pg: &PgDb) {
    exec_noresult(core, pg, c"COMMIT");
}

pub(crate) fn rollback(core: &mut Core, pg: &PgDb) {
    exec_noresult(core, pg, c"ROLLBACK");
}

/// Execute a SQL string directly, invoking `callback` once per result row.
///
/// bytea columns are decoded from their hex representation before the
/// callback sees them.
pub(crate) fn exec(core: &mut Core, pg: &PgDb, sql: &str, mut callback: Option<ExecCallback<'_>>) {
    let Ok(c_sql) = CString::new(sql) else {
        core.set_error(Status::Exec, "SQL contains a null byte");
        return;
    };

    // SAFETY: pg.conn is live; no parameters are passed.
    let result = unsafe {
        ffi::PQexecParams(
            pg.conn,
            c_sql.as_ptr(),
            0,
            ptr::null(),
            ptr::null(),
            ptr::null(),
            ptr::null(),
            0,
        )
    };
    if result.is_null() {
        pq_error(core, pg.conn, Status::Exec);
        return;
    }

    // SAFETY: result is a live PGresult for the rest of the function.
    let result_status = unsafe { ffi::PQresultStatus(result) };
    if result_status == ffi::PGRES_COMMAND_OK {
        // Insert/update has no rows for the caller.
    } else if result_status == ffi::PGRES_TUPLES_OK {
        if let Some(callback) = callback.as_mut() {
            let num_rows = unsafe { ffi::PQntuples(result) };
            let num_cols = unsafe { ffi::PQnfields(result) }.max(0);

            let mut cols: Vec<Option<Cow<'_, [u8]>>> = Vec::with_capacity(num_cols as usize);
            for row in 0..num_rows {
                cols.clear();
                for col in 0..num_cols {
                    // SAFETY: row/col are within the result bounds.
                    if unsafe { ffi::PQgetisnull(result, row, col) } != 0 {
                        cols.push(None);
                        continue;
                    }
                    let value = unsafe { ffi::PQgetvalue(result, row, col) };
                    let length = unsafe { ffi::PQgetlength(result, row, col) };
                    let Some(len) = convert::int_to_size(length) else {
                        core.set_status(Status::Overflow);
                        break;
                    };
                    // SAFETY: value points at len bytes owned by the result.
                    let bytes =
                        unsafe { slice::from_raw_parts(value.cast::<u8>().cast_const(), len) };
                    let ftype = unsafe { ffi::PQftype(result, col) };
                    if is_oid(&pg.oid_typnames, ftype, "bytea") {
                        let digits = bytes.strip_prefix(b"\\x").unwrap_or(bytes);
                        match hex::decode(digits) {
                            Some(bin) => cols.push(Some(Cow::Owned(bin))),
                            None => {
                                core.set_error(
                                    Status::ColumnCoerce,
                                    "malformed bytea hex encoding",
                                );
                                cols.push(None);
                            }
                        }
                    } else {
                        cols.push(Some(Cow::Borrowed(bytes)));
                    }
                }
                if core.status == Status::Ok {
                    let view: Vec<Option<&[u8]>> = cols.iter().map(|c| c.as_deref()).collect();
                    if !callback(&view) {
                        core.set_status(Status::Exec);
                    }
                }
            }
        }
    } else {
        result_error(core, result, Status::Exec);
    }
    // SAFETY: result is freed exactly once.
    unsafe { ffi::PQclear(result) };
}

/// Generate the next unique statement name for this connection.
fn gen_stmt_name(pg: &mut PgDb) -> CString {
    let name = format!("pqs{}", pg.stmt_counter);
    pg.stmt_counter += 1;
    // The name is ASCII digits and letters, so the conversion cannot fail.
    CString::new(name).unwrap_or_default()
}

/// Compile a statement under a fresh name and size its parameter arrays.
pub(crate) fn stmt_prepare(
    core: &mut Core,
    pg: &mut PgDb,
    sql: &str,
) -> Option<(PgStmt, usize, usize)> {
    let name = gen_stmt_name(pg);
    let Ok(c_sql) = CString::new(sql) else {
        core.set_error(Status::Prepare, "SQL contains a null byte");
        return None;
    };

    // SAFETY: pg.conn is live; name and sql are NUL-terminated.
    let result = unsafe { ffi::PQprepare(pg.conn, name.as_ptr(), c_sql.as_ptr(), 0, ptr::null()) };
    if result.is_null() {
        pq_error(core, pg.conn, Status::Prepare);
        return None;
    }
    if unsafe { ffi::PQresultStatus(result) } != ffi::PGRES_COMMAND_OK {
        result_error(core, result, Status::Prepare);
        unsafe { ffi::PQclear(result) };
        return None;
    }
    unsafe { ffi::PQclear(result) };

    // SAFETY: the statement was just prepared under this name.
    let describe = unsafe { ffi::PQdescribePrepared(pg.conn, name.as_ptr()) };
    if describe.is_null() || unsafe { ffi::PQresultStatus(describe) } != ffi::PGRES_COMMAND_OK {
        core.set_status(Status::Prepare);
        if !describe.is_null() {
            unsafe { ffi::PQclear(describe) };
        }
        return None;
    }
    let nparams = unsafe { ffi::PQnparams(describe) };
    unsafe { ffi::PQclear(describe) };

    let Some(num_params) = convert::int_to_size(nparams) else {
        core.set_status(Status::Overflow);
        return None;
    };

    tracing::trace!(name = %name.to_string_lossy(), num_params, "prepared statement");

    let st = PgStmt {
        name,
        param_values: (0..num_params).map(|_| None).collect(),
        param_lengths: vec![0; num_params],
        param_formats: vec![0; num_params],
        exec_result: ptr::null_mut(),
        exec_row_count: 0,
        fetch_row_index: 0,
        decoded: Vec::new(),
    };
    Some((st, num_params, 0))
}

/// Install a binary-format parameter. Rebinding drops the previous buffer.
pub(crate) fn stmt_bind_blob(core: &mut Core, st: &mut PgStmt, col_idx: usize, blob: &[u8]) {
    let Some(length) = convert::size_to_int(blob.len()) else {
        core.set_status(Status::Overflow);
        return;
    };
    st.param_values[col_idx] = Some(blob.to_vec().into_boxed_slice());
    st.param_lengths[col_idx] = length;
    st.param_formats[col_idx] = 1;
}

/// Install a text-format parameter.
///
/// libpq reads text-format parameters as C strings, so the stored copy is
/// NUL-terminated.
pub(crate) fn stmt_bind_text(core: &mut Core, st: &mut PgStmt, col_idx: usize, s: &str) {
    let Some(length) = convert::size_to_int(s.len()) else {
        core.set_status(Status::Overflow);
        return;
    };
    let mut buf = Vec::with_capacity(s.len() + 1);
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
    st.param_values[col_idx] = Some(buf.into_boxed_slice());
    st.param_lengths[col_idx] = length;
    st.param_formats[col_idx] = 0;
}

/// Integers travel as text: the wire protocol binds by text by default.
pub(crate) fn stmt_bind_int64(core: &mut Core, st: &mut PgStmt, col_idx: usize, i64: i64) {
    stmt_bind_text(core, st, col_idx, &i64.to_string());
}

pub(crate) fn stmt_bind_null(_core: &mut Core, st: &mut PgStmt, col_idx: usize) {
    st.param_values[col_idx] = None;
    st.param_lengths[col_idx] = 0;
    st.param_formats[col_idx] = 0;
}

/// Run the prepared statement with the currently bound parameters.
pub(crate) fn stmt_execute(core: &mut Core, pg: &PgDb, st: &mut PgStmt, num_cols: &mut usize) {
    if !st.exec_result.is_null() {
        // SAFETY: the previous result is freed exactly once.
        unsafe { ffi::PQclear(st.exec_result) };
        st.exec_result = ptr::null_mut();
    }

    let Some(nparams) = convert::size_to_int(st.param_values.len()) else {
        core.set_status(Status::Overflow);
        return;
    };
    let values: Vec<*const c_char> = st
        .param_values
        .iter()
        .map(|v| v.as_ref().map_or(ptr::null(), |b| b.as_ptr().cast()))
        .collect();

    // SAFETY: the parallel arrays all have nparams entries and the bound
    // buffers outlive the call.
    let result = unsafe {
        ffi::PQexecPrepared(
            pg.conn,
            st.name.as_ptr(),
            nparams,
            values.as_ptr(),
            st.param_lengths.as_ptr(),
            st.param_formats.as_ptr(),
            0,
        )
    };
    st.exec_result = result;
    st.fetch_row_index = 0;

    if result.is_null() {
        pq_error(core, pg.conn, Status::Exec);
        return;
    }
    // SAFETY: result is a live PGresult.
    let result_status = unsafe { ffi::PQresultStatus(result) };
    if result_status != ffi::PGRES_COMMAND_OK && result_status != ffi::PGRES_TUPLES_OK {
        result_error(core, result, Status::Exec);
        return;
    }

    st.exec_row_count = unsafe { ffi::PQntuples(result) };
    let nfields = unsafe { ffi::PQnfields(result) };
    match convert::int_to_size(nfields) {
        Some(n) => {
            *num_cols = n;
            st.decoded = (0..n).map(|_| None).collect();
        }
        None => {
            core.set_status(Status::Nomem);
        }
    }
}

/// Advance the cursor over the stored result.
///
/// The previous row's decoded bytea buffers are released here.
pub(crate) fn stmt_fetch(_core: &mut Core, st: &mut PgStmt) -> Fetch {
    for slot in &mut st.decoded {
        *slot = None;
    }
    if st.fetch_row_index >= st.exec_row_count {
        Fetch::Done
    } else {
        st.fetch_row_index += 1;
        Fetch::Row
    }
}

pub(crate) fn stmt_column_blob<'a>(
    core: &mut Core,
    pg: &PgDb,
    st: &'a mut PgStmt,
    col_idx: usize,
) -> Result<Option<&'a [u8]>, Status> {
    let Some(col) = convert::size_to_int(col_idx) else {
        return Err(core.set_status(Status::Overflow));
    };
    let row = st.fetch_row_index - 1;

    // SAFETY: fetch returned Row, so row is within the stored result.
    if unsafe { ffi::PQgetisnull(st.exec_result, row, col) } != 0 {
        return Ok(None);
    }
    let value = unsafe { ffi::PQgetvalue(st.exec_result, row, col) };
    let length = unsafe { ffi::PQgetlength(st.exec_result, row, col) };
    let Some(len) = convert::int_to_size(length) else {
        return Err(core.set_status(Status::Overflow));
    };
    // SAFETY: value points at len bytes owned by exec_result, which lives
    // until the statement is re-executed or closed.
    let bytes = unsafe { slice::from_raw_parts(value.cast::<u8>().cast_const(), len) };

    let ftype = unsafe { ffi::PQftype(st.exec_result, col) };
    if is_oid(&pg.oid_typnames, ftype, "bytea") {
        let digits = bytes.strip_prefix(b"\\x").unwrap_or(bytes);
        let Some(bin) = hex::decode(digits) else {
            return Err(core.set_error(Status::ColumnCoerce, "malformed bytea hex encoding"));
        };
        let slot = &mut st.decoded[col_idx];
        *slot = Some(bin.into_boxed_slice());
        Ok(slot.as_deref())
    } else {
        Ok(Some(bytes))
    }
}

pub(crate) fn stmt_column_text<'a>(
    core: &mut Core,
    pg: &PgDb,
    st: &'a mut PgStmt,
    col_idx: usize,
) -> Result<Option<&'a str>, Status> {
    match stmt_column_blob(core, pg, st, col_idx)? {
        None => Ok(None),
        Some(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => Ok(Some(s)),
            Err(_) => Err(core.set_error(Status::ColumnCoerce, "column text is not valid UTF-8")),
        },
    }
}

pub(crate) fn stmt_column_int64(
    core: &mut Core,
    pg: &PgDb,
    st: &mut PgStmt,
    col_idx: usize,
) -> Result<i64, Status> {
    let Some(text) = stmt_column_text(core, pg, st, col_idx)? else {
        return Ok(0);
    };
    match convert::parse_i64(text) {
        Some(v) => Ok(v),
        None => Err(core.set_status(Status::ColumnCoerce)),
    }
}

pub(crate) fn stmt_column_type(core: &mut Core, st: &PgStmt, col_idx: usize) -> ColumnType {
    let Some(col) = convert::size_to_int(col_idx) else {
        core.set_status(Status::Overflow);
        return ColumnType::Error;
    };
    let row = st.fetch_row_index - 1;
    // SAFETY: fetch returned Row, so row is within the stored result.
    if unsafe { ffi::PQgetisnull(st.exec_result, row, col) } != 0 {
        ColumnType::Null
    } else {
        ColumnType::Blob
    }
}

/// Release the statement: clear the stored result and `DEALLOCATE` the
/// server-side name through the direct-exec path.
pub(crate) fn stmt_close(core: &mut Core, pg: &PgDb, st: &mut PgStmt) {
    if !st.exec_result.is_null() {
        // SAFETY: the result is freed exactly once.
        unsafe { ffi::PQclear(st.exec_result) };
        st.exec_result = ptr::null_mut();
    }
    let sql = format!("DEALLOCATE {}", st.name.to_string_lossy());
    exec(core, pg, &sql, None);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oid_lookup_matches_typname() {
        let list = vec![
            OidTypname {
                oid: 16,
                typname: "bool".to_string(),
            },
            OidTypname {
                oid: 17,
                typname: "bytea".to_string(),
            },
            OidTypname {
                oid: 25,
                typname: "text".to_string(),
            },
        ];
        assert!(is_oid(&list, 17, "bytea"));
        assert!(!is_oid(&list, 25, "bytea"));
        assert!(!is_oid(&list, 999, "bytea"));
    }

    #[test]
    fn typname_truncated_to_cache_width() {
        let long = "x".repeat(TYPNAME_MAX + 10);
        assert_eq!(truncate_typname(long).len(), TYPNAME_MAX);
        assert_eq!(truncate_typname("bytea".to_string()), "bytea");
    }

    #[test]
    fn stmt_names_are_unique_and_monotonic() {
        let mut pg = PgDb {
            conn: std::ptr::null_mut(),
            stmt_counter: 1,
            oid_typnames: Vec::new(),
        };
        assert_eq!(gen_stmt_name(&mut pg).to_str(), Ok("pqs1"));
        assert_eq!(gen_stmt_name(&mut pg).to_str(), Ok("pqs2"));
        assert_eq!(gen_stmt_name(&mut pg).to_str(), Ok("pqs3"));
        assert_eq!(pg.stmt_counter, 4);
    }
}
