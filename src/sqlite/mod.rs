//! SQLite driver adapter.
//!
//! Wraps file-open, direct exec with a per-row callback, prepare/step/reset,
//! positional binding (SQLite indices are 1-based; the public surface is
//! 0-based), column extraction with the engine's native type reporting, and
//! a bounded busy-retry loop around execute and fetch.

pub(crate) mod ffi;

use crate::convert;
use crate::db::{Core, DriverOption, ExecCallback};
use crate::status::{ColumnType, Fetch, Status};
use std::ffi::{CStr, CString, c_char, c_int, c_uint, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::ptr;
use std::slice;
use std::time::Duration;

/// Maximum number of retries when the engine reports busy.
const MAX_BUSY_RETRIES: u32 = 10;

/// Backend state owned by the connection.
pub(crate) struct SqliteDb {
    pub(crate) db: *mut ffi::sqlite3,
}

/// Backend state owned by a prepared statement.
pub(crate) struct SqliteStmt {
    stmt: *mut ffi::sqlite3_stmt,
    db: *mut ffi::sqlite3,
}

impl SqliteStmt {
    pub(crate) fn handle(&self) -> *mut c_void {
        self.stmt.cast()
    }
}

/// Record the engine's error message for `status`.
///
/// Falls back to the generic string for `rc` when no connection handle
/// exists yet.
fn sqlite_error(core: &mut Core, db: *mut ffi::sqlite3, rc: c_int, status: Status) {
    let message = if db.is_null() {
        ffi::error_string(rc).to_string()
    } else {
        // SAFETY: db is a live connection handle; errmsg returns a valid
        // C string owned by SQLite.
        unsafe { CStr::from_ptr(ffi::sqlite3_errmsg(db)) }
            .to_string_lossy()
            .into_owned()
    };
    core.set_error(status, message);
}

const TRACE_ALL: c_uint = ffi::SQLITE_TRACE_STMT
    | ffi::SQLITE_TRACE_PROFILE
    | ffi::SQLITE_TRACE_ROW
    | ffi::SQLITE_TRACE_CLOSE;

unsafe extern "C" fn trace_hook(
    mask: c_uint,
    _ctx: *mut c_void,
    _p: *mut c_void,
    x: *mut c_void,
) -> c_int {
    match mask {
        ffi::SQLITE_TRACE_STMT => {
            if !x.is_null() {
                // SAFETY: for STMT events X is the unexpanded SQL text.
                let sql = unsafe { CStr::from_ptr(x.cast::<c_char>()) }.to_string_lossy();
                eprintln!("SQLITE_TRACE_STMT: {sql}");
            }
        }
        ffi::SQLITE_TRACE_PROFILE => {
            // SAFETY: for PROFILE events X points at an estimated runtime
            // in nanoseconds.
            let ns = unsafe { *x.cast::<i64>() };
            eprintln!("SQLITE_TRACE_PROFILE: statement took {ns} ns");
        }
        ffi::SQLITE_TRACE_ROW => {
            eprintln!("SQLITE_TRACE_ROW: statement generated new row");
        }
        ffi::SQLITE_TRACE_CLOSE => {
            eprintln!("SQLITE_TRACE_CLOSE: database connection closed");
        }
        _ => {
            eprintln!("SQLITE_TRACE_UNKNOWN: unknown trace mask");
        }
    }
    0
}

/// Open a database file.
///
/// Ignores port/user/password/database; the location is the file path. On a
/// failed open the handle SQLite returned (if any) is still kept so `close`
/// releases it.
pub(crate) fn open(core: &mut Core, location: &str, options: &[DriverOption]) -> Option<SqliteDb> {
    let mut vfs = None;
    for option in options {
        if option.key == "VFS" {
            vfs = Some(option.value);
        } else {
            core.set_status(Status::Param);
        }
    }
    if core.status != Status::Ok {
        return None;
    }

    let Ok(c_location) = CString::new(location) else {
        core.set_error(Status::Param, "database location contains a null byte");
        return None;
    };
    let c_vfs = match vfs {
        Some(name) => match CString::new(name) {
            Ok(c) => Some(c),
            Err(_) => {
                core.set_error(Status::Param, "VFS name contains a null byte");
                return None;
            }
        },
        None => None,
    };

    let mut flags = 0;
    if core.flags.read_only {
        flags |= ffi::SQLITE_OPEN_READONLY;
    }
    if core.flags.read_write {
        flags |= ffi::SQLITE_OPEN_READWRITE;
    }
    if core.flags.create {
        flags |= ffi::SQLITE_OPEN_CREATE;
    }
    if flags == 0 {
        flags = ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
    }

    let mut db: *mut ffi::sqlite3 = ptr::null_mut();
    // SAFETY: all pointers are valid for the duration of the call.
    let rc = unsafe {
        ffi::sqlite3_open_v2(
            c_location.as_ptr(),
            &mut db,
            flags,
            c_vfs.as_ref().map_or(ptr::null(), |v| v.as_ptr()),
        )
    };
    if rc != ffi::SQLITE_OK {
        core.set_error(Status::Open, ffi::error_string(rc));
    } else if core.flags.debug {
        // SAFETY: db is a live connection handle.
        if unsafe { ffi::sqlite3_trace_v2(db, TRACE_ALL, Some(trace_hook), ptr::null_mut()) }
            != ffi::SQLITE_OK
        {
            sqlite_error(core, db, 0, Status::Open);
        }
    }

    Some(SqliteDb { db })
}

pub(crate) fn close(core: &mut Core, sq: &SqliteDb) {
    // SAFETY: close_v2 accepts the handle exactly once; a null handle is a
    // harmless no-op.
    if unsafe { ffi::sqlite3_close_v2(sq.db) } != ffi::SQLITE_OK {
        sqlite_error(core, sq.db, 0, Status::Close);
    }
}

pub(crate) fn db_handle(sq: &SqliteDb) -> *mut c_void {
    sq.db.cast()
}

struct ExecCtx<'a, 'b> {
    core: &'a mut Core,
    callback: Option<ExecCallback<'b>>,
    panic: Option<Box<dyn std::any::Any + Send>>,
}

const SQLITE_ABORT: c_int = 4;

unsafe extern "C" fn exec_trampoline(
    arg: *mut c_void,
    num_cols: c_int,
    values: *mut *mut c_char,
    _names: *mut *mut c_char,
) -> c_int {
    // SAFETY: arg is the ExecCtx passed to sqlite3_exec below, valid for the
    // duration of that call.
    let ctx = unsafe { &mut *arg.cast::<ExecCtx>() };
    if ctx.panic.is_some() {
        return SQLITE_ABORT;
    }

    let num_cols = num_cols.max(0) as usize;
    let mut cols: Vec<Option<&[u8]>> = Vec::with_capacity(num_cols);
    for i in 0..num_cols {
        // SAFETY: values has num_cols entries, each either null or a
        // NUL-terminated string owned by SQLite for this row.
        let value = unsafe { *values.add(i) };
        if value.is_null() {
            cols.push(None);
        } else {
            cols.push(Some(unsafe { CStr::from_ptr(value) }.to_bytes()));
        }
    }

    let keep_going = match ctx.callback.as_mut() {
        Some(callback) => match catch_unwind(AssertUnwindSafe(|| callback(&cols))) {
            Ok(keep_going) => keep_going,
            Err(payload) => {
                ctx.panic = Some(payload);
                false
            }
        },
        None => true,
    };

    if keep_going {
        ffi::SQLITE_OK
    } else {
        ctx.core.set_status(Status::Exec);
        SQLITE_ABORT
    }
}

/// Execute a SQL string directly, invoking `callback` once per result row.
pub(crate) fn exec(
    core: &mut Core,
    sq: &SqliteDb,
    sql: &str,
    callback: Option<ExecCallback<'_>>,
) {
    let Ok(c_sql) = CString::new(sql) else {
        core.set_error(Status::Exec, "SQL contains a null byte");
        return;
    };

    let trampoline = callback.as_ref().map(|_| {
        exec_trampoline
            as unsafe extern "C" fn(*mut c_void, c_int, *mut *mut c_char, *mut *mut c_char) -> c_int
    });
    let mut ctx = ExecCtx {
        core,
        callback,
        panic: None,
    };

    let mut errmsg: *mut c_char = ptr::null_mut();
    // SAFETY: ctx outlives the call; sqlite copies nothing out of it.
    unsafe {
        ffi::sqlite3_exec(
            sq.db,
            c_sql.as_ptr(),
            trampoline,
            (&mut ctx as *mut ExecCtx).cast(),
            &mut errmsg,
        );
    }

    if !errmsg.is_null() {
        // SAFETY: errmsg is a NUL-terminated string allocated by SQLite.
        let message = unsafe { CStr::from_ptr(errmsg) }.to_string_lossy().into_owned();
        unsafe { ffi::sqlite3_free(errmsg.cast()) };
        ctx.core.set_error(Status::Exec, message);
    }

    if let Some(payload) = ctx.panic.take() {
        resume_unwind(payload);
    }
}

fn exec_noresult(core: &mut Core, sq: &SqliteDb, sql: &str) {
    exec(core, sq, sql, None);
}

pub(crate) fn begin_transaction(core: &mut Core, sq: &SqliteDb) {
    exec_noresult(core, sq, "BEGIN");
}

pub(crate) fn commit(core: &mut Core, sq: &SqliteDb) {
    exec_noresult(core, sq, "COMMIT");
}

pub(crate) fn rollback(core: &mut Core, sq: &SqliteDb) {
    exec_noresult(core, sq, "ROLLBACK");
}

/// Rowid of the most recent insert.
///
/// SQLite itself never returns a negative rowid, but a virtual table
/// implementation might.
pub(crate) fn last_insert_id(core: &mut Core, sq: &SqliteDb) -> Option<u64> {
    // SAFETY: sq.db is a live connection handle.
    let rowid = unsafe { ffi::sqlite3_last_insert_rowid(sq.db) };
    match convert::int64_to_uint64(rowid) {
        Some(id) => Some(id),
        None => {
            core.set_status(Status::Overflow);
            None
        }
    }
}

/// Compile a statement, returning it with its parameter and column counts.
pub(crate) fn stmt_prepare(
    core: &mut Core,
    sq: &SqliteDb,
    sql: &str,
) -> Option<(SqliteStmt, usize, usize)> {
    let Ok(c_sql) = CString::new(sql) else {
        core.set_error(Status::Prepare, "SQL contains a null byte");
        return None;
    };
    let Some(nbyte) = convert::size_to_int(sql.len()) else {
        core.set_status(Status::Param);
        return None;
    };

    let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
    // SAFETY: all pointers are valid for the duration of the call.
    let rc = unsafe {
        ffi::sqlite3_prepare_v2(sq.db, c_sql.as_ptr(), nbyte, &mut stmt, ptr::null_mut())
    };
    if rc != ffi::SQLITE_OK {
        sqlite_error(core, sq.db, rc, Status::Prepare);
        return None;
    }

    // SAFETY: stmt is a freshly prepared statement.
    let num_params = unsafe { ffi::sqlite3_bind_parameter_count(stmt) }.max(0) as usize;
    let num_cols = unsafe { ffi::sqlite3_column_count(stmt) }.max(0) as usize;
    Some((SqliteStmt { stmt, db: sq.db }, num_params, num_cols))
}

/// Translate a 0-based placeholder index into SQLite's 1-based scheme.
fn bind_index(col_idx: usize) -> Option<c_int> {
    convert::add_size(col_idx, 1).and_then(convert::size_to_int)
}

pub(crate) fn stmt_bind_blob(core: &mut Core, st: &mut SqliteStmt, col_idx: usize, blob: &[u8]) {
    let (Some(blobsz), Some(idx)) = (convert::size_to_int(blob.len()), bind_index(col_idx)) else {
        core.set_status(Status::Overflow);
        return;
    };
    // SAFETY: SQLITE_TRANSIENT instructs SQLite to copy the buffer before
    // returning.
    let rc = unsafe {
        ffi::sqlite3_bind_blob(st.stmt, idx, blob.as_ptr().cast(), blobsz, ffi::SQLITE_TRANSIENT)
    };
    if rc != ffi::SQLITE_OK {
        sqlite_error(core, st.db, 0, Status::Bind);
    }
}

pub(crate) fn stmt_bind_int64(core: &mut Core, st: &mut SqliteStmt, col_idx: usize, i64: i64) {
    let Some(idx) = bind_index(col_idx) else {
        core.set_status(Status::Overflow);
        return;
    };
    // SAFETY: st.stmt is a live prepared statement.
    if unsafe { ffi::sqlite3_bind_int64(st.stmt, idx, i64) } != ffi::SQLITE_OK {
        sqlite_error(core, st.db, 0, Status::Bind);
    }
}

pub(crate) fn stmt_bind_text(core: &mut Core, st: &mut SqliteStmt, col_idx: usize, s: &str) {
    let (Some(len), Some(idx)) = (convert::size_to_int(s.len()), bind_index(col_idx)) else {
        core.set_status(Status::Overflow);
        return;
    };
    // SAFETY: SQLITE_TRANSIENT instructs SQLite to copy the buffer before
    // returning.
    let rc = unsafe {
        ffi::sqlite3_bind_text(st.stmt, idx, s.as_ptr().cast(), len, ffi::SQLITE_TRANSIENT)
    };
    if rc != ffi::SQLITE_OK {
        sqlite_error(core, st.db, 0, Status::Bind);
    }
}

pub(crate) fn stmt_bind_null(core: &mut Core, st: &mut SqliteStmt, col_idx: usize) {
    let Some(idx) = bind_index(col_idx) else {
        core.set_status(Status::Overflow);
        return;
    };
    // SAFETY: st.stmt is a live prepared statement.
    if unsafe { ffi::sqlite3_bind_null(st.stmt, idx) } != ffi::SQLITE_OK {
        sqlite_error(core, st.db, 0, Status::Bind);
    }
}

fn busy_sleep() {
    std::thread::sleep(Duration::from_millis(10));
}

/// Run the statement with the currently bound parameters.
///
/// Step followed by reset: the reset rewinds the statement so a subsequent
/// fetch re-runs it from the first row, while the bindings stay in place.
pub(crate) fn stmt_execute(core: &mut Core, st: &mut SqliteStmt) {
    let mut num_retries = 0;
    loop {
        // SAFETY: st.stmt is a live prepared statement.
        let step_rc = unsafe { ffi::sqlite3_step(st.stmt) };
        if step_rc == ffi::SQLITE_DONE || step_rc == ffi::SQLITE_ROW {
            if unsafe { ffi::sqlite3_reset(st.stmt) } != ffi::SQLITE_OK {
                sqlite_error(core, st.db, 0, Status::Exec);
            }
        } else if step_rc == ffi::SQLITE_BUSY {
            if num_retries < MAX_BUSY_RETRIES {
                tracing::debug!(num_retries, "sqlite busy during execute, retrying");
                busy_sleep();
                num_retries += 1;
                continue;
            }
            sqlite_error(core, st.db, step_rc, Status::Exec);
        } else {
            sqlite_error(core, st.db, step_rc, Status::Exec);
        }
        return;
    }
}

pub(crate) fn stmt_fetch(core: &mut Core, st: &mut SqliteStmt) -> Fetch {
    let mut num_retries = 0;
    loop {
        // SAFETY: st.stmt is a live prepared statement.
        let step_rc = unsafe { ffi::sqlite3_step(st.stmt) };
        if step_rc == ffi::SQLITE_ROW {
            return Fetch::Row;
        } else if step_rc == ffi::SQLITE_DONE {
            return Fetch::Done;
        } else if step_rc == ffi::SQLITE_BUSY {
            if num_retries < MAX_BUSY_RETRIES {
                tracing::debug!(num_retries, "sqlite busy during fetch, retrying");
                busy_sleep();
                num_retries += 1;
                continue;
            }
            sqlite_error(core, st.db, step_rc, Status::Fetch);
            return Fetch::Error;
        } else {
            sqlite_error(core, st.db, step_rc, Status::Fetch);
            return Fetch::Error;
        }
    }
}

pub(crate) fn stmt_column_blob<'a>(
    core: &mut Core,
    st: &'a mut SqliteStmt,
    col_idx: usize,
) -> Result<Option<&'a [u8]>, Status> {
    let Some(col) = convert::size_to_int(col_idx) else {
        return Err(core.set_status(Status::Overflow));
    };
    // SAFETY: the statement has a current row; the returned pointer stays
    // valid until the next step/reset/finalize, which the statement borrow
    // outlasts.
    let blob = unsafe { ffi::sqlite3_column_blob(st.stmt, col) };
    let col_bytes = unsafe { ffi::sqlite3_column_bytes(st.stmt, col) };
    let Some(len) = convert::int_to_size(col_bytes) else {
        return Err(core.set_status(Status::Overflow));
    };
    if blob.is_null() {
        if len != 0 {
            sqlite_error(core, st.db, 0, Status::Nomem);
            return Err(Status::Nomem);
        }
        return Ok(None);
    }
    // SAFETY: blob points at len bytes owned by SQLite for the current row.
    Ok(Some(unsafe { slice::from_raw_parts(blob.cast::<u8>(), len) }))
}

pub(crate) fn stmt_column_int64(
    core: &mut Core,
    st: &mut SqliteStmt,
    col_idx: usize,
) -> Result<i64, Status> {
    let Some(col) = convert::size_to_int(col_idx) else {
        return Err(core.set_status(Status::Overflow));
    };
    // SAFETY: the statement has a current row; SQLite coerces the value.
    Ok(unsafe { ffi::sqlite3_column_int64(st.stmt, col) })
}

pub(crate) fn stmt_column_text<'a>(
    core: &mut Core,
    st: &'a mut SqliteStmt,
    col_idx: usize,
) -> Result<Option<&'a str>, Status> {
    let Some(col) = convert::size_to_int(col_idx) else {
        return Err(core.set_status(Status::Overflow));
    };
    // SAFETY: the statement has a current row; column_text converts the
    // value to UTF-8 text valid until the next step/reset/finalize.
    let text = unsafe { ffi::sqlite3_column_text(st.stmt, col) };
    let col_bytes = unsafe { ffi::sqlite3_column_bytes(st.stmt, col) };
    let Some(len) = convert::int_to_size(col_bytes) else {
        return Err(core.set_status(Status::Overflow));
    };
    if text.is_null() {
        if len != 0 {
            sqlite_error(core, st.db, 0, Status::Nomem);
            return Err(Status::Nomem);
        }
        return Ok(None);
    }
    // SAFETY: text points at len bytes of the converted value.
    let bytes = unsafe { slice::from_raw_parts(text.cast::<u8>(), len) };
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(Some(s)),
        Err(_) => Err(core.set_error(Status::ColumnCoerce, "column text is not valid UTF-8")),
    }
}

pub(crate) fn stmt_column_type(core: &mut Core, st: &mut SqliteStmt, col_idx: usize) -> ColumnType {
    let Some(col) = convert::size_to_int(col_idx) else {
        core.set_status(Status::Overflow);
        return ColumnType::Error;
    };
    // SAFETY: the statement has a current row.
    match unsafe { ffi::sqlite3_column_type(st.stmt, col) } {
        ffi::SQLITE_INTEGER => ColumnType::Int,
        ffi::SQLITE_TEXT => ColumnType::Text,
        ffi::SQLITE_BLOB => ColumnType::Blob,
        ffi::SQLITE_NULL => ColumnType::Null,
        _ => ColumnType::Other,
    }
}

pub(crate) fn stmt_close(core: &mut Core, st: &SqliteStmt) {
    // SAFETY: finalize accepts the statement exactly once.
    if unsafe { ffi::sqlite3_finalize(st.stmt) } != ffi::SQLITE_OK {
        sqlite_error(core, st.db, 0, Status::Close);
    }
}
