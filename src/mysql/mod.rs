//! MariaDB/MySQL driver adapter.
//!
//! Wraps connect with TLS/timeout options, autocommit-toggled transactions,
//! server-side prepared statements with adapter-owned parameter buffers, and
//! row fetch through a stored result whose per-column buffers are sized by
//! the server-reported maximum column length.

pub(crate) mod ffi;

use crate::convert;
use crate::db::{Core, DriverOption, ExecCallback};
use crate::status::{ColumnType, Fetch, Status};
use std::ffi::{CStr, CString, c_uint, c_ulong, c_void};
use std::ptr;
use std::slice;

/// Upper bound in seconds for the CONNECT_TIMEOUT option.
const MAX_CONNECT_TIMEOUT: u32 = 1000;

/// Backend state owned by the connection.
pub(crate) struct MysqlDb {
    pub(crate) mysql: *mut ffi::MYSQL,
}

/// Backend state owned by a prepared statement.
///
/// Parameter buffers live in `param_bufs`; the corresponding `bind_out`
/// entry points into them, so neither vector is ever resized after prepare.
/// The input side (`bind_in`/`in_*`) is rebuilt on every execute that
/// produces result columns.
pub(crate) struct MysqlStmt {
    stmt: *mut ffi::MYSQL_STMT,
    bind_out: Vec<ffi::MYSQL_BIND>,
    param_bufs: Vec<Option<Box<[u8]>>>,
    bind_in: Vec<ffi::MYSQL_BIND>,
    in_bufs: Vec<Box<[u8]>>,
    in_lengths: Box<[c_ulong]>,
    in_nulls: Box<[ffi::my_bool]>,
}

impl MysqlStmt {
    pub(crate) fn handle(&self) -> *mut c_void {
        self.stmt.cast()
    }
}

/// Record the connection's error message for `status`.
fn mysql_error(core: &mut Core, mysql: *mut ffi::MYSQL, status: Status) {
    // SAFETY: mysql is a live connection handle; mysql_error returns a
    // NUL-terminated string owned by the library.
    let message = unsafe { CStr::from_ptr(ffi::mysql_error(mysql)) }
        .to_string_lossy()
        .into_owned();
    core.set_error(status, message);
}

/// Record the statement's error message for `status`.
fn stmt_error(core: &mut Core, stmt: *mut ffi::MYSQL_STMT, status: Status) {
    // SAFETY: stmt is a live statement handle.
    let message = unsafe { CStr::from_ptr(ffi::mysql_stmt_error(stmt)) }
        .to_string_lossy()
        .into_owned();
    core.set_error(status, message);
}

/// Apply one option through `mysql_options`, reporting failures as `Param`.
fn set_option(core: &mut Core, mysql: *mut ffi::MYSQL, option: std::ffi::c_int, arg: *const c_void) {
    // SAFETY: mysql is a live handle; the library copies the option value.
    if unsafe { ffi::mysql_options(mysql, option, arg) } != 0 {
        core.set_status(Status::Param);
    }
}

fn set_string_option(
    core: &mut Core,
    mysql: *mut ffi::MYSQL,
    option: std::ffi::c_int,
    value: &str,
) {
    let Ok(c_value) = CString::new(value) else {
        core.set_status(Status::Param);
        return;
    };
    set_option(core, mysql, option, c_value.as_ptr().cast());
}

fn set_options(core: &mut Core, mysql: *mut ffi::MYSQL, options: &[DriverOption]) {
    for option in options {
        match option.key {
            "CONNECT_TIMEOUT" => {
                match convert::parse_u32_bounded(option.value, MAX_CONNECT_TIMEOUT) {
                    Some(timeout) => {
                        let timeout = timeout as c_uint;
                        set_option(
                            core,
                            mysql,
                            ffi::MYSQL_OPT_CONNECT_TIMEOUT,
                            (&raw const timeout).cast(),
                        );
                    }
                    None => {
                        core.set_status(Status::Param);
                    }
                }
            }
            "TLS_KEY" => set_string_option(core, mysql, ffi::MYSQL_OPT_SSL_KEY, option.value),
            "TLS_CERT" => set_string_option(core, mysql, ffi::MYSQL_OPT_SSL_CERT, option.value),
            "TLS_CA" => set_string_option(core, mysql, ffi::MYSQL_OPT_SSL_CA, option.value),
            "TLS_CAPATH" => set_string_option(core, mysql, ffi::MYSQL_OPT_SSL_CAPATH, option.value),
            "TLS_CIPHER" => set_string_option(core, mysql, ffi::MYSQL_OPT_SSL_CIPHER, option.value),
            _ => {
                core.set_status(Status::Param);
            }
        }
    }
}

/// Empty strings stand in for C NULL arguments on the public surface.
fn optional_cstring(core: &mut Core, value: &str) -> Result<Option<CString>, ()> {
    if value.is_empty() {
        return Ok(None);
    }
    match CString::new(value) {
        Ok(c) => Ok(Some(c)),
        Err(_) => {
            core.set_status(Status::Param);
            Err(())
        }
    }
}

/// Connect to the server.
///
/// An empty port string selects the client library's default. A handle that
/// was initialized but failed to connect is still returned so `close`
/// releases it.
pub(crate) fn open(
    core: &mut Core,
    location: &str,
    port: &str,
    username: &str,
    password: &str,
    database: &str,
    options: &[DriverOption],
) -> Option<MysqlDb> {
    let port = if port.is_empty() {
        0
    } else {
        match convert::parse_u32_bounded(port, u16::MAX as u32) {
            Some(port) => port,
            None => {
                core.set_status(Status::Param);
                return None;
            }
        }
    };

    if core.flags.debug {
        // SAFETY: mysql_debug takes a NUL-terminated option string.
        unsafe { ffi::mysql_debug(c"d".as_ptr()) };
    }

    // SAFETY: a null argument asks the library to allocate a new handle.
    let mysql = unsafe { ffi::mysql_init(ptr::null_mut()) };
    if mysql.is_null() {
        core.set_status(Status::Nomem);
        return None;
    }
    let db = MysqlDb { mysql };

    set_options(core, mysql, options);
    if core.status != Status::Ok {
        return Some(db);
    }

    let (Ok(c_host), Ok(c_user), Ok(c_passwd), Ok(c_db)) = (
        optional_cstring(core, location),
        optional_cstring(core, username),
        optional_cstring(core, password),
        optional_cstring(core, database),
    ) else {
        return Some(db);
    };
    let as_ptr = |c: &Option<CString>| c.as_ref().map_or(ptr::null(), |c| c.as_ptr());

    // SAFETY: all pointers are valid NUL-terminated strings or null.
    let connected = unsafe {
        ffi::mysql_real_connect(
            mysql,
            as_ptr(&c_host),
            as_ptr(&c_user),
            as_ptr(&c_passwd),
            as_ptr(&c_db),
            port as c_uint,
            ptr::null(),
            0,
        )
    };
    if connected.is_null() {
        mysql_error(core, mysql, Status::Open);
    }
    Some(db)
}

pub(crate) fn close(m: &MysqlDb) {
    // SAFETY: the handle came from mysql_init and is closed exactly once.
    unsafe { ffi::mysql_close(m.mysql) };
}

pub(crate) fn db_handle(m: &MysqlDb) -> *mut c_void {
    m.mysql.cast()
}

pub(crate) fn begin_transaction(core: &mut Core, m: &MysqlDb) {
    // SAFETY: m.mysql is a live connection handle.
    if unsafe { ffi::mysql_autocommit(m.mysql, 0) } != 0 {
        mysql_error(core, m.mysql, Status::Exec);
    }
}

pub(crate) fn commit(core: &mut Core, m: &MysqlDb) {
    // SAFETY: m.mysql is a live connection handle.
    if unsafe { ffi::mysql_commit(m.mysql) } != 0 || unsafe { ffi::mysql_autocommit(m.mysql, 1) } != 0
    {
        mysql_error(core, m.mysql, Status::Exec);
    }
}

pub(crate) fn rollback(core: &mut Core, m: &MysqlDb) {
    // SAFETY: m.mysql is a live connection handle.
    if unsafe { ffi::mysql_rollback(m.mysql) } != 0
        || unsafe { ffi::mysql_autocommit(m.mysql, 1) } != 0
    {
        mysql_error(core, m.mysql, Status::Exec);
    }
}

/// Execute a SQL string directly, invoking `callback` once per stored row.
pub(crate) fn exec(core: &mut Core, m: &MysqlDb, sql: &str, mut callback: Option<ExecCallback<'_>>) {
    let Some(sql_len) = convert::size_to_ulong(sql.len()) else {
        core.set_status(Status::Overflow);
        return;
    };
    // SAFETY: the query is length-counted, no terminator needed.
    if unsafe { ffi::mysql_real_query(m.mysql, sql.as_ptr().cast(), sql_len) } != 0 {
        mysql_error(core, m.mysql, Status::Exec);
        return;
    }

    // SAFETY: m.mysql is a live connection handle.
    let result = unsafe { ffi::mysql_store_result(m.mysql) };
    if result.is_null() {
        if unsafe { ffi::mysql_errno(m.mysql) } != 0 {
            core.set_status(Status::Exec);
        }
        return;
    }

    if let Some(callback) = callback.as_mut() {
        // SAFETY: result is a live stored result set.
        let num_fields = unsafe { ffi::mysql_num_fields(result) } as usize;
        let num_rows = unsafe { ffi::mysql_num_rows(result) };
        let mut cols: Vec<Option<&[u8]>> = Vec::with_capacity(num_fields);

        for _ in 0..num_rows {
            // SAFETY: num_rows bounds the stored result, so each fetch
            // yields a valid row with num_fields values and lengths.
            let row = unsafe { ffi::mysql_fetch_row(result) };
            let lengths = unsafe { ffi::mysql_fetch_lengths(result) };
            if row.is_null() || lengths.is_null() {
                core.set_status(Status::Exec);
                break;
            }

            cols.clear();
            let mut wrapped = false;
            for i in 0..num_fields {
                // SAFETY: row and lengths each have num_fields entries.
                let value = unsafe { *row.add(i) };
                let Some(len) = convert::ulong_to_size(unsafe { *lengths.add(i) }) else {
                    wrapped = true;
                    break;
                };
                if value.is_null() {
                    cols.push(None);
                } else {
                    // SAFETY: value points at len bytes owned by the result.
                    cols.push(Some(unsafe { slice::from_raw_parts(value.cast::<u8>(), len) }));
                }
            }
            if wrapped {
                core.set_status(Status::Overflow);
                break;
            }
            if !callback(&cols) {
                core.set_status(Status::Exec);
                break;
            }
        }
    }

    // SAFETY: result is freed exactly once.
    unsafe { ffi::mysql_free_result(result) };
}

pub(crate) fn last_insert_id(_core: &mut Core, m: &MysqlDb) -> u64 {
    // SAFETY: m.mysql is a live connection handle.
    unsafe { ffi::mysql_insert_id(m.mysql) }
}

/// Number of result columns, read from the statement metadata.
fn stmt_num_cols(core: &mut Core, stmt: *mut ffi::MYSQL_STMT) -> usize {
    // SAFETY: stmt is a live prepared statement.
    let metadata = unsafe { ffi::mysql_stmt_result_metadata(stmt) };
    if metadata.is_null() {
        // No metadata is normal for statements without a result set.
        if unsafe { ffi::mysql_stmt_errno(stmt) } != 0 {
            core.set_status(Status::Nomem);
        }
        return 0;
    }
    let num_cols = unsafe { ffi::mysql_num_fields(metadata) } as usize;
    unsafe { ffi::mysql_free_result(metadata) };
    num_cols
}

/// Compile a statement, returning it with its parameter and column counts.
pub(crate) fn stmt_prepare(
    core: &mut Core,
    m: &MysqlDb,
    sql: &str,
) -> Option<(MysqlStmt, usize, usize)> {
    // SAFETY: m.mysql is a live connection handle.
    let stmt = unsafe { ffi::mysql_stmt_init(m.mysql) };
    if stmt.is_null() {
        mysql_error(core, m.mysql, Status::Prepare);
        return None;
    }

    let Some(sql_len) = convert::size_to_ulong(sql.len()) else {
        core.set_status(Status::Param);
        // SAFETY: the statement is released exactly once.
        unsafe { ffi::mysql_stmt_close(stmt) };
        return None;
    };
    // SAFETY: the query is length-counted, no terminator needed.
    if unsafe { ffi::mysql_stmt_prepare(stmt, sql.as_ptr().cast(), sql_len) } != 0 {
        stmt_error(core, stmt, Status::Prepare);
        // SAFETY: the statement is released exactly once.
        unsafe { ffi::mysql_stmt_close(stmt) };
        return None;
    }

    // SAFETY: stmt has been prepared.
    let num_params = unsafe { ffi::mysql_stmt_param_count(stmt) } as usize;
    let num_cols = stmt_num_cols(core, stmt);

    let st = MysqlStmt {
        stmt,
        bind_out: (0..num_params).map(|_| ffi::MYSQL_BIND::zeroed()).collect(),
        param_bufs: (0..num_params).map(|_| None).collect(),
        bind_in: Vec::new(),
        in_bufs: Vec::new(),
        in_lengths: Box::new([]),
        in_nulls: Box::new([]),
    };
    Some((st, num_params, num_cols))
}

/// Install an adapter-owned buffer as the parameter at `col_idx`.
///
/// Replacing the slot drops the previously bound buffer.
fn install_bind(
    core: &mut Core,
    st: &mut MysqlStmt,
    col_idx: usize,
    mut buf: Box<[u8]>,
    buffer_type: std::ffi::c_int,
) {
    let Some(buffer_length) = convert::size_to_ulong(buf.len()) else {
        core.set_status(Status::Overflow);
        return;
    };
    let buffer = buf.as_mut_ptr();
    st.param_bufs[col_idx] = Some(buf);

    let bind = &mut st.bind_out[col_idx];
    *bind = ffi::MYSQL_BIND::zeroed();
    bind.buffer_type = buffer_type;
    bind.buffer = buffer.cast();
    bind.buffer_length = buffer_length;
    bind.length = &raw mut bind.buffer_length;
}

pub(crate) fn stmt_bind_blob(core: &mut Core, st: &mut MysqlStmt, col_idx: usize, blob: &[u8]) {
    install_bind(
        core,
        st,
        col_idx,
        blob.to_vec().into_boxed_slice(),
        ffi::MYSQL_TYPE_BLOB,
    );
}

pub(crate) fn stmt_bind_int64(core: &mut Core, st: &mut MysqlStmt, col_idx: usize, i64: i64) {
    let buf: Box<[u8]> = Box::new(i64.to_ne_bytes());
    install_bind(core, st, col_idx, buf, ffi::MYSQL_TYPE_LONGLONG);
}

pub(crate) fn stmt_bind_text(core: &mut Core, st: &mut MysqlStmt, col_idx: usize, s: &str) {
    install_bind(
        core,
        st,
        col_idx,
        s.as_bytes().to_vec().into_boxed_slice(),
        ffi::MYSQL_TYPE_STRING,
    );
}

pub(crate) fn stmt_bind_null(_core: &mut Core, st: &mut MysqlStmt, col_idx: usize) {
    st.param_bufs[col_idx] = None;
    let bind = &mut st.bind_out[col_idx];
    *bind = ffi::MYSQL_BIND::zeroed();
    bind.buffer_type = ffi::MYSQL_TYPE_NULL;
}

/// Allocate the per-column input binds from the statement metadata.
///
/// Each column gets a BLOB-typed bind whose buffer is sized by the
/// server-reported maximum length, with length and null flags stored in
/// parallel arrays of identical cardinality.
fn allocate_bind_in(
    core: &mut Core,
    st: &mut MysqlStmt,
    metadata: *mut ffi::MYSQL_RES,
    num_cols: usize,
) -> bool {
    st.in_lengths = vec![0; num_cols].into_boxed_slice();
    st.in_nulls = vec![0; num_cols].into_boxed_slice();
    st.in_bufs = Vec::with_capacity(num_cols);
    st.bind_in = Vec::with_capacity(num_cols);

    for i in 0..num_cols {
        let Some(fieldnr) = convert::size_to_uint(i) else {
            core.set_status(Status::Nomem);
            return false;
        };
        // SAFETY: metadata is a live result set with num_cols fields.
        let field = unsafe { ffi::mysql_fetch_field_direct(metadata, fieldnr) };
        if field.is_null() {
            core.set_status(Status::Nomem);
            return false;
        }
        let Some(max_length) = convert::ulong_to_size(unsafe { (*field).max_length }) else {
            core.set_status(Status::Overflow);
            return false;
        };

        let mut buf = vec![0u8; max_length].into_boxed_slice();
        let mut bind = ffi::MYSQL_BIND::zeroed();
        bind.buffer_type = ffi::MYSQL_TYPE_BLOB;
        bind.buffer = buf.as_mut_ptr().cast();
        bind.buffer_length = max_length as c_ulong;
        bind.length = &raw mut st.in_lengths[i];
        bind.is_null = &raw mut st.in_nulls[i];
        st.in_bufs.push(buf);
        st.bind_in.push(bind);
    }
    true
}

/// Run the prepared statement with the currently bound parameters.
pub(crate) fn stmt_execute(core: &mut Core, st: &mut MysqlStmt, num_cols: usize) {
    let update_max_length: ffi::my_bool = 1;
    // SAFETY: st.stmt is a live prepared statement; bind_out has exactly
    // param_count entries whose buffers live in param_bufs.
    let failed = unsafe {
        ffi::mysql_stmt_attr_set(
            st.stmt,
            ffi::STMT_ATTR_UPDATE_MAX_LENGTH,
            (&raw const update_max_length).cast(),
        ) != 0
            || ffi::mysql_stmt_bind_param(st.stmt, st.bind_out.as_mut_ptr()) != 0
            || ffi::mysql_stmt_execute(st.stmt) != 0
            || ffi::mysql_stmt_store_result(st.stmt) != 0
    };
    if failed {
        stmt_error(core, st.stmt, Status::Exec);
        return;
    }

    if num_cols == 0 {
        return;
    }

    // SAFETY: st.stmt has a stored result.
    let metadata = unsafe { ffi::mysql_stmt_result_metadata(st.stmt) };
    if metadata.is_null() {
        stmt_error(core, st.stmt, Status::Nomem);
        return;
    }
    if allocate_bind_in(core, st, metadata, num_cols) {
        // SAFETY: bind_in and its pointed-to arrays stay alive for the life
        // of the statement.
        if unsafe { ffi::mysql_stmt_bind_result(st.stmt, st.bind_in.as_mut_ptr()) } != 0 {
            stmt_error(core, st.stmt, Status::Exec);
        }
    }
    // SAFETY: metadata is freed exactly once.
    unsafe { ffi::mysql_free_result(metadata) };
}

pub(crate) fn stmt_fetch(core: &mut Core, st: &mut MysqlStmt) -> Fetch {
    // SAFETY: st.stmt has a stored and bound result.
    match unsafe { ffi::mysql_stmt_fetch(st.stmt) } {
        0 => Fetch::Row,
        ffi::MYSQL_NO_DATA => Fetch::Done,
        _ => {
            stmt_error(core, st.stmt, Status::Fetch);
            Fetch::Error
        }
    }
}

fn column_bytes(st: &MysqlStmt, col_idx: usize) -> Option<&[u8]> {
    if *st.in_nulls.get(col_idx)? != 0 {
        return None;
    }
    let buf = st.in_bufs.get(col_idx)?;
    let len = (st.in_lengths[col_idx] as usize).min(buf.len());
    Some(&buf[..len])
}

pub(crate) fn stmt_column_blob<'a>(
    _core: &mut Core,
    st: &'a MysqlStmt,
    col_idx: usize,
) -> Result<Option<&'a [u8]>, Status> {
    Ok(column_bytes(st, col_idx))
}

pub(crate) fn stmt_column_int64(
    core: &mut Core,
    st: &MysqlStmt,
    col_idx: usize,
) -> Result<i64, Status> {
    let Some(bytes) = column_bytes(st, col_idx) else {
        return Ok(0);
    };
    std::str::from_utf8(bytes)
        .ok()
        .and_then(convert::parse_i64)
        .ok_or_else(|| core.set_status(Status::ColumnCoerce))
}

pub(crate) fn stmt_column_text<'a>(
    core: &mut Core,
    st: &'a MysqlStmt,
    col_idx: usize,
) -> Result<Option<&'a str>, Status> {
    let Some(bytes) = column_bytes(st, col_idx) else {
        return Ok(None);
    };
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(Some(s)),
        Err(_) => Err(core.set_error(Status::ColumnCoerce, "column text is not valid UTF-8")),
    }
}

pub(crate) fn stmt_column_type(_core: &mut Core, st: &MysqlStmt, col_idx: usize) -> ColumnType {
    match st.in_nulls.get(col_idx) {
        Some(&0) => ColumnType::Blob,
        _ => ColumnType::Null,
    }
}

pub(crate) fn stmt_close(_core: &mut Core, st: &mut MysqlStmt) {
    if !st.stmt.is_null() {
        // SAFETY: the statement is released exactly once.
        unsafe { ffi::mysql_stmt_close(st.stmt) };
        st.stmt = ptr::null_mut();
    }
}
