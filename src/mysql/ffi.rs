//! Low-level FFI bindings to the MariaDB/MySQL client library.
//!
//! Manually written against the MariaDB Connector/C ABI (which kept the
//! classic libmysqlclient layout for `MYSQL_BIND`/`MYSQL_FIELD` and the
//! `mysql_option` numbering). Only the subset the driver uses is declared.

#![allow(non_camel_case_types)]

use std::ffi::{c_char, c_int, c_uint, c_ulong, c_ulonglong, c_void};

/// Opaque connection handle.
#[repr(C)]
pub struct MYSQL {
    _private: [u8; 0],
}

/// Opaque prepared statement handle.
#[repr(C)]
pub struct MYSQL_STMT {
    _private: [u8; 0],
}

/// Opaque result set handle.
#[repr(C)]
pub struct MYSQL_RES {
    _private: [u8; 0],
}

pub type my_bool = c_char;
pub type my_ulonglong = c_ulonglong;

/// A fetched row: array of nullable column values.
pub type MYSQL_ROW = *mut *mut c_char;

/// Column metadata as returned by `mysql_fetch_field_direct`.
#[repr(C)]
pub struct MYSQL_FIELD {
    pub name: *mut c_char,
    pub org_name: *mut c_char,
    pub table: *mut c_char,
    pub org_table: *mut c_char,
    pub db: *mut c_char,
    pub catalog: *mut c_char,
    pub def: *mut c_char,
    pub length: c_ulong,
    pub max_length: c_ulong,
    pub name_length: c_uint,
    pub org_name_length: c_uint,
    pub table_length: c_uint,
    pub org_table_length: c_uint,
    pub db_length: c_uint,
    pub catalog_length: c_uint,
    pub def_length: c_uint,
    pub flags: c_uint,
    pub decimals: c_uint,
    pub charsetnr: c_uint,
    pub field_type: c_int,
    pub extension: *mut c_void,
}

/// Input/output bind descriptor for prepared statements.
///
/// The library reads `buffer`, `buffer_length`, `buffer_type`, `length`,
/// `is_null`, and `error`; everything else is internal state it fills in
/// itself, declared here only to get the struct size and offsets right.
#[repr(C)]
pub struct MYSQL_BIND {
    pub length: *mut c_ulong,
    pub is_null: *mut my_bool,
    pub buffer: *mut c_void,
    pub error: *mut my_bool,
    pub row_ptr: *mut c_void,
    pub store_param_func: *mut c_void,
    pub fetch_result: *mut c_void,
    pub skip_result: *mut c_void,
    pub buffer_length: c_ulong,
    pub offset: c_ulong,
    pub length_value: c_ulong,
    pub param_number: c_uint,
    pub pack_length: c_uint,
    pub buffer_type: c_int,
    pub error_value: my_bool,
    pub is_unsigned: my_bool,
    pub long_data_used: my_bool,
    pub is_null_value: my_bool,
    pub extension: *mut c_void,
}

impl MYSQL_BIND {
    /// An all-zero bind, matching the `memset` the C API expects before use.
    pub fn zeroed() -> Self {
        // SAFETY: MYSQL_BIND contains only raw pointers and integers, all of
        // which have a valid all-zero representation.
        unsafe { std::mem::zeroed() }
    }
}

// mysql_option values (MariaDB Connector/C numbering)
pub const MYSQL_OPT_CONNECT_TIMEOUT: c_int = 0;
pub const MYSQL_OPT_SSL_KEY: c_int = 25;
pub const MYSQL_OPT_SSL_CERT: c_int = 26;
pub const MYSQL_OPT_SSL_CA: c_int = 27;
pub const MYSQL_OPT_SSL_CAPATH: c_int = 28;
pub const MYSQL_OPT_SSL_CIPHER: c_int = 29;

// enum_stmt_attr_type values
pub const STMT_ATTR_UPDATE_MAX_LENGTH: c_int = 0;

// enum_field_types values
pub const MYSQL_TYPE_NULL: c_int = 6;
pub const MYSQL_TYPE_LONGLONG: c_int = 8;
pub const MYSQL_TYPE_BLOB: c_int = 252;
pub const MYSQL_TYPE_STRING: c_int = 254;

/// Returned by `mysql_stmt_fetch` when the result set is exhausted.
pub const MYSQL_NO_DATA: c_int = 100;

#[link(name = "mysqlclient")]
unsafe extern "C" {
    // Connection management
    pub fn mysql_init(mysql: *mut MYSQL) -> *mut MYSQL;
    pub fn mysql_options(mysql: *mut MYSQL, option: c_int, arg: *const c_void) -> c_int;

    pub fn mysql_real_connect(
        mysql: *mut MYSQL,
        host: *const c_char,
        user: *const c_char,
        passwd: *const c_char,
        db: *const c_char,
        port: c_uint,
        unix_socket: *const c_char,
        client_flag: c_ulong,
    ) -> *mut MYSQL;

    pub fn mysql_close(mysql: *mut MYSQL);
    pub fn mysql_debug(debug: *const c_char);

    // Error handling
    pub fn mysql_errno(mysql: *mut MYSQL) -> c_uint;
    pub fn mysql_error(mysql: *mut MYSQL) -> *const c_char;

    // Transactions
    pub fn mysql_autocommit(mysql: *mut MYSQL, auto_mode: my_bool) -> my_bool;
    pub fn mysql_commit(mysql: *mut MYSQL) -> my_bool;
    pub fn mysql_rollback(mysql: *mut MYSQL) -> my_bool;

    // Direct execution
    pub fn mysql_real_query(mysql: *mut MYSQL, stmt_str: *const c_char, length: c_ulong) -> c_int;
    pub fn mysql_store_result(mysql: *mut MYSQL) -> *mut MYSQL_RES;
    pub fn mysql_free_result(result: *mut MYSQL_RES);
    pub fn mysql_num_fields(result: *mut MYSQL_RES) -> c_uint;
    pub fn mysql_num_rows(result: *mut MYSQL_RES) -> my_ulonglong;
    pub fn mysql_fetch_row(result: *mut MYSQL_RES) -> MYSQL_ROW;
    pub fn mysql_fetch_lengths(result: *mut MYSQL_RES) -> *mut c_ulong;
    pub fn mysql_fetch_field_direct(result: *mut MYSQL_RES, fieldnr: c_uint) -> *mut MYSQL_FIELD;

    // Metadata
    pub fn mysql_insert_id(mysql: *mut MYSQL) -> my_ulonglong;

    // Prepared statements
    pub fn mysql_stmt_init(mysql: *mut MYSQL) -> *mut MYSQL_STMT;
    pub fn mysql_stmt_prepare(stmt: *mut MYSQL_STMT, query: *const c_char, length: c_ulong)
        -> c_int;
    pub fn mysql_stmt_param_count(stmt: *mut MYSQL_STMT) -> c_ulong;
    pub fn mysql_stmt_result_metadata(stmt: *mut MYSQL_STMT) -> *mut MYSQL_RES;
    pub fn mysql_stmt_attr_set(
        stmt: *mut MYSQL_STMT,
        attr_type: c_int,
        attr: *const c_void,
    ) -> my_bool;
    pub fn mysql_stmt_bind_param(stmt: *mut MYSQL_STMT, bnd: *mut MYSQL_BIND) -> my_bool;
    pub fn mysql_stmt_execute(stmt: *mut MYSQL_STMT) -> c_int;
    pub fn mysql_stmt_store_result(stmt: *mut MYSQL_STMT) -> c_int;
    pub fn mysql_stmt_bind_result(stmt: *mut MYSQL_STMT, bnd: *mut MYSQL_BIND) -> my_bool;
    pub fn mysql_stmt_fetch(stmt: *mut MYSQL_STMT) -> c_int;
    pub fn mysql_stmt_errno(stmt: *mut MYSQL_STMT) -> c_uint;
    pub fn mysql_stmt_error(stmt: *mut MYSQL_STMT) -> *const c_char;
    pub fn mysql_stmt_close(stmt: *mut MYSQL_STMT) -> my_bool;
}
