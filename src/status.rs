//! Status codes shared by every operation in the library.

use std::fmt;

/// Result of any library operation.
///
/// Every fallible call records its status on the connection, where it stays
/// until [`Db::clear_status`](crate::Db::clear_status) resets it. Use
/// [`Db::errstr`](crate::Db::errstr) for a human-readable description of the
/// most recent failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Successful operation completed.
    Ok,
    /// Invalid parameter.
    Param,
    /// Memory allocation failed inside a backend library.
    Nomem,
    /// Overflow, wrap, or conversion issue.
    Overflow,
    /// Failed to execute SQL statement.
    Exec,
    /// Failed to prepare statement (syntax error, communication error, ...).
    Prepare,
    /// Failed to bind parameter.
    Bind,
    /// Failed to fetch the next result from the executed prepared statement.
    Fetch,
    /// Error occurred while coercing the requested column value.
    ColumnCoerce,
    /// Driver not supported or not compiled into the library.
    DriverNosupport,
    /// Failed to open the database handle or connection to the server.
    Open,
    /// Failed to close or free resources associated with the database.
    Close,
}

impl Status {
    /// True when the status indicates success.
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }

    /// Default description used when the backend did not supply one.
    pub(crate) fn default_message(self) -> &'static str {
        match self {
            Status::Ok => "Success",
            Status::Param => "Invalid parameter",
            Status::Nomem => "Memory allocation failed",
            Status::Overflow => "Overflow/wrap/conversion",
            Status::Exec => "Failed to execute SQL statement",
            Status::Prepare => "Failed to prepare statement",
            Status::Bind => "Failed to bind parameter",
            Status::Fetch => "Failed to fetch next statement result",
            Status::ColumnCoerce => "Error coercing the requested column value",
            Status::DriverNosupport => "Driver not supported",
            Status::Open => "Failed to open database context",
            Status::Close => "Failed to close database context",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_message())
    }
}

/// Outcome of [`Stmt::fetch`](crate::Stmt::fetch).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Fetch {
    /// The next row has been loaded; the `column_*` accessors read it.
    Row,
    /// No more rows exist in the result set.
    Done,
    /// An error occurred while fetching; the connection status is set.
    Error,
}

/// Column data type reported by [`Stmt::column_type`](crate::Stmt::column_type).
///
/// The MariaDB/MySQL and PostgreSQL adapters only distinguish null from
/// non-null and report every non-null column as [`ColumnType::Blob`]; the
/// SQLite adapter reports the engine's native storage class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Integer.
    Int,
    /// Text string.
    Text,
    /// Blob/binary data.
    Blob,
    /// NULL value.
    Null,
    /// Non-standard data type.
    Other,
    /// Error occurred while determining the data type.
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_default_messages() {
        assert_eq!(Status::Ok.to_string(), "Success");
        assert_eq!(Status::Nomem.to_string(), "Memory allocation failed");
        assert_eq!(Status::DriverNosupport.to_string(), "Driver not supported");
        assert_eq!(
            Status::ColumnCoerce.to_string(),
            "Error coercing the requested column value"
        );
    }

    #[test]
    fn is_ok() {
        assert!(Status::Ok.is_ok());
        assert!(!Status::Exec.is_ok());
        assert!(!Status::Close.is_ok());
    }
}
