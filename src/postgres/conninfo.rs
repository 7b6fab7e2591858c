//! Connection-string assembly for libpq.
//!
//! `PQconnectdb` takes a single string of space-separated `key=value`
//! tokens. The key set is fixed; a token is emitted only when its value is
//! non-empty.

use crate::db::{Core, DriverOption};
use crate::status::Status;

/// Keys libpq understands, in emission order. Most stay unset; the open
/// arguments and recognized driver options fill in the handful that matter.
const PARAM_KEYS: [&str; 30] = [
    "host",
    "hostaddr",
    "port",
    "dbname",
    "user",
    "password",
    "passfile",
    "connect_timeout",
    "client_encoding",
    "options",
    "application_name",
    "fallback_application_name",
    "keepalives",
    "keepalives_idle",
    "keepalives_interval",
    "keepalives_count",
    "tty",
    "replication",
    "sslmode",
    "requiressl",
    "sslcompression",
    "sslcert",
    "sslkey",
    "sslrootcert",
    "sslcrl",
    "requirepeer",
    "krbsrvname",
    "gsslib",
    "service",
    "target_session_attrs",
];

const IDX_CONNECT_TIMEOUT: usize = 7;
const IDX_SSLMODE: usize = 18;
const IDX_SSLCERT: usize = 21;
const IDX_SSLKEY: usize = 22;
const IDX_SSLROOTCERT: usize = 23;

/// Build the conninfo string, or return `None` with status set when an
/// unrecognized option key was supplied.
pub(crate) fn build(
    core: &mut Core,
    location: &str,
    port: &str,
    username: &str,
    password: &str,
    database: &str,
    options: &[DriverOption],
) -> Option<String> {
    let mut values: [&str; PARAM_KEYS.len()] = [""; PARAM_KEYS.len()];
    values[0] = location;
    values[2] = port;
    values[3] = database;
    values[4] = username;
    values[5] = password;

    for option in options {
        let idx = match option.key {
            "CONNECT_TIMEOUT" => IDX_CONNECT_TIMEOUT,
            "TLS_MODE" => IDX_SSLMODE,
            "TLS_CERT" => IDX_SSLCERT,
            "TLS_KEY" => IDX_SSLKEY,
            "TLS_CA" => IDX_SSLROOTCERT,
            _ => {
                core.set_status(Status::Param);
                continue;
            }
        };
        values[idx] = option.value;
    }
    if core.status != Status::Ok {
        return None;
    }

    let mut conninfo = String::new();
    for (key, value) in PARAM_KEYS.iter().zip(values.iter()) {
        if !value.is_empty() {
            conninfo.push(' ');
            conninfo.push_str(key);
            conninfo.push('=');
            conninfo.push_str(value);
        }
    }
    Some(conninfo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_core;

    #[test]
    fn emits_only_non_empty_values() {
        let mut core = test_core();
        let conninfo = build(&mut core, "localhost", "5432", "user", "", "db", &[]).unwrap();
        assert_eq!(conninfo, " host=localhost port=5432 dbname=db user=user");
        assert_eq!(core.status, Status::Ok);
    }

    #[test]
    fn maps_recognized_options() {
        let mut core = test_core();
        let options = [
            DriverOption::new("CONNECT_TIMEOUT", "5"),
            DriverOption::new("TLS_MODE", "verify-full"),
            DriverOption::new("TLS_CERT", "/tls/cert.pem"),
            DriverOption::new("TLS_KEY", "/tls/key.pem"),
            DriverOption::new("TLS_CA", "/tls/ca.pem"),
        ];
        let conninfo = build(&mut core, "db.example.com", "5432", "u", "secret", "d", &options)
            .unwrap();
        assert_eq!(
            conninfo,
            " host=db.example.com port=5432 dbname=d user=u password=secret \
             connect_timeout=5 sslmode=verify-full sslcert=/tls/cert.pem \
             sslkey=/tls/key.pem sslrootcert=/tls/ca.pem"
        );
    }

    #[test]
    fn unknown_option_sets_param() {
        let mut core = test_core();
        let options = [DriverOption::new("NOT_AN_OPTION", "x")];
        assert!(build(&mut core, "h", "1", "u", "p", "d", &options).is_none());
        assert_eq!(core.status, Status::Param);
    }
}
