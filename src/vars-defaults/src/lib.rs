// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The built-in configuration variables.
//!
//! Pure data: every built-in variable's name, type, default, bounds,
//! context, flags, and hooks, collected by [`builtins`] and registered into
//! a [`VarRegistry`] once at process start via [`registry`]. The engine
//! proper lives in `mz_vars`; nothing here is consulted at runtime except
//! through the registry built from it.

use std::sync::Arc;

use mz_vars::{
    CheckFailure, VarAlias, VarContext, VarDefinition, VarExtra, VarFlags, VarGroup, VarRegistry,
    VarSource, VarUnit, VarValue,
};
use uncased::UncasedStr;

/// Severity levels a client can ask to receive messages at.
pub const CLIENT_MESSAGE_LEVELS: &[(&str, i32)] = &[
    ("debug5", 0),
    ("debug4", 1),
    ("debug3", 2),
    ("debug2", 3),
    ("debug1", 4),
    ("log", 5),
    ("notice", 6),
    ("warning", 7),
    ("error", 8),
    // Hidden alias.
    ("debug", 3),
];

/// Severity levels the server log can be filtered at.
pub const SERVER_MESSAGE_LEVELS: &[(&str, i32)] = &[
    ("debug5", 0),
    ("debug4", 1),
    ("debug3", 2),
    ("debug2", 3),
    ("debug1", 4),
    ("info", 5),
    ("notice", 6),
    ("warning", 7),
    ("error", 8),
    ("log", 9),
    ("fatal", 10),
    ("panic", 11),
    // Hidden alias.
    ("debug", 3),
];

/// Transaction isolation levels.
pub const ISOLATION_LEVELS: &[(&str, i32)] = &[
    ("serializable", 3),
    ("repeatable read", 2),
    ("read committed", 1),
    ("read uncommitted", 0),
];

/// Styles for displaying interval values.
pub const INTERVAL_STYLES: &[(&str, i32)] = &[
    ("postgres", 0),
    ("postgres_verbose", 1),
    ("sql_standard", 2),
    ("iso_8601", 3),
];

/// Output formats for binary string values.
pub const BYTEA_OUTPUT_FORMATS: &[(&str, i32)] = &[("hex", 0), ("escape", 1)];

/// Statement classes eligible for logging.
pub const LOG_STATEMENT_CLASSES: &[(&str, i32)] =
    &[("none", 0), ("ddl", 1), ("mod", 2), ("all", 3)];

// ---------------------------------------------------------------------------
// Preset facts about the build.

pub static SERVER_VERSION: VarDefinition = VarDefinition::new_string(
    "server_version",
    "15.4",
    VarContext::Internal,
    "Shows the server version.",
)
.with_group(VarGroup::Preset)
.with_flags(VarFlags::REPORT);

pub static SERVER_VERSION_NUM: VarDefinition = VarDefinition::new_int(
    "server_version_num",
    150004,
    150004,
    150004,
    VarUnit::None,
    VarContext::Internal,
    "Shows the server version as an integer.",
)
.with_group(VarGroup::Preset);

pub static INTEGER_DATETIMES: VarDefinition = VarDefinition::new_bool(
    "integer_datetimes",
    true,
    VarContext::Internal,
    "Shows whether datetimes are integer based.",
)
.with_group(VarGroup::Preset)
.with_flags(VarFlags::REPORT);

// ---------------------------------------------------------------------------
// Connections and authentication.

pub static MAX_CONNECTIONS: VarDefinition = VarDefinition::new_int(
    "max_connections",
    100,
    1,
    262143,
    VarUnit::None,
    VarContext::ServerStart,
    "Sets the maximum number of concurrent connections.",
)
.with_group(VarGroup::ConnectionAuth);

pub static SUPERUSER_RESERVED_CONNECTIONS: VarDefinition = VarDefinition::new_int(
    "superuser_reserved_connections",
    3,
    0,
    262143,
    VarUnit::None,
    VarContext::ServerStart,
    "Sets the number of connection slots reserved for superusers.",
)
.with_group(VarGroup::ConnectionAuth);

pub static MAX_PREPARED_TRANSACTIONS: VarDefinition = VarDefinition::new_uint(
    "max_prepared_transactions",
    0,
    0,
    262143,
    VarUnit::None,
    VarContext::ServerStart,
    "Sets the maximum number of simultaneously prepared transactions.",
)
.with_group(VarGroup::ConnectionAuth);

pub static PORT: VarDefinition = VarDefinition::new_int(
    "port",
    5432,
    1,
    65535,
    VarUnit::None,
    VarContext::ServerStart,
    "Sets the TCP port the server listens on.",
)
.with_group(VarGroup::ConnectionAuth);

pub static LISTEN_ADDRESSES: VarDefinition = VarDefinition::new_string(
    "listen_addresses",
    "localhost",
    VarContext::ServerStart,
    "Sets the host name or IP address(es) to listen to.",
)
.with_group(VarGroup::ConnectionAuth)
.with_flags(VarFlags::LIST_INPUT);

pub static UNIX_SOCKET_PERMISSIONS: VarDefinition = VarDefinition::new_int(
    "unix_socket_permissions",
    0o777,
    0,
    0o777,
    VarUnit::None,
    VarContext::ServerStart,
    "Sets the access permissions of the Unix-domain socket.",
)
.with_group(VarGroup::ConnectionAuth)
.with_show(show_unix_socket_permissions);

pub static SSL: VarDefinition = VarDefinition::new_bool(
    "ssl",
    false,
    VarContext::Reload,
    "Enables SSL connections.",
)
.with_group(VarGroup::ConnectionAuth);

pub static SESSION_AUTHORIZATION: VarDefinition = VarDefinition::new_string(
    "session_authorization",
    "",
    VarContext::User,
    "Sets the session user name.",
)
.with_group(VarGroup::ConnectionAuth)
.with_flags(
    VarFlags::REPORT
        .union(VarFlags::NO_RESET_ALL)
        .union(VarFlags::NOT_WHILE_SECURITY_RESTRICTED),
)
.with_check(check_session_authorization);

pub static ROLE: VarDefinition = VarDefinition::new_string(
    "role",
    "none",
    VarContext::User,
    "Sets the current role.",
)
.with_group(VarGroup::ConnectionAuth)
.with_flags(
    VarFlags::NO_RESET_ALL
        .union(VarFlags::NOT_WHILE_SECURITY_RESTRICTED)
        // Applying `role` resolves the name against the session user, so it
        // must be restored only after `session_authorization` is in place.
        .union(VarFlags::RESTORE_LAST),
)
.with_check(check_role);

// ---------------------------------------------------------------------------
// Resource usage.

pub static SHARED_BUFFERS: VarDefinition = VarDefinition::new_int(
    "shared_buffers",
    16384,
    16,
    i32::MAX as i64,
    VarUnit::Blocks,
    VarContext::ServerStart,
    "Sets the number of shared memory buffers used by the server.",
)
.with_group(VarGroup::ResourceUsage);

pub static WORK_MEM: VarDefinition = VarDefinition::new_int(
    "work_mem",
    4096,
    64,
    2147483647,
    VarUnit::Kilobytes,
    VarContext::User,
    "Sets the maximum memory to be used for query workspaces.",
)
.with_group(VarGroup::ResourceUsage);

pub static MAINTENANCE_WORK_MEM: VarDefinition = VarDefinition::new_int(
    "maintenance_work_mem",
    65536,
    1024,
    2147483647,
    VarUnit::Kilobytes,
    VarContext::User,
    "Sets the maximum memory to be used for maintenance operations.",
)
.with_group(VarGroup::ResourceUsage);

pub static MAX_WORKER_PROCESSES: VarDefinition = VarDefinition::new_int(
    "max_worker_processes",
    8,
    0,
    262143,
    VarUnit::None,
    VarContext::ServerStart,
    "Maximum number of concurrent worker processes.",
)
.with_group(VarGroup::ResourceUsage);

pub static TEMP_FILE_LIMIT: VarDefinition = VarDefinition::new_int(
    "temp_file_limit",
    -1,
    -1,
    2147483647,
    VarUnit::Kilobytes,
    VarContext::Superuser,
    "Limits the total size of all temporary files used by each process.",
)
.with_group(VarGroup::ResourceUsage);

pub static AUTOVACUUM: VarDefinition = VarDefinition::new_bool(
    "autovacuum",
    true,
    VarContext::Reload,
    "Starts the autovacuum subprocess.",
)
.with_group(VarGroup::ResourceUsage);

pub static CHECKPOINT_TIMEOUT: VarDefinition = VarDefinition::new_int(
    "checkpoint_timeout",
    300,
    30,
    86400,
    VarUnit::Seconds,
    VarContext::Reload,
    "Sets the maximum time between automatic checkpoints.",
)
.with_group(VarGroup::ResourceUsage);

// ---------------------------------------------------------------------------
// Query tuning.

pub static RANDOM_PAGE_COST: VarDefinition = VarDefinition::new_real(
    "random_page_cost",
    4.0,
    0.0,
    f64::MAX,
    VarUnit::None,
    VarContext::User,
    "Sets the planner's estimate of the cost of a nonsequentially fetched disk page.",
)
.with_group(VarGroup::QueryTuning);

pub static SEQ_PAGE_COST: VarDefinition = VarDefinition::new_real(
    "seq_page_cost",
    1.0,
    0.0,
    f64::MAX,
    VarUnit::None,
    VarContext::User,
    "Sets the planner's estimate of the cost of a sequentially fetched disk page.",
)
.with_group(VarGroup::QueryTuning);

pub static CURSOR_TUPLE_FRACTION: VarDefinition = VarDefinition::new_real(
    "cursor_tuple_fraction",
    0.1,
    0.0,
    1.0,
    VarUnit::None,
    VarContext::User,
    "Sets the planner's estimate of the fraction of a cursor's rows that will be retrieved.",
)
.with_group(VarGroup::QueryTuning);

pub static VACUUM_COST_DELAY: VarDefinition = VarDefinition::new_real(
    "vacuum_cost_delay",
    0.0,
    0.0,
    100.0,
    VarUnit::Milliseconds,
    VarContext::User,
    "Vacuum cost delay between cleanup rounds.",
)
.with_group(VarGroup::QueryTuning);

// ---------------------------------------------------------------------------
// Reporting and logging.

pub static LOG_MIN_MESSAGES: VarDefinition = VarDefinition::new_enum(
    "log_min_messages",
    SERVER_MESSAGE_LEVELS,
    7,
    VarContext::Superuser,
    "Sets the message levels that are logged.",
)
.with_group(VarGroup::Logging);

pub static LOG_STATEMENT: VarDefinition = VarDefinition::new_enum(
    "log_statement",
    LOG_STATEMENT_CLASSES,
    0,
    VarContext::Superuser,
    "Sets the type of statements logged.",
)
.with_group(VarGroup::Logging);

pub static LOG_CONNECTIONS: VarDefinition = VarDefinition::new_bool(
    "log_connections",
    false,
    VarContext::SuperuserStartup,
    "Logs each successful connection.",
)
.with_group(VarGroup::Logging);

pub static APPLICATION_NAME: VarDefinition = VarDefinition::new_string(
    "application_name",
    "",
    VarContext::User,
    "Sets the application name to be reported in statistics and logs.",
)
.with_group(VarGroup::Logging)
.with_flags(VarFlags::REPORT)
.with_check(check_application_name);

// ---------------------------------------------------------------------------
// Client connection defaults.

pub static CLIENT_MIN_MESSAGES: VarDefinition = VarDefinition::new_enum(
    "client_min_messages",
    CLIENT_MESSAGE_LEVELS,
    6,
    VarContext::User,
    "Sets the message levels that are sent to the client.",
)
.with_group(VarGroup::ClientDefaults);

pub static SEARCH_PATH: VarDefinition = VarDefinition::new_string(
    "search_path",
    "\"$user\", public",
    VarContext::User,
    "Sets the schema search order for names that are not schema-qualified.",
)
.with_group(VarGroup::ClientDefaults)
.with_flags(VarFlags::LIST_INPUT);

pub static DATE_STYLE: VarDefinition = VarDefinition::new_string(
    // DateStyle has nonstandard capitalization for historical reasons.
    "DateStyle",
    "ISO, MDY",
    VarContext::User,
    "Sets the display format for date and time values.",
)
.with_group(VarGroup::ClientDefaults)
.with_flags(VarFlags::REPORT.union(VarFlags::LIST_INPUT))
.with_check(check_date_style);

pub static INTERVAL_STYLE: VarDefinition = VarDefinition::new_enum(
    "IntervalStyle",
    INTERVAL_STYLES,
    0,
    VarContext::User,
    "Sets the display format for interval values.",
)
.with_group(VarGroup::ClientDefaults)
.with_flags(VarFlags::REPORT);

pub static TIMEZONE: VarDefinition = VarDefinition::new_string(
    // TimeZone has nonstandard capitalization for historical reasons.
    "TimeZone",
    "UTC",
    VarContext::User,
    "Sets the time zone for displaying and interpreting time stamps.",
)
.with_group(VarGroup::ClientDefaults)
.with_flags(VarFlags::REPORT)
.with_check(check_timezone);

pub static CLIENT_ENCODING: VarDefinition = VarDefinition::new_string(
    "client_encoding",
    "UTF8",
    VarContext::User,
    "Sets the client's character set encoding.",
)
.with_group(VarGroup::ClientDefaults)
.with_flags(VarFlags::REPORT)
.with_check(check_client_encoding);

pub static BYTEA_OUTPUT: VarDefinition = VarDefinition::new_enum(
    "bytea_output",
    BYTEA_OUTPUT_FORMATS,
    0,
    VarContext::User,
    "Sets the output format for binary string values.",
)
.with_group(VarGroup::ClientDefaults);

pub static TRANSACTION_ISOLATION: VarDefinition = VarDefinition::new_enum(
    "transaction_isolation",
    ISOLATION_LEVELS,
    1,
    VarContext::User,
    "Sets the current transaction's isolation level.",
)
.with_group(VarGroup::ClientDefaults)
.with_flags(VarFlags::NO_RESET_ALL);

pub static EXIT_ON_ERROR: VarDefinition = VarDefinition::new_bool(
    "exit_on_error",
    false,
    VarContext::User,
    "Terminates the session on any error.",
)
.with_group(VarGroup::ClientDefaults);

pub static EXTRA_FLOAT_DIGITS: VarDefinition = VarDefinition::new_int(
    "extra_float_digits",
    1,
    -15,
    3,
    VarUnit::None,
    VarContext::User,
    "Adjusts the number of digits displayed for floating-point values.",
)
.with_group(VarGroup::ClientDefaults);

pub static STATEMENT_TIMEOUT: VarDefinition = VarDefinition::new_int(
    "statement_timeout",
    0,
    0,
    2147483647,
    VarUnit::Milliseconds,
    VarContext::User,
    "Sets the maximum allowed duration of any statement.",
)
.with_group(VarGroup::ClientDefaults);

pub static IDLE_IN_TRANSACTION_SESSION_TIMEOUT: VarDefinition = VarDefinition::new_int(
    "idle_in_transaction_session_timeout",
    0,
    0,
    2147483647,
    VarUnit::Milliseconds,
    VarContext::User,
    "Sets the maximum allowed idle time between queries, when in a transaction.",
)
.with_group(VarGroup::ClientDefaults);

pub static SESSION_PRELOAD_LIBRARIES: VarDefinition = VarDefinition::new_string(
    "session_preload_libraries",
    "",
    VarContext::Superuser,
    "Lists shared libraries to preload into each backend.",
)
.with_group(VarGroup::ClientDefaults)
.with_flags(VarFlags::LIST_INPUT.union(VarFlags::SUPERUSER_ONLY));

pub static LOCAL_PRELOAD_LIBRARIES: VarDefinition = VarDefinition::new_string(
    "local_preload_libraries",
    "",
    VarContext::Startup,
    "Lists unprivileged shared libraries to preload into each backend.",
)
.with_group(VarGroup::ClientDefaults)
.with_flags(VarFlags::LIST_INPUT);

pub static DYNAMIC_LIBRARY_PATH: VarDefinition = VarDefinition::new_string(
    "dynamic_library_path",
    "$libdir",
    VarContext::Superuser,
    "Sets the path for dynamically loadable modules.",
)
.with_group(VarGroup::ClientDefaults);

// ---------------------------------------------------------------------------
// Lock management and compatibility.

pub static DEADLOCK_TIMEOUT: VarDefinition = VarDefinition::new_int(
    "deadlock_timeout",
    1000,
    1,
    2147483647,
    VarUnit::Milliseconds,
    VarContext::Superuser,
    "Sets the time to wait on a lock before checking for deadlock.",
)
.with_group(VarGroup::LockManagement);

pub static LOCK_TIMEOUT: VarDefinition = VarDefinition::new_int(
    "lock_timeout",
    0,
    0,
    2147483647,
    VarUnit::Milliseconds,
    VarContext::User,
    "Sets the maximum allowed duration of any wait for a lock.",
)
.with_group(VarGroup::LockManagement);

pub static STANDARD_CONFORMING_STRINGS: VarDefinition = VarDefinition::new_bool(
    "standard_conforming_strings",
    true,
    VarContext::User,
    "Causes '...' strings to treat backslashes literally.",
)
.with_group(VarGroup::Compatibility)
.with_flags(VarFlags::REPORT);

/// Deprecated spellings and the names they resolve to.
pub static ALIASES: &[VarAlias] = &[
    (UncasedStr::new("sort_mem"), UncasedStr::new("work_mem")),
    (
        UncasedStr::new("vacuum_mem"),
        UncasedStr::new("maintenance_work_mem"),
    ),
];

static BUILTINS: &[&VarDefinition] = &[
    &SERVER_VERSION,
    &SERVER_VERSION_NUM,
    &INTEGER_DATETIMES,
    &MAX_CONNECTIONS,
    &SUPERUSER_RESERVED_CONNECTIONS,
    &MAX_PREPARED_TRANSACTIONS,
    &PORT,
    &LISTEN_ADDRESSES,
    &UNIX_SOCKET_PERMISSIONS,
    &SSL,
    &SESSION_AUTHORIZATION,
    &ROLE,
    &SHARED_BUFFERS,
    &WORK_MEM,
    &MAINTENANCE_WORK_MEM,
    &MAX_WORKER_PROCESSES,
    &TEMP_FILE_LIMIT,
    &AUTOVACUUM,
    &CHECKPOINT_TIMEOUT,
    &RANDOM_PAGE_COST,
    &SEQ_PAGE_COST,
    &CURSOR_TUPLE_FRACTION,
    &VACUUM_COST_DELAY,
    &LOG_MIN_MESSAGES,
    &LOG_STATEMENT,
    &LOG_CONNECTIONS,
    &APPLICATION_NAME,
    &CLIENT_MIN_MESSAGES,
    &SEARCH_PATH,
    &DATE_STYLE,
    &INTERVAL_STYLE,
    &TIMEZONE,
    &CLIENT_ENCODING,
    &BYTEA_OUTPUT,
    &TRANSACTION_ISOLATION,
    &EXIT_ON_ERROR,
    &EXTRA_FLOAT_DIGITS,
    &STATEMENT_TIMEOUT,
    &IDLE_IN_TRANSACTION_SESSION_TIMEOUT,
    &SESSION_PRELOAD_LIBRARIES,
    &LOCAL_PRELOAD_LIBRARIES,
    &DYNAMIC_LIBRARY_PATH,
    &DEADLOCK_TIMEOUT,
    &LOCK_TIMEOUT,
    &STANDARD_CONFORMING_STRINGS,
];

/// Returns every built-in variable definition.
pub fn builtins() -> Vec<VarDefinition> {
    BUILTINS.iter().map(|def| (*def).clone()).collect()
}

/// Builds the process's variable registry with every built-in installed at
/// its compiled-in default.
pub fn registry() -> VarRegistry {
    VarRegistry::build(&builtins(), ALIASES)
}

// ---------------------------------------------------------------------------
// Hooks.

/// Replaces characters that cannot appear in reported statistics with `?`.
fn check_application_name(
    value: &mut VarValue,
    _extra: &mut Option<VarExtra>,
    _source: VarSource,
) -> Result<(), CheckFailure> {
    if let VarValue::String(s) = value {
        if s.chars().any(|c| !(' '..='\u{7e}').contains(&c)) {
            let clean: String = s
                .chars()
                .map(|c| if (' '..='\u{7e}').contains(&c) { c } else { '?' })
                .collect();
            *value = VarValue::String(Arc::from(clean));
        }
    }
    Ok(())
}

/// Only UTF-8 is supported; common spellings are canonicalized.
fn check_client_encoding(
    value: &mut VarValue,
    _extra: &mut Option<VarExtra>,
    _source: VarSource,
) -> Result<(), CheckFailure> {
    let VarValue::String(s) = value else {
        return Ok(());
    };
    let wanted = UncasedStr::new(s.trim());
    if wanted == "utf8" || wanted == "utf-8" || wanted == "unicode" {
        if &**s != "UTF8" {
            *value = VarValue::String(Arc::from("UTF8"));
        }
        Ok(())
    } else {
        Err(CheckFailure::new()
            .with_detail(format!("conversion to encoding \"{}\" is not supported", s))
            .with_hint("The only supported client encoding is \"UTF8\"."))
    }
}

/// Accepts any combination of the supported date-style keywords and
/// canonicalizes to "ISO, MDY".
fn check_date_style(
    value: &mut VarValue,
    _extra: &mut Option<VarExtra>,
    _source: VarSource,
) -> Result<(), CheckFailure> {
    let VarValue::String(s) = value else {
        return Ok(());
    };
    for part in s.split(',') {
        let part = UncasedStr::new(part.trim());
        if part != "ISO" && part != "MDY" {
            return Err(CheckFailure::new()
                .with_detail(format!("Unrecognized key word: \"{}\".", part)));
        }
    }
    if &**s != "ISO, MDY" {
        *value = VarValue::String(Arc::from("ISO, MDY"));
    }
    Ok(())
}

/// Accepts UTC, GMT, or a fixed numeric offset like "UTC+2" or "-03:30".
/// The parsed offset, in seconds east of Greenwich, rides along as the
/// variable's extra payload.
fn check_timezone(
    value: &mut VarValue,
    extra: &mut Option<VarExtra>,
    _source: VarSource,
) -> Result<(), CheckFailure> {
    let VarValue::String(s) = value else {
        return Ok(());
    };
    let raw = s.trim();
    let unrecognized = || {
        CheckFailure::new()
            .with_detail(format!("time zone \"{}\" is not recognized", raw))
            .with_hint("Specify \"UTC\", \"GMT\", or a numeric offset such as \"UTC+2\".")
    };
    let named = UncasedStr::new(raw);
    if named == "utc" || named == "gmt" {
        let canonical = if named == "utc" { "UTC" } else { "GMT" };
        if &**s != canonical {
            *value = VarValue::String(Arc::from(canonical));
        }
        *extra = Some(VarExtra::new(0_i64));
        return Ok(());
    }
    // Strip an optional UTC/GMT prefix off a numeric offset.
    let rest = match raw.get(..3) {
        Some(prefix)
            if prefix.eq_ignore_ascii_case("utc") || prefix.eq_ignore_ascii_case("gmt") =>
        {
            &raw[3..]
        }
        _ => raw,
    };
    let mut chars = rest.chars();
    let sign = match chars.next() {
        Some('+') => 1_i64,
        Some('-') => -1_i64,
        _ => return Err(unrecognized()),
    };
    let body = chars.as_str();
    let (hours_str, minutes_str) = match body.split_once(':') {
        Some((h, m)) => (h, Some(m)),
        None => (body, None),
    };
    let hours: i64 = hours_str.parse().map_err(|_| unrecognized())?;
    let minutes: i64 = match minutes_str {
        Some(m) => m.parse().map_err(|_| unrecognized())?,
        None => 0,
    };
    if hours > 15 || minutes > 59 {
        return Err(unrecognized());
    }
    let offset = sign * (hours * 3600 + minutes * 60);
    let canonical = if minutes == 0 {
        format!("UTC{}{:02}", if sign >= 0 { '+' } else { '-' }, hours)
    } else {
        format!(
            "UTC{}{:02}:{:02}",
            if sign >= 0 { '+' } else { '-' },
            hours,
            minutes
        )
    };
    if &**s != canonical {
        *value = VarValue::String(Arc::from(canonical.as_str()));
    }
    *extra = Some(VarExtra::new(offset));
    Ok(())
}

fn is_role_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn check_session_authorization(
    value: &mut VarValue,
    _extra: &mut Option<VarExtra>,
    source: VarSource,
) -> Result<(), CheckFailure> {
    let VarValue::String(s) = value else {
        return Ok(());
    };
    // The compiled-in default is empty until the session user is known.
    if s.is_empty() && source == VarSource::Default {
        return Ok(());
    }
    if is_role_name(s) {
        Ok(())
    } else {
        Err(CheckFailure::new()
            .with_detail(format!("\"{}\" is not a valid role name", s)))
    }
}

fn check_role(
    value: &mut VarValue,
    _extra: &mut Option<VarExtra>,
    _source: VarSource,
) -> Result<(), CheckFailure> {
    let VarValue::String(s) = value else {
        return Ok(());
    };
    if &**s == "none" || is_role_name(s) {
        Ok(())
    } else {
        Err(CheckFailure::new()
            .with_detail(format!("\"{}\" is not a valid role name", s)))
    }
}

/// Renders socket permissions in the customary octal form.
fn show_unix_socket_permissions(value: &VarValue, _extra: Option<&VarExtra>) -> String {
    match value {
        VarValue::Int(v) => format!("{:04o}", v),
        other => other.format_plain(&mz_vars::ValueSpec::String),
    }
}
