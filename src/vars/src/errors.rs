// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::error::Error;
use std::fmt;

use itertools::Itertools;

/// Errors that can occur while resolving, validating, or assigning a
/// configuration variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarError {
    /// The named variable does not exist and cannot be created.
    UnknownParameter(String),
    /// The value cannot be parsed as the variable's declared type.
    InvalidParameterType {
        /// The variable's name.
        name: String,
        /// The name of the expected type.
        expected: &'static str,
    },
    /// The value parsed but was rejected, either by the variable's value
    /// domain or by its check hook.
    InvalidParameterValue {
        /// The variable's name.
        name: String,
        /// The rejected input, as given.
        value: String,
        /// Diagnostics supplied by the check hook, if any. When absent a
        /// generic message is synthesized.
        failure: Option<CheckFailure>,
    },
    /// A numeric value fell outside the variable's declared bounds.
    ValueOutOfRange {
        /// The variable's name.
        name: String,
        /// The out-of-range value, rendered in the variable's base unit.
        value: String,
        /// The lower bound.
        min: String,
        /// The upper bound.
        max: String,
    },
    /// A numeric value carried a unit suffix the variable does not accept.
    InvalidUnit {
        /// The variable's name.
        name: String,
        /// The rejected input, as given.
        value: String,
        /// The unit suffixes the variable accepts, largest first. Empty when
        /// the variable takes no units at all.
        valid: &'static [&'static str],
    },
    /// A multi-element list was supplied for a scalar variable.
    SingleValueExpected(String),
    /// The variable can never be changed from this process.
    ReadOnlyParameter(String),
    /// The variable can only change across a server restart.
    CannotChangeWithoutRestart(String),
    /// The variable can only change at server start or configuration reload.
    CannotChangeNow(String),
    /// The variable can only be set while the connection is starting up.
    CannotChangeAfterStart(String),
    /// The calling context lacks the privilege to set the variable.
    PermissionDenied(String),
    /// The variable cannot be set inside a security-restricted operation.
    SecurityRestricted(String),
    /// The variable's value is only visible to superusers.
    SuperuserRequiredToShow(String),
    /// An attempt was made to register a variable under a name that already
    /// names a fully defined variable.
    AlreadyDefined(String),
    /// A serialized state buffer was truncated or otherwise unreadable.
    MalformedState(String),
}

impl VarError {
    /// Returns the SQLSTATE-style error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            VarError::UnknownParameter(_) => "42704",
            VarError::InvalidParameterType { .. }
            | VarError::ValueOutOfRange { .. }
            | VarError::InvalidUnit { .. }
            | VarError::SingleValueExpected(_) => "22023",
            VarError::InvalidParameterValue { failure, .. } => failure
                .as_ref()
                .and_then(|f| f.code)
                .unwrap_or("22023"),
            VarError::ReadOnlyParameter(_)
            | VarError::CannotChangeWithoutRestart(_)
            | VarError::CannotChangeNow(_)
            | VarError::CannotChangeAfterStart(_) => "55P02",
            VarError::PermissionDenied(_)
            | VarError::SecurityRestricted(_)
            | VarError::SuperuserRequiredToShow(_) => "42501",
            VarError::AlreadyDefined(_) => "42710",
            VarError::MalformedState(_) => "XX000",
        }
    }

    /// Reports additional details about the error, if any are available.
    pub fn detail(&self) -> Option<String> {
        match self {
            VarError::InvalidParameterValue { failure, .. } => {
                failure.as_ref().and_then(|f| f.detail.clone())
            }
            VarError::InvalidUnit { valid, .. } if !valid.is_empty() => Some(format!(
                "Valid units for this parameter are {}.",
                valid.iter().map(|u| format!("\"{}\"", u)).join(", ")
            )),
            _ => None,
        }
    }

    /// Reports a hint for the user about how the error could be fixed.
    pub fn hint(&self) -> Option<String> {
        match self {
            VarError::InvalidParameterValue { failure, .. } => {
                failure.as_ref().and_then(|f| f.hint.clone())
            }
            VarError::SecurityRestricted(_) => {
                Some("Retry the operation outside of the restricted context.".into())
            }
            _ => None,
        }
    }
}

impl fmt::Display for VarError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VarError::UnknownParameter(name) => {
                write!(f, "unrecognized configuration parameter \"{}\"", name)
            }
            VarError::InvalidParameterType { name, expected } => {
                write!(f, "parameter \"{}\" requires a {} value", name, expected)
            }
            VarError::InvalidParameterValue {
                name,
                value,
                failure,
            } => match failure.as_ref().and_then(|c| c.message.as_deref()) {
                Some(message) => f.write_str(message),
                None => write!(
                    f,
                    "invalid value for parameter \"{}\": \"{}\"",
                    name, value
                ),
            },
            VarError::ValueOutOfRange {
                name,
                value,
                min,
                max,
            } => write!(
                f,
                "{} is outside the valid range for parameter \"{}\" ({} .. {})",
                value, name, min, max
            ),
            VarError::InvalidUnit { name, value, .. } => write!(
                f,
                "invalid value for parameter \"{}\": \"{}\"",
                name, value
            ),
            VarError::SingleValueExpected(name) => {
                write!(f, "parameter \"{}\" takes only one value", name)
            }
            VarError::ReadOnlyParameter(name) => {
                write!(f, "parameter \"{}\" cannot be changed", name)
            }
            VarError::CannotChangeWithoutRestart(name) => write!(
                f,
                "parameter \"{}\" cannot be changed without restarting the server",
                name
            ),
            VarError::CannotChangeNow(name) => {
                write!(f, "parameter \"{}\" cannot be changed now", name)
            }
            VarError::CannotChangeAfterStart(name) => write!(
                f,
                "parameter \"{}\" cannot be set after connection start",
                name
            ),
            VarError::PermissionDenied(name) => {
                write!(f, "permission denied to set parameter \"{}\"", name)
            }
            VarError::SecurityRestricted(name) => write!(
                f,
                "cannot set parameter \"{}\" within security-restricted operation",
                name
            ),
            VarError::SuperuserRequiredToShow(name) => {
                write!(f, "must be superuser to examine \"{}\"", name)
            }
            VarError::AlreadyDefined(name) => {
                write!(f, "attempt to redefine parameter \"{}\"", name)
            }
            VarError::MalformedState(reason) => {
                write!(f, "malformed serialized variable state: {}", reason)
            }
        }
    }
}

impl Error for VarError {}

/// Diagnostics produced by a check hook when it rejects a proposed value.
///
/// Every field is optional; the setter pipeline synthesizes a generic
/// message naming the variable and the rejected input for any field the
/// hook leaves unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckFailure {
    /// An overriding SQLSTATE-style error code.
    pub code: Option<&'static str>,
    /// An overriding primary message.
    pub message: Option<String>,
    /// Additional details about the rejection.
    pub detail: Option<String>,
    /// A hint about how to fix the value.
    pub hint: Option<String>,
}

impl CheckFailure {
    /// Creates a rejection with no diagnostics beyond the synthesized
    /// generic message.
    pub fn new() -> CheckFailure {
        CheckFailure::default()
    }

    /// Sets the overriding primary message.
    pub fn with_message(mut self, message: impl Into<String>) -> CheckFailure {
        self.message = Some(message.into());
        self
    }

    /// Sets the detail message.
    pub fn with_detail(mut self, detail: impl Into<String>) -> CheckFailure {
        self.detail = Some(detail.into());
        self
    }

    /// Sets the hint message.
    pub fn with_hint(mut self, hint: impl Into<String>) -> CheckFailure {
        self.hint = Some(hint.into());
        self
    }

    /// Sets the overriding error code.
    pub fn with_code(mut self, code: &'static str) -> CheckFailure {
        self.code = Some(code);
        self
    }
}
