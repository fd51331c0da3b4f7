// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Typed values for configuration variables.
//!
//! Every variable is one of a small closed set of types: boolean, integer,
//! unsigned integer, real, string, or enumeration. Parsing accepts the
//! PostgreSQL-compatible literal forms for each type, including unit
//! suffixes on numeric variables that declare a base unit.

use std::borrow::Cow;
use std::num::IntErrorKind;
use std::sync::Arc;

use itertools::Itertools;
use uncased::UncasedStr;

use crate::errors::{CheckFailure, VarError};

/// The current or proposed value of a configuration variable.
#[derive(Clone, Debug, PartialEq)]
pub enum VarValue {
    /// A boolean value.
    Bool(bool),
    /// A signed integer value, stored in the variable's base unit.
    Int(i64),
    /// An unsigned integer value, stored in the variable's base unit.
    UInt(u64),
    /// A floating-point value.
    Real(f64),
    /// A string value. Shared so that the live value, the reset value, and
    /// any number of rollback-stack entries can alias one buffer.
    String(Arc<str>),
    /// An enumeration value, identified by its numeric representation.
    Enum(i32),
}

impl VarValue {
    /// Formats the value without unit conversion, suitable for reparsing.
    pub fn format_plain(&self, spec: &ValueSpec) -> String {
        match self {
            VarValue::Bool(true) => "on".into(),
            VarValue::Bool(false) => "off".into(),
            VarValue::Int(v) => v.to_string(),
            VarValue::UInt(v) => v.to_string(),
            VarValue::Real(v) => v.to_string(),
            VarValue::String(s) => s.to_string(),
            VarValue::Enum(v) => match spec {
                ValueSpec::Enum { options } => options
                    .iter()
                    .find(|(_, val)| val == v)
                    .map(|(name, _)| (*name).into())
                    .unwrap_or_else(|| v.to_string()),
                _ => v.to_string(),
            },
        }
    }

    /// Formats the value for display, converting unit-typed integers to the
    /// largest unit that represents them exactly.
    pub fn format_display(&self, spec: &ValueSpec) -> String {
        match (self, spec) {
            (VarValue::Int(v), ValueSpec::Int { unit, .. }) => format_with_unit(*v, *unit),
            (VarValue::UInt(v), ValueSpec::UInt { unit, .. }) => {
                if *v <= i64::MAX as u64 {
                    format_with_unit(*v as i64, *unit)
                } else {
                    v.to_string()
                }
            }
            _ => self.format_plain(spec),
        }
    }
}

/// The value domain of a configuration variable.
#[derive(Clone, Debug)]
pub enum ValueSpec {
    /// A boolean variable.
    Bool,
    /// A signed integer variable with inclusive bounds and an optional base
    /// unit for suffixed input.
    Int {
        /// The smallest allowed value.
        min: i64,
        /// The largest allowed value.
        max: i64,
        /// The base unit, or [`VarUnit::None`] for a bare number.
        unit: VarUnit,
    },
    /// An unsigned integer variable.
    UInt {
        /// The smallest allowed value.
        min: u64,
        /// The largest allowed value.
        max: u64,
        /// The base unit, or [`VarUnit::None`] for a bare number.
        unit: VarUnit,
    },
    /// A floating-point variable.
    Real {
        /// The smallest allowed value.
        min: f64,
        /// The largest allowed value.
        max: f64,
        /// The base unit, or [`VarUnit::None`] for a bare number.
        unit: VarUnit,
    },
    /// A string variable.
    String,
    /// An enumeration variable. Multiple names may map to the same numeric
    /// value; the first name for a value is its canonical spelling and later
    /// ones are hidden aliases.
    Enum {
        /// The allowed names and their numeric representations.
        options: &'static [(&'static str, i32)],
    },
}

impl ValueSpec {
    /// Returns the name of this value domain's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            ValueSpec::Bool => "boolean",
            ValueSpec::Int { .. } => "integer",
            ValueSpec::UInt { .. } => "unsigned integer",
            ValueSpec::Real { .. } => "numeric",
            ValueSpec::String => "string",
            ValueSpec::Enum { .. } => "enum",
        }
    }

    /// Parses `input` into a value of this domain, applying unit conversion
    /// and bound checks.
    pub(crate) fn parse(&self, name: &str, input: &str) -> Result<VarValue, VarError> {
        match self {
            ValueSpec::Bool => parse_bool(name, input).map(VarValue::Bool),
            ValueSpec::Int { min, max, unit } => {
                parse_int(name, input, *unit, *min, *max).map(VarValue::Int)
            }
            ValueSpec::UInt { min, max, unit } => {
                parse_uint(name, input, *unit, *min, *max).map(VarValue::UInt)
            }
            ValueSpec::Real { min, max, unit } => {
                parse_real(name, input, *unit, *min, *max).map(VarValue::Real)
            }
            ValueSpec::String => Ok(VarValue::String(Arc::from(input))),
            ValueSpec::Enum { options } => parse_enum(name, options, input).map(VarValue::Enum),
        }
    }
}

/// The base unit of a numeric variable, used to interpret suffixed input
/// like `4MB` or `150ms`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarUnit {
    /// The variable is a bare number; unit suffixes are rejected.
    None,
    /// The value counts bytes.
    Bytes,
    /// The value counts kibibytes.
    Kilobytes,
    /// The value counts 8 KiB storage pages.
    Blocks,
    /// The value counts milliseconds.
    Milliseconds,
    /// The value counts seconds.
    Seconds,
    /// The value counts minutes.
    Minutes,
}

/// Memory suffixes with their size in bytes, largest first.
const MEMORY_SUFFIXES: &[(&str, i64)] = &[
    ("TB", 1 << 40),
    ("GB", 1 << 30),
    ("MB", 1 << 20),
    ("kB", 1 << 10),
    ("B", 1),
];

/// Time suffixes with their length in microseconds, largest first.
const TIME_SUFFIXES: &[(&str, i64)] = &[
    ("d", 86_400_000_000),
    ("h", 3_600_000_000),
    ("min", 60_000_000),
    ("s", 1_000_000),
    ("ms", 1_000),
    ("us", 1),
];

const MEMORY_SUFFIX_NAMES: &[&str] = &["B", "kB", "MB", "GB", "TB"];
const TIME_SUFFIX_NAMES: &[&str] = &["us", "ms", "s", "min", "h", "d"];

impl VarUnit {
    /// Returns the number of atoms (bytes or microseconds) in one base unit.
    fn atoms(&self) -> Option<i64> {
        match self {
            VarUnit::None => None,
            VarUnit::Bytes => Some(1),
            VarUnit::Kilobytes => Some(1 << 10),
            VarUnit::Blocks => Some(8 << 10),
            VarUnit::Milliseconds => Some(1_000),
            VarUnit::Seconds => Some(1_000_000),
            VarUnit::Minutes => Some(60_000_000),
        }
    }

    /// Returns the suffix conversion table for this unit's family.
    fn table(&self) -> &'static [(&'static str, i64)] {
        match self {
            VarUnit::None => &[],
            VarUnit::Bytes | VarUnit::Kilobytes | VarUnit::Blocks => MEMORY_SUFFIXES,
            VarUnit::Milliseconds | VarUnit::Seconds | VarUnit::Minutes => TIME_SUFFIXES,
        }
    }

    /// Returns the suffixes this unit accepts, smallest first, for use in
    /// error details.
    pub fn suffixes(&self) -> &'static [&'static str] {
        match self {
            VarUnit::None => &[],
            VarUnit::Bytes | VarUnit::Kilobytes | VarUnit::Blocks => MEMORY_SUFFIX_NAMES,
            VarUnit::Milliseconds | VarUnit::Seconds | VarUnit::Minutes => TIME_SUFFIX_NAMES,
        }
    }
}

/// Formats a base-unit quantity using the largest suffix that represents it
/// exactly. Zero and negative values (sentinels like `-1`) print bare.
fn format_with_unit(value: i64, unit: VarUnit) -> String {
    let Some(base) = unit.atoms() else {
        return value.to_string();
    };
    if value <= 0 {
        return value.to_string();
    }
    let atoms = i128::from(value) * i128::from(base);
    for (suffix, factor) in unit.table() {
        if atoms % i128::from(*factor) == 0 {
            return format!("{}{}", atoms / i128::from(*factor), suffix);
        }
    }
    value.to_string()
}

/// Converts `value` interpreted in `suffix` units into `unit` base units,
/// rounding to the nearest whole number.
fn convert_suffixed(
    name: &str,
    raw: &str,
    value: f64,
    suffix: &str,
    unit: VarUnit,
) -> Result<f64, VarError> {
    let (Some(base), Some((_, factor))) = (
        unit.atoms(),
        unit.table().iter().find(|(s, _)| *s == suffix),
    ) else {
        return Err(VarError::InvalidUnit {
            name: name.to_owned(),
            value: raw.to_owned(),
            valid: unit.suffixes(),
        });
    };
    Ok(value * (*factor as f64) / (base as f64))
}

fn parse_bool(name: &str, input: &str) -> Result<bool, VarError> {
    let s = input.trim().to_ascii_lowercase();
    match s.as_str() {
        "1" => return Ok(true),
        "0" => return Ok(false),
        "" => {
            return Err(VarError::InvalidParameterType {
                name: name.to_owned(),
                expected: "boolean",
            })
        }
        _ => {}
    }
    // Any unique prefix of the keyword spellings is accepted; "o" is
    // ambiguous between "on" and "off".
    const KEYWORDS: &[(&str, bool)] = &[
        ("true", true),
        ("false", false),
        ("yes", true),
        ("no", false),
        ("on", true),
        ("off", false),
    ];
    let mut matched = None;
    for (keyword, value) in KEYWORDS {
        if keyword.starts_with(&s) {
            match matched {
                None => matched = Some(*value),
                Some(prev) if prev == *value => {}
                Some(_) => {
                    return Err(VarError::InvalidParameterType {
                        name: name.to_owned(),
                        expected: "boolean",
                    })
                }
            }
        }
    }
    matched.ok_or_else(|| VarError::InvalidParameterType {
        name: name.to_owned(),
        expected: "boolean",
    })
}

/// Splits an integer literal into (negative, digits, radix, rest).
fn split_int_literal(input: &str) -> (bool, &str, u32, &str) {
    let mut s = input.trim();
    let mut negative = false;
    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        let end = hex
            .find(|c: char| !c.is_ascii_hexdigit())
            .unwrap_or(hex.len());
        return (negative, &hex[..end], 16, &hex[end..]);
    }
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let digits = &s[..end];
    let radix = if digits.len() > 1 && digits.starts_with('0') {
        8
    } else {
        10
    };
    (negative, digits, radix, &s[end..])
}

fn parse_int(name: &str, input: &str, unit: VarUnit, min: i64, max: i64) -> Result<i64, VarError> {
    let type_err = || VarError::InvalidParameterType {
        name: name.to_owned(),
        expected: "integer",
    };
    let range_err = |value: String| VarError::ValueOutOfRange {
        name: name.to_owned(),
        value,
        min: min.to_string(),
        max: max.to_string(),
    };
    let (negative, digits, radix, rest) = split_int_literal(input);
    if digits.is_empty() {
        return Err(type_err());
    }
    let magnitude = i64::from_str_radix(digits, radix).map_err(|e| match e.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => range_err(input.trim().into()),
        _ => type_err(),
    })?;
    let mut value = if negative { -magnitude } else { magnitude };
    let suffix = rest.trim();
    if !suffix.is_empty() {
        if !suffix.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(type_err());
        }
        let converted = convert_suffixed(name, input.trim(), value as f64, suffix, unit)?;
        let rounded = converted.round();
        if !rounded.is_finite() || rounded < i64::MIN as f64 || rounded > i64::MAX as f64 {
            return Err(range_err(input.trim().into()));
        }
        value = rounded as i64;
    }
    if value < min || value > max {
        return Err(range_err(value.to_string()));
    }
    Ok(value)
}

fn parse_uint(name: &str, input: &str, unit: VarUnit, min: u64, max: u64) -> Result<u64, VarError> {
    let type_err = || VarError::InvalidParameterType {
        name: name.to_owned(),
        expected: "unsigned integer",
    };
    let range_err = |value: String| VarError::ValueOutOfRange {
        name: name.to_owned(),
        value,
        min: min.to_string(),
        max: max.to_string(),
    };
    let (negative, digits, radix, rest) = split_int_literal(input);
    if digits.is_empty() || negative {
        return Err(type_err());
    }
    let mut value = u64::from_str_radix(digits, radix).map_err(|e| match e.kind() {
        IntErrorKind::PosOverflow => range_err(input.trim().into()),
        _ => type_err(),
    })?;
    let suffix = rest.trim();
    if !suffix.is_empty() {
        if !suffix.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(type_err());
        }
        let converted = convert_suffixed(name, input.trim(), value as f64, suffix, unit)?;
        let rounded = converted.round();
        if !rounded.is_finite() || rounded < 0.0 || rounded > u64::MAX as f64 {
            return Err(range_err(input.trim().into()));
        }
        value = rounded as u64;
    }
    if value < min || value > max {
        return Err(range_err(value.to_string()));
    }
    Ok(value)
}

fn parse_real(name: &str, input: &str, unit: VarUnit, min: f64, max: f64) -> Result<f64, VarError> {
    let type_err = || VarError::InvalidParameterType {
        name: name.to_owned(),
        expected: "numeric",
    };
    let trimmed = input.trim();
    let value = match trimmed.parse::<f64>() {
        Ok(v) => v,
        Err(_) => {
            let numeric = trimmed.trim_end_matches(|c: char| c.is_ascii_alphabetic());
            let suffix = &trimmed[numeric.len()..];
            if suffix.is_empty() {
                return Err(type_err());
            }
            let v = numeric.trim_end().parse::<f64>().map_err(|_| type_err())?;
            convert_suffixed(name, trimmed, v, suffix, unit)?
        }
    };
    if !value.is_finite() {
        return Err(type_err());
    }
    if value < min || value > max {
        return Err(VarError::ValueOutOfRange {
            name: name.to_owned(),
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        });
    }
    Ok(value)
}

fn parse_enum(
    name: &str,
    options: &'static [(&'static str, i32)],
    input: &str,
) -> Result<i32, VarError> {
    let wanted = UncasedStr::new(input.trim());
    if let Some((_, value)) = options.iter().find(|(n, _)| UncasedStr::new(n) == wanted) {
        return Ok(*value);
    }
    let available = options
        .iter()
        .unique_by(|(_, value)| *value)
        .map(|(n, _)| *n)
        .join(", ");
    Err(VarError::InvalidParameterValue {
        name: name.to_owned(),
        value: input.trim().to_owned(),
        failure: Some(CheckFailure::new().with_hint(format!("Available values: {}.", available))),
    })
}

/// A value as supplied by the SQL layer: either a single flat string or the
/// elements of a `SET x = a, b, c` list.
#[derive(Clone, Copy, Debug)]
pub enum VarInput<'a> {
    /// A single string value.
    Flat(&'a str),
    /// The elements of a SQL `SET` list.
    SqlSet(&'a [String]),
}

impl<'a> VarInput<'a> {
    /// Flattens the input into one string. List-valued variables join
    /// multiple elements with `", "`; scalar variables reject them.
    pub(crate) fn flatten(&self, name: &str, list_input: bool) -> Result<Cow<'a, str>, VarError> {
        match self {
            VarInput::Flat(s) => Ok(Cow::Borrowed(s)),
            VarInput::SqlSet(values) if values.len() == 1 => Ok(Cow::Borrowed(&values[0])),
            VarInput::SqlSet(values) if list_input => Ok(Cow::Owned(values.iter().join(", "))),
            VarInput::SqlSet(_) => Err(VarError::SingleValueExpected(name.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KB_SPEC: ValueSpec = ValueSpec::Int {
        min: 64,
        max: i64::MAX,
        unit: VarUnit::Kilobytes,
    };

    #[test]
    fn bool_prefixes() {
        for ok in ["true", "t", "tr", "yes", "y", "on", "1", "TRUE", " On "] {
            assert_eq!(parse_bool("x", ok).unwrap(), true, "{}", ok);
        }
        for ok in ["false", "f", "no", "n", "off", "of", "0"] {
            assert_eq!(parse_bool("x", ok).unwrap(), false, "{}", ok);
        }
        for bad in ["o", "maybe", "", "2", "onn"] {
            assert!(parse_bool("x", bad).is_err(), "{}", bad);
        }
    }

    #[test]
    fn int_radixes() {
        assert_eq!(parse_int("x", "42", VarUnit::None, 0, 100).unwrap(), 42);
        assert_eq!(parse_int("x", "0x1A", VarUnit::None, 0, 100).unwrap(), 26);
        assert_eq!(parse_int("x", "010", VarUnit::None, 0, 100).unwrap(), 8);
        assert_eq!(parse_int("x", "-5", VarUnit::None, -10, 100).unwrap(), -5);
        assert!(parse_int("x", "4.5", VarUnit::None, 0, 100).is_err());
    }

    #[test]
    fn int_units() {
        assert_eq!(
            parse_int("work_mem", "4MB", VarUnit::Kilobytes, 64, i64::MAX).unwrap(),
            4096
        );
        assert_eq!(
            parse_int("work_mem", "4 MB", VarUnit::Kilobytes, 64, i64::MAX).unwrap(),
            4096
        );
        assert_eq!(
            parse_int("shared_buffers", "128MB", VarUnit::Blocks, 16, i64::MAX).unwrap(),
            16384
        );
        assert_eq!(
            parse_int("statement_timeout", "5s", VarUnit::Milliseconds, 0, i64::MAX).unwrap(),
            5000
        );
        // Converting downward rounds to nearest.
        assert_eq!(
            parse_int("work_mem", "1536B", VarUnit::Kilobytes, 0, i64::MAX).unwrap(),
            2
        );
    }

    #[test]
    fn int_unit_rejections() {
        let err = parse_int("work_mem", "4ms", VarUnit::Kilobytes, 64, i64::MAX).unwrap_err();
        assert!(matches!(err, VarError::InvalidUnit { .. }));
        assert_eq!(
            err.detail().unwrap(),
            "Valid units for this parameter are \"B\", \"kB\", \"MB\", \"GB\", \"TB\"."
        );
        let err = parse_int("max_connections", "10kB", VarUnit::None, 1, 100).unwrap_err();
        assert!(matches!(err, VarError::InvalidUnit { .. }));
        assert_eq!(err.detail(), None);
    }

    #[test]
    fn int_bounds() {
        let err = parse_int("work_mem", "31", VarUnit::Kilobytes, 64, 2147483647).unwrap_err();
        assert_eq!(
            err.to_string(),
            "31 is outside the valid range for parameter \"work_mem\" (64 .. 2147483647)"
        );
    }

    #[test]
    fn uint_rejects_sign() {
        assert!(parse_uint("x", "-1", VarUnit::None, 0, 10).is_err());
        assert_eq!(parse_uint("x", "7", VarUnit::None, 0, 10).unwrap(), 7);
    }

    #[test]
    fn real_units_and_bounds() {
        assert_eq!(
            parse_real("vacuum_cost_delay", "20", VarUnit::Milliseconds, 0.0, 100.0).unwrap(),
            20.0
        );
        assert_eq!(
            parse_real("vacuum_cost_delay", "1s", VarUnit::Milliseconds, 0.0, 10000.0).unwrap(),
            1000.0
        );
        assert!(parse_real("cursor_tuple_fraction", "1.5", VarUnit::None, 0.0, 1.0).is_err());
        assert!(parse_real("x", "nan", VarUnit::None, 0.0, 1.0).is_err());
    }

    #[test]
    fn enum_matching() {
        const OPTIONS: &[(&str, i32)] = &[("hex", 0), ("escape", 1)];
        assert_eq!(parse_enum("bytea_output", OPTIONS, "HEX").unwrap(), 0);
        assert_eq!(parse_enum("bytea_output", OPTIONS, " escape ").unwrap(), 1);
        let err = parse_enum("bytea_output", OPTIONS, "base64").unwrap_err();
        assert_eq!(err.hint().unwrap(), "Available values: hex, escape.");
    }

    #[test]
    fn enum_hint_hides_aliases() {
        const OPTIONS: &[(&str, i32)] = &[("debug2", 3), ("notice", 6), ("debug", 3)];
        let err = parse_enum("client_min_messages", OPTIONS, "nope").unwrap_err();
        assert_eq!(err.hint().unwrap(), "Available values: debug2, notice.");
    }

    #[test]
    fn display_formatting() {
        assert_eq!(
            VarValue::Int(4096).format_display(&KB_SPEC),
            "4MB"
        );
        assert_eq!(VarValue::Int(100).format_display(&KB_SPEC), "100kB");
        assert_eq!(VarValue::Int(0).format_display(&KB_SPEC), "0");
        assert_eq!(VarValue::Int(-1).format_display(&KB_SPEC), "-1");
        let blocks = ValueSpec::Int {
            min: 16,
            max: i64::MAX,
            unit: VarUnit::Blocks,
        };
        assert_eq!(VarValue::Int(16384).format_display(&blocks), "128MB");
        assert_eq!(VarValue::Int(1).format_display(&blocks), "8kB");
        let ms = ValueSpec::Int {
            min: 0,
            max: i64::MAX,
            unit: VarUnit::Milliseconds,
        };
        assert_eq!(VarValue::Int(5000).format_display(&ms), "5s");
        assert_eq!(VarValue::Int(90_000).format_display(&ms), "90s");
        assert_eq!(VarValue::Int(120_000).format_display(&ms), "2min");
    }

    #[test]
    fn plain_formatting_reparses() {
        let v = KB_SPEC.parse("work_mem", "4MB").unwrap();
        let plain = v.format_plain(&KB_SPEC);
        assert_eq!(plain, "4096");
        assert_eq!(KB_SPEC.parse("work_mem", &plain).unwrap(), v);
    }

    #[test]
    fn list_input_flattening() {
        let values = vec!["a".to_owned(), "b".to_owned()];
        let input = VarInput::SqlSet(&values);
        assert_eq!(input.flatten("search_path", true).unwrap(), "a, b");
        assert!(matches!(
            input.flatten("application_name", false),
            Err(VarError::SingleValueExpected(_))
        ));
        let one = vec!["x".to_owned()];
        assert_eq!(
            VarInput::SqlSet(&one).flatten("application_name", false).unwrap(),
            "x"
        );
    }
}
