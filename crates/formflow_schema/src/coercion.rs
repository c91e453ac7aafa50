//! Raw submitted values and their coercion to a field's declared type.
//!
//! Coercion is pure: it never touches storage and never mutates the input
//! beyond trimming. Every successfully coerced value renders back through
//! [`TypedValue::display`] to a string that coerces to the same value again.

use chrono::NaiveDate;
use formflow_db::{FieldType, FormField};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Wire format for `date` fields.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s.]+$").expect("valid email regex")
});

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?$").expect("valid number regex")
});

/// Largest number of fractional digits a `number` value keeps.
const MAX_SCALE: u32 = 28;

/// An uploaded file as handed over by the transport layer.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHandle {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl FileHandle {
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            data: data.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("size", &self.data.len())
            .finish()
    }
}

/// One submitted value before typing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    Text(String),
    File(FileHandle),
}

impl RawValue {
    /// Blank strings and nameless empty uploads count as "not submitted".
    pub fn is_empty(&self) -> bool {
        match self {
            RawValue::Text(s) => s.trim().is_empty(),
            RawValue::File(file) => file.filename.trim().is_empty() && file.data.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawValue::Text(s) => Some(s),
            RawValue::File(_) => None,
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

impl From<FileHandle> for RawValue {
    fn from(file: FileHandle) -> Self {
        RawValue::File(file)
    }
}

/// A scalar value typed according to its field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TypedValue {
    /// `text`, `textarea` and `email`
    Text(String),
    Number(Decimal),
    Date(NaiveDate),
    Boolean(bool),
    /// A `select` option
    Choice(String),
}

/// Outcome of coercing one raw value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Coerced {
    Value(TypedValue),
    File(FileHandle),
}

/// The raw value does not fit the field's declared type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected}: {reason}")]
pub struct CoercionError {
    pub expected: FieldType,
    pub reason: String,
}

impl CoercionError {
    fn new(expected: FieldType, reason: impl Into<String>) -> Self {
        Self {
            expected,
            reason: reason.into(),
        }
    }
}

impl TypedValue {
    /// Parse a literal under `field_type` without checking select membership.
    ///
    /// Used for condition comparison literals as well as for stored values.
    pub fn parse(field_type: FieldType, raw: &str) -> Result<Self, CoercionError> {
        let trimmed = raw.trim();
        match field_type {
            FieldType::Text | FieldType::Email => {
                if field_type == FieldType::Email && !EMAIL_RE.is_match(trimmed) {
                    return Err(CoercionError::new(field_type, format!("'{}' is not an email address", trimmed)));
                }
                Ok(TypedValue::Text(trimmed.to_string()))
            }
            // Multi-line text keeps its inner layout
            FieldType::Textarea => Ok(TypedValue::Text(raw.to_string())),
            FieldType::Number => parse_decimal(trimmed)
                .map(TypedValue::Number)
                .map_err(|reason| CoercionError::new(field_type, reason)),
            FieldType::Date => NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
                .map(TypedValue::Date)
                .map_err(|_| CoercionError::new(field_type, format!("'{}' is not a YYYY-MM-DD date", trimmed))),
            FieldType::Boolean => parse_bool(trimmed)
                .map(TypedValue::Boolean)
                .ok_or_else(|| {
                    CoercionError::new(
                        field_type,
                        format!("'{}' is not one of true/false/yes/no/on/off/1/0", trimmed),
                    )
                }),
            FieldType::Select => Ok(TypedValue::Choice(trimmed.to_string())),
            FieldType::File => Err(CoercionError::new(field_type, "a file upload is required, got text")),
        }
    }

    /// Serialized form written to the EAV `value` column.
    pub fn to_storage(&self) -> String {
        match self {
            TypedValue::Text(s) | TypedValue::Choice(s) => s.clone(),
            TypedValue::Number(n) => n.to_string(),
            TypedValue::Date(d) => d.format(DATE_FORMAT).to_string(),
            TypedValue::Boolean(b) => b.to_string(),
        }
    }

    /// Human-readable rendering for detail views and notifications.
    pub fn display(&self) -> String {
        match self {
            TypedValue::Boolean(true) => "Yes".to_string(),
            TypedValue::Boolean(false) => "No".to_string(),
            other => other.to_storage(),
        }
    }

    /// Ordering for values of the same ordered kind; `None` otherwise.
    pub fn compare(&self, other: &TypedValue) -> Option<Ordering> {
        match (self, other) {
            (TypedValue::Number(a), TypedValue::Number(b)) => Some(a.cmp(b)),
            (TypedValue::Date(a), TypedValue::Date(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            TypedValue::Text(s) | TypedValue::Choice(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Coerce a raw submitted value to `field`'s declared type.
pub fn coerce(raw: RawValue, field: &FormField) -> Result<Coerced, CoercionError> {
    match (field.field_type, raw) {
        (FieldType::File, RawValue::File(file)) => Ok(Coerced::File(file)),
        (FieldType::File, RawValue::Text(_)) => Err(CoercionError::new(
            FieldType::File,
            "a file upload is required, got text",
        )),
        (expected, RawValue::File(file)) => Err(CoercionError::new(
            expected,
            format!("got file upload '{}'", file.filename),
        )),
        (FieldType::Select, RawValue::Text(s)) => {
            let choice = s.trim();
            if field.options.iter().any(|o| o == choice) {
                Ok(Coerced::Value(TypedValue::Choice(choice.to_string())))
            } else {
                Err(CoercionError::new(
                    FieldType::Select,
                    format!("'{}' is not one of [{}]", choice, field.options.join(", ")),
                ))
            }
        }
        (field_type, RawValue::Text(s)) => TypedValue::parse(field_type, &s).map(Coerced::Value),
    }
}

/// Parse a numeric literal exactly. Literals `Decimal` cannot hold without
/// rounding are rejected, never approximated.
fn parse_decimal(s: &str) -> Result<Decimal, String> {
    if !NUMBER_RE.is_match(s) {
        return Err(format!("'{}' is not a number", s));
    }

    let parsed = if s.contains(['e', 'E']) {
        Decimal::from_scientific(s)
    } else {
        Decimal::from_str_exact(s)
    };

    match parsed {
        Ok(value) if significant_digits(&value.normalize().mantissa().unsigned_abs().to_string())
            == significant_digits(literal_digits(s).as_str()) =>
        {
            Ok(value)
        }
        _ => Err(format!(
            "'{}' is out of range (at most {} decimal places, magnitude below {})",
            s,
            MAX_SCALE,
            Decimal::MAX
        )),
    }
}

/// Mantissa digits of a literal, without sign, point or exponent.
fn literal_digits(s: &str) -> String {
    let mantissa = s.split(['e', 'E']).next().unwrap_or_default();
    mantissa.chars().filter(char::is_ascii_digit).collect()
}

fn significant_digits(digits: &str) -> &str {
    digits.trim_start_matches('0').trim_end_matches('0')
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formflow_ids::{FieldId, FormId};

    fn field(field_type: FieldType) -> FormField {
        FormField {
            id: FieldId::new(),
            form_id: FormId::new(),
            label: "Field".into(),
            field_key: "field".into(),
            field_type,
            is_required: false,
            order: 0,
            options: Vec::new(),
            help_text: None,
            condition: None,
        }
    }

    fn value(raw: &str, field_type: FieldType) -> Result<TypedValue, CoercionError> {
        match coerce(RawValue::from(raw), &field(field_type))? {
            Coerced::Value(v) => Ok(v),
            Coerced::File(_) => panic!("unexpected file"),
        }
    }

    #[test]
    fn numbers_parse_plain_and_scientific() {
        assert_eq!(value("150000", FieldType::Number).unwrap(), TypedValue::Number(Decimal::from(150000)));
        assert_eq!(value(" -2.50 ", FieldType::Number).unwrap().to_storage(), "-2.50");
        assert_eq!(value("1e3", FieldType::Number).unwrap(), TypedValue::Number(Decimal::from(1000)));

        let err = value("12abc", FieldType::Number).unwrap_err();
        assert_eq!(err.expected, FieldType::Number);
    }

    #[test]
    fn numbers_outside_decimal_range_are_rejected() {
        for literal in ["1e30", "100000000000000000000000000000", "1.5e-40", "-1E+29"] {
            let err = value(literal, FieldType::Number).unwrap_err();
            assert!(err.reason.contains("out of range"), "{literal}: {}", err.reason);
        }
    }

    #[test]
    fn numbers_are_never_rounded() {
        let err = value("12345678901234567890.123456789012", FieldType::Number).unwrap_err();
        assert!(err.reason.contains("out of range"), "{}", err.reason);

        let err = value("0.00000000000000000000000000001", FieldType::Number).unwrap_err();
        assert!(err.reason.contains("out of range"), "{}", err.reason);

        // 28 fractional digits still fit and survive storage unchanged
        let exact = "0.1234567890123456789012345678";
        assert_eq!(value(exact, FieldType::Number).unwrap().to_storage(), exact);
        assert_eq!(value("2.5e-3", FieldType::Number).unwrap().to_storage(), "0.0025");
    }

    #[test]
    fn malformed_numbers_are_not_numbers() {
        for literal in ["", "1.", ".5", "1e", "--1", "0x10", "1_000"] {
            let err = value(literal, FieldType::Number).unwrap_err();
            assert!(err.reason.contains("is not a number"), "{literal}: {}", err.reason);
        }
    }

    #[test]
    fn booleans_accept_fixed_tokens_only() {
        for token in ["true", "TRUE", "1", "yes", "On"] {
            assert_eq!(value(token, FieldType::Boolean).unwrap(), TypedValue::Boolean(true), "{token}");
        }
        for token in ["false", "0", "No", "off"] {
            assert_eq!(value(token, FieldType::Boolean).unwrap(), TypedValue::Boolean(false), "{token}");
        }
        assert!(value("maybe", FieldType::Boolean).is_err());
    }

    #[test]
    fn dates_use_iso_format() {
        let d = value("2024-02-29", FieldType::Date).unwrap();
        assert_eq!(d.to_storage(), "2024-02-29");
        assert!(value("29/02/2024", FieldType::Date).is_err());
        assert!(value("2023-02-29", FieldType::Date).is_err());
    }

    #[test]
    fn emails_are_pattern_checked() {
        assert!(value("a@example.com", FieldType::Email).is_ok());
        assert!(value("not-an-email", FieldType::Email).is_err());
        assert!(value("a@b", FieldType::Email).is_err());
    }

    #[test]
    fn select_requires_declared_option() {
        let mut f = field(FieldType::Select);
        f.options = vec!["red".into(), "green".into()];

        let ok = coerce(RawValue::from(" green "), &f).unwrap();
        assert_eq!(ok, Coerced::Value(TypedValue::Choice("green".into())));

        let err = coerce(RawValue::from("blue"), &f).unwrap_err();
        assert!(err.reason.contains("red, green"));
    }

    #[test]
    fn files_and_scalars_do_not_mix() {
        let upload = FileHandle::new("cv.pdf", b"%PDF".to_vec());

        assert!(matches!(
            coerce(RawValue::File(upload.clone()), &field(FieldType::File)),
            Ok(Coerced::File(_))
        ));
        assert!(coerce(RawValue::from("cv.pdf"), &field(FieldType::File)).is_err());
        assert!(coerce(RawValue::File(upload), &field(FieldType::Text)).is_err());
    }

    #[test]
    fn display_round_trips_through_coercion() {
        let samples = [
            (FieldType::Text, "hello"),
            (FieldType::Textarea, "line one\nline two"),
            (FieldType::Email, "x@y.org"),
            (FieldType::Number, "100000.25"),
            (FieldType::Number, "7"),
            (FieldType::Date, "1999-12-31"),
            (FieldType::Boolean, "1"),
            (FieldType::Boolean, "off"),
        ];

        for (field_type, raw) in samples {
            let typed = value(raw, field_type).unwrap();
            let again = value(&typed.display(), field_type).unwrap();
            assert_eq!(typed, again, "{field_type} {raw:?}");

            let stored = TypedValue::parse(field_type, &typed.to_storage()).unwrap();
            assert_eq!(typed, stored, "{field_type} {raw:?}");
        }
    }

    #[test]
    fn blank_values_are_empty() {
        assert!(RawValue::from("   ").is_empty());
        assert!(!RawValue::from("0").is_empty());
        assert!(RawValue::File(FileHandle::new("", Vec::new())).is_empty());
    }
}
