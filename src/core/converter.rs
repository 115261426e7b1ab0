// src/core/converter.rs

//! String-to-typed-value conversion used by the binder.
//!
//! The binder never inspects Rust types: each parameter declares a [`ValueType`] and the
//! [`ValueConverter`] turns the raw token text into a [`Value`] of that type. Command
//! structs then take the value apart with the `TryFrom<Value>` impls below.

use chrono::{NaiveDate, NaiveDateTime};
use std::{collections::HashSet, fmt, sync::Arc};
use thiserror::Error;

/// The declared type of a parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    String,
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    DateTime,
    /// A closed set of names, matched case-insensitively.
    Enum(Vec<String>),
    /// A homogeneous list of the element type.
    List(Box<ValueType>),
    /// A type only a custom converter knows about.
    Custom(String),
}

impl ValueType {
    /// Shorthand for `ValueType::List(Box::new(element))`.
    pub fn list(element: Self) -> Self {
        Self::List(Box::new(element))
    }

    pub fn enumeration<I, S>(variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum(variants.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::Bool => f.write_str("bool"),
            Self::I8 => f.write_str("i8"),
            Self::I16 => f.write_str("i16"),
            Self::I32 => f.write_str("i32"),
            Self::I64 => f.write_str("i64"),
            Self::U8 => f.write_str("u8"),
            Self::U16 => f.write_str("u16"),
            Self::U32 => f.write_str("u32"),
            Self::U64 => f.write_str("u64"),
            Self::F32 => f.write_str("f32"),
            Self::F64 => f.write_str("f64"),
            Self::DateTime => f.write_str("datetime"),
            Self::Enum(variants) => write!(f, "enum({})", variants.join("|")),
            Self::List(element) => write!(f, "list<{}>", element),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

/// A converted parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    DateTime(NaiveDateTime),
    /// The declared spelling of the matched variant.
    Enum(String),
    List(Vec<Value>),
}

/// Raw token text handed to a converter: one word, or every word of a list parameter.
#[derive(Debug, Clone, Copy)]
pub enum RawValue<'a> {
    Single(&'a str),
    Many(&'a [String]),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    #[error("'{value}' is not a valid {target}.")]
    InvalidValue { value: String, target: String },
    #[error("'{value}' is out of range for {target}.")]
    OutOfRange { value: String, target: String },
    #[error("'{value}' is not one of: {variants}.")]
    UnknownVariant { value: String, variants: String },
    #[error("A list of values cannot be converted to the scalar type {0}.")]
    NotAList(String),
    #[error("No conversion available for type {0}.")]
    Unsupported(String),
    #[error("Expected a {expected} value but got {found:?}.")]
    TypeMismatch { expected: &'static str, found: Value },
}

/// Converts raw token text into typed values.
///
/// Implementations must be thread-safe: one converter is shared by every invocation.
pub trait ValueConverter: Send + Sync + fmt::Debug {
    /// Whether this converter can produce values of `target`. Checked at registration.
    fn supports(&self, target: &ValueType) -> bool;

    fn convert(&self, raw: RawValue<'_>, target: &ValueType) -> Result<Value, ConversionError>;
}

/// A parser for one [`ValueType::Custom`] type.
pub type CustomParser = Arc<dyn Fn(&str) -> Result<Value, ConversionError> + Send + Sync>;

/// Date and date-time layouts accepted for [`ValueType::DateTime`], tried in order.
const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];

/// The built-in converter: integers, floats, bools, date/times, enums, strings, lists of
/// those, plus any custom types registered with [`DefaultConverter::with_custom`].
#[derive(Default, Clone)]
pub struct DefaultConverter {
    custom: Vec<(String, CustomParser)>,
}

impl fmt::Debug for DefaultConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultConverter")
            .field(
                "custom",
                &self.custom.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl DefaultConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a parser for `ValueType::Custom(name)`.
    pub fn with_custom<F>(mut self, name: impl Into<String>, parser: F) -> Self
    where
        F: Fn(&str) -> Result<Value, ConversionError> + Send + Sync + 'static,
    {
        self.custom.push((name.into(), Arc::new(parser)));
        self
    }

    fn custom_parser(&self, name: &str) -> Option<&CustomParser> {
        self.custom
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, parser)| parser)
    }

    fn convert_scalar(&self, raw: &str, target: &ValueType) -> Result<Value, ConversionError> {
        let value = raw.trim();
        match target {
            ValueType::String => Ok(Value::String(raw.to_string())),
            ValueType::Bool => parse_bool(value).map(Value::Bool),
            ValueType::I8 => parse_signed(value, target, i8::MIN.into(), i8::MAX.into()),
            ValueType::I16 => parse_signed(value, target, i16::MIN.into(), i16::MAX.into()),
            ValueType::I32 => parse_signed(value, target, i32::MIN.into(), i32::MAX.into()),
            ValueType::I64 => parse_signed(value, target, i64::MIN, i64::MAX),
            ValueType::U8 => parse_unsigned(value, target, u8::MAX.into()),
            ValueType::U16 => parse_unsigned(value, target, u16::MAX.into()),
            ValueType::U32 => parse_unsigned(value, target, u32::MAX.into()),
            ValueType::U64 => parse_unsigned(value, target, u64::MAX),
            ValueType::F32 => parse_float(value, target, true),
            ValueType::F64 => parse_float(value, target, false),
            ValueType::DateTime => parse_date_time(value).map(Value::DateTime),
            ValueType::Enum(variants) => variants
                .iter()
                .find(|v| v.eq_ignore_ascii_case(value))
                .map(|v| Value::Enum(v.clone()))
                .ok_or_else(|| ConversionError::UnknownVariant {
                    value: value.to_string(),
                    variants: variants.join(", "),
                }),
            ValueType::Custom(name) => match self.custom_parser(name) {
                Some(parser) => parser(raw),
                None => Err(ConversionError::Unsupported(name.clone())),
            },
            ValueType::List(element) => self.convert_list(&[raw.to_string()], element),
        }
    }

    fn convert_list(&self, raw: &[String], element: &ValueType) -> Result<Value, ConversionError> {
        raw.iter()
            .map(|item| self.convert_scalar(item, element))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List)
    }
}

impl ValueConverter for DefaultConverter {
    fn supports(&self, target: &ValueType) -> bool {
        match target {
            ValueType::List(element) => {
                !matches!(**element, ValueType::List(_)) && self.supports(element)
            }
            ValueType::Enum(variants) => {
                let mut seen = HashSet::new();
                !variants.is_empty()
                    && variants.iter().all(|v| seen.insert(v.to_ascii_lowercase()))
            }
            ValueType::Custom(name) => self.custom_parser(name).is_some(),
            _ => true,
        }
    }

    fn convert(&self, raw: RawValue<'_>, target: &ValueType) -> Result<Value, ConversionError> {
        match (raw, target) {
            (RawValue::Many(items), ValueType::List(element)) => self.convert_list(items, element),
            (RawValue::Single(item), target) => self.convert_scalar(item, target),
            (RawValue::Many([item]), target) => self.convert_scalar(item, target),
            (RawValue::Many(_), target) => Err(ConversionError::NotAList(target.to_string())),
        }
    }
}

fn parse_bool(value: &str) -> Result<bool, ConversionError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConversionError::InvalidValue {
            value: value.to_string(),
            target: ValueType::Bool.to_string(),
        }),
    }
}

fn parse_signed(value: &str, target: &ValueType, min: i64, max: i64) -> Result<Value, ConversionError> {
    let parsed: i128 = value.parse().map_err(|_| ConversionError::InvalidValue {
        value: value.to_string(),
        target: target.to_string(),
    })?;
    if parsed < i128::from(min) || parsed > i128::from(max) {
        return Err(ConversionError::OutOfRange {
            value: value.to_string(),
            target: target.to_string(),
        });
    }
    i64::try_from(parsed)
        .map(Value::Int)
        .map_err(|_| ConversionError::OutOfRange {
            value: value.to_string(),
            target: target.to_string(),
        })
}

fn parse_unsigned(value: &str, target: &ValueType, max: u64) -> Result<Value, ConversionError> {
    let parsed: i128 = value.parse().map_err(|_| ConversionError::InvalidValue {
        value: value.to_string(),
        target: target.to_string(),
    })?;
    u64::try_from(parsed)
        .ok()
        .filter(|v| *v <= max)
        .map(Value::UInt)
        .ok_or_else(|| ConversionError::OutOfRange {
            value: value.to_string(),
            target: target.to_string(),
        })
}

fn parse_float(value: &str, target: &ValueType, single: bool) -> Result<Value, ConversionError> {
    let parsed: f64 = value.parse().map_err(|_| ConversionError::InvalidValue {
        value: value.to_string(),
        target: target.to_string(),
    })?;
    if single && parsed.is_finite() && parsed.abs() > f64::from(f32::MAX) {
        return Err(ConversionError::OutOfRange {
            value: value.to_string(),
            target: target.to_string(),
        });
    }
    Ok(Value::Float(parsed))
}

fn parse_date_time(value: &str) -> Result<NaiveDateTime, ConversionError> {
    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.naive_utc());
    }
    DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| ConversionError::InvalidValue {
            value: value.to_string(),
            target: ValueType::DateTime.to_string(),
        })
}

// --- Construction from Rust types (used for declared defaults) ---

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::UInt(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl Value {
    /// Whether this value is a legal instance of `target`, used to vet typed defaults.
    pub fn fits(&self, target: &ValueType) -> bool {
        match (self, target) {
            (_, ValueType::Custom(_)) => true,
            (Self::String(_), ValueType::String) => true,
            (Self::Bool(_), ValueType::Bool) => true,
            (
                Self::Int(_) | Self::UInt(_),
                ValueType::I8
                | ValueType::I16
                | ValueType::I32
                | ValueType::I64
                | ValueType::U8
                | ValueType::U16
                | ValueType::U32
                | ValueType::U64,
            ) => true,
            (Self::Float(_), ValueType::F32 | ValueType::F64) => true,
            (Self::DateTime(_), ValueType::DateTime) => true,
            (Self::Enum(name), ValueType::Enum(variants)) => variants.contains(name),
            (Self::List(items), ValueType::List(element)) => {
                items.iter().all(|item| item.fits(element))
            }
            _ => false,
        }
    }
}

// --- Extraction into Rust types ---

impl TryFrom<Value> for String {
    type Error = ConversionError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) | Value::Enum(s) => Ok(s),
            other => Err(ConversionError::TypeMismatch {
                expected: "string",
                found: other,
            }),
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = ConversionError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(ConversionError::TypeMismatch {
                expected: "bool",
                found: other,
            }),
        }
    }
}

impl TryFrom<Value> for f64 {
    type Error = ConversionError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Float(f) => Ok(f),
            other => Err(ConversionError::TypeMismatch {
                expected: "float",
                found: other,
            }),
        }
    }
}

impl TryFrom<Value> for NaiveDateTime {
    type Error = ConversionError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::DateTime(dt) => Ok(dt),
            other => Err(ConversionError::TypeMismatch {
                expected: "datetime",
                found: other,
            }),
        }
    }
}

macro_rules! integer_try_from {
    ($($ty:ty),*) => {$(
        impl TryFrom<Value> for $ty {
            type Error = ConversionError;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                let out_of_range = |v: &Value| ConversionError::OutOfRange {
                    value: format!("{:?}", v),
                    target: stringify!($ty).to_string(),
                };
                match value {
                    Value::Int(i) => <$ty>::try_from(i).map_err(|_| out_of_range(&value)),
                    Value::UInt(u) => <$ty>::try_from(u).map_err(|_| out_of_range(&value)),
                    other => Err(ConversionError::TypeMismatch {
                        expected: "integer",
                        found: other,
                    }),
                }
            }
        }
    )*};
}

integer_try_from!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl<T> TryFrom<Value> for Vec<T>
where
    T: TryFrom<Value, Error = ConversionError>,
{
    type Error = ConversionError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::List(items) => items.into_iter().map(T::try_from).collect(),
            other => Err(ConversionError::TypeMismatch {
                expected: "list",
                found: other,
            }),
        }
    }
}
