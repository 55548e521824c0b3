//! Dynamically typed SQL values.

use crate::error::{Error, Result};
use crate::types::FieldType;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A dynamically-typed SQL value.
///
/// `Array` is only meaningful as a bound parameter, where it expands to an
/// `IN (...)` list.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// NULL value
    #[default]
    Null,
    Bool(bool),
    Byte(u8),
    Short(i16),
    UShort(u16),
    Int(i32),
    UInt(u32),
    Long(i64),
    ULong(u64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    DateTime(NaiveDateTime),
    Uuid(Uuid),
    /// Sequence parameter.
    Array(Vec<Value>),
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];

/// Display format for datetimes, also used by JSON conversion.
pub const DATETIME_DISPLAY: &str = "%Y-%m-%d %H:%M:%S";

impl Value {
    /// Check if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// NULL, an empty string, or an empty sequence.
    pub fn is_null_or_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
            Value::Array(a) => a.is_empty(),
            _ => false,
        }
    }

    /// Get the value as text, if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Widen any integer value to `i128`.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Bool(b) => Some(i128::from(*b)),
            Value::Byte(v) => Some(i128::from(*v)),
            Value::Short(v) => Some(i128::from(*v)),
            Value::UShort(v) => Some(i128::from(*v)),
            Value::Int(v) => Some(i128::from(*v)),
            Value::UInt(v) => Some(i128::from(*v)),
            Value::Long(v) => Some(i128::from(*v)),
            Value::ULong(v) => Some(i128::from(*v)),
            Value::Float(v) if v.fract() == 0.0 => Some(*v as i128),
            Value::Double(v) if v.fract() == 0.0 => Some(*v as i128),
            Value::Decimal(d) if d.fract().is_zero() => d.to_i128(),
            _ => None,
        }
    }

    /// Get the value as `f64` if it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            Value::Decimal(d) => d.to_f64(),
            other => other.as_i128().map(|v| v as f64),
        }
    }

    /// Name of the variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Byte(_) => "byte",
            Value::Short(_) => "short",
            Value::UShort(_) => "ushort",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Long(_) => "long",
            Value::ULong(_) => "ulong",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Decimal(_) => "decimal",
            Value::Text(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::DateTime(_) => "datetime",
            Value::Uuid(_) => "guid",
            Value::Array(_) => "array",
        }
    }

    /// Whether the value already has the representation of `ty`.
    ///
    /// NULL conforms to every type; requiredness is a separate check.
    pub fn conforms_to(&self, ty: &FieldType) -> bool {
        match (ty, self) {
            (_, Value::Null) => true,
            (FieldType::Object | FieldType::Other(_), _) => true,
            (FieldType::String, Value::Text(_))
            | (FieldType::Decimal, Value::Decimal(_))
            | (FieldType::Bool, Value::Bool(_))
            | (FieldType::Byte, Value::Byte(_))
            | (FieldType::Short, Value::Short(_))
            | (FieldType::UShort, Value::UShort(_))
            | (FieldType::Int, Value::Int(_))
            | (FieldType::UInt, Value::UInt(_))
            | (FieldType::Long, Value::Long(_))
            | (FieldType::ULong, Value::ULong(_))
            | (FieldType::Float, Value::Float(_))
            | (FieldType::Double, Value::Double(_))
            | (FieldType::DateTime, Value::DateTime(_))
            | (FieldType::Guid, Value::Uuid(_))
            | (FieldType::Bytes, Value::Bytes(_)) => true,
            _ => false,
        }
    }

    /// Convert this value to the representation of `ty`.
    ///
    /// Textual input is parsed. An empty string becomes NULL for every type
    /// except `string`. Opaque and unrecognized types pass through. The error
    /// is a human-readable reason, not an [`Error`], because a failed
    /// coercion is a data fault.
    pub fn coerce_to(self, ty: &FieldType) -> std::result::Result<Value, String> {
        if self.is_null() || self.conforms_to(ty) {
            return Ok(self);
        }
        if let Value::Text(s) = &self {
            if s.trim().is_empty() && *ty != FieldType::String {
                return Ok(Value::Null);
            }
        }
        let fail = |v: &Value| format!("cannot convert {} '{}' to {}", v.type_name(), v, ty);

        let out = match ty {
            FieldType::String => match &self {
                Value::Array(_) => None,
                other => Some(Value::Text(other.to_string())),
            },
            FieldType::Bool => match &self {
                Value::Text(s) => parse_bool(s).map(Value::Bool),
                other => other.as_i128().map(|v| Value::Bool(v != 0)),
            },
            FieldType::Decimal => match &self {
                Value::Text(s) => Decimal::from_str(s.trim()).ok().map(Value::Decimal),
                Value::Float(v) => Decimal::from_f32(*v).map(Value::Decimal),
                Value::Double(v) => Decimal::from_f64(*v).map(Value::Decimal),
                other => other.as_i128().and_then(Decimal::from_i128).map(Value::Decimal),
            },
            FieldType::Float => self.numeric_f64().map(|v| Value::Float(v as f32)),
            FieldType::Double => self.numeric_f64().map(Value::Double),
            t if t.is_integer() => self.integer().and_then(|v| integer_as(t, v)),
            FieldType::DateTime => match &self {
                Value::Text(s) => parse_datetime(s).map(Value::DateTime),
                _ => None,
            },
            FieldType::Guid => match &self {
                Value::Text(s) => Uuid::parse_str(s.trim()).ok().map(Value::Uuid),
                Value::Bytes(b) => Uuid::from_slice(b).ok().map(Value::Uuid),
                _ => None,
            },
            FieldType::Bytes => match &self {
                Value::Text(s) => Some(Value::Bytes(s.as_bytes().to_vec())),
                Value::Byte(b) => Some(Value::Bytes(vec![*b])),
                _ => None,
            },
            _ => Some(self.clone()),
        };
        out.ok_or_else(|| fail(&self))
    }

    fn integer(&self) -> Option<i128> {
        match self {
            Value::Text(s) => {
                let t = s.trim();
                t.parse::<i128>()
                    .ok()
                    .or_else(|| Decimal::from_str(t).ok().filter(|d| d.fract().is_zero()).and_then(|d| d.to_i128()))
            }
            other => other.as_i128(),
        }
    }

    fn numeric_f64(&self) -> Option<f64> {
        match self {
            Value::Text(s) => s.trim().parse::<f64>().ok(),
            other => other.as_f64(),
        }
    }

    /// Convert to a JSON value.
    ///
    /// Decimals are emitted as strings to preserve precision.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Value::Null => J::Null,
            Value::Bool(b) => J::Bool(*b),
            Value::Byte(v) => J::from(*v),
            Value::Short(v) => J::from(*v),
            Value::UShort(v) => J::from(*v),
            Value::Int(v) => J::from(*v),
            Value::UInt(v) => J::from(*v),
            Value::Long(v) => J::from(*v),
            Value::ULong(v) => J::from(*v),
            Value::Float(v) => J::from(f64::from(*v)),
            Value::Double(v) => J::from(*v),
            Value::Decimal(d) => J::String(d.to_string()),
            Value::Text(s) => J::String(s.clone()),
            Value::Bytes(b) => J::Array(b.iter().map(|x| J::from(*x)).collect()),
            Value::DateTime(dt) => J::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Value::Uuid(u) => J::String(u.to_string()),
            Value::Array(items) => J::Array(items.iter().map(Value::to_json).collect()),
        }
    }

    /// Convert from a JSON value. Objects are kept as their JSON text.
    pub fn from_json(json: &serde_json::Value) -> Value {
        use serde_json::Value as J;
        match json {
            J::Null => Value::Null,
            J::Bool(b) => Value::Bool(*b),
            J::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Long(i)
                } else if let Some(u) = n.as_u64() {
                    Value::ULong(u)
                } else {
                    Value::Double(n.as_f64().unwrap_or_default())
                }
            }
            J::String(s) => Value::Text(s.clone()),
            J::Array(items) => Value::Array(items.iter().map(Value::from_json).collect()),
            J::Object(_) => Value::Text(json.to_string()),
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "on" => Some(true),
        "false" | "0" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a datetime from the textual forms drivers and users commonly send.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn integer_as(ty: &FieldType, v: i128) -> Option<Value> {
    match ty {
        FieldType::Byte => u8::try_from(v).ok().map(Value::Byte),
        FieldType::Short => i16::try_from(v).ok().map(Value::Short),
        FieldType::UShort => u16::try_from(v).ok().map(Value::UShort),
        FieldType::Int => i32::try_from(v).ok().map(Value::Int),
        FieldType::UInt => u32::try_from(v).ok().map(Value::UInt),
        FieldType::Long => i64::try_from(v).ok().map(Value::Long),
        FieldType::ULong => u64::try_from(v).ok().map(Value::ULong),
        _ => None,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Byte(v) => write!(f, "{v}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::UShort(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::ULong(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Text(s) => f.write_str(s),
            Value::Bytes(b) => {
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Value::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_DISPLAY)),
            Value::Uuid(u) => write!(f, "{u}"),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(|j| Value::from_json(&j))
    }
}

// ============================================================================
// Conversions into Value
// ============================================================================

macro_rules! impl_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from!(
    bool => Bool,
    u8 => Byte,
    i16 => Short,
    u16 => UShort,
    i32 => Int,
    u32 => UInt,
    i64 => Long,
    u64 => ULong,
    f32 => Float,
    f64 => Double,
    Decimal => Decimal,
    String => Text,
    Vec<u8> => Bytes,
    NaiveDateTime => DateTime,
    Uuid => Uuid,
    Vec<Value> => Array,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// ============================================================================
// Conversions out of Value
// ============================================================================

/// Typed extraction from a [`Value`], used by scalar materializers.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

fn conversion_error(value: &Value, target: &str) -> Error {
    Error::usage(format!("cannot read {} value as {target}", value.type_name()))
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null | Value::Array(_) => Err(conversion_error(value, "string")),
            other => Ok(other.to_string()),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        match value.clone().coerce_to(&FieldType::Bool) {
            Ok(Value::Bool(b)) => Ok(b),
            _ => Err(conversion_error(value, "bool")),
        }
    }
}

macro_rules! impl_from_value_int {
    ($($t:ty),*) => {
        $(
            impl FromValue for $t {
                fn from_value(value: &Value) -> Result<Self> {
                    value
                        .integer()
                        .and_then(|v| <$t>::try_from(v).ok())
                        .ok_or_else(|| conversion_error(value, stringify!($t)))
                }
            }
        )*
    };
}

impl_from_value_int!(u8, i16, u16, i32, u32, i64, u64);

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .numeric_f64()
            .ok_or_else(|| conversion_error(value, "f64"))
    }
}

impl FromValue for Decimal {
    fn from_value(value: &Value) -> Result<Self> {
        match value.clone().coerce_to(&FieldType::Decimal) {
            Ok(Value::Decimal(d)) => Ok(d),
            _ => Err(conversion_error(value, "decimal")),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> Result<Self> {
        match value.clone().coerce_to(&FieldType::DateTime) {
            Ok(Value::DateTime(dt)) => Ok(dt),
            _ => Err(conversion_error(value, "datetime")),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: &Value) -> Result<Self> {
        match value.clone().coerce_to(&FieldType::Guid) {
            Ok(Value::Uuid(u)) => Ok(u),
            _ => Err(conversion_error(value, "guid")),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}
