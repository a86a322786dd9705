mod coerce;
pub(crate) mod date;
mod decimal;
mod from_sql;

use std::fmt;

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use strum::AsRefStr;

pub use self::decimal::Decimal;
pub use self::from_sql::FromSql;

/// A single host-side value of a `ClickHouse` column.
///
/// Unsigned 64-bit integers are carried as native `u64`, so the whole `UInt64` range is exact.
/// Strings are bytes: `ClickHouse` strings are not required to be UTF-8.
#[derive(Debug, Clone, PartialEq, AsRefStr)]
pub enum Value {
    Null,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    String(Vec<u8>),
    /// Exactly `N` bytes as stored, trailing zero padding included.
    FixedString(Vec<u8>),
    Date(NaiveDate),
    DateTime(chrono::DateTime<Tz>),
    Decimal(Decimal),
    Enum8(String, i8),
    Enum16(String, i16),
}

impl Value {
    pub fn string(value: impl Into<String>) -> Value { Value::String(value.into().into_bytes()) }

    pub fn is_null(&self) -> bool { matches!(self, Value::Null) }

    /// String contents, if this is a string holding valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(bytes) | Value::FixedString(bytes) => std::str::from_utf8(bytes).ok(),
            Value::Enum8(label, _) | Value::Enum16(label, _) => Some(label),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::String(bytes) | Value::FixedString(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Any integer value that fits `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int8(x) | Value::Enum8(_, x) => Some(i64::from(x)),
            Value::Int16(x) | Value::Enum16(_, x) => Some(i64::from(x)),
            Value::Int32(x) => Some(i64::from(x)),
            Value::Int64(x) => Some(x),
            Value::UInt8(x) => Some(i64::from(x)),
            Value::UInt16(x) => Some(i64::from(x)),
            Value::UInt32(x) => Some(i64::from(x)),
            Value::UInt64(x) => i64::try_from(x).ok(),
            _ => None,
        }
    }

    /// Any integer value that fits `u64`.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::UInt64(x) => Some(x),
            _ => self.as_i64().and_then(|x| u64::try_from(x).ok()),
        }
    }

    #[expect(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float32(x) => Some(f64::from(*x)),
            Value::Float64(x) => Some(*x),
            Value::UInt64(x) => Some(*x as f64),
            Value::Decimal(d) => Some(d.to_f64()),
            _ => self.as_i64().map(|x| x as f64),
        }
    }

    /// A fixed string with its trailing zero padding removed, as a plain string. Other values are
    /// returned unchanged.
    #[must_use]
    pub fn trim_fixed(self) -> Value {
        match self {
            Value::FixedString(mut bytes) => {
                let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
                bytes.truncate(end);
                Value::String(bytes)
            }
            other => other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(x) => write!(f, "{x}"),
            Value::Int8(x) => write!(f, "{x}"),
            Value::Int16(x) => write!(f, "{x}"),
            Value::Int32(x) => write!(f, "{x}"),
            Value::Int64(x) => write!(f, "{x}"),
            Value::UInt8(x) => write!(f, "{x}"),
            Value::UInt16(x) => write!(f, "{x}"),
            Value::UInt32(x) => write!(f, "{x}"),
            Value::UInt64(x) => write!(f, "{x}"),
            Value::Float32(x) => write!(f, "{x}"),
            Value::Float64(x) => write!(f, "{x}"),
            Value::String(bytes) | Value::FixedString(bytes) => {
                write!(f, "{}", String::from_utf8_lossy(bytes))
            }
            Value::Date(x) => write!(f, "{}", x.format("%Y-%m-%d")),
            Value::DateTime(x) => write!(f, "{}", x.format("%Y-%m-%d %H:%M:%S")),
            Value::Decimal(x) => write!(f, "{x}"),
            Value::Enum8(label, _) | Value::Enum16(label, _) => write!(f, "{label}"),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self { Value::$variant(value) }
            }
        )*
    };
}

value_from!(
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    Vec<u8> => String,
    NaiveDate => Date,
    chrono::DateTime<Tz> => DateTime,
    Decimal => Decimal,
);

impl From<&str> for Value {
    fn from(value: &str) -> Self { Value::string(value) }
}

impl From<String> for Value {
    fn from(value: String) -> Self { Value::String(value.into_bytes()) }
}

impl From<chrono::DateTime<Utc>> for Value {
    fn from(value: chrono::DateTime<Utc>) -> Self { Value::DateTime(value.with_timezone(&Tz::UTC)) }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self { value.map_or(Value::Null, Into::into) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Value::UInt64(u64::MAX).to_string(), "18446744073709551615");
        assert_eq!(Value::Int64(i64::MIN).to_string(), "-9223372036854775808");
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Float64(1.0 / 3.0).to_string(), "0.3333333333333333");
        assert_eq!(
            Value::Date(NaiveDate::from_ymd_opt(2020, 1, 3).unwrap()).to_string(),
            "2020-01-03"
        );
        let dt = chrono::DateTime::from_timestamp(1_577_836_800, 0).unwrap();
        assert_eq!(Value::from(dt).to_string(), "2020-01-01 00:00:00");
        assert_eq!(Value::Enum8("gauge".into(), 2).to_string(), "gauge");
    }

    #[test]
    fn test_trim_fixed() {
        let padded = Value::FixedString(b"test\0\0\0\0".to_vec());
        assert_eq!(padded.clone().trim_fixed(), Value::string("test"));
        assert_eq!(Value::FixedString(vec![0; 4]).trim_fixed(), Value::string(""));
        assert_eq!(Value::Int8(1).trim_fixed(), Value::Int8(1));
        assert_eq!(padded.as_bytes().map(<[u8]>::len), Some(8));
    }

    #[test]
    fn test_numeric_accessors() {
        assert_eq!(Value::UInt64(u64::MAX).as_i64(), None);
        assert_eq!(Value::UInt64(u64::MAX).as_u64(), Some(u64::MAX));
        assert_eq!(Value::Int8(-1).as_u64(), None);
        assert_eq!(Value::Int32(7).as_f64(), Some(7.0));
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some("a")), Value::string("a"));
    }
}
