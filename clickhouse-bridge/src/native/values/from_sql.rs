use chrono::NaiveDate;
use chrono_tz::Tz;

use super::{Decimal, Value};
use crate::native::types::Type;
use crate::{Error, Result};

/// Typed extraction of a decoded value. See [`crate::Row::try_get`].
pub trait FromSql: Sized {
    /// # Errors
    ///
    /// Returns a decode error if `value` cannot be represented as `Self`. A `NULL` only converts
    /// into `Option<T>` or [`Value`].
    fn from_sql(type_: &Type, value: Value) -> Result<Self>;
}

fn unexpected(type_: &Type, value: &Value, target: &str) -> Error {
    if value.is_null() {
        return Error::decode(format!("unexpected NULL in {type_} column, use Option<{target}>"));
    }
    Error::decode(format!("cannot read {} value '{value}' of {type_} as {target}", value.as_ref()))
}

impl FromSql for Value {
    fn from_sql(_type_: &Type, value: Value) -> Result<Self> { Ok(value) }
}

impl<T: FromSql> FromSql for Option<T> {
    fn from_sql(type_: &Type, value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(None);
        }
        T::from_sql(type_.strip_null(), value).map(Some)
    }
}

macro_rules! integer_from_sql {
    ($($ty:ty),*) => {
        $(
            impl FromSql for $ty {
                fn from_sql(type_: &Type, value: Value) -> Result<Self> {
                    let out = match &value {
                        Value::Bool(_) | Value::Enum8(..) | Value::Enum16(..) => None,
                        Value::UInt64(x) => <$ty>::try_from(*x).ok(),
                        other => other.as_i64().and_then(|x| <$ty>::try_from(x).ok()),
                    };
                    out.ok_or_else(|| unexpected(type_, &value, stringify!($ty)))
                }
            }
        )*
    };
}

integer_from_sql!(i8, i16, i32, i64, u8, u16, u32, u64);

impl FromSql for bool {
    fn from_sql(type_: &Type, value: Value) -> Result<Self> {
        match value {
            Value::Bool(x) => Ok(x),
            Value::UInt8(x @ (0 | 1)) => Ok(x == 1),
            other => Err(unexpected(type_, &other, "bool")),
        }
    }
}

impl FromSql for f64 {
    fn from_sql(type_: &Type, value: Value) -> Result<Self> {
        match value {
            Value::Float32(x) => Ok(f64::from(x)),
            Value::Float64(x) => Ok(x),
            other => Err(unexpected(type_, &other, "f64")),
        }
    }
}

impl FromSql for f32 {
    fn from_sql(type_: &Type, value: Value) -> Result<Self> {
        match value {
            Value::Float32(x) => Ok(x),
            other => Err(unexpected(type_, &other, "f32")),
        }
    }
}

impl FromSql for String {
    fn from_sql(type_: &Type, value: Value) -> Result<Self> {
        match value {
            Value::String(bytes) | Value::FixedString(bytes) => Ok(String::from_utf8(bytes)?),
            Value::Enum8(label, _) | Value::Enum16(label, _) => Ok(label),
            other => Err(unexpected(type_, &other, "String")),
        }
    }
}

impl FromSql for Vec<u8> {
    fn from_sql(type_: &Type, value: Value) -> Result<Self> {
        match value {
            Value::String(bytes) | Value::FixedString(bytes) => Ok(bytes),
            other => Err(unexpected(type_, &other, "Vec<u8>")),
        }
    }
}

impl FromSql for NaiveDate {
    fn from_sql(type_: &Type, value: Value) -> Result<Self> {
        match value {
            Value::Date(x) => Ok(x),
            other => Err(unexpected(type_, &other, "NaiveDate")),
        }
    }
}

impl FromSql for chrono::DateTime<Tz> {
    fn from_sql(type_: &Type, value: Value) -> Result<Self> {
        match value {
            Value::DateTime(x) => Ok(x),
            other => Err(unexpected(type_, &other, "DateTime<Tz>")),
        }
    }
}

impl FromSql for Decimal {
    fn from_sql(type_: &Type, value: Value) -> Result<Self> {
        match value {
            Value::Decimal(x) => Ok(x),
            other => Err(unexpected(type_, &other, "Decimal")),
        }
    }
}

#[cfg(feature = "rust_decimal")]
impl FromSql for rust_decimal::Decimal {
    fn from_sql(type_: &Type, value: Value) -> Result<Self> {
        match value {
            Value::Decimal(x) => rust_decimal::Decimal::try_from(x),
            other => Err(unexpected(type_, &other, "rust_decimal::Decimal")),
        }
    }
}
