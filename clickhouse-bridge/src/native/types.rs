pub(crate) mod deserialize;
pub(crate) mod serialize;
#[cfg(test)]
mod tests;

pub use deserialize::decode_value;
pub use serialize::encode_value;

use std::fmt;
use std::str::FromStr;

use chrono_tz::Tz;

use crate::native::values::{Decimal, Value};
use crate::{Error, Result};

/// Largest decimal precision backed by a native integer on the wire (`Decimal128`).
pub const MAX_DECIMAL_PRECISION: u8 = 38;

/// A `ClickHouse` column type, as declared by the server for result and insert columns.
///
/// Types are parsed from the server's type names (`Nullable(FixedString(5))`,
/// `Decimal(38, 3)`, `DateTime('Europe/Amsterdam')`, ...) and render back to the same canonical
/// names through [`fmt::Display`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Bool,
    String,
    FixedSizedString(usize),
    /// Days since 1970-01-01, stored as `u16`.
    Date,
    /// Seconds since the epoch, stored as `u32`. `None` means the column has no explicit zone and
    /// values are presented in the connection's zone.
    DateTime(Option<Tz>),
    /// Scaled integer: `value × 10^scale`, bounded to `precision` digits.
    Decimal {
        precision: u8,
        scale:     u8,
    },
    Enum8(Vec<(String, i8)>),
    Enum16(Vec<(String, i16)>),
    LowCardinality(Box<Type>),
    Nullable(Box<Type>),
    /// The type of a bare `NULL` literal; only ever seen wrapped in `Nullable`.
    Nothing,
}

impl Type {
    /// Helper to wrap a type in `Nullable`.
    #[must_use]
    pub fn into_nullable(self) -> Type {
        match self {
            t @ Type::Nullable(_) => t,
            t => Type::Nullable(Box::new(t)),
        }
    }

    /// The type without any `Nullable` wrapper.
    pub fn strip_null(&self) -> &Type {
        match self {
            Type::Nullable(inner) => inner,
            _ => self,
        }
    }

    /// The type without any `LowCardinality` wrapper.
    pub fn strip_low_cardinality(&self) -> &Type {
        match self {
            Type::LowCardinality(inner) => inner.strip_low_cardinality(),
            _ => self,
        }
    }

    pub fn is_nullable(&self) -> bool {
        match self {
            Type::Nullable(_) => true,
            Type::LowCardinality(inner) => inner.is_nullable(),
            _ => false,
        }
    }

    /// Bytes per value for a decimal of the given precision.
    pub(crate) fn decimal_width(precision: u8) -> usize {
        match precision {
            0..=9 => 4,
            10..=18 => 8,
            _ => 16,
        }
    }

    /// The value written in the inner column for rows that are null.
    pub(crate) fn default_value(&self, tz: Tz) -> Value {
        match self {
            Type::Int8 => Value::Int8(0),
            Type::Int16 => Value::Int16(0),
            Type::Int32 => Value::Int32(0),
            Type::Int64 => Value::Int64(0),
            Type::UInt8 => Value::UInt8(0),
            Type::UInt16 => Value::UInt16(0),
            Type::UInt32 => Value::UInt32(0),
            Type::UInt64 => Value::UInt64(0),
            Type::Float32 => Value::Float32(0.0),
            Type::Float64 => Value::Float64(0.0),
            Type::Bool => Value::Bool(false),
            Type::String => Value::String(vec![]),
            Type::FixedSizedString(n) => Value::FixedString(vec![0; *n]),
            Type::Date => Value::Date(chrono::NaiveDate::default()),
            Type::DateTime(zone) => {
                Value::DateTime(chrono::DateTime::UNIX_EPOCH.with_timezone(&zone.unwrap_or(tz)))
            }
            Type::Decimal { precision, scale } => {
                Value::Decimal(Decimal::zero(*precision, *scale))
            }
            Type::Enum8(variants) => variants
                .first()
                .map_or(Value::Enum8(String::new(), 0), |(n, v)| Value::Enum8(n.clone(), *v)),
            Type::Enum16(variants) => variants
                .first()
                .map_or(Value::Enum16(String::new(), 0), |(n, v)| Value::Enum16(n.clone(), *v)),
            Type::LowCardinality(inner) => inner.default_value(tz),
            Type::Nullable(_) | Type::Nothing => Value::Null,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int8 => write!(f, "Int8"),
            Type::Int16 => write!(f, "Int16"),
            Type::Int32 => write!(f, "Int32"),
            Type::Int64 => write!(f, "Int64"),
            Type::UInt8 => write!(f, "UInt8"),
            Type::UInt16 => write!(f, "UInt16"),
            Type::UInt32 => write!(f, "UInt32"),
            Type::UInt64 => write!(f, "UInt64"),
            Type::Float32 => write!(f, "Float32"),
            Type::Float64 => write!(f, "Float64"),
            Type::Bool => write!(f, "Bool"),
            Type::String => write!(f, "String"),
            Type::FixedSizedString(n) => write!(f, "FixedString({n})"),
            Type::Date => write!(f, "Date"),
            Type::DateTime(None) => write!(f, "DateTime"),
            Type::DateTime(Some(tz)) => write!(f, "DateTime('{}')", tz.name()),
            Type::Decimal { precision, scale } => write!(f, "Decimal({precision}, {scale})"),
            Type::Enum8(variants) => write_enum(f, "Enum8", variants),
            Type::Enum16(variants) => write_enum(f, "Enum16", variants),
            Type::LowCardinality(inner) => write!(f, "LowCardinality({inner})"),
            Type::Nullable(inner) => write!(f, "Nullable({inner})"),
            Type::Nothing => write!(f, "Nothing"),
        }
    }
}

fn write_enum<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    variants: &[(String, T)],
) -> fmt::Result {
    write!(f, "{name}(")?;
    for (i, (label, value)) in variants.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        let escaped = label.replace('\\', "\\\\").replace('\'', "\\'");
        write!(f, "'{escaped}' = {value}")?;
    }
    write!(f, ")")
}

impl FromStr for Type {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(inner) = wrapped(s, "Nullable") {
            let inner = inner.parse::<Type>()?;
            if inner.is_nullable() {
                return Err(Error::TypeParse(s.to_string()));
            }
            return Ok(Type::Nullable(Box::new(inner)));
        }
        if let Some(inner) = wrapped(s, "LowCardinality") {
            return Ok(Type::LowCardinality(Box::new(inner.parse()?)));
        }
        if let Some(n) = wrapped(s, "FixedString") {
            return n
                .trim()
                .parse::<usize>()
                .map(Type::FixedSizedString)
                .map_err(|_| Error::TypeParse(s.to_string()));
        }
        if let Some(zone) = wrapped(s, "DateTime") {
            let zone = unquote(zone.trim()).ok_or_else(|| Error::TypeParse(s.to_string()))?;
            let tz = zone
                .parse::<Tz>()
                .map_err(|_| Error::UnsupportedType(format!("unknown timezone in {s}")))?;
            return Ok(Type::DateTime(Some(tz)));
        }
        if let Some(args) = wrapped(s, "Decimal") {
            let (p, sc) = args.split_once(',').ok_or_else(|| Error::TypeParse(s.to_string()))?;
            let precision = parse_u8(p, s)?;
            let scale = parse_u8(sc, s)?;
            return decimal(precision, scale, s);
        }
        for (name, precision) in [("Decimal32", 9), ("Decimal64", 18), ("Decimal128", 38), (
            "Decimal256",
            76,
        )] {
            if let Some(scale) = wrapped(s, name) {
                return decimal(precision, parse_u8(scale, s)?, s);
            }
        }
        if let Some(args) = wrapped(s, "Enum8") {
            return Ok(Type::Enum8(parse_enum(args, s)?));
        }
        if let Some(args) = wrapped(s, "Enum16") {
            return Ok(Type::Enum16(parse_enum(args, s)?));
        }

        Ok(match s {
            "Int8" => Type::Int8,
            "Int16" => Type::Int16,
            "Int32" => Type::Int32,
            "Int64" => Type::Int64,
            "UInt8" => Type::UInt8,
            "UInt16" => Type::UInt16,
            "UInt32" => Type::UInt32,
            "UInt64" => Type::UInt64,
            "Float32" => Type::Float32,
            "Float64" => Type::Float64,
            "Bool" => Type::Bool,
            "String" => Type::String,
            "Date" => Type::Date,
            "DateTime" => Type::DateTime(None),
            "Nothing" => Type::Nothing,
            "" => return Err(Error::TypeParse(s.to_string())),
            other => return Err(Error::UnsupportedType(other.to_string())),
        })
    }
}

/// `Name(args)` -> `args`
fn wrapped<'a>(s: &'a str, name: &str) -> Option<&'a str> {
    s.strip_prefix(name)?.trim_start().strip_prefix('(')?.strip_suffix(')')
}

fn unquote(s: &str) -> Option<&str> { s.strip_prefix('\'')?.strip_suffix('\'') }

fn parse_u8(s: &str, full: &str) -> Result<u8> {
    s.trim().parse::<u8>().map_err(|_| Error::TypeParse(full.to_string()))
}

fn decimal(precision: u8, scale: u8, full: &str) -> Result<Type> {
    if precision == 0 || scale > precision {
        return Err(Error::TypeParse(full.to_string()));
    }
    if precision > MAX_DECIMAL_PRECISION {
        return Err(Error::UnsupportedType(full.to_string()));
    }
    Ok(Type::Decimal { precision, scale })
}

fn parse_enum<T: FromStr>(args: &str, full: &str) -> Result<Vec<(String, T)>> {
    let err = || Error::TypeParse(full.to_string());
    let mut variants = Vec::new();
    let mut chars = args.chars().peekable();
    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.next() != Some('\'') {
            return Err(err());
        }
        let mut label = String::new();
        loop {
            match chars.next().ok_or_else(err)? {
                '\\' => label.push(chars.next().ok_or_else(err)?),
                '\'' => break,
                c => label.push(c),
            }
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.next() != Some('=') {
            return Err(err());
        }
        let number = chars.by_ref().take_while(|c| *c != ',').collect::<String>();
        let value = number.trim().parse::<T>().map_err(|_| err())?;
        variants.push((label, value));
        if chars.peek().is_none() {
            break;
        }
    }
    Ok(variants)
}
