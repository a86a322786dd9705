use chrono::NaiveTime;
use chrono_tz::Tz;

use super::date::{self, datetime_from_timestamp, localize};
use super::{Decimal, Value};
use crate::native::types::{MAX_DECIMAL_PRECISION, Type};
use crate::{Error, Result};

impl Value {
    /// Convert this value into the canonical variant for a column of `type_`, with UTC as the
    /// zone for `DateTime` columns that do not declare one.
    ///
    /// # Errors
    ///
    /// Returns an encode error when the value cannot be represented in the column: out of range
    /// integers, strings longer than a `FixedString`, decimals that would lose digits, `NULL` for
    /// a column that is not `Nullable`, and unrelated variants.
    pub fn coerce_to(self, type_: &Type) -> Result<Value> { self.coerce_to_tz(type_, Tz::UTC) }

    /// Like [`Value::coerce_to`], with `tz` applied to `DateTime` columns without their own zone.
    ///
    /// # Errors
    ///
    /// See [`Value::coerce_to`].
    pub fn coerce_to_tz(self, type_: &Type, tz: Tz) -> Result<Value> {
        let mismatch = |value: &Value| {
            Error::encode(format!("cannot convert {} value '{value}' to {type_}", value.as_ref()))
        };

        match type_ {
            Type::Nullable(inner) => {
                if self.is_null() {
                    Ok(Value::Null)
                } else {
                    self.coerce_to_tz(inner, tz)
                }
            }
            Type::LowCardinality(inner) => self.coerce_to_tz(inner, tz),
            _ if self.is_null() => {
                Err(Error::encode(format!("NULL is not allowed for non-Nullable column {type_}")))
            }
            Type::Nothing => Err(mismatch(&self)),

            Type::Int8 => integer(&self, type_).map(Value::Int8),
            Type::Int16 => integer(&self, type_).map(Value::Int16),
            Type::Int32 => integer(&self, type_).map(Value::Int32),
            Type::Int64 => integer(&self, type_).map(Value::Int64),
            Type::UInt8 => integer(&self, type_).map(Value::UInt8),
            Type::UInt16 => integer(&self, type_).map(Value::UInt16),
            Type::UInt32 => integer(&self, type_).map(Value::UInt32),
            Type::UInt64 => integer(&self, type_).map(Value::UInt64),

            Type::Float32 => {
                let x = float(&self).ok_or_else(|| mismatch(&self))?;
                narrow(x).map(Value::Float32).ok_or_else(|| {
                    Error::encode(format!("value {x} is out of range for {type_}"))
                })
            }
            Type::Float64 => float(&self).map(Value::Float64).ok_or_else(|| mismatch(&self)),

            Type::Bool => match &self {
                Value::Bool(x) => Ok(Value::Bool(*x)),
                Value::String(_) => match self.as_str().map(|s| s.trim().to_ascii_lowercase()) {
                    Some(s) if s == "true" || s == "1" => Ok(Value::Bool(true)),
                    Some(s) if s == "false" || s == "0" => Ok(Value::Bool(false)),
                    _ => Err(mismatch(&self)),
                },
                _ => match self.as_i64() {
                    Some(0) => Ok(Value::Bool(false)),
                    Some(1) => Ok(Value::Bool(true)),
                    _ => Err(mismatch(&self)),
                },
            },

            Type::String => match self {
                Value::String(bytes) | Value::FixedString(bytes) => Ok(Value::String(bytes)),
                other => Err(mismatch(&other)),
            },
            Type::FixedSizedString(n) => match self {
                Value::String(mut bytes) | Value::FixedString(mut bytes) => {
                    if bytes.len() > *n {
                        return Err(Error::encode(format!(
                            "{} bytes do not fit {type_}",
                            bytes.len()
                        )));
                    }
                    bytes.resize(*n, 0);
                    Ok(Value::FixedString(bytes))
                }
                other => Err(mismatch(&other)),
            },

            Type::Date => {
                let date = match &self {
                    Value::Date(d) => *d,
                    Value::DateTime(dt) => dt.date_naive(),
                    Value::String(_) => {
                        date::parse_date(self.as_str().ok_or_else(|| mismatch(&self))?)?
                    }
                    _ => {
                        let days = integer::<u16>(&self, type_)?;
                        date::date_from_days(days)
                    }
                };
                let _ = date::days_from_date(date)?;
                Ok(Value::Date(date))
            }
            Type::DateTime(zone) => {
                let zone = zone.unwrap_or(tz);
                let datetime = match &self {
                    Value::DateTime(dt) => dt.with_timezone(&zone),
                    Value::Date(d) => localize(d.and_time(NaiveTime::default()), zone)?,
                    Value::String(_) => {
                        date::parse_datetime(self.as_str().ok_or_else(|| mismatch(&self))?, zone)?
                    }
                    _ => {
                        let secs = integer::<i64>(&self, type_)?;
                        datetime_from_timestamp(secs, zone)?
                    }
                };
                let _ = date::secs_from_datetime(&datetime)?;
                Ok(Value::DateTime(datetime))
            }

            Type::Decimal { precision, scale } => {
                let decimal = match &self {
                    Value::Decimal(d) => *d,
                    Value::String(_) => {
                        self.as_str().ok_or_else(|| mismatch(&self))?.parse::<Decimal>()?
                    }
                    // Shortest round-trip rendering in the source width, never in exponent form.
                    Value::Float32(x) if x.is_finite() => x.to_string().parse::<Decimal>()?,
                    Value::Float64(x) if x.is_finite() => x.to_string().parse::<Decimal>()?,
                    Value::Float32(_) | Value::Float64(_) => return Err(mismatch(&self)),
                    _ => {
                        let x = integer::<i128>(&self, type_)?;
                        Decimal::from_raw(x, MAX_DECIMAL_PRECISION, 0)
                    }
                };
                decimal.rescale(*precision, *scale).map(Value::Decimal)
            }

            Type::Enum8(variants) => {
                let (label, code) = enum_member(&self, variants, type_)?;
                Ok(Value::Enum8(label, code))
            }
            Type::Enum16(variants) => {
                let (label, code) = enum_member(&self, variants, type_)?;
                Ok(Value::Enum16(label, code))
            }
        }
    }
}

/// Integral value of `value` as `T`, range checked.
fn integer<T: TryFrom<i128>>(value: &Value, type_: &Type) -> Result<T> {
    let wide = match value {
        Value::Bool(x) => Some(i128::from(*x)),
        Value::UInt64(x) => Some(i128::from(*x)),
        Value::Float32(_) | Value::Float64(_) => float(value)
            .filter(|x| x.is_finite() && x.fract() == 0.0 && x.abs() < 1e38)
            .map(truncate),
        Value::String(_) => value.as_str().and_then(|s| s.trim().parse::<i128>().ok()),
        Value::Decimal(d) => d.rescale(MAX_DECIMAL_PRECISION, 0).ok().map(|d| d.mantissa()),
        Value::Enum8(..) | Value::Enum16(..) => None,
        other => other.as_i64().map(i128::from),
    };
    let wide = wide.ok_or_else(|| {
        Error::encode(format!("cannot convert {} value '{value}' to {type_}", value.as_ref()))
    })?;
    T::try_from(wide).map_err(|_| Error::encode(format!("value {wide} is out of range for {type_}")))
}

/// `None` when a finite `x` overflows `f32`.
#[expect(clippy::cast_possible_truncation)]
fn narrow(x: f64) -> Option<f32> {
    let narrowed = x as f32;
    (narrowed.is_finite() || !x.is_finite()).then_some(narrowed)
}

#[expect(clippy::cast_possible_truncation)]
fn truncate(x: f64) -> i128 { x as i128 }

#[expect(clippy::cast_precision_loss)]
fn float(value: &Value) -> Option<f64> {
    match value {
        Value::Float32(x) => Some(f64::from(*x)),
        Value::Float64(x) => Some(*x),
        Value::UInt64(x) => Some(*x as f64),
        Value::String(_) => value.as_str().and_then(|s| s.trim().parse::<f64>().ok()),
        Value::Decimal(d) => Some(d.to_f64()),
        Value::Bool(_) | Value::Enum8(..) | Value::Enum16(..) => None,
        other => other.as_i64().map(|x| x as f64),
    }
}

fn enum_member<T>(value: &Value, variants: &[(String, T)], type_: &Type) -> Result<(String, T)>
where
    T: Copy + PartialEq + TryFrom<i64>,
{
    let found = match value {
        Value::String(_) | Value::Enum8(..) | Value::Enum16(..) => {
            value.as_str().and_then(|label| variants.iter().find(|(l, _)| l == label))
        }
        _ => value
            .as_i64()
            .and_then(|code| T::try_from(code).ok())
            .and_then(|code| variants.iter().find(|(_, c)| *c == code)),
    };
    found
        .map(|(label, code)| (label.clone(), *code))
        .ok_or_else(|| Error::encode(format!("'{value}' is not a member of {type_}")))
}
