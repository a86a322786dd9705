use tokio::io::AsyncReadExt;

use super::{Deserializer, DeserializerState, Type};
use crate::io::ClickHouseRead;
use crate::native::values::{Decimal, Value, date};
use crate::{Error, Result};

/// Fixed width little-endian values: numbers, dates, decimals and enums.
pub(crate) struct SizedDeserializer;

impl Deserializer for SizedDeserializer {
    async fn read<R: ClickHouseRead>(
        type_: &Type,
        reader: &mut R,
        rows: usize,
        state: &mut DeserializerState,
    ) -> Result<Vec<Value>> {
        let mut out = Vec::with_capacity(rows);
        for _ in 0..rows {
            out.push(match type_ {
                Type::Int8 => Value::Int8(reader.read_i8().await?),
                Type::Int16 => Value::Int16(reader.read_i16_le().await?),
                Type::Int32 => Value::Int32(reader.read_i32_le().await?),
                Type::Int64 => Value::Int64(reader.read_i64_le().await?),
                Type::UInt8 => Value::UInt8(reader.read_u8().await?),
                Type::UInt16 => Value::UInt16(reader.read_u16_le().await?),
                Type::UInt32 => Value::UInt32(reader.read_u32_le().await?),
                Type::UInt64 => Value::UInt64(reader.read_u64_le().await?),
                Type::Float32 => Value::Float32(f32::from_bits(reader.read_u32_le().await?)),
                Type::Float64 => Value::Float64(f64::from_bits(reader.read_u64_le().await?)),
                Type::Bool => Value::Bool(reader.read_u8().await? != 0),
                Type::Date => Value::Date(date::date_from_days(reader.read_u16_le().await?)),
                Type::DateTime(zone) => {
                    let secs = reader.read_u32_le().await?;
                    Value::DateTime(date::datetime_from_secs(secs, zone.unwrap_or(state.timezone)))
                }
                Type::Decimal { precision, scale } => {
                    let mantissa = match Type::decimal_width(*precision) {
                        4 => i128::from(reader.read_i32_le().await?),
                        8 => i128::from(reader.read_i64_le().await?),
                        _ => reader.read_i128_le().await?,
                    };
                    Value::Decimal(Decimal::from_raw(mantissa, *precision, *scale))
                }
                Type::Enum8(variants) => {
                    let code = reader.read_i8().await?;
                    Value::Enum8(enum_label(type_, variants, code)?, code)
                }
                Type::Enum16(variants) => {
                    let code = reader.read_i16_le().await?;
                    Value::Enum16(enum_label(type_, variants, code)?, code)
                }
                _ => {
                    return Err(Error::decode(format!(
                        "SizedDeserializer called with non-sized type: {type_}"
                    )));
                }
            });
        }
        Ok(out)
    }
}

fn enum_label<T: PartialEq + std::fmt::Display>(
    type_: &Type,
    variants: &[(String, T)],
    code: T,
) -> Result<String> {
    variants
        .iter()
        .find(|(_, v)| *v == code)
        .map(|(label, _)| label.clone())
        .ok_or_else(|| Error::decode(format!("value {code} is not a member of {type_}")))
}
