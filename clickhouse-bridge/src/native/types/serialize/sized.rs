use tokio::io::AsyncWriteExt;

use super::{Serializer, Type};
use crate::io::ClickHouseWrite;
use crate::native::values::{Value, date};
use crate::{Error, Result};

pub(crate) struct SizedSerializer;

impl Serializer for SizedSerializer {
    async fn write<W: ClickHouseWrite>(
        type_: &Type,
        values: &[Value],
        writer: &mut W,
    ) -> Result<()> {
        for value in values {
            match (type_, value) {
                (Type::Int8, Value::Int8(x)) | (Type::Enum8(_), Value::Enum8(_, x)) => {
                    writer.write_i8(*x).await?;
                }
                (Type::Int16, Value::Int16(x)) | (Type::Enum16(_), Value::Enum16(_, x)) => {
                    writer.write_i16_le(*x).await?;
                }
                (Type::Int32, Value::Int32(x)) => writer.write_i32_le(*x).await?,
                (Type::Int64, Value::Int64(x)) => writer.write_i64_le(*x).await?,
                (Type::UInt8, Value::UInt8(x)) => writer.write_u8(*x).await?,
                (Type::UInt16, Value::UInt16(x)) => writer.write_u16_le(*x).await?,
                (Type::UInt32, Value::UInt32(x)) => writer.write_u32_le(*x).await?,
                (Type::UInt64, Value::UInt64(x)) => writer.write_u64_le(*x).await?,
                (Type::Float32, Value::Float32(x)) => writer.write_u32_le(x.to_bits()).await?,
                (Type::Float64, Value::Float64(x)) => writer.write_u64_le(x.to_bits()).await?,
                (Type::Bool, Value::Bool(x)) => writer.write_u8(u8::from(*x)).await?,
                (Type::Date, Value::Date(x)) => writer.write_u16_le(date::days_from_date(*x)?).await?,
                (Type::DateTime(_), Value::DateTime(x)) => {
                    writer.write_u32_le(date::secs_from_datetime(x)?).await?;
                }
                (Type::Decimal { precision, scale }, Value::Decimal(x)) => {
                    let mantissa = x.rescale(*precision, *scale)?.mantissa();
                    let out_of_range = || Error::encode(format!("{x} does not fit {type_}"));
                    match Type::decimal_width(*precision) {
                        4 => writer
                            .write_i32_le(i32::try_from(mantissa).map_err(|_| out_of_range())?)
                            .await?,
                        8 => writer
                            .write_i64_le(i64::try_from(mantissa).map_err(|_| out_of_range())?)
                            .await?,
                        _ => writer.write_i128_le(mantissa).await?,
                    }
                }
                _ => {
                    return Err(Error::encode(format!(
                        "SizedSerializer unimplemented: {type_} for value = {value:?}",
                    )));
                }
            }
        }
        Ok(())
    }
}
