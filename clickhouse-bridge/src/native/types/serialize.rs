pub(crate) mod nullable;
pub(crate) mod sized;
pub(crate) mod string;

use futures_util::FutureExt;

use super::Type;
use crate::io::ClickHouseWrite;
use crate::native::values::Value;
use crate::{Error, Result};

/// Writes one column of already coerced values. See [`Value::coerce_to`].
pub(crate) trait Serializer {
    async fn write_prefix<W: ClickHouseWrite>(_type_: &Type, _writer: &mut W) -> Result<()> {
        Ok(())
    }

    async fn write<W: ClickHouseWrite>(type_: &Type, values: &[Value], writer: &mut W)
    -> Result<()>;
}

pub(crate) trait ClickHouseNativeSerializer {
    fn serialize_prefix_async<'a, W: ClickHouseWrite>(
        &'a self,
        writer: &'a mut W,
    ) -> impl Future<Output = Result<()>> + Send + 'a;

    fn serialize_column<'a, W: ClickHouseWrite>(
        &'a self,
        values: &'a [Value],
        writer: &'a mut W,
    ) -> impl Future<Output = Result<()>> + Send + 'a;
}

impl ClickHouseNativeSerializer for Type {
    fn serialize_prefix_async<'a, W: ClickHouseWrite>(
        &'a self,
        writer: &'a mut W,
    ) -> impl Future<Output = Result<()>> + Send + 'a {
        async move {
            match self {
                Type::Nullable(_) => nullable::NullableSerializer::write_prefix(self, writer).await,
                _ => Ok(()),
            }
        }
        .boxed()
    }

    fn serialize_column<'a, W: ClickHouseWrite>(
        &'a self,
        values: &'a [Value],
        writer: &'a mut W,
    ) -> impl Future<Output = Result<()>> + Send + 'a {
        async move {
            if values.is_empty() {
                return Ok(());
            }
            match self {
                Type::Int8
                | Type::Int16
                | Type::Int32
                | Type::Int64
                | Type::UInt8
                | Type::UInt16
                | Type::UInt32
                | Type::UInt64
                | Type::Float32
                | Type::Float64
                | Type::Bool
                | Type::Date
                | Type::DateTime(_)
                | Type::Decimal { .. }
                | Type::Enum8(_)
                | Type::Enum16(_) => sized::SizedSerializer::write(self, values, writer).await,
                Type::String | Type::FixedSizedString(_) => {
                    string::StringSerializer::write(self, values, writer).await
                }
                Type::Nullable(_) => nullable::NullableSerializer::write(self, values, writer).await,
                Type::Nothing => {
                    let placeholders = vec![0u8; values.len()];
                    tokio::io::AsyncWriteExt::write_all(writer, &placeholders).await?;
                    Ok(())
                }
                Type::LowCardinality(_) => {
                    Err(Error::encode(format!("inserting into {self} columns is not supported")))
                }
            }
        }
        .boxed()
    }
}

/// Encode a single value as a one-row column of `type_`, coercing it first.
pub async fn encode_value(type_: &Type, value: Value) -> Result<Vec<u8>> {
    let value = value.coerce_to(type_)?;
    let mut out = Vec::new();
    type_.serialize_prefix_async(&mut out).await?;
    type_.serialize_column(std::slice::from_ref(&value), &mut out).await?;
    Ok(out)
}
