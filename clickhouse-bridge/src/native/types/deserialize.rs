pub(crate) mod low_cardinality;
pub(crate) mod nullable;
pub(crate) mod sized;
pub(crate) mod string;

use chrono_tz::Tz;
use futures_util::FutureExt;

use super::Type;
use crate::io::ClickHouseRead;
use crate::native::values::Value;
use crate::{Error, Result};

/// Context carried through the decoding of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DeserializerState {
    /// Zone applied to `DateTime` columns that do not declare their own.
    pub(crate) timezone: Tz,
}

impl Default for DeserializerState {
    fn default() -> Self { DeserializerState { timezone: Tz::UTC } }
}

pub(crate) trait Deserializer {
    async fn read_prefix<R: ClickHouseRead>(
        _type_: &Type,
        _reader: &mut R,
        _state: &mut DeserializerState,
    ) -> Result<()> {
        Ok(())
    }

    async fn read<R: ClickHouseRead>(
        type_: &Type,
        reader: &mut R,
        rows: usize,
        state: &mut DeserializerState,
    ) -> Result<Vec<Value>>;
}

pub(crate) trait ClickHouseNativeDeserializer {
    fn deserialize_prefix_async<'a, R: ClickHouseRead>(
        &'a self,
        reader: &'a mut R,
        state: &'a mut DeserializerState,
    ) -> impl Future<Output = Result<()>> + Send + 'a;

    fn deserialize_column<'a, R: ClickHouseRead>(
        &'a self,
        reader: &'a mut R,
        rows: usize,
        state: &'a mut DeserializerState,
    ) -> impl Future<Output = Result<Vec<Value>>> + Send + 'a;
}

impl ClickHouseNativeDeserializer for Type {
    fn deserialize_prefix_async<'a, R: ClickHouseRead>(
        &'a self,
        reader: &'a mut R,
        state: &'a mut DeserializerState,
    ) -> impl Future<Output = Result<()>> + Send + 'a {
        async move {
            match self {
                Type::Nullable(_) => {
                    nullable::NullableDeserializer::read_prefix(self, reader, state).await
                }
                Type::LowCardinality(_) => {
                    low_cardinality::LowCardinalityDeserializer::read_prefix(self, reader, state)
                        .await
                }
                _ => Ok(()),
            }
        }
        .boxed()
    }

    fn deserialize_column<'a, R: ClickHouseRead>(
        &'a self,
        reader: &'a mut R,
        rows: usize,
        state: &'a mut DeserializerState,
    ) -> impl Future<Output = Result<Vec<Value>>> + Send + 'a {
        async move {
            if rows == 0 {
                return Ok(vec![]);
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
                | Type::Enum16(_) => sized::SizedDeserializer::read(self, reader, rows, state).await,
                Type::String | Type::FixedSizedString(_) => {
                    string::StringDeserializer::read(self, reader, rows, state).await
                }
                Type::Nullable(_) => {
                    nullable::NullableDeserializer::read(self, reader, rows, state).await
                }
                Type::LowCardinality(_) => {
                    low_cardinality::LowCardinalityDeserializer::read(self, reader, rows, state)
                        .await
                }
                // A `Nothing` column carries one placeholder byte per row.
                Type::Nothing => {
                    for _ in 0..rows {
                        let _ = tokio::io::AsyncReadExt::read_u8(reader).await?;
                    }
                    Ok(vec![Value::Null; rows])
                }
            }
        }
        .boxed()
    }
}

/// Decode a single value of `type_` from its native column encoding.
pub async fn decode_value(type_: &Type, bytes: &[u8]) -> Result<Value> {
    let mut reader = std::io::Cursor::new(bytes);
    let mut state = DeserializerState::default();
    type_.deserialize_prefix_async(&mut reader, &mut state).await?;
    let mut values = type_.deserialize_column(&mut reader, 1, &mut state).await?;
    if usize::try_from(reader.position()).ok() != Some(bytes.len()) {
        return Err(Error::decode(format!("trailing bytes after {type_} value")));
    }
    values.pop().ok_or_else(|| Error::decode(format!("no {type_} value decoded")))
}
