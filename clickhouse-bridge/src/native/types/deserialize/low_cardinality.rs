use tokio::io::AsyncReadExt;

use super::{ClickHouseNativeDeserializer, Deserializer, DeserializerState, Type};
use crate::io::ClickHouseRead;
use crate::native::values::Value;
use crate::{Error, Result};

// Dictionary keys serialization version `SharedDictionariesWithAdditionalKeys`.
pub(crate) const LOW_CARDINALITY_VERSION: u64 = 1;

pub(crate) const NEED_GLOBAL_DICTIONARY_BIT: u64 = 1 << 8;
pub(crate) const HAS_ADDITIONAL_KEYS_BIT: u64 = 1 << 9;

pub(crate) const TUINT8: u64 = 0;
pub(crate) const TUINT16: u64 = 1;
pub(crate) const TUINT32: u64 = 2;
pub(crate) const TUINT64: u64 = 3;

/// Dictionary encoded columns. Each granule carries its own dictionary followed by one index per
/// row. For nullable inner types, index 0 stands for null.
pub(crate) struct LowCardinalityDeserializer;

impl Deserializer for LowCardinalityDeserializer {
    async fn read_prefix<R: ClickHouseRead>(
        _type_: &Type,
        reader: &mut R,
        _state: &mut DeserializerState,
    ) -> Result<()> {
        let version = reader.read_u64_le().await?;
        if version != LOW_CARDINALITY_VERSION {
            return Err(Error::decode(format!("unsupported LowCardinality version {version}")));
        }
        Ok(())
    }

    async fn read<R: ClickHouseRead>(
        type_: &Type,
        reader: &mut R,
        rows: usize,
        state: &mut DeserializerState,
    ) -> Result<Vec<Value>> {
        let Type::LowCardinality(inner) = type_ else {
            return Err(Error::decode(format!("Expected LowCardinality type, got {type_}")));
        };
        let nullable = inner.is_nullable();
        let dictionary_type = inner.strip_null();

        let flags = reader.read_u64_le().await?;
        if flags & NEED_GLOBAL_DICTIONARY_BIT != 0 {
            return Err(Error::decode("LowCardinality global dictionaries are not supported"));
        }
        if flags & HAS_ADDITIONAL_KEYS_BIT == 0 {
            return Err(Error::decode("LowCardinality column is missing its dictionary"));
        }

        let dictionary_size = read_count(reader).await?;
        let dictionary =
            dictionary_type.deserialize_column(reader, dictionary_size, state).await?;

        let indexed_rows = read_count(reader).await?;
        if indexed_rows != rows {
            return Err(Error::decode(format!(
                "LowCardinality row count mismatch: expected {rows}, got {indexed_rows}"
            )));
        }

        let mut out = Vec::with_capacity(rows);
        for _ in 0..rows {
            let index = match flags & 0xFF {
                TUINT8 => u64::from(reader.read_u8().await?),
                TUINT16 => u64::from(reader.read_u16_le().await?),
                TUINT32 => u64::from(reader.read_u32_le().await?),
                TUINT64 => reader.read_u64_le().await?,
                key => return Err(Error::decode(format!("invalid LowCardinality key type {key}"))),
            };
            if nullable && index == 0 {
                out.push(Value::Null);
                continue;
            }
            let value = usize::try_from(index)
                .ok()
                .and_then(|i| dictionary.get(i))
                .ok_or_else(|| Error::decode(format!("LowCardinality index {index} out of range")))?;
            out.push(value.clone());
        }
        Ok(out)
    }
}

async fn read_count<R: ClickHouseRead>(reader: &mut R) -> Result<usize> {
    let count = reader.read_u64_le().await?;
    usize::try_from(count)
        .ok()
        .filter(|c| *c <= crate::native::protocol::MAX_STRING_SIZE)
        .ok_or_else(|| Error::decode(format!("LowCardinality count too large: {count}")))
}
