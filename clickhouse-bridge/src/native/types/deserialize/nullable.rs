use tokio::io::AsyncReadExt;

use super::{ClickHouseNativeDeserializer, Deserializer, DeserializerState, Type};
use crate::io::ClickHouseRead;
use crate::native::values::Value;
use crate::{Error, Result};

pub(crate) struct NullableDeserializer;

impl Deserializer for NullableDeserializer {
    async fn read_prefix<R: ClickHouseRead>(
        type_: &Type,
        reader: &mut R,
        state: &mut DeserializerState,
    ) -> Result<()> {
        type_.strip_null().deserialize_prefix_async(reader, state).await
    }

    async fn read<R: ClickHouseRead>(
        type_: &Type,
        reader: &mut R,
        rows: usize,
        state: &mut DeserializerState,
    ) -> Result<Vec<Value>> {
        if !matches!(type_, Type::Nullable(_)) {
            return Err(Error::decode(format!("Expected Nullable type, got {type_}")));
        }

        // mask[i] != 0 marks row i as null
        let mut mask = vec![0u8; rows];
        let _ = reader.read_exact(&mut mask).await?;

        let mut out = type_.strip_null().deserialize_column(reader, rows, state).await?;
        for (value, is_null) in out.iter_mut().zip(mask) {
            if is_null != 0 {
                *value = Value::Null;
            }
        }
        Ok(out)
    }
}
