use tokio::io::AsyncWriteExt;

use super::{ClickHouseNativeSerializer, Serializer, Type};
use crate::io::ClickHouseWrite;
use crate::native::values::Value;
use crate::{Error, Result};

pub(crate) struct NullableSerializer;

impl Serializer for NullableSerializer {
    async fn write_prefix<W: ClickHouseWrite>(type_: &Type, writer: &mut W) -> Result<()> {
        type_.strip_null().serialize_prefix_async(writer).await
    }

    async fn write<W: ClickHouseWrite>(
        type_: &Type,
        values: &[Value],
        writer: &mut W,
    ) -> Result<()> {
        let Type::Nullable(inner) = type_ else {
            return Err(Error::encode(format!(
                "NullableSerializer called with non-nullable type: {type_}"
            )));
        };

        let mask = values.iter().map(|value| u8::from(value.is_null())).collect::<Vec<u8>>();
        writer.write_all(&mask).await?;

        // Null rows still occupy a slot in the inner column.
        let default = inner.default_value(chrono_tz::Tz::UTC);
        let filled = values
            .iter()
            .map(|value| if value.is_null() { default.clone() } else { value.clone() })
            .collect::<Vec<_>>();
        inner.serialize_column(&filled, writer).await
    }
}
