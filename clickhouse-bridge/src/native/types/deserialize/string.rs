use tokio::io::AsyncReadExt;

use super::{Deserializer, DeserializerState, Type};
use crate::io::ClickHouseRead;
use crate::native::values::Value;
use crate::{Error, Result};

pub(crate) struct StringDeserializer;

impl Deserializer for StringDeserializer {
    async fn read<R: ClickHouseRead>(
        type_: &Type,
        reader: &mut R,
        rows: usize,
        _state: &mut DeserializerState,
    ) -> Result<Vec<Value>> {
        let mut out = Vec::with_capacity(rows);
        match type_ {
            Type::String => {
                for _ in 0..rows {
                    out.push(Value::String(reader.read_string().await?));
                }
            }
            // Kept as stored, zero padding included. Trimming is a presentation choice.
            Type::FixedSizedString(n) => {
                for _ in 0..rows {
                    let mut buf = vec![0u8; *n];
                    let _ = reader.read_exact(&mut buf[..]).await?;
                    out.push(Value::FixedString(buf));
                }
            }
            _ => {
                return Err(Error::decode(format!(
                    "StringDeserializer called with non-string type: {type_}"
                )));
            }
        }
        Ok(out)
    }
}
