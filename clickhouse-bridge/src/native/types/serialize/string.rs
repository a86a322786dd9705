use tokio::io::AsyncWriteExt;

use super::{Serializer, Type};
use crate::io::ClickHouseWrite;
use crate::native::values::Value;
use crate::{Error, Result};

pub(crate) struct StringSerializer;

impl Serializer for StringSerializer {
    async fn write<W: ClickHouseWrite>(
        type_: &Type,
        values: &[Value],
        writer: &mut W,
    ) -> Result<()> {
        for value in values {
            match (type_, value) {
                (Type::String, Value::String(bytes)) => writer.write_string(bytes).await?,
                (Type::FixedSizedString(n), Value::FixedString(bytes)) => {
                    if bytes.len() > *n {
                        return Err(Error::encode(format!(
                            "{} bytes do not fit {type_}",
                            bytes.len()
                        )));
                    }
                    writer.write_all(bytes).await?;
                    if bytes.len() < *n {
                        writer.write_all(&vec![0u8; *n - bytes.len()]).await?;
                    }
                }
                _ => {
                    return Err(Error::encode(format!(
                        "StringSerializer unimplemented: {type_} for value = {value:?}",
                    )));
                }
            }
        }
        Ok(())
    }
}
