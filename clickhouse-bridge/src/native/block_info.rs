use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::io::{ClickHouseRead, ClickHouseWrite};
use crate::{Error, Result};

/// Metadata about a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockInfo {
    pub(crate) is_overflows: bool,
    pub(crate) bucket_num:   i32,
}

impl Default for BlockInfo {
    fn default() -> Self { BlockInfo { is_overflows: false, bucket_num: -1 } }
}

impl BlockInfo {
    pub(crate) async fn read<R: ClickHouseRead>(reader: &mut R) -> Result<Self> {
        let mut new = Self::default();
        loop {
            match reader.read_var_uint().await? {
                0 => break,
                1 => new.is_overflows = reader.read_u8().await? != 0,
                2 => new.bucket_num = reader.read_i32_le().await?,
                field_num => {
                    return Err(Error::protocol(format!(
                        "unknown block info field number: {field_num}"
                    )));
                }
            }
        }
        Ok(new)
    }

    pub(crate) async fn write<W: ClickHouseWrite>(&self, writer: &mut W) -> Result<()> {
        writer.write_var_uint(1).await?;
        writer.write_u8(u8::from(self.is_overflows)).await?;
        writer.write_var_uint(2).await?;
        writer.write_i32_le(self.bucket_num).await?;
        writer.write_var_uint(0).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[tokio::test]
    async fn test_block_info_wire_format() {
        let mut buf = Vec::new();
        BlockInfo::default().write(&mut buf).await.unwrap();
        assert_eq!(buf, vec![1, 0, 2, 0xFF, 0xFF, 0xFF, 0xFF, 0]);

        let info = BlockInfo::read(&mut Cursor::new(buf)).await.unwrap();
        assert_eq!(info, BlockInfo::default());
    }

    #[tokio::test]
    async fn test_unknown_field_rejected() {
        let result = BlockInfo::read(&mut Cursor::new(vec![7u8, 0])).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }
}
