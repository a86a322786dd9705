use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::native::protocol::MAX_STRING_SIZE;
use crate::{Error, Result};

/// An extension trait on [`AsyncRead`] providing `ClickHouse` specific functionality.
pub(crate) trait ClickHouseRead: AsyncRead + Unpin + Send + Sync {
    fn read_var_uint(&mut self) -> impl Future<Output = Result<u64>> + Send + '_;

    fn read_string(&mut self) -> impl Future<Output = Result<Vec<u8>>> + Send + '_;

    fn read_utf8_string(&mut self) -> impl Future<Output = Result<String>> + Send + '_ {
        async { Ok(String::from_utf8(self.read_string().await?)?) }
    }

    /// Read a varuint that is about to be used as a length or count.
    fn read_len(&mut self) -> impl Future<Output = Result<usize>> + Send + '_ {
        async {
            let len = self.read_var_uint().await?;
            usize::try_from(len)
                .ok()
                .filter(|len| *len <= MAX_STRING_SIZE)
                .ok_or_else(|| Error::protocol(format!("length too large: {len}")))
        }
    }
}

impl<T: AsyncRead + Unpin + Send + Sync> ClickHouseRead for T {
    async fn read_var_uint(&mut self) -> Result<u64> {
        let mut out = 0u64;
        for i in 0..10u64 {
            let octet = self.read_u8().await?;
            out |= u64::from(octet & 0x7F) << (7 * i);
            if (octet & 0x80) == 0 {
                return Ok(out);
            }
        }
        Err(Error::protocol("varuint longer than 10 bytes"))
    }

    async fn read_string(&mut self) -> Result<Vec<u8>> {
        let len = self.read_len().await?;
        let mut buf = vec![0u8; len];
        if len > 0 {
            let _ = self.read_exact(&mut buf).await?;
        }
        Ok(buf)
    }
}

/// An extension trait on [`AsyncWrite`] providing `ClickHouse` specific functionality.
pub(crate) trait ClickHouseWrite: AsyncWrite + Unpin + Send + Sync {
    fn write_var_uint(&mut self, value: u64) -> impl Future<Output = Result<()>> + Send + '_;

    fn write_string<V: AsRef<[u8]> + Send>(
        &mut self,
        value: V,
    ) -> impl Future<Output = Result<()>> + Send + use<'_, Self, V>;
}

impl<T: AsyncWrite + Unpin + Send + Sync> ClickHouseWrite for T {
    async fn write_var_uint(&mut self, mut value: u64) -> Result<()> {
        let mut buf = [0u8; 10];
        let mut pos = 0;
        loop {
            #[expect(clippy::cast_possible_truncation)]
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value > 0 {
                byte |= 0x80;
            }
            buf[pos] = byte;
            pos += 1;
            if value == 0 {
                break;
            }
        }
        self.write_all(&buf[..pos]).await?;
        Ok(())
    }

    async fn write_string<V: AsRef<[u8]> + Send>(&mut self, value: V) -> Result<()> {
        let value = value.as_ref();
        self.write_var_uint(value.len() as u64).await?;
        self.write_all(value).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[tokio::test]
    async fn test_var_uint_boundaries() {
        for value in [0, 1, 127, 128, 300, 16_384, u64::from(u32::MAX), u64::MAX] {
            let mut buf = Vec::new();
            buf.write_var_uint(value).await.unwrap();
            let mut reader = Cursor::new(buf);
            assert_eq!(reader.read_var_uint().await.unwrap(), value);
        }
    }

    #[tokio::test]
    async fn test_var_uint_known_encoding() {
        let mut buf = Vec::new();
        buf.write_var_uint(300).await.unwrap();
        assert_eq!(buf, vec![0xAC, 0x02]);
    }

    #[tokio::test]
    async fn test_string_roundtrip() {
        let mut buf = Vec::new();
        buf.write_string("clickhouse").await.unwrap();
        buf.write_string("").await.unwrap();
        let mut reader = Cursor::new(buf);
        assert_eq!(reader.read_utf8_string().await.unwrap(), "clickhouse");
        assert_eq!(reader.read_utf8_string().await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_truncated_string_errors() {
        let mut buf = Vec::new();
        buf.write_var_uint(10).await.unwrap();
        buf.extend_from_slice(b"short");
        let mut reader = Cursor::new(buf);
        assert!(matches!(reader.read_string().await, Err(Error::Io(_))));
    }
}
