use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::block_info::BlockInfo;
use super::protocol::DBMS_MIN_PROTOCOL_VERSION_WITH_CUSTOM_SERIALIZATION;
use super::types::Type;
use super::types::deserialize::{ClickHouseNativeDeserializer, DeserializerState};
use super::types::serialize::ClickHouseNativeSerializer;
use super::values::Value;
use crate::io::{ClickHouseRead, ClickHouseWrite};
use crate::{Error, Result};

/// One column of a block: its name, declared type and decoded values.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BlockColumn {
    pub(crate) name:   String,
    pub(crate) type_:  Type,
    pub(crate) values: Vec<Value>,
}

/// A chunk of column-oriented data, the unit exchanged in `Data` packets.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Block {
    pub(crate) info:    BlockInfo,
    pub(crate) rows:    usize,
    pub(crate) columns: Vec<BlockColumn>,
}

impl Block {
    /// A block without columns or rows, sent to mark the end of client data.
    pub(crate) fn empty() -> Self { Block::default() }

    pub(crate) fn is_empty(&self) -> bool { self.rows == 0 }

    /// Column names and types, in order.
    pub(crate) fn schema(&self) -> Vec<(String, Type)> {
        self.columns.iter().map(|c| (c.name.clone(), c.type_.clone())).collect()
    }

    pub(crate) async fn read<R: ClickHouseRead>(
        reader: &mut R,
        revision: u64,
        state: &mut DeserializerState,
    ) -> Result<Self> {
        let info = BlockInfo::read(reader).await?;
        let column_count = reader.read_len().await?;
        let rows = reader.read_len().await?;

        let mut columns = Vec::with_capacity(column_count);
        for _ in 0..column_count {
            let name = reader.read_utf8_string().await?;
            let type_name = reader.read_utf8_string().await?;
            let type_ = type_name.parse::<Type>()?;

            if revision >= DBMS_MIN_PROTOCOL_VERSION_WITH_CUSTOM_SERIALIZATION {
                let has_custom = reader.read_u8().await?;
                if has_custom != 0 {
                    return Err(Error::decode(format!(
                        "column '{name}' uses a custom serialization, which is not supported"
                    )));
                }
            }

            // Zero rows are encoded as zero bytes, prefixes included.
            let values = if rows > 0 {
                type_.deserialize_prefix_async(reader, state).await?;
                type_.deserialize_column(reader, rows, state).await?
            } else {
                vec![]
            };
            columns.push(BlockColumn { name, type_, values });
        }

        tracing::trace!(rows, columns = columns.len(), "read block");
        Ok(Block { info, rows, columns })
    }

    pub(crate) async fn write<W: ClickHouseWrite>(&self, writer: &mut W, revision: u64) -> Result<()> {
        self.info.write(writer).await?;
        writer.write_var_uint(self.columns.len() as u64).await?;
        writer.write_var_uint(self.rows as u64).await?;

        for column in &self.columns {
            if column.values.len() != self.rows {
                return Err(Error::encode(format!(
                    "column '{}' has {} values, block has {} rows",
                    column.name,
                    column.values.len(),
                    self.rows
                )));
            }
            writer.write_string(&column.name).await?;
            writer.write_string(column.type_.to_string()).await?;
            if revision >= DBMS_MIN_PROTOCOL_VERSION_WITH_CUSTOM_SERIALIZATION {
                writer.write_u8(0).await?;
            }
            if self.rows > 0 {
                column.type_.serialize_prefix_async(writer).await?;
                column.type_.serialize_column(&column.values, writer).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::native::protocol::DBMS_TCP_PROTOCOL_VERSION;

    fn sample() -> Block {
        Block {
            info:    BlockInfo::default(),
            rows:    2,
            columns: vec![
                BlockColumn {
                    name:   "id".into(),
                    type_:  Type::UInt64,
                    values: vec![Value::UInt64(1), Value::UInt64(u64::MAX)],
                },
                BlockColumn {
                    name:   "note".into(),
                    type_:  Type::Nullable(Box::new(Type::String)),
                    values: vec![Value::Null, Value::string("x")],
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_block_roundtrip() {
        let block = sample();
        let mut buf = Vec::new();
        block.write(&mut buf, DBMS_TCP_PROTOCOL_VERSION).await.unwrap();

        let mut state = DeserializerState::default();
        let read = Block::read(&mut Cursor::new(buf), DBMS_TCP_PROTOCOL_VERSION, &mut state)
            .await
            .unwrap();
        assert_eq!(read, block);
        assert_eq!(read.schema(), vec![
            ("id".to_string(), Type::UInt64),
            ("note".to_string(), Type::Nullable(Box::new(Type::String)))
        ]);
    }

    #[tokio::test]
    async fn test_empty_block_layout() {
        let mut buf = Vec::new();
        Block::empty().write(&mut buf, DBMS_TCP_PROTOCOL_VERSION).await.unwrap();
        assert_eq!(buf, vec![1, 0, 2, 0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_header_block_has_no_data() {
        let mut header = sample();
        header.rows = 0;
        for column in &mut header.columns {
            column.values.clear();
        }
        let mut buf = Vec::new();
        header.write(&mut buf, DBMS_TCP_PROTOCOL_VERSION).await.unwrap();

        let mut state = DeserializerState::default();
        let mut reader = Cursor::new(buf);
        let read = Block::read(&mut reader, DBMS_TCP_PROTOCOL_VERSION, &mut state).await.unwrap();
        assert!(read.is_empty());
        assert_eq!(read.schema(), header.schema());
        assert_eq!(reader.position() as usize, reader.get_ref().len());
    }

    #[tokio::test]
    async fn test_custom_serialization_is_rejected() {
        let mut buf = Vec::new();
        BlockInfo::default().write(&mut buf).await.unwrap();
        buf.write_var_uint(1).await.unwrap();
        buf.write_var_uint(1).await.unwrap();
        buf.write_string("x").await.unwrap();
        buf.write_string("UInt8").await.unwrap();
        buf.write_u8(1).await.unwrap();
        buf.write_u8(7).await.unwrap();

        let mut state = DeserializerState::default();
        let err = Block::read(&mut Cursor::new(buf), DBMS_TCP_PROTOCOL_VERSION, &mut state).await;
        assert!(matches!(err, Err(Error::Decode(_))));
    }

    #[tokio::test]
    async fn test_unknown_type_is_named() {
        let mut buf = Vec::new();
        BlockInfo::default().write(&mut buf).await.unwrap();
        buf.write_var_uint(1).await.unwrap();
        buf.write_var_uint(0).await.unwrap();
        buf.write_string("ids").await.unwrap();
        buf.write_string("Array(UInt8)").await.unwrap();
        buf.write_u8(0).await.unwrap();

        let mut state = DeserializerState::default();
        let err = Block::read(&mut Cursor::new(buf), DBMS_TCP_PROTOCOL_VERSION, &mut state).await;
        assert!(matches!(err, Err(Error::UnsupportedType(t)) if t == "Array(UInt8)"));
    }

    #[tokio::test]
    async fn test_mismatched_column_length_fails() {
        let mut block = sample();
        block.rows = 3;
        let mut buf = Vec::new();
        assert!(block.write(&mut buf, DBMS_TCP_PROTOCOL_VERSION).await.is_err());
    }
}
