use tokio::io::AsyncReadExt;

use super::connection::ConnectionMetadata;
use crate::compression::{DecompressingReader, surface};
use crate::io::ClickHouseRead;
use crate::native::block::Block;
use crate::native::progress::Progress;
use crate::native::protocol::{
    DBMS_MIN_REVISION_WITH_SERVER_DISPLAY_NAME, DBMS_MIN_REVISION_WITH_SERVER_TIMEZONE,
    DBMS_MIN_REVISION_WITH_VERSION_PATCH, DBMS_TCP_PROTOCOL_VERSION, ProfileInfo, ServerHello,
    ServerPacket, ServerPacketId, TableColumns,
};
use crate::native::types::deserialize::DeserializerState;
use crate::prelude::*;
use crate::{Error, Result, ServerError};

// Bounds the nested exception chain of a single packet
const MAX_NESTED_EXCEPTIONS: usize = 64;

pub(super) struct Reader;

impl Reader {
    /// Read the body of a server `Hello`, negotiating the revision down to ours.
    pub(super) async fn read_hello<R: ClickHouseRead>(reader: &mut R, cid: u16) -> Result<ServerHello> {
        let server_name = reader.read_utf8_string().await?;
        let major_version = reader.read_var_uint().await?;
        let minor_version = reader.read_var_uint().await?;
        let revision_version = reader.read_var_uint().await?.min(DBMS_TCP_PROTOCOL_VERSION);

        let timezone = if revision_version >= DBMS_MIN_REVISION_WITH_SERVER_TIMEZONE {
            Some(reader.read_utf8_string().await?)
        } else {
            None
        };
        let display_name = if revision_version >= DBMS_MIN_REVISION_WITH_SERVER_DISPLAY_NAME {
            Some(reader.read_utf8_string().await?)
        } else {
            None
        };
        let patch_version = if revision_version >= DBMS_MIN_REVISION_WITH_VERSION_PATCH {
            reader.read_var_uint().await?
        } else {
            revision_version
        };

        trace!(
            server_name,
            version = format!("{major_version}.{minor_version}.{patch_version}"),
            revision = revision_version,
            { ATT_CID } = cid,
            "Received server hello",
        );

        Ok(ServerHello {
            server_name,
            major_version,
            minor_version,
            patch_version,
            revision_version,
            timezone,
            display_name,
        })
    }

    /// Read an exception and its nested causes.
    pub(super) async fn read_exception<R: ClickHouseRead>(reader: &mut R) -> Result<ServerError> {
        let mut chain = Vec::new();
        loop {
            let code = reader.read_i32_le().await?;
            let name = reader.read_utf8_string().await?;
            let message = String::from_utf8_lossy(&reader.read_string().await?).to_string();
            let stack_trace = String::from_utf8_lossy(&reader.read_string().await?).to_string();
            let has_nested = reader.read_u8().await? != 0;
            chain.push(ServerError { code, name, message, stack_trace, nested: None });
            if !has_nested {
                break;
            }
            if chain.len() >= MAX_NESTED_EXCEPTIONS {
                return Err(Error::protocol("exception nesting too deep"));
            }
        }

        let mut exception = chain.pop().ok_or_else(|| Error::protocol("empty exception"))?;
        while let Some(mut outer) = chain.pop() {
            outer.nested = Some(Box::new(exception));
            exception = outer;
        }
        Ok(exception)
    }

    async fn read_profile_info<R: ClickHouseRead>(reader: &mut R) -> Result<ProfileInfo> {
        Ok(ProfileInfo {
            rows:                         reader.read_var_uint().await?,
            blocks:                       reader.read_var_uint().await?,
            bytes:                        reader.read_var_uint().await?,
            applied_limit:                reader.read_u8().await? != 0,
            rows_before_limit:            reader.read_var_uint().await?,
            calculated_rows_before_limit: reader.read_u8().await? != 0,
        })
    }

    async fn read_table_columns<R: ClickHouseRead>(reader: &mut R) -> Result<TableColumns> {
        Ok(TableColumns {
            name:        reader.read_utf8_string().await?,
            description: reader.read_utf8_string().await?,
        })
    }

    /// Read the table name and block of a data packet, decompressing when `compressed`.
    pub(super) async fn read_data<R: ClickHouseRead>(
        reader: &mut R,
        metadata: &ConnectionMetadata,
        compressed: bool,
    ) -> Result<Block> {
        drop(reader.read_string().await?);
        let mut state = DeserializerState { timezone: metadata.timezone };
        let revision = metadata.revision;

        let block = if compressed && metadata.compression.is_enabled() {
            let mut decompressed = DecompressingReader::new(metadata.compression, reader);
            Block::read(&mut decompressed, revision, &mut state).await.map_err(surface)
        } else {
            Block::read(reader, revision, &mut state).await
        };
        block.inspect_err(|error| {
            error!(?error, { ATT_CID } = metadata.client_id, "Block read fail");
        })
    }

    /// Read the packet id from the reader
    pub(super) async fn read_packet<R: ClickHouseRead>(reader: &mut R) -> Result<ServerPacketId> {
        ServerPacketId::from_u64(reader.read_var_uint().await?)
            .inspect(|id| trace!({ ATT_PID } = id.as_ref(), "Reading packet ID"))
            .inspect_err(|error| error!(?error, "Failed to read packet ID"))
    }

    /// Receive any packet from the server
    pub(super) async fn receive_packet<R: ClickHouseRead>(
        reader: &mut R,
        metadata: &ConnectionMetadata,
    ) -> Result<ServerPacket> {
        let packet = Self::read_packet(reader).await?;
        match packet {
            ServerPacketId::Hello => {
                Self::read_hello(reader, metadata.client_id).await.map(ServerPacket::Hello)
            }
            ServerPacketId::Data => Self::read_data(reader, metadata, true).await.map(ServerPacket::Data),
            ServerPacketId::Totals => {
                Self::read_data(reader, metadata, true).await.map(ServerPacket::Totals)
            }
            ServerPacketId::Extremes => {
                Self::read_data(reader, metadata, true).await.map(ServerPacket::Extremes)
            }
            ServerPacketId::Log => {
                Self::read_data(reader, metadata, false).await.map(ServerPacket::Log)
            }
            ServerPacketId::ProfileEvents => {
                Self::read_data(reader, metadata, false).await.map(ServerPacket::ProfileEvents)
            }
            ServerPacketId::Exception => {
                Self::read_exception(reader).await.map(ServerPacket::Exception)
            }
            ServerPacketId::Progress => {
                Progress::read(reader, metadata.revision).await.map(ServerPacket::Progress)
            }
            ServerPacketId::Pong => Ok(ServerPacket::Pong),
            ServerPacketId::EndOfStream => Ok(ServerPacket::EndOfStream),
            ServerPacketId::ProfileInfo => {
                Self::read_profile_info(reader).await.map(ServerPacket::ProfileInfo)
            }
            ServerPacketId::TableColumns => {
                Self::read_table_columns(reader).await.map(ServerPacket::TableColumns)
            }
            packet @ (ServerPacketId::TablesStatusResponse
            | ServerPacketId::PartUUIDs
            | ServerPacketId::ReadTaskRequest) => {
                error!({ ATT_CID } = metadata.client_id, packet = packet.as_ref(), "Unexpected packet");
                Err(Error::protocol(format!("unexpected packet {}", packet.as_ref())))
            }
        }
    }
}
