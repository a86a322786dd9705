use strum::AsRefStr;
use tracing::trace;

use super::block::Block;
use super::progress::Progress;
use crate::{Error, Result, ServerError};

pub(crate) const DBMS_MIN_REVISION_WITH_CLIENT_INFO: u64 = 54032;
pub(crate) const DBMS_MIN_REVISION_WITH_SERVER_TIMEZONE: u64 = 54058;
pub(crate) const DBMS_MIN_REVISION_WITH_QUOTA_KEY_IN_CLIENT_INFO: u64 = 54060;
pub(crate) const DBMS_MIN_REVISION_WITH_SERVER_DISPLAY_NAME: u64 = 54372;
pub(crate) const DBMS_MIN_REVISION_WITH_VERSION_PATCH: u64 = 54401;
pub(crate) const DBMS_MIN_REVISION_WITH_SERVER_LOGS: u64 = 54406;
pub(crate) const DBMS_MIN_REVISION_WITH_CLIENT_WRITE_INFO: u64 = 54420;
pub(crate) const DBMS_MIN_REVISION_WITH_SETTINGS_SERIALIZED_AS_STRINGS: u64 = 54429;
pub(crate) const DBMS_MIN_REVISION_WITH_INTERSERVER_SECRET: u64 = 54441;
pub(crate) const DBMS_MIN_REVISION_WITH_OPENTELEMETRY: u64 = 54442;
pub(crate) const DBMS_MIN_PROTOCOL_VERSION_WITH_DISTRIBUTED_DEPTH: u64 = 54448;
pub(crate) const DBMS_MIN_PROTOCOL_VERSION_WITH_QUERY_START_TIME: u64 = 54449;
pub(crate) const DBMS_MIN_PROTOCOL_VERSION_WITH_PARALLEL_REPLICAS: u64 = 54453;
pub(crate) const DBMS_MIN_PROTOCOL_VERSION_WITH_CUSTOM_SERIALIZATION: u64 = 54454;
pub(crate) const DBMS_MIN_PROTOCOL_VERSION_WITH_ADDENDUM: u64 = 54458;
pub(crate) const DBMS_MIN_PROTOCOL_VERSION_WITH_PARAMETERS: u64 = 54459;

pub(crate) const DBMS_TCP_PROTOCOL_VERSION: u64 = DBMS_MIN_PROTOCOL_VERSION_WITH_PARAMETERS;

pub(crate) const MAX_STRING_SIZE: usize = 1 << 30;

#[repr(u64)]
#[derive(Clone, Copy, Debug)]
pub(crate) enum QueryProcessingStage {
    Complete = 2,
}

#[repr(u64)]
#[derive(Clone, Copy, Debug)]
pub(crate) enum ClientPacketId {
    Hello  = 0,
    Query  = 1,
    Data   = 2,
    Cancel = 3,
    Ping   = 4,
}

#[repr(u64)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, AsRefStr)]
pub(crate) enum ServerPacketId {
    Hello                = 0,
    Data                 = 1,
    Exception            = 2,
    Progress             = 3,
    Pong                 = 4,
    EndOfStream          = 5,
    ProfileInfo          = 6,
    Totals               = 7,
    Extremes             = 8,
    TablesStatusResponse = 9,
    Log                  = 10,
    TableColumns         = 11,
    PartUUIDs            = 12,
    ReadTaskRequest      = 13,
    ProfileEvents        = 14,
}

impl ServerPacketId {
    pub(crate) fn from_u64(i: u64) -> Result<Self> {
        Ok(match i {
            0 => ServerPacketId::Hello,
            1 => ServerPacketId::Data,
            2 => ServerPacketId::Exception,
            3 => ServerPacketId::Progress,
            4 => ServerPacketId::Pong,
            5 => ServerPacketId::EndOfStream,
            6 => ServerPacketId::ProfileInfo,
            7 => ServerPacketId::Totals,
            8 => ServerPacketId::Extremes,
            9 => ServerPacketId::TablesStatusResponse,
            10 => ServerPacketId::Log,
            11 => ServerPacketId::TableColumns,
            12 => ServerPacketId::PartUUIDs,
            13 => ServerPacketId::ReadTaskRequest,
            14 => ServerPacketId::ProfileEvents,
            x => return Err(Error::protocol(format!("unknown packet id {x}"))),
        })
    }
}

/// A decoded server packet. Packets the client never acts on keep only what is needed to log them.
#[derive(Debug, AsRefStr)]
pub(crate) enum ServerPacket {
    Hello(ServerHello),
    Data(Block),
    Totals(Block),
    Extremes(Block),
    Log(Block),
    ProfileEvents(Block),
    Exception(ServerError),
    Progress(Progress),
    Pong,
    EndOfStream,
    ProfileInfo(ProfileInfo),
    TableColumns(TableColumns),
}

impl ServerPacket {
    /// Trace a packet the client reads past without acting on it.
    pub(crate) fn trace_skipped(&self) {
        let packet = self.as_ref();
        match self {
            ServerPacket::Totals(block)
            | ServerPacket::Extremes(block)
            | ServerPacket::Log(block)
            | ServerPacket::ProfileEvents(block) => {
                trace!(packet, rows = block.rows, columns = block.columns.len(), "skipping packet");
            }
            ServerPacket::ProfileInfo(info) => trace!(
                packet,
                rows = info.rows,
                blocks = info.blocks,
                bytes = info.bytes,
                applied_limit = info.applied_limit,
                rows_before_limit = info.rows_before_limit,
                calculated_rows_before_limit = info.calculated_rows_before_limit,
                "skipping packet"
            ),
            ServerPacket::TableColumns(columns) => trace!(
                packet,
                table = %columns.name,
                description = %columns.description,
                "skipping packet"
            ),
            _ => trace!(packet, "skipping packet"),
        }
    }
}

pub(crate) struct ClientHello<'a> {
    pub(crate) default_database: &'a str,
    pub(crate) username:         &'a str,
    pub(crate) password:         &'a str,
}

/// Identity of the server negotiated during the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerHello {
    pub server_name:      String,
    pub major_version:    u64,
    pub minor_version:    u64,
    pub patch_version:    u64,
    /// Negotiated revision, the lower of the server's and the client's.
    pub revision_version: u64,
    pub timezone:         Option<String>,
    pub display_name:     Option<String>,
}

impl std::fmt::Display for ServerHello {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}.{}.{} (revision {})",
            self.server_name,
            self.major_version,
            self.minor_version,
            self.patch_version,
            self.revision_version
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ProfileInfo {
    pub(crate) rows:                         u64,
    pub(crate) blocks:                       u64,
    pub(crate) bytes:                        u64,
    pub(crate) applied_limit:                bool,
    pub(crate) rows_before_limit:            u64,
    pub(crate) calculated_rows_before_limit: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct TableColumns {
    pub(crate) name:        String,
    pub(crate) description: String,
}

/// Compression applied to data blocks exchanged with the server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CompressionMethod {
    None,
    #[default]
    LZ4,
    ZSTD,
}

impl CompressionMethod {
    pub(crate) fn byte(self) -> u8 {
        match self {
            CompressionMethod::None => 0x02,
            CompressionMethod::LZ4 => 0x82,
            CompressionMethod::ZSTD => 0x90,
        }
    }

    pub(crate) fn is_enabled(self) -> bool { !matches!(self, CompressionMethod::None) }
}

impl std::fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl AsRef<str> for CompressionMethod {
    fn as_ref(&self) -> &str {
        match self {
            CompressionMethod::None => "None",
            CompressionMethod::LZ4 => "LZ4",
            CompressionMethod::ZSTD => "ZSTD",
        }
    }
}

impl std::str::FromStr for CompressionMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(CompressionMethod::None),
            "lz4" => Ok(CompressionMethod::LZ4),
            "zstd" => Ok(CompressionMethod::ZSTD),
            _ => Err(Error::MalformedConnectionInformation(format!(
                "invalid compression method: {s}"
            ))),
        }
    }
}
