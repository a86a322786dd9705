use tokio::io::AsyncWriteExt;

use super::connection::ConnectionMetadata;
use crate::Result;
use crate::compression::compress_block;
use crate::constants::{CLIENT_NAME, VERSION_MAJOR, VERSION_MINOR};
use crate::io::ClickHouseWrite;
use crate::native::block::Block;
use crate::native::client_info::ClientInfo;
use crate::native::protocol::{
    ClientHello, ClientPacketId, DBMS_MIN_PROTOCOL_VERSION_WITH_ADDENDUM,
    DBMS_MIN_PROTOCOL_VERSION_WITH_PARAMETERS, DBMS_MIN_REVISION_WITH_CLIENT_INFO,
    DBMS_MIN_REVISION_WITH_INTERSERVER_SECRET, DBMS_TCP_PROTOCOL_VERSION, QueryProcessingStage,
};
use crate::prelude::*;
use crate::settings::Settings;

#[derive(Debug)]
pub(super) struct Query<'a> {
    pub(super) qid:      Qid,
    pub(super) info:     &'a ClientInfo,
    pub(super) settings: &'a Settings,
    pub(super) stage:    QueryProcessingStage,
    pub(super) sql:      &'a str,
}

/// Client packets are assembled in memory and written in one go, so a failure while encoding
/// never leaves a partial packet on the wire.
pub(super) struct Writer;

impl Writer {
    pub(super) async fn send_hello<W: ClickHouseWrite>(
        writer: &mut W,
        params: ClientHello<'_>,
    ) -> Result<()> {
        let mut buf = Vec::new();
        buf.write_var_uint(ClientPacketId::Hello as u64).await?;
        buf.write_string(format!("{CLIENT_NAME} {}", env!("CARGO_PKG_VERSION"))).await?;
        buf.write_var_uint(VERSION_MAJOR).await?;
        buf.write_var_uint(VERSION_MINOR).await?;
        buf.write_var_uint(DBMS_TCP_PROTOCOL_VERSION).await?;
        buf.write_string(params.default_database).await?;
        buf.write_string(params.username).await?;
        buf.write_string(params.password).await?;
        flush(writer, &buf).instrument(trace_span!("flush_hello")).await
    }

    pub(super) async fn send_addendum<W: ClickHouseWrite>(writer: &mut W, revision: u64) -> Result<()> {
        if revision >= DBMS_MIN_PROTOCOL_VERSION_WITH_ADDENDUM {
            // quota key
            let mut buf = Vec::new();
            buf.write_string("").await?;
            flush(writer, &buf).await?;
        }
        Ok(())
    }

    pub(super) async fn send_query<W: ClickHouseWrite>(
        writer: &mut W,
        params: Query<'_>,
        metadata: &ConnectionMetadata,
    ) -> Result<()> {
        let revision = metadata.revision;
        let mut buf = Vec::new();

        buf.write_var_uint(ClientPacketId::Query as u64).await?;
        params.qid.write_id(&mut buf).await?;
        if revision >= DBMS_MIN_REVISION_WITH_CLIENT_INFO {
            params.info.write(&mut buf, revision).await?;
        }
        params.settings.encode(&mut buf, revision).await?;
        if revision >= DBMS_MIN_REVISION_WITH_INTERSERVER_SECRET {
            buf.write_string("").await?;
        }
        buf.write_var_uint(params.stage as u64).await?;
        buf.write_u8(u8::from(metadata.compression.is_enabled())).await?;
        buf.write_string(params.sql).await?;
        if revision >= DBMS_MIN_PROTOCOL_VERSION_WITH_PARAMETERS {
            buf.write_string("").await?; // end of params
        }

        flush(writer, &buf)
            .instrument(trace_span!(
                "flush_query",
                { ATT_CID } = metadata.client_id,
                { ATT_QID } = %params.qid,
                { attribute::DB_QUERY_TEXT } = params.sql,
            ))
            .await?;
        trace!({ ATT_QID } = %params.qid, { ATT_CID } = metadata.client_id, "query sent");
        Ok(())
    }

    /// Send a data packet. An empty block marks the end of the client's data.
    pub(super) async fn send_data<W: ClickHouseWrite>(
        writer: &mut W,
        block: &Block,
        qid: Qid,
        metadata: &ConnectionMetadata,
    ) -> Result<()> {
        let mut buf = Vec::new();
        buf.write_var_uint(ClientPacketId::Data as u64).await?;
        buf.write_string("").await?; // table name

        if metadata.compression.is_enabled() {
            let mut raw = Vec::new();
            block.write(&mut raw, metadata.revision).await?;
            buf.extend_from_slice(&compress_block(metadata.compression, &raw)?);
        } else {
            block.write(&mut buf, metadata.revision).await?;
        }

        flush(writer, &buf)
            .instrument(trace_span!("flush_data", { ATT_QID } = %qid, rows = block.rows))
            .await
            .inspect_err(|error| error!(?error, { ATT_QID } = %qid, "send_data"))
    }

    pub(super) async fn send_ping<W: ClickHouseWrite>(writer: &mut W) -> Result<()> {
        writer.write_var_uint(ClientPacketId::Ping as u64).await?;
        writer.flush().instrument(trace_span!("flush_ping")).await?;
        Ok(())
    }

    pub(super) async fn send_cancel<W: ClickHouseWrite>(writer: &mut W) -> Result<()> {
        writer.write_var_uint(ClientPacketId::Cancel as u64).await?;
        writer.flush().instrument(trace_span!("flush_cancel")).await?;
        Ok(())
    }
}

async fn flush<W: ClickHouseWrite>(writer: &mut W, buf: &[u8]) -> Result<()> {
    writer.write_all(buf).await?;
    writer.flush().await?;
    Ok(())
}
