use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono_tz::Tz;
use parking_lot::{Mutex, RwLock};
use strum::Display;
use tokio::io::{AsyncWriteExt, BufStream};
use tokio::sync::OwnedMutexGuard;

use super::reader::Reader;
use super::result::ResultSet;
use super::tcp::{Destination, Transport, connect_socket, tls_stream};
use super::writer::{Query, Writer};
use crate::batch::InsertBatch;
use crate::native::block::Block;
use crate::native::client_info::ClientInfo;
use crate::native::progress::Progress;
use crate::native::protocol::{
    ClientHello, CompressionMethod, QueryProcessingStage, ServerHello, ServerPacket,
    ServerPacketId,
};
use crate::prelude::*;
use crate::query::is_insert;
use crate::settings::Settings;
use crate::{ClientOptions, Error, QueryError, Result};

/// The status of the underlying connection to `ClickHouse`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ConnectionStatus {
    /// No usable transport: closed, never connected, or lost after a transport failure.
    Disconnected,
    /// Idle and ready for the next query.
    Connected,
    /// A query, insert or ping is running, or a result set is still being read.
    QueryInFlight,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnectionMetadata {
    pub(crate) client_id:   u16,
    pub(crate) revision:    u64,
    pub(crate) compression: CompressionMethod,
    pub(crate) timezone:    Tz,
    pub(crate) trim_fixed:  bool,
}

pub(crate) type Stream = BufStream<Box<dyn Transport>>;

/// Exclusive access to the wire. Held by one operation, or by a live [`ResultSet`].
pub(crate) struct Session {
    stream:              Option<Stream>,
    pub(crate) metadata: ConnectionMetadata,
    /// A result stream was abandoned before its end and must be drained before reuse
    pub(crate) dirty:    bool,
}

impl Session {
    fn stream(&mut self) -> Result<&mut Stream> { self.stream.as_mut().ok_or(Error::Disconnected) }

    pub(crate) async fn next_packet(&mut self) -> Result<ServerPacket> {
        let stream = self.stream.as_mut().ok_or(Error::Disconnected)?;
        Reader::receive_packet(stream, &self.metadata).await
    }

    /// Send a query followed by the empty block that ends the (absent) external tables.
    async fn send_query(
        &mut self,
        qid: Qid,
        sql: &str,
        settings: &Settings,
        info: &ClientInfo,
    ) -> Result<()> {
        let metadata = self.metadata;
        let stream = self.stream()?;
        let query = Query { qid, info, settings, stage: QueryProcessingStage::Complete, sql };
        Writer::send_query(stream, query, &metadata).await?;
        Writer::send_data(stream, &Block::empty(), qid, &metadata).await
    }

    async fn send_block(&mut self, block: &Block, qid: Qid) -> Result<()> {
        let metadata = self.metadata;
        Writer::send_data(self.stream()?, block, qid, &metadata).await
    }

    /// Read until the end of the current query, skipping informational packets.
    async fn wait_end(&mut self) -> Result<Progress> {
        let mut progress = Progress::default();
        loop {
            match self.next_packet().await? {
                ServerPacket::EndOfStream => return Ok(progress),
                ServerPacket::Exception(exception) => return Err(exception.into()),
                ServerPacket::Progress(delta) => progress += delta,
                packet => packet.trace_skipped(),
            }
        }
    }

    /// Cancel and read past a result stream that was dropped before its end.
    async fn drain(&mut self) -> Result<()> {
        let cid = self.metadata.client_id;
        warn!({ ATT_CID } = cid, "Draining abandoned result stream");
        Writer::send_cancel(self.stream()?).await?;
        let skipped = match self.wait_end().await {
            Ok(progress) => progress.read_rows,
            Err(Error::Server(exception)) => {
                debug!({ ATT_CID } = cid, %exception, "Abandoned query ended with an exception");
                0
            }
            Err(error) => return Err(error),
        };
        self.dirty = false;
        trace!({ ATT_CID } = cid, skipped, "Drained abandoned result stream");
        Ok(())
    }

    /// Drop the transport when `error` leaves the stream position unknown.
    pub(crate) fn fail(&mut self, error: Error) -> Error {
        if error.is_fatal() && self.stream.is_some() {
            error!(?error, { ATT_CID } = self.metadata.client_id, "Connection lost");
            self.stream = None;
        }
        error
    }

    pub(crate) fn disconnect(&mut self) { self.stream = None; }
}

/// State shared between the connection and the result sets it hands out.
#[derive(Debug)]
pub(crate) struct Shared {
    status:     RwLock<ConnectionStatus>,
    closed:     AtomicBool,
    last_error: Mutex<Option<QueryError>>,
}

impl Shared {
    fn new() -> Self {
        Shared {
            status:     RwLock::new(ConnectionStatus::Connected),
            closed:     AtomicBool::new(false),
            last_error: Mutex::new(None),
        }
    }

    pub(crate) fn status(&self) -> ConnectionStatus { *self.status.read() }

    fn set_status(&self, status: ConnectionStatus) { *self.status.write() = status; }

    pub(crate) fn is_closed(&self) -> bool { self.closed.load(Ordering::Acquire) }

    pub(crate) fn last_error(&self) -> Option<QueryError> { self.last_error.lock().clone() }

    pub(crate) fn clear_error(&self) { *self.last_error.lock() = None; }

    pub(crate) fn record(&self, error: &Error) {
        *self.last_error.lock() = Some(QueryError::from(error));
    }

    /// Hand the session back: the status follows whether the transport survived.
    pub(crate) fn release(&self, session: &mut Session) {
        if self.is_closed() {
            session.disconnect();
        }
        let status = if session.stream.is_some() {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        };
        self.set_status(status);
    }
}

/// A single native protocol connection. At most one operation runs on it at a time.
pub(crate) struct Connection {
    client_id:   u16,
    destination: Option<Destination>,
    options:     Arc<ClientOptions>,
    info:        ClientInfo,
    server:      RwLock<ServerHello>,
    session:     Arc<tokio::sync::Mutex<Session>>,
    shared:      Arc<Shared>,
}

impl Connection {
    #[instrument(
        level = "trace",
        name = "clickhouse.connection.create",
        skip_all,
        fields(
            clickhouse.client.id = client_id,
            db.system = "clickhouse",
            db.operation = "connect",
            network.transport = if options.use_tls { "tls" } else { "tcp" },
        ),
        err
    )]
    pub(crate) async fn connect(
        client_id: u16,
        destination: Destination,
        options: ClientOptions,
    ) -> Result<Self> {
        let (stream, hello) = Self::open(client_id, &destination, &options).await?;
        Ok(Self::new(client_id, Some(destination), options, stream, hello))
    }

    /// Run the handshake over an already established transport.
    #[cfg(test)]
    pub(crate) async fn connect_transport(
        client_id: u16,
        transport: Box<dyn Transport>,
        options: ClientOptions,
    ) -> Result<Self> {
        let mut stream = BufStream::new(transport);
        let hello = Self::handshake(&mut stream, client_id, &options).await?;
        Ok(Self::new(client_id, None, options, stream, hello))
    }

    fn new(
        client_id: u16,
        destination: Option<Destination>,
        options: ClientOptions,
        stream: Stream,
        hello: ServerHello,
    ) -> Self {
        let metadata = ConnectionMetadata {
            client_id,
            revision: hello.revision_version,
            compression: options.compression,
            timezone: options.timezone(),
            trim_fixed: options.trim_fixed_strings,
        };
        let session = Session { stream: Some(stream), metadata, dirty: false };
        Connection {
            client_id,
            destination,
            options: Arc::new(options),
            info: ClientInfo::default(),
            server: RwLock::new(hello),
            session: Arc::new(tokio::sync::Mutex::new(session)),
            shared: Arc::new(Shared::new()),
        }
    }

    async fn open(
        client_id: u16,
        destination: &Destination,
        options: &ClientOptions,
    ) -> Result<(Stream, ServerHello)> {
        let addrs = destination.resolve(options.ipv4_only).await?;
        let timeout = options.connect_timeout;

        let transport: Box<dyn Transport> = if options.use_tls {
            let domain = options.domain.clone().unwrap_or_else(|| destination.domain());
            debug!(%domain, { ATT_CID } = client_id, "Initiating TLS connection");
            let stream = connect_socket(&addrs, timeout).await?;
            Box::new(tls_stream(domain, options.cafile.as_deref(), stream).await?)
        } else {
            debug!(?addrs, { ATT_CID } = client_id, "Initiating TCP connection");
            Box::new(connect_socket(&addrs, timeout).await?)
        };

        let mut stream = BufStream::new(transport);
        let hello = tokio::time::timeout(timeout, Self::handshake(&mut stream, client_id, options))
            .await
            .map_err(|_| Error::ConnectTimeout(timeout))??;
        Ok((stream, hello))
    }

    async fn handshake(
        stream: &mut Stream,
        client_id: u16,
        options: &ClientOptions,
    ) -> Result<ServerHello> {
        Writer::send_hello(stream, ClientHello {
            default_database: &options.default_database,
            username:         &options.username,
            password:         options.password.get(),
        })
        .await
        .inspect_err(|error| error!(?error, { ATT_CID } = client_id, "Failed to send hello"))?;

        let hello = match Reader::read_packet(stream).await? {
            ServerPacketId::Hello => Reader::read_hello(stream, client_id).await?,
            // Authentication failures and unknown databases are reported here
            ServerPacketId::Exception => {
                let exception = Reader::read_exception(stream).await?;
                return Err(Error::Connection(format!("handshake rejected: {exception}")));
            }
            packet => {
                return Err(Error::protocol(format!(
                    "unexpected packet {}, expected server hello",
                    packet.as_ref()
                )));
            }
        };

        Writer::send_addendum(stream, hello.revision_version).await?;
        debug!({ ATT_CID } = client_id, server = %hello, "Finished handshake");
        Ok(hello)
    }

    pub(crate) fn options(&self) -> &ClientOptions { &self.options }

    pub(crate) fn shared(&self) -> &Shared { &self.shared }

    pub(crate) fn status(&self) -> ConnectionStatus { self.shared.status() }

    pub(crate) fn server_info(&self) -> ServerHello { self.server.read().clone() }

    /// Take the session for one operation, failing fast instead of waiting on another.
    async fn acquire(&self) -> Result<OwnedMutexGuard<Session>> {
        if self.shared.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        let mut session =
            Arc::clone(&self.session).try_lock_owned().map_err(|_| Error::QueryInFlight)?;
        if session.stream.is_none() {
            return Err(Error::Disconnected);
        }
        if session.dirty {
            if let Err(error) = session.drain().await {
                let error = session.fail(error);
                self.shared.release(&mut session);
                return Err(error);
            }
        }
        self.shared.set_status(ConnectionStatus::QueryInFlight);
        Ok(session)
    }

    /// Release the session after an operation, dropping the transport on fatal errors.
    fn finish<T>(&self, mut session: OwnedMutexGuard<Session>, result: Result<T>) -> Result<T> {
        let result = result.map_err(|error| session.fail(error));
        self.shared.release(&mut session);
        result
    }

    fn settings(&self, extra: Option<&Settings>) -> Settings {
        let mut settings = self.options.settings.clone();
        if let Some(extra) = extra {
            settings.0.extend(extra.iter().cloned());
        }
        settings
    }

    #[instrument(
        level = "trace",
        name = "clickhouse.query",
        skip_all,
        fields(
            clickhouse.client.id = self.client_id,
            clickhouse.query.id,
            db.query.text = sql,
        ),
        err
    )]
    pub(crate) async fn query(&self, sql: &str, settings: Option<&Settings>) -> Result<ResultSet> {
        let mut session = self.acquire().await?;
        let qid = Qid::new();
        let _ = Span::current().record(ATT_QID, tracing::field::display(qid));

        let settings = self.settings(settings);
        let started = self.start_query(&mut session, qid, sql, &settings).await;
        match started {
            Ok((Some(header), progress)) => {
                Ok(ResultSet::new(qid, header, progress, session, Arc::clone(&self.shared)))
            }
            Ok((None, progress)) => {
                self.shared.release(&mut session);
                Ok(ResultSet::finished(qid, progress, Arc::clone(&self.shared)))
            }
            Err(error) => self.finish(session, Err(error)),
        }
    }

    /// Send the query and read up to the header block, or to the end for statements without
    /// a result.
    async fn start_query(
        &self,
        session: &mut Session,
        qid: Qid,
        sql: &str,
        settings: &Settings,
    ) -> Result<(Option<Block>, Progress)> {
        debug!({ ATT_QID } = %qid, "sending query");
        session.send_query(qid, sql, settings, &self.info).await?;

        let insert = is_insert(sql);
        let mut progress = Progress::default();
        loop {
            match session.next_packet().await? {
                ServerPacket::Data(block) if insert => {
                    // Rows of an inline insert travel in the query text, end the data right away
                    trace!({ ATT_QID } = %qid, columns = block.columns.len(), "insert header");
                    session.send_block(&Block::empty(), qid).await?;
                    progress += session.wait_end().await?;
                    return Ok((None, progress));
                }
                ServerPacket::Data(block) => return Ok((Some(block), progress)),
                ServerPacket::EndOfStream => return Ok((None, progress)),
                ServerPacket::Exception(exception) => return Err(exception.into()),
                ServerPacket::Progress(delta) => progress += delta,
                packet @ (ServerPacket::Hello(_) | ServerPacket::Pong) => {
                    error!({ ATT_QID } = %qid, packet = packet.as_ref(), "Unexpected packet");
                    return Err(Error::protocol(format!(
                        "unexpected {} while waiting for a query header",
                        packet.as_ref()
                    )));
                }
                packet => packet.trace_skipped(),
            }
        }
    }

    #[instrument(
        level = "trace",
        name = "clickhouse.insert",
        skip_all,
        fields(clickhouse.client.id = self.client_id, clickhouse.query.id, db.collection.name = table),
        err
    )]
    pub(crate) async fn insert(
        &self,
        table: &str,
        batch: InsertBatch,
        settings: Option<&Settings>,
    ) -> Result<u64> {
        let mut session = self.acquire().await?;
        let qid = Qid::new();
        let _ = Span::current().record(ATT_QID, tracing::field::display(qid));

        let settings = self.settings(settings);
        let result = self.run_insert(&mut session, qid, table, batch, &settings).await;
        self.finish(session, result)
    }

    async fn run_insert(
        &self,
        session: &mut Session,
        qid: Qid,
        table: &str,
        batch: InsertBatch,
        settings: &Settings,
    ) -> Result<u64> {
        let rows = batch.len() as u64;
        let sql = batch.statement(table);
        debug!({ ATT_QID } = %qid, rows, "sending insert");
        session.send_query(qid, &sql, settings, &self.info).await?;

        let header = loop {
            match session.next_packet().await? {
                ServerPacket::Data(block) => break block.schema(),
                ServerPacket::Exception(exception) => return Err(exception.into()),
                ServerPacket::EndOfStream => {
                    return Err(Error::protocol("insert ended before the server sent a header"));
                }
                packet => packet.trace_skipped(),
            }
        };

        let timezone = session.metadata.timezone;
        let sent = match batch.encode(&header, timezone) {
            Ok(block) => session.send_block(&block, qid).await,
            Err(error) => Err(error),
        };
        if let Err(error) = sent {
            if error.is_fatal() {
                return Err(error);
            }
            // Nothing was written, close the insert empty so the connection stays in sync
            warn!(?error, { ATT_QID } = %qid, "Insert rejected before sending data");
            session.send_block(&Block::empty(), qid).await?;
            let _ = session.wait_end().await?;
            return Err(error);
        }

        session.send_block(&Block::empty(), qid).await?;
        let progress = session.wait_end().await?;
        trace!({ ATT_QID } = %qid, %progress, "insert complete");
        Ok(rows)
    }

    #[instrument(level = "trace", name = "clickhouse.ping", skip_all, fields(clickhouse.client.id = self.client_id), err)]
    pub(crate) async fn ping(&self) -> Result<()> {
        let mut session = self.acquire().await?;
        let result = async {
            Writer::send_ping(session.stream()?).await?;
            loop {
                match session.next_packet().await? {
                    ServerPacket::Pong => return Ok(()),
                    ServerPacket::Progress(_) | ServerPacket::Log(_) => {}
                    packet => {
                        return Err(Error::protocol(format!(
                            "unexpected {} while waiting for pong",
                            packet.as_ref()
                        )));
                    }
                }
            }
        }
        .await;
        self.finish(session, result)
    }

    /// Replace the transport with a fresh connection and handshake.
    #[instrument(level = "trace", name = "clickhouse.reconnect", skip_all, fields(clickhouse.client.id = self.client_id), err)]
    pub(crate) async fn reconnect(&self) -> Result<()> {
        let destination =
            self.destination.as_ref().ok_or(Error::MissingConnectionInformation)?;
        let mut session = self.session.try_lock().map_err(|_| Error::QueryInFlight)?;
        if let Some(mut stream) = session.stream.take() {
            if let Err(error) = stream.shutdown().await {
                debug!(?error, { ATT_CID } = self.client_id, "Shutdown before reconnect failed");
            }
        }
        self.shared.set_status(ConnectionStatus::Disconnected);

        let (stream, hello) = Self::open(self.client_id, destination, &self.options).await?;
        session.stream = Some(stream);
        session.dirty = false;
        session.metadata.revision = hello.revision_version;
        *self.server.write() = hello;

        self.shared.closed.store(false, Ordering::Release);
        self.shared.set_status(ConnectionStatus::Connected);
        info!({ ATT_CID } = self.client_id, "Reconnected");
        Ok(())
    }

    /// Close the connection. A live result set gives up the transport on its next read.
    pub(crate) async fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.set_status(ConnectionStatus::Disconnected);
        if let Ok(mut session) = self.session.try_lock() {
            if let Some(mut stream) = session.stream.take() {
                if let Err(error) = stream.shutdown().await {
                    debug!(?error, { ATT_CID } = self.client_id, "Shutdown on close failed");
                }
            }
        }
        debug!({ ATT_CID } = self.client_id, "Connection closed");
    }
}
