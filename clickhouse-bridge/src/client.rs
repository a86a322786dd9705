//! The `client` module provides the primary interface for interacting with `ClickHouse` over its
//! native protocol. The main entry point is the [`Client`] struct.
//!
//! A [`Client`] wraps exactly one connection. At most one operation runs on it at a time: a live
//! [`ResultSet`] keeps the connection busy until it is exhausted or dropped, and any other call
//! made meanwhile fails fast with [`Error::QueryInFlight`]. Use one client per concurrent task.
mod builder;
pub(crate) mod connection;
mod options;
mod reader;
mod result;
mod tcp;
mod writer;


use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

pub use self::builder::*;
pub use self::connection::ConnectionStatus;
pub use self::options::*;
pub use self::result::{ResultSet, ResultState};
pub use self::tcp::Destination;
use crate::batch::{InsertBatch, InsertRow};
use crate::constants::{DEFAULT_DATABASE, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_USER};
use crate::native::protocol::{CompressionMethod, ServerHello};
use crate::prelude::*;
use crate::{QueryError, Result};

static CLIENT_ID: AtomicU16 = AtomicU16::new(0);

/// A handle for interacting with a `ClickHouse` database over its native protocol.
///
/// Cloning a `Client` is cheap; clones share the same underlying connection and its last-error
/// slot.
///
/// # Usage
/// Create a `Client` using the [`ClientBuilder`] for a fluent configuration experience, or use
/// [`Client::connect`] for the common host, credentials and database case.
///
/// # Examples
/// ```rust,ignore
/// use clickhouse_bridge::prelude::*;
///
/// let client = Client::builder()
///     .with_endpoint("localhost:9000")
///     .with_username("default")
///     .build()
///     .await?;
///
/// let mut result = client.query("SELECT number FROM system.numbers LIMIT 3").await?;
/// while let Some(row) = result.next_row().await? {
///     println!("{row}");
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    pub client_id: u16,
    conn:          Arc<connection::Connection>,
}

impl Client {
    /// Get an instance of [`ClientBuilder`] which allows creating a `Client` using a builder
    pub fn builder() -> ClientBuilder { ClientBuilder::new() }

    /// Connects to `ClickHouse` with plain credentials.
    ///
    /// Empty strings fall back to `127.0.0.1`, the `default` user and the `default` database,
    /// and port 0 falls back to 9000.
    ///
    /// # Errors
    /// Fails if the host cannot be resolved, the connection times out, or the server rejects the
    /// handshake (e.g. bad credentials or an unknown database).
    ///
    /// # Examples
    /// ```rust,ignore
    /// use clickhouse_bridge::prelude::*;
    ///
    /// let client = Client::connect("localhost", "default", "", "default", 9000).await?;
    /// ```
    pub async fn connect(
        host: &str,
        user: &str,
        password: &str,
        database: &str,
        port: u16,
    ) -> Result<Self> {
        let or = |value: &str, default: &str| {
            if value.is_empty() { default.to_string() } else { value.to_string() }
        };
        let port = if port == 0 { DEFAULT_PORT } else { port };
        let options = ClientOptions {
            username: or(user, DEFAULT_USER),
            password: Secret::new(password),
            default_database: or(database, DEFAULT_DATABASE),
            ..ClientOptions::default()
        };
        Self::connect_with(Destination::from((or(host, DEFAULT_HOST), port)), options).await
    }

    /// Connects to `destination` using the provided options.
    ///
    /// # Errors
    /// See [`Client::connect`].
    #[instrument(
        level = "trace",
        name = "clickhouse.connect",
        fields(
            db.system = "clickhouse",
            network.transport = if options.use_tls { "tls" } else { "tcp" },
        ),
        skip_all
    )]
    pub async fn connect_with<A: Into<Destination>>(
        destination: A,
        options: ClientOptions,
    ) -> Result<Self> {
        let client_id = CLIENT_ID.fetch_add(1, Ordering::Relaxed);
        let conn = connection::Connection::connect(client_id, destination.into(), options).await?;
        debug!({ ATT_CID } = client_id, "created connection successfully");
        Ok(Client { client_id, conn: Arc::new(conn) })
    }

    /// Retrieves the status of the underlying `ClickHouse` connection.
    pub fn status(&self) -> ConnectionStatus { self.conn.status() }

    /// Server identity received during the handshake.
    pub fn server_info(&self) -> ServerHello { self.conn.server_info() }

    pub fn options(&self) -> &ClientOptions { self.conn.options() }

    /// Executes a query and returns its rows as a [`ResultSet`].
    ///
    /// The result's schema is available as soon as this returns. Statements without a result,
    /// such as DDL, return an exhausted result with an empty schema.
    ///
    /// # Errors
    /// - [`Error::QueryInFlight`] if another result set on this client is still live.
    /// - [`Error::Server`] if `ClickHouse` raises an exception. The connection stays usable.
    /// - Connection errors, after which the client reports [`ConnectionStatus::Disconnected`].
    ///
    /// # Examples
    /// ```rust,ignore
    /// use clickhouse_bridge::prelude::*;
    ///
    /// let mut result = client.query("SELECT toUInt64(1) AS id, 'a' AS name").await?;
    /// assert_eq!(result.schema()[0].0, "id");
    /// let rows = result.fetch_all(FetchMode::Assoc).await?;
    /// ```
    pub async fn query(&self, query: impl AsRef<str>) -> Result<ResultSet> {
        self.tracked(self.conn.query(query.as_ref(), None)).await
    }

    /// Like [`Client::query`], with settings applied to this query only, after the client's own.
    ///
    /// # Errors
    /// See [`Client::query`].
    pub async fn query_with_settings(
        &self,
        query: impl AsRef<str>,
        settings: &Settings,
    ) -> Result<ResultSet> {
        self.tracked(self.conn.query(query.as_ref(), Some(settings))).await
    }

    /// Executes a statement and discards any rows it returns.
    ///
    /// # Errors
    /// See [`Client::query`].
    pub async fn execute(&self, query: impl AsRef<str>) -> Result<()> {
        self.tracked(async { self.conn.query(query.as_ref(), None).await?.drain().await.map(drop) })
            .await
    }

    /// Inserts `batch` into `table`, returning the number of rows sent.
    ///
    /// Values are checked and converted against the column types the server reports for the
    /// table before anything is sent. A batch that fails conversion is rejected as a whole and
    /// the connection stays usable.
    ///
    /// # Errors
    /// - [`Error::Encode`] if a value does not fit its column's type.
    /// - [`Error::ColumnNotFound`] if the batch names a column the table does not have, or omits
    ///   a column that is not nullable.
    /// - [`Error::Server`] if `ClickHouse` rejects the insert.
    ///
    /// # Examples
    /// ```rust,ignore
    /// use clickhouse_bridge::prelude::*;
    ///
    /// let batch = InsertBatch::positional(["id", "name"], vec![
    ///     vec![Value::UInt64(1), Value::string("a")],
    /// ])?;
    /// let inserted = client.insert("my_table", batch).await?;
    /// ```
    pub async fn insert(&self, table: &str, batch: InsertBatch) -> Result<u64> {
        self.tracked(self.conn.insert(table, batch, None)).await
    }

    /// Inserts loosely shaped rows: positional rows need `columns`, associative rows carry their
    /// own column names.
    ///
    /// # Errors
    /// [`Error::InvalidBatch`] if the rows do not form a valid batch, otherwise see
    /// [`Client::insert`].
    pub async fn insert_rows<S: Into<String>>(
        &self,
        table: &str,
        columns: Option<Vec<S>>,
        rows: Vec<InsertRow>,
    ) -> Result<u64> {
        self.tracked(async {
            let batch = InsertBatch::from_rows(columns, rows)?;
            self.conn.insert(table, batch, None).await
        })
        .await
    }

    /// Sends a ping and waits for the server's pong.
    ///
    /// # Errors
    /// Fails if the connection is busy, closed or unresponsive.
    pub async fn ping(&self) -> Result<()> { self.tracked(self.conn.ping()).await }

    /// Replaces the underlying transport with a fresh connection to the same destination.
    ///
    /// # Errors
    /// Fails if a result set is still live, or if connecting fails.
    pub async fn reconnect(&self) -> Result<()> { self.tracked(self.conn.reconnect()).await }

    /// Closes the connection. Later calls fail with [`Error::ConnectionClosed`], and a live
    /// result set fails on its next read.
    pub async fn close(&self) {
        trace!({ ATT_CID } = self.client_id, "closing client");
        self.conn.close().await;
    }

    /// Message of the last failed call, empty when the last call succeeded.
    pub fn error(&self) -> String {
        self.conn.shared().last_error().map(|e| e.message).unwrap_or_default()
    }

    /// `ClickHouse` error code of the last failed call. 0 when it succeeded or failed client side.
    pub fn errno(&self) -> i32 { self.conn.shared().last_error().map_or(0, |e| e.code) }

    /// The last failed call's error, if any.
    pub fn last_error(&self) -> Option<QueryError> { self.conn.shared().last_error() }

    /// Clears the last-error slot, runs `operation`, and records its failure.
    async fn tracked<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        self.conn.shared().clear_error();
        operation.await.inspect_err(|error| {
            debug!(?error, { ATT_CID } = self.client_id, "operation failed");
            self.conn.shared().record(error);
        })
    }
}

#[cfg(test)]
impl Client {
    /// Handshake over an in-memory transport.
    pub(crate) async fn with_transport(
        transport: Box<dyn tcp::Transport>,
        options: ClientOptions,
    ) -> Result<Self> {
        let client_id = CLIENT_ID.fetch_add(1, Ordering::Relaxed);
        let conn =
            connection::Connection::connect_transport(client_id, transport, options).await?;
        Ok(Client { client_id, conn: Arc::new(conn) })
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("client_id", &self.client_id)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
