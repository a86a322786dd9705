use std::sync::Arc;
use std::vec;

use futures_util::Stream;
use strum::Display;
use tokio::sync::OwnedMutexGuard;

use super::connection::{Session, Shared};
use crate::native::block::Block;
use crate::native::progress::Progress;
use crate::native::protocol::ServerPacket;
use crate::prelude::*;
use crate::row::{FetchMode, Fetched, Row, Schema};
use crate::{Error, Result};

/// Lifecycle of a [`ResultSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ResultState {
    /// Header received, no row handed out yet.
    Open,
    /// At least one row handed out, more may follow.
    Streaming,
    /// The server ended the stream, or the query failed. Further reads yield nothing.
    Exhausted,
    /// The owning connection was closed while the stream was live.
    Closed,
}

/// Rows of a query, pulled from the server one block at a time.
///
/// While a result set is live it holds the connection: other operations on the same client fail
/// with [`Error::QueryInFlight`]. Dropping it before the end of the stream cancels the query, and
/// the remainder is drained before the next operation runs.
pub struct ResultSet {
    qid:        Qid,
    schema:     Schema,
    state:      ResultState,
    session:    Option<OwnedMutexGuard<Session>>,
    shared:     Arc<Shared>,
    columns:    Vec<vec::IntoIter<Value>>,
    remaining:  usize,
    rows_read:  u64,
    progress:   Progress,
    trim_fixed: bool,
}

impl ResultSet {
    pub(crate) fn new(
        qid: Qid,
        header: Block,
        progress: Progress,
        session: OwnedMutexGuard<Session>,
        shared: Arc<Shared>,
    ) -> Self {
        let trim_fixed = session.metadata.trim_fixed;
        let mut result = ResultSet {
            qid,
            schema: header.schema().into(),
            state: ResultState::Open,
            session: Some(session),
            shared,
            columns: Vec::new(),
            remaining: 0,
            rows_read: 0,
            progress,
            trim_fixed,
        };
        if !header.is_empty() {
            result.load(header);
        }
        result
    }

    /// Result of a statement that produced no rows.
    pub(crate) fn finished(qid: Qid, progress: Progress, shared: Arc<Shared>) -> Self {
        ResultSet {
            qid,
            schema: Arc::from(Vec::new()),
            state: ResultState::Exhausted,
            session: None,
            shared,
            columns: Vec::new(),
            remaining: 0,
            rows_read: 0,
            progress,
            trim_fixed: false,
        }
    }

    pub fn qid(&self) -> Qid { self.qid }

    pub fn state(&self) -> ResultState { self.state }

    /// Column names and types, known as soon as the query returns. Empty for statements.
    pub fn schema(&self) -> &[(String, Type)] { &self.schema }

    /// Number of rows handed out so far.
    pub fn rows_read(&self) -> u64 { self.rows_read }

    /// Alias of [`ResultSet::rows_read`].
    pub fn num_rows(&self) -> u64 { self.rows_read }

    /// Progress reported by the server so far.
    pub fn progress(&self) -> Progress { self.progress }

    /// The next row, or `None` once the stream has ended.
    ///
    /// # Errors
    /// Server exceptions raised mid-stream, decode failures and transport failures. After an
    /// error the result set is exhausted.
    pub async fn next_row(&mut self) -> Result<Option<Row>> {
        loop {
            match self.state {
                ResultState::Exhausted => return Ok(None),
                ResultState::Closed => return Err(Error::ConnectionClosed),
                ResultState::Open | ResultState::Streaming => {}
            }

            if self.shared.is_closed() {
                self.abandon();
                let error = Error::ConnectionClosed;
                self.shared.record(&error);
                return Err(error);
            }

            if self.remaining > 0 {
                self.remaining -= 1;
                self.rows_read += 1;
                self.state = ResultState::Streaming;
                let trim = self.trim_fixed;
                let values = self
                    .columns
                    .iter_mut()
                    .filter_map(Iterator::next)
                    .map(|value| if trim { value.trim_fixed() } else { value })
                    .collect();
                return Ok(Some(Row::new(Arc::clone(&self.schema), values)));
            }

            self.next_block().await?;
        }
    }

    /// The next row in the shape given by `mode`.
    ///
    /// # Errors
    /// See [`ResultSet::next_row`].
    pub async fn fetch(&mut self, mode: FetchMode) -> Result<Option<Fetched>> {
        Ok(self.next_row().await?.map(|row| row.fetch(mode)))
    }

    /// All remaining rows in the shape given by `mode`.
    ///
    /// # Errors
    /// See [`ResultSet::next_row`].
    pub async fn fetch_all(&mut self, mode: FetchMode) -> Result<Vec<Fetched>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await? {
            rows.push(row.fetch(mode));
        }
        Ok(rows)
    }

    /// All remaining rows.
    ///
    /// # Errors
    /// See [`ResultSet::next_row`].
    pub async fn collect_rows(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Read and discard the rest of the stream, returning the number of rows read in total.
    ///
    /// # Errors
    /// See [`ResultSet::next_row`].
    pub async fn drain(mut self) -> Result<u64> {
        while self.next_row().await?.is_some() {}
        Ok(self.rows_read)
    }

    /// Convert into a stream of rows. The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Row>> + Send {
        futures_util::stream::try_unfold(self, |mut result| async move {
            Ok::<_, Error>(result.next_row().await?.map(|row| (row, result)))
        })
    }

    async fn next_block(&mut self) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            self.state = ResultState::Exhausted;
            return Ok(());
        };
        let next = session.next_packet().await;
        let packet = match next {
            Ok(packet) => packet,
            Err(error) => return Err(self.fail(error)),
        };

        match packet {
            ServerPacket::Data(block) => {
                if block.is_empty() {
                    return Ok(());
                }
                let matches = block.columns.len() == self.schema.len()
                    && block
                        .columns
                        .iter()
                        .zip(self.schema.iter())
                        .all(|(column, (name, type_))| &column.name == name && &column.type_ == type_);
                if !matches {
                    let error = Error::decode(format!(
                        "block schema {:?} does not match the result header",
                        block.schema()
                    ));
                    return Err(self.fail(error));
                }
                self.load(block);
            }
            ServerPacket::Progress(delta) => self.progress += delta,
            ServerPacket::EndOfStream => {
                trace!({ ATT_QID } = %self.qid, rows = self.rows_read, "result exhausted");
                self.finish();
            }
            ServerPacket::Exception(exception) => {
                let error = Error::from(exception);
                self.shared.record(&error);
                self.finish();
                return Err(error);
            }
            packet @ (ServerPacket::Hello(_) | ServerPacket::Pong) => {
                let error = Error::protocol(format!("unexpected {} in result", packet.as_ref()));
                return Err(self.fail(error));
            }
            packet => packet.trace_skipped(),
        }
        Ok(())
    }

    fn load(&mut self, block: Block) {
        self.remaining = block.rows;
        self.columns = block.columns.into_iter().map(|column| column.values.into_iter()).collect();
    }

    /// Hand the session back after the stream ended.
    fn finish(&mut self) {
        self.state = ResultState::Exhausted;
        self.columns.clear();
        self.remaining = 0;
        if let Some(mut session) = self.session.take() {
            self.shared.release(&mut session);
        }
    }

    fn fail(&mut self, error: Error) -> Error {
        let error = match self.session.as_mut() {
            Some(session) => session.fail(error),
            None => error,
        };
        self.shared.record(&error);
        self.finish();
        error
    }

    /// Give up the transport after the connection was closed underneath.
    fn abandon(&mut self) {
        self.state = ResultState::Closed;
        self.columns.clear();
        self.remaining = 0;
        if let Some(mut session) = self.session.take() {
            session.disconnect();
            self.shared.release(&mut session);
        }
    }
}

impl Drop for ResultSet {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            debug!({ ATT_QID } = %self.qid, rows = self.rows_read, "Result dropped before end of stream");
            session.dirty = true;
            self.shared.release(&mut session);
        }
    }
}

impl std::fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("qid", &self.qid)
            .field("schema", &self.schema)
            .field("state", &self.state)
            .field("rows_read", &self.rows_read)
            .finish_non_exhaustive()
    }
}
