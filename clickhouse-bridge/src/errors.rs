use std::time::Duration;

use strum::Display;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure the client can surface.
///
/// Variants fall into four groups, see [`ErrorKind`]:
/// - connection failures (unreachable host, TLS, lost transport, closed connection)
/// - query failures reported by the server, or a second query while one is in flight
/// - decode failures (payload does not match the declared schema, protocol violations)
/// - encode failures (a value does not fit its column, a malformed insert batch)
#[derive(Error, Debug)]
pub enum Error {
    // -- Connection --
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("connection timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("tls error: {0}")]
    Tls(String),
    #[error("invalid dns name: {0}")]
    InvalidDnsName(String),
    #[error("missing connection information")]
    MissingConnectionInformation,
    #[error("malformed connection information: {0}")]
    MalformedConnectionInformation(String),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("connection lost, reconnect required")]
    Disconnected,

    // -- Query --
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error("a query is already in flight on this connection")]
    QueryInFlight,

    // -- Decode --
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("could not parse type '{0}'")]
    TypeParse(String),
    #[error("unsupported column type: {0}")]
    UnsupportedType(String),
    #[error("checksum mismatch: expected {expected:032x}, got {actual:032x}")]
    Checksum { expected: u128, actual: u128 },
    #[error("decompression failed: {0}")]
    Decompress(String),
    #[error("invalid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    // -- Encode --
    #[error("encode error: {0}")]
    Encode(String),
    #[error("invalid insert batch: {0}")]
    InvalidBatch(String),

    // -- Row access --
    #[error("column not found: {0}")]
    ColumnNotFound(String),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ErrorKind {
    Connection,
    Query,
    Decode,
    Encode,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_)
            | Error::Connection(_)
            | Error::ConnectTimeout(_)
            | Error::Tls(_)
            | Error::InvalidDnsName(_)
            | Error::MissingConnectionInformation
            | Error::MalformedConnectionInformation(_)
            | Error::ConnectionClosed
            | Error::Disconnected => ErrorKind::Connection,
            Error::Server(_) | Error::QueryInFlight => ErrorKind::Query,
            Error::Protocol(_)
            | Error::Decode(_)
            | Error::TypeParse(_)
            | Error::UnsupportedType(_)
            | Error::Checksum { .. }
            | Error::Decompress(_)
            | Error::Utf8(_)
            | Error::ColumnNotFound(_) => ErrorKind::Decode,
            Error::Encode(_) | Error::InvalidBatch(_) => ErrorKind::Encode,
        }
    }

    /// The `ClickHouse` error code for server exceptions, 0 for everything raised client side.
    pub fn code(&self) -> i32 {
        match self {
            Error::Server(e) => e.code,
            _ => 0,
        }
    }

    /// Whether the session can no longer be trusted after this error was raised while talking to
    /// the server. Anything that may have left unread bytes on the wire qualifies.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::Server(_)
                | Error::QueryInFlight
                | Error::Encode(_)
                | Error::InvalidBatch(_)
                | Error::ColumnNotFound(_)
                | Error::MissingConnectionInformation
                | Error::MalformedConnectionInformation(_)
        )
    }

    pub(crate) fn decode(msg: impl Into<String>) -> Self { Error::Decode(msg.into()) }

    pub(crate) fn encode(msg: impl Into<String>) -> Self { Error::Encode(msg.into()) }

    pub(crate) fn protocol(msg: impl Into<String>) -> Self { Error::Protocol(msg.into()) }
}

/// An exception raised by the server, including any nested causes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{name} (code {code}): {message}")]
pub struct ServerError {
    pub code:        i32,
    pub name:        String,
    pub message:     String,
    pub stack_trace: String,
    pub nested:      Option<Box<ServerError>>,
}

impl ServerError {
    /// Iterate this exception and its nested causes, outermost first.
    pub fn chain(&self) -> impl Iterator<Item = &ServerError> {
        std::iter::successors(Some(self), |e| e.nested.as_deref())
    }
}

/// The `{message, code}` pair kept in a connection's last-error slot.
///
/// Server exceptions keep their message and code verbatim; every other failure is recorded with
/// its rendered message and code 0.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryError {
    pub message: String,
    pub code:    i32,
    pub kind:    ErrorKind,
}

impl From<&Error> for QueryError {
    fn from(error: &Error) -> Self {
        let message = match error {
            Error::Server(e) => e.message.clone(),
            e => e.to_string(),
        };
        QueryError { message, code: error.code(), kind: error.kind() }
    }
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_error(code: i32, message: &str) -> ServerError {
        ServerError {
            code,
            name: "DB::Exception".into(),
            message: message.into(),
            stack_trace: String::new(),
            nested: None,
        }
    }

    #[test]
    fn test_server_error_keeps_code_and_message() {
        let error = Error::from(server_error(60, "Table default.missing does not exist"));
        assert_eq!(error.code(), 60);
        assert_eq!(error.kind(), ErrorKind::Query);
        assert!(!error.is_fatal());

        let slot = QueryError::from(&error);
        assert_eq!(slot.code, 60);
        assert_eq!(slot.message, "Table default.missing does not exist");
    }

    #[test]
    fn test_client_errors_use_code_zero() {
        let error = Error::encode("value 300 does not fit UInt8");
        assert_eq!(error.code(), 0);
        assert_eq!(error.kind(), ErrorKind::Encode);
        assert!(!error.is_fatal());
        assert_eq!(QueryError::from(&error).message, "encode error: value 300 does not fit UInt8");
    }

    #[test]
    fn test_transport_errors_are_fatal() {
        let io = Error::from(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"));
        assert!(io.is_fatal());
        assert_eq!(io.kind(), ErrorKind::Connection);
        assert!(Error::decode("schema mismatch").is_fatal());
    }

    #[test]
    fn test_nested_chain() {
        let mut outer = server_error(1, "outer");
        outer.nested = Some(Box::new(server_error(2, "inner")));
        let codes = outer.chain().map(|e| e.code).collect::<Vec<_>>();
        assert_eq!(codes, vec![1, 2]);
    }
}
