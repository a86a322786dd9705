use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpSocket, TcpStream};
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::pem::PemObject;
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName};
use tokio_rustls::rustls::{self, ClientConfig, RootCertStore};

use crate::constants::*;
use crate::prelude::*;
use crate::{Error, Result};

/// A byte stream the native protocol runs over: plain tcp, tls, or an in-memory pipe in tests.
pub(crate) trait Transport: AsyncRead + AsyncWrite + Unpin + Send + Sync {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + Sync> Transport for T {}

/// Where to connect: socket addresses, a host and port, or an endpoint string to resolve.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Destination {
    inner: DestinationInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum DestinationInner {
    SocketAddrs(Vec<SocketAddr>),
    SocketAddr(SocketAddr),
    HostPort(String, u16),
    Endpoint(String),
}

impl Destination {
    /// Resolve to Vec<SocketAddr> using [`tokio::net::lookup_host`]
    pub(crate) async fn resolve(&self, ipv4_only: bool) -> Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = match &self.inner {
            DestinationInner::SocketAddrs(addrs) => addrs.clone(),
            DestinationInner::SocketAddr(addr) => vec![*addr],
            DestinationInner::HostPort(host, port) => {
                tokio::net::lookup_host((host.as_str(), *port))
                    .await
                    .map(Iterator::collect)
                    .map_err(|e| unresolved(self, &e))?
            }
            DestinationInner::Endpoint(endpoint) => tokio::net::lookup_host(endpoint)
                .await
                .map(Iterator::collect)
                .map_err(|e| unresolved(self, &e))?,
        };

        Ok(addrs
            .into_iter()
            .filter(|addr| !ipv4_only || matches!(addr, SocketAddr::V4(_)))
            .collect())
    }

    /// Host part of the destination, used as the tls server name
    pub(crate) fn domain(&self) -> String {
        match &self.inner {
            DestinationInner::SocketAddrs(addrs) => {
                addrs.first().map(|addr| addr.ip().to_string()).unwrap_or_default()
            }
            DestinationInner::SocketAddr(addr) => addr.ip().to_string(),
            DestinationInner::HostPort(host, _) => host.clone(),
            DestinationInner::Endpoint(endpoint) => endpoint
                .rsplit_once(':')
                .map_or(endpoint.as_str(), |(host, _)| host)
                .trim_start_matches('[')
                .trim_end_matches(']')
                .to_string(),
        }
    }
}

fn unresolved(destination: &Destination, error: &std::io::Error) -> Error {
    Error::MalformedConnectionInformation(format!("could not resolve {destination}: {error}"))
}

/// Connects to the first reachable address, with socket options tuned for bulk transfer.
#[instrument(level = "trace", name = "clickhouse._connect_socket", skip_all, err)]
pub(crate) async fn connect_socket(addrs: &[SocketAddr], timeout: Duration) -> Result<TcpStream> {
    let mut last_error = None;
    for addr in addrs {
        match connect_addr(*addr, timeout).await {
            Ok(stream) => {
                trace!("Connected socket for {addr}");
                return Ok(stream);
            }
            Err(error) => {
                debug!(?error, %addr, "Connection attempt failed");
                last_error = Some(error);
            }
        }
    }
    Err(last_error.unwrap_or(Error::MissingConnectionInformation))
}

async fn connect_addr(addr: SocketAddr, timeout: Duration) -> Result<TcpStream> {
    let domain = if addr.is_ipv4() { socket2::Domain::IPV4 } else { socket2::Domain::IPV6 };
    let socket = socket2::Socket::new(domain, socket2::Type::STREAM, Some(socket2::Protocol::TCP))?;
    socket.set_nonblocking(true)?;
    socket.set_recv_buffer_size(TCP_READ_BUFFER_SIZE as usize)?;
    socket.set_send_buffer_size(TCP_WRITE_BUFFER_SIZE as usize)?;
    let keepalive = socket2::TcpKeepalive::new()
        .with_time(Duration::from_secs(TCP_KEEP_ALIVE_SECS))
        .with_interval(Duration::from_secs(TCP_KEEP_ALIVE_INTERVAL))
        .with_retries(TCP_KEEP_ALIVE_RETRIES);
    socket.set_tcp_keepalive(&keepalive)?;

    let socket = TcpSocket::from_std_stream(std::net::TcpStream::from(socket));
    socket.set_nodelay(true)?;
    tokio::time::timeout(timeout, socket.connect(addr))
        .await
        .map_err(|_| Error::ConnectTimeout(timeout))?
        .map_err(|e| Error::Connection(format!("{addr}: {e}")))
}

/// Wrap `stream` in tls, trusting the bundled web roots and optionally a PEM `cafile`.
pub(super) async fn tls_stream(
    domain: String,
    cafile: Option<&Path>,
    stream: TcpStream,
) -> Result<TlsStream<TcpStream>> {
    let mut root_store = RootCertStore { roots: webpki_roots::TLS_SERVER_ROOTS.into() };
    if let Some(cafile) = cafile {
        for cert in CertificateDer::pem_file_iter(cafile)
            .map_err(|e| Error::Tls(format!("reading {}: {e}", cafile.display())))?
        {
            let cert = cert.map_err(|e| Error::Tls(format!("parsing {}: {e}", cafile.display())))?;
            root_store.add(cert).map_err(|e| Error::Tls(e.to_string()))?;
        }
    }

    // No-op when a provider is already installed
    drop(rustls::crypto::aws_lc_rs::default_provider().install_default());
    let mut tls_config =
        ClientConfig::builder().with_root_certificates(root_store).with_no_client_auth();
    tls_config.resumption = rustls::client::Resumption::in_memory_sessions(256);

    let connector = TlsConnector::from(Arc::new(tls_config));
    let dnsname = ServerName::try_from(domain).map_err(|e| Error::InvalidDnsName(e.to_string()))?;
    connector.connect(dnsname, stream).await.map_err(|e| Error::Tls(e.to_string()))
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            DestinationInner::SocketAddrs(addrs) => {
                write!(f, "{}", addrs.first().map(ToString::to_string).unwrap_or_default())
            }
            DestinationInner::SocketAddr(addr) => write!(f, "{addr}"),
            DestinationInner::HostPort(host, port) => write!(f, "{host}:{port}"),
            DestinationInner::Endpoint(endpoint) => write!(f, "{endpoint}"),
        }
    }
}

impl From<Vec<SocketAddr>> for Destination {
    fn from(addrs: Vec<SocketAddr>) -> Self {
        Destination { inner: DestinationInner::SocketAddrs(addrs) }
    }
}

impl From<SocketAddr> for Destination {
    fn from(addr: SocketAddr) -> Self { Destination { inner: DestinationInner::SocketAddr(addr) } }
}

impl From<(String, u16)> for Destination {
    fn from((host, port): (String, u16)) -> Self {
        Destination { inner: DestinationInner::HostPort(host, port) }
    }
}

impl From<(&str, u16)> for Destination {
    fn from((host, port): (&str, u16)) -> Self {
        Destination { inner: DestinationInner::HostPort(host.to_string(), port) }
    }
}

impl From<String> for Destination {
    fn from(endpoint: String) -> Self {
        Destination { inner: DestinationInner::Endpoint(endpoint) }
    }
}

impl From<&str> for Destination {
    fn from(endpoint: &str) -> Self {
        Destination { inner: DestinationInner::Endpoint(endpoint.to_string()) }
    }
}

impl From<(Ipv4Addr, u16)> for Destination {
    fn from((host, port): (Ipv4Addr, u16)) -> Self {
        Destination { inner: DestinationInner::SocketAddr((host, port).into()) }
    }
}

impl From<(Ipv6Addr, u16)> for Destination {
    fn from((host, port): (Ipv6Addr, u16)) -> Self {
        Destination { inner: DestinationInner::SocketAddr((host, port).into()) }
    }
}
