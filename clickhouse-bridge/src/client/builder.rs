use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use chrono_tz::Tz;

use super::tcp::Destination;
use super::{Client, CompressionMethod, Secret};
use crate::prelude::*;
use crate::settings::{SettingValue, Settings};
use crate::{ClientOptions, Error, Result};

/// Builder for [`crate::Client`]
#[derive(Default, Debug, Clone)]
pub struct ClientBuilder {
    destination: Option<Destination>,
    options:     ClientOptions,
    verified:    bool,
}

impl ClientBuilder {
    /// Create a new builder with default options
    pub fn new() -> Self { ClientBuilder::default() }

    /// Access inner destination
    pub fn destination(&self) -> Option<&Destination> { self.destination.as_ref() }

    /// Access inner options
    pub fn options(&self) -> &ClientOptions { &self.options }

    /// Whether the client builder has been verified
    pub fn verified(&self) -> bool { self.verified }

    /// Set destination with a [`SocketAddr`] (e.g., 127.0.0.1:9000)
    #[must_use]
    pub fn with_socket_addr(self, addr: SocketAddr) -> Self { self.with_destination(addr) }

    /// Set destination with an IP or hostname and port (e.g., "localhost", 9000)
    #[must_use]
    pub fn with_host_port(self, host: impl Into<String>, port: u16) -> Self {
        self.with_destination((host.into(), port))
    }

    /// Set destination with a string endpoint (e.g., "localhost:9000")
    #[must_use]
    pub fn with_endpoint(self, endpoint: impl Into<String>) -> Self {
        self.with_destination(endpoint.into())
    }

    /// Set destination with a Destination
    #[must_use]
    pub fn with_destination<D>(mut self, destination: D) -> Self
    where
        D: Into<Destination>,
    {
        self.destination = Some(destination.into());
        self.verified = false;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self.verified = false;
        self
    }

    #[must_use]
    pub fn with_tls(mut self, tls: bool) -> Self {
        if self.options.use_tls != tls {
            self.options.use_tls = tls;
            self.verified = false;
        }
        self
    }

    #[must_use]
    pub fn with_cafile<P: AsRef<Path>>(mut self, cafile: P) -> Self {
        self.options.cafile = Some(cafile.as_ref().to_path_buf());
        self
    }

    #[must_use]
    pub fn with_ipv4_only(mut self, enabled: bool) -> Self {
        self.options.ipv4_only = enabled;
        self.verified = false;
        self
    }

    /// Replace the settings sent with every query
    #[must_use]
    pub fn with_settings(mut self, settings: impl Into<Settings>) -> Self {
        self.options.settings = settings.into();
        self
    }

    /// Add a single setting sent with every query
    #[must_use]
    pub fn with_setting<S>(mut self, name: impl Into<String>, value: S) -> Self
    where
        SettingValue: From<S>,
    {
        self.options.settings.add_setting(name, value);
        self
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.options.username = username.into();
        self
    }

    #[must_use]
    pub fn with_password<T>(mut self, password: T) -> Self
    where
        Secret: From<T>,
    {
        self.options.password = Secret::from(password);
        self
    }

    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.options.default_database = database.into();
        self
    }

    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.options.domain = Some(domain.into());
        self.verified = false;
        self
    }

    #[must_use]
    pub fn with_compression(mut self, compression: CompressionMethod) -> Self {
        self.options.compression = compression;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    /// Zone for `DateTime` columns without an explicit one
    #[must_use]
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.options.timezone = Some(timezone);
        self
    }

    /// Return `FixedString` values trimmed of trailing zero bytes
    #[must_use]
    pub fn with_trim_fixed_strings(mut self, enabled: bool) -> Self {
        self.options.trim_fixed_strings = enabled;
        self
    }

    /// Helper to resolve the destination early
    ///
    /// # Errors
    ///
    /// Returns an error if destination verification fails.
    pub async fn verify(mut self) -> Result<Self> {
        let destination =
            self.destination.as_ref().ok_or(Error::MissingConnectionInformation)?;
        let addrs = destination
            .resolve(self.options.ipv4_only)
            .await
            .inspect_err(|error| error!(?error, "Failed to resolve destination"))?;
        if addrs.is_empty() {
            return Err(Error::MalformedConnectionInformation(
                "Socket addresses cannot be empty".into(),
            ));
        }

        if self.options.use_tls && self.options.domain.is_none() {
            let domain = destination.domain();
            if domain.is_empty() {
                return Err(Error::MalformedConnectionInformation(
                    "Domain required for TLS, couldn't be determined from destination".into(),
                ));
            }
            self.options.domain = Some(domain);
        }

        self.destination = Some(Destination::from(addrs));
        self.verified = true;
        Ok(self)
    }

    /// Build the client by connecting to the destination
    ///
    /// # Errors
    ///
    /// Returns an error if destination verification, the connection or the handshake fails.
    pub async fn build(self) -> Result<Client> {
        let builder = if self.verified { self } else { self.verify().await? };
        let destination = builder.destination.ok_or(Error::MissingConnectionInformation)?;
        Client::connect_with(destination, builder.options).await
    }
}
