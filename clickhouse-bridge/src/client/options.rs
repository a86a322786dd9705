use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;

use super::CompressionMethod;
use crate::constants::{DEFAULT_DATABASE, DEFAULT_USER, TCP_CONNECT_TIMEOUT};
use crate::prelude::Secret;
use crate::settings::Settings;

/// Options set for a `ClickHouse` connection.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClientOptions {
    /// Username credential
    pub username:           String,
    /// Password credential. [`Secret`] is used to minimize likelihood of exposure through logs
    pub password:           Secret,
    /// Scope this client to a specifc database, otherwise 'default' is used
    pub default_database:   String,
    /// For tls, provide the domain, otherwise it will be determined from the endpoint.
    pub domain:             Option<String>,
    /// Whether any non-ipv4 socket addrs should be filtered out.
    pub ipv4_only:          bool,
    /// Provide a path to a PEM certificate authority to trust for tls, in addition to the
    /// bundled web roots.
    pub cafile:             Option<PathBuf>,
    /// Whether a connection should be made securely over tls.
    pub use_tls:            bool,
    /// The compression applied to data blocks in both directions.
    pub compression:        CompressionMethod,
    /// Upper bound for establishing the tcp connection and completing the handshake.
    pub connect_timeout:    Duration,
    /// Zone applied to `DateTime` columns that do not declare one. UTC when unset.
    pub timezone:           Option<Tz>,
    /// Return `FixedString` values with trailing zero bytes removed, as `String` values.
    pub trim_fixed_strings: bool,
    /// Settings sent with every query.
    pub settings:           Settings,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            username:           DEFAULT_USER.to_string(),
            password:           Secret::new(""),
            default_database:   DEFAULT_DATABASE.to_string(),
            domain:             None,
            ipv4_only:          false,
            cafile:             None,
            use_tls:            false,
            compression:        CompressionMethod::default(),
            connect_timeout:    Duration::from_secs(TCP_CONNECT_TIMEOUT),
            timezone:           None,
            trim_fixed_strings: false,
            settings:           Settings::default(),
        }
    }
}

impl ClientOptions {
    pub(crate) fn timezone(&self) -> Tz { self.timezone.unwrap_or(Tz::UTC) }
}
