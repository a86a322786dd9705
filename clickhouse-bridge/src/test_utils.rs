//! Helpers for integration tests: tracing setup and a `ClickHouse` server container.
use std::collections::VecDeque;
use std::env;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use testcontainers::core::IntoContainerPort;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt, TestcontainersError};
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

pub const ENDPOINT_ENV: &str = "CLICKHOUSE_ENDPOINT";
pub const VERSION_ENV: &str = "CLICKHOUSE_VERSION";
pub const NATIVE_PORT_ENV: &str = "CLICKHOUSE_NATIVE_PORT";
pub const USER_ENV: &str = "CLICKHOUSE_USER";
pub const PASSWORD_ENV: &str = "CLICKHOUSE_PASSWORD";

// Env defaults
const CLICKHOUSE_USER: &str = "clickhouse";
const CLICKHOUSE_PASSWORD: &str = "clickhouse";
const CLICKHOUSE_VERSION: &str = "latest";
const CLICKHOUSE_NATIVE_PORT: u16 = 9000;
const CLICKHOUSE_ENDPOINT: &str = "localhost";

pub static CONTAINER: OnceLock<Arc<ClickHouseContainer>> = OnceLock::new();

/// Initialize tracing in a test setup
pub fn init_tracing(directives: Option<&[(&str, &str)]>) {
    let rust_log = env::var("RUST_LOG").unwrap_or_default();

    let stdio_logger = tracing_subscriber::fmt::Layer::default()
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(get_filter(&rust_log, directives));

    // Initialize only if not already set (avoids multiple subscribers in tests)
    if tracing::subscriber::set_global_default(tracing_subscriber::registry().with(stdio_logger))
        .is_ok()
    {
        debug!("Tracing initialized with RUST_LOG={rust_log}");
    }
}

/// Common tracing filters
///
/// # Panics
/// If a directive does not parse.
pub fn get_filter(rust_log: &str, directives: Option<&[(&str, &str)]>) -> EnvFilter {
    let mut env_dirs = vec![];
    let level = if rust_log.is_empty() {
        LevelFilter::WARN.to_string()
    } else if let Ok(level) = LevelFilter::from_str(rust_log) {
        level.to_string()
    } else {
        let mut parts = rust_log.split(',');
        let level = parts.next().and_then(|p| LevelFilter::from_str(p).ok());
        env_dirs = parts
            .map(|s| s.split('=').collect::<VecDeque<_>>())
            .filter(|s| s.len() == 2)
            .map(|mut s| (s.pop_front().unwrap(), s.pop_front().unwrap()))
            .collect::<Vec<_>>();
        level.unwrap_or(LevelFilter::WARN).to_string()
    };

    let mut filter = EnvFilter::new(level)
        .add_directive("tokio=info".parse().unwrap())
        .add_directive("runtime=error".parse().unwrap())
        .add_directive("testcontainers=info".parse().unwrap())
        .add_directive("rustls=warn".parse().unwrap());

    if let Some(directives) = directives {
        for (key, value) in directives {
            filter = filter.add_directive(format!("{key}={value}").parse().unwrap());
        }
    }

    for (key, value) in env_dirs {
        filter = filter.add_directive(format!("{key}={value}").parse().unwrap());
    }

    filter
}

/// # Panics
/// If the container fails to start.
pub async fn get_or_create_container() -> &'static Arc<ClickHouseContainer> {
    if let Some(c) = CONTAINER.get() {
        c
    } else {
        let ch =
            ClickHouseContainer::try_new().await.expect("Failed to initialize ClickHouse container");
        CONTAINER.get_or_init(|| Arc::new(ch))
    }
}

pub struct ClickHouseContainer {
    pub endpoint:    String,
    pub native_port: u16,
    pub url:         String,
    pub user:        String,
    pub password:    String,
    container:       RwLock<Option<ContainerAsync<GenericImage>>>,
}

impl ClickHouseContainer {
    /// # Errors
    /// If the image cannot be started or its port cannot be resolved.
    pub async fn try_new() -> Result<Self, TestcontainersError> {
        // Env vars
        let version = env::var(VERSION_ENV).unwrap_or(CLICKHOUSE_VERSION.to_string());
        let native_port = env::var(NATIVE_PORT_ENV)
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(CLICKHOUSE_NATIVE_PORT);
        let user = env::var(USER_ENV).ok().unwrap_or(CLICKHOUSE_USER.into());
        let password = env::var(PASSWORD_ENV).ok().unwrap_or(CLICKHOUSE_PASSWORD.into());

        // Get image
        let image = GenericImage::new("clickhouse/clickhouse-server", &version)
            .with_exposed_port(native_port.tcp())
            .with_wait_for(testcontainers::core::WaitFor::message_on_stderr(
                "Ready for connections",
            ))
            .with_env_var(USER_ENV, &user)
            .with_env_var(PASSWORD_ENV, &password);

        // Start container
        let container = image.start().await?;
        let native_port = container.get_host_port_ipv4(native_port).await?;

        let endpoint = env::var(ENDPOINT_ENV).unwrap_or(CLICKHOUSE_ENDPOINT.to_string());
        let url = format!("{endpoint}:{native_port}");

        // Pause
        sleep(Duration::from_secs(2)).await;

        let container = RwLock::new(Some(container));
        Ok(ClickHouseContainer { endpoint, native_port, url, user, password, container })
    }

    pub fn get_native_url(&self) -> &str { &self.url }

    pub fn get_native_port(&self) -> u16 { self.native_port }

    /// # Errors
    /// Never; failures to stop or remove the container are logged.
    pub async fn shutdown(&self) -> Result<(), TestcontainersError> {
        let mut container = self.container.write().await;
        if let Some(container) = container.take() {
            let _ = container
                .stop_with_timeout(Some(0))
                .await
                .inspect_err(|error| {
                    error!(?error, "Failed to stop container, will attempt to remove");
                })
                .ok();
            let _ = container
                .rm()
                .await
                .inspect_err(|error| {
                    error!(?error, "Failed to rm container, cleanup manually");
                })
                .ok();
        }
        Ok(())
    }
}

pub mod native_tests {
    use super::*;
    use crate::prelude::*;

    pub fn setup_test_client(
        url: &str,
        user: &str,
        password: &str,
        compression: CompressionMethod,
    ) -> ClientBuilder {
        Client::builder()
            .with_endpoint(url)
            .with_username(user)
            .with_password(password)
            .with_compression(compression)
    }

    /// # Errors
    /// If the database cannot be dropped or created.
    pub async fn setup_database(client: &Client, db: &str) -> Result<()> {
        client.execute(format!("DROP DATABASE IF EXISTS {db} SYNC")).await?;
        client.execute(format!("CREATE DATABASE {db}")).await?;
        Ok(())
    }

    /// Create a table covering every supported column type, returning its qualified name.
    ///
    /// # Errors
    /// If the table cannot be created.
    pub async fn setup_table(client: &Client, db: &str) -> Result<String> {
        let table = format!("{db}.test_table_{}", Qid::new());
        client
            .execute(format!(
                "CREATE TABLE {table} (
                    id UInt64,
                    small Int8,
                    flag Bool,
                    name String,
                    code FixedString(4),
                    ratio Float64,
                    amount Decimal(18, 4),
                    day Date,
                    seen DateTime('UTC'),
                    level Enum8('low' = 1, 'high' = 2),
                    note Nullable(String)
                ) ENGINE = MergeTree ORDER BY id"
            ))
            .await?;
        Ok(table)
    }

    /// Columns of [`setup_table`], in order.
    pub const TEST_COLUMNS: [&str; 11] =
        ["id", "small", "flag", "name", "code", "ratio", "amount", "day", "seen", "level", "note"];

    /// Positional rows for [`setup_table`], given as the loosely typed values a caller would hold.
    pub fn create_test_rows(rows: u64) -> Vec<Vec<Value>> {
        (0..rows)
            .map(|i| {
                vec![
                    Value::UInt64(u64::MAX - i),
                    Value::Int64(-(i64::try_from(i % 100).unwrap_or(0))),
                    Value::string(if i % 2 == 0 { "true" } else { "false" }),
                    Value::string(format!("name{i}")),
                    Value::string("ab"),
                    Value::Float64(0.5),
                    Value::string("12345.6789"),
                    Value::string("2024-02-29"),
                    Value::string("2024-02-29 23:59:59"),
                    Value::string(if i % 2 == 0 { "low" } else { "high" }),
                    if i % 3 == 0 { Value::Null } else { Value::string(format!("note{i}")) },
                ]
            })
            .collect()
    }
}
