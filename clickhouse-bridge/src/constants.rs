pub(super) const VERSION_MAJOR: u64 = 0;
pub(super) const VERSION_MINOR: u64 = 1;
pub(super) const VERSION_PATCH: u64 = 0;

pub(super) const CLIENT_NAME: &str = "clickhouse-bridge";

// Connection defaults
pub(super) const DEFAULT_HOST: &str = "127.0.0.1";
pub(super) const DEFAULT_PORT: u16 = 9000;
pub(super) const DEFAULT_USER: &str = "default";
pub(super) const DEFAULT_DATABASE: &str = "default";

// Socket buffer sizes
pub(super) const TCP_READ_BUFFER_SIZE: u32 = 1024 * 1024; // 1MB
pub(super) const TCP_WRITE_BUFFER_SIZE: u32 = 1024 * 1024; // 1MB
// Connection
pub(super) const TCP_CONNECT_TIMEOUT: u64 = 30;
// Keep alive
pub(super) const TCP_KEEP_ALIVE_SECS: u64 = 60;
pub(super) const TCP_KEEP_ALIVE_INTERVAL: u64 = 10;
pub(super) const TCP_KEEP_ALIVE_RETRIES: u32 = 6;

// Uncompressed bytes per compressed frame
pub(super) const MAX_COMPRESS_CHUNK: usize = 1024 * 1024;

#[cfg(test)]
mod tests {
    #[test]
    fn test_version_matches_cargo() {
        let cargo_version = env!("CARGO_PKG_VERSION");
        let parts: Vec<u64> =
            cargo_version.split('.').map(|p| p.parse().expect("numeric version")).collect();
        assert_eq!(parts, vec![super::VERSION_MAJOR, super::VERSION_MINOR, super::VERSION_PATCH]);
    }
}
