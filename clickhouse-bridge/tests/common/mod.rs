use std::sync::Arc;

use clickhouse_bridge::test_utils::{ClickHouseContainer, get_or_create_container, init_tracing};

pub const SEP: &str = "\n-------------------------------\n";

/// Little helper function to print headers for tests
pub fn header(qid: impl std::fmt::Display, msg: impl AsRef<str>) {
    eprintln!("{SEP} Query ID = {qid}\n {} {SEP}", msg.as_ref());
}

/// Initialize tracing and get thread safe reference to `ClickHouseContainer`
pub async fn init(directives: Option<&[(&str, &str)]>) -> &'static Arc<ClickHouseContainer> {
    init_tracing(directives);
    get_or_create_container().await
}

/// Run an async test body against the shared container.
#[macro_export]
macro_rules! e2e_test {
    ($name:ident, $test:path, $directives:expr) => {
        #[tokio::test(flavor = "multi_thread")]
        async fn $name() {
            let ch = $crate::common::init(Some($directives)).await;
            $test(ch).await;
        }
    };
}
