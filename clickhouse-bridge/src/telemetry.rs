//! Span and event attribute names shared by connection and query instrumentation.
pub use opentelemetry_semantic_conventions::attribute;

/// Per-client identifier, assigned in connection order.
pub const ATT_CID: &str = "clickhouse.client.id";
/// Query identifier, see [`crate::Qid`].
pub const ATT_QID: &str = "clickhouse.query.id";
/// Server packet currently being read.
pub const ATT_PID: &str = "clickhouse.packet.id";
