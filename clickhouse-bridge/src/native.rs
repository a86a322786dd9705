//! The native TCP protocol: packets, blocks and the column type codec.
pub(crate) mod block;
pub(crate) mod block_info;
pub(crate) mod client_info;
pub(crate) mod progress;
pub(crate) mod protocol;
pub mod types;
pub mod values;

pub use protocol::{CompressionMethod, ServerHello};
