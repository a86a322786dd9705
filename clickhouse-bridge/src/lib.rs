#![doc = include_str!("../README.md")]

mod batch;
mod client;
mod compression;
mod constants;
mod errors;
mod io;
pub mod native;
pub mod prelude;
mod query;
mod row;
mod settings;
pub mod telemetry;
#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use batch::{InsertBatch, InsertRow};
pub use client::*;
pub use errors::*;
pub use native::progress::Progress;
/// Represents the types that `ClickHouse` supports internally.
pub use native::types::{Type, decode_value, encode_value};
/// Values exchanged with `ClickHouse`, and conversions out of them.
pub use native::values::*;
pub use native::{CompressionMethod, ServerHello};
pub use query::Qid;
pub use row::{FetchMode, Fetched, Row, Schema};
pub use settings::{Setting, SettingValue, Settings};

mod aliases {
    /// A non-cryptographically secure [`std::hash::BuildHasherDefault`] using
    /// [`rustc_hash::FxHasher`].
    pub type HashBuilder = std::hash::BuildHasherDefault<rustc_hash::FxHasher>;
    /// A non-cryptographically secure [`indexmap::IndexMap`] using [`HashBuilder`].
    pub type FxIndexMap<K, V> = indexmap::IndexMap<K, V, HashBuilder>;
}
// Type aliases used throughout the library
pub use aliases::*;
// External libraries
mod reexports {
    pub use chrono_tz::Tz;
    pub use indexmap::IndexMap;
    pub use uuid::Uuid;
    pub use {rustc_hash, tracing};
}
/// Re-exports
///
/// Exporting different external modules used by the library.
pub use reexports::*;
