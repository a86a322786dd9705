//! Query settings sent with every query, e.g. `max_threads` or `max_execution_time`.
//!
//! See the [ClickHouse Settings Reference](https://clickhouse.com/docs/en/operations/settings)
//! for valid names. Settings are serialized as strings on revisions newer than 54429; older
//! servers only accept integer and boolean values.
use std::fmt;

use crate::io::ClickHouseWrite;
use crate::native::protocol::DBMS_MIN_REVISION_WITH_SETTINGS_SERIALIZED_AS_STRINGS;
use crate::{Error, Result};

const SETTING_FLAG_IMPORTANT: u64 = 0x01;

/// A single query setting.
#[derive(Debug, Clone, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Setting {
    key:       String,
    value:     SettingValue,
    important: bool,
}

/// Supported value types for query settings.
#[derive(Debug, Clone, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum SettingValue {
    Int(i64),
    Bool(bool),
    Float(f64),
    String(String),
}

macro_rules! setting_value {
    ($ty:ident, $inner:ty) => {
        impl From<$inner> for SettingValue {
            fn from(value: $inner) -> Self { SettingValue::$ty(value) }
        }
    };
    ($ty:ident, $inner:ty, $override:ty) => {
        impl From<$override> for SettingValue {
            fn from(value: $override) -> Self { SettingValue::$ty(<$inner>::from(value)) }
        }
    };
}

setting_value!(Int, i64, u8);
setting_value!(Int, i64, u16);
setting_value!(Int, i64, u32);
setting_value!(Int, i64, i8);
setting_value!(Int, i64, i16);
setting_value!(Int, i64, i32);
setting_value!(Int, i64);
setting_value!(Bool, bool);
setting_value!(Float, f64, f32);
setting_value!(Float, f64);
setting_value!(String, String);

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self { SettingValue::String(value.to_string()) }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Int(i) => write!(f, "{i}"),
            SettingValue::Bool(b) => write!(f, "{}", u8::from(*b)),
            SettingValue::Float(fl) => write!(f, "{fl}"),
            SettingValue::String(s) => write!(f, "{s}"),
        }
    }
}

impl Setting {
    pub fn key(&self) -> &str { &self.key }

    pub fn value(&self) -> &SettingValue { &self.value }

    async fn encode<W: ClickHouseWrite>(&self, writer: &mut W, revision: u64) -> Result<()> {
        writer.write_string(&self.key).await?;
        if revision < DBMS_MIN_REVISION_WITH_SETTINGS_SERIALIZED_AS_STRINGS {
            let value = match &self.value {
                SettingValue::Int(i) => u64::try_from(*i).ok(),
                SettingValue::Bool(b) => Some(u64::from(*b)),
                _ => None,
            };
            let value = value.ok_or_else(|| {
                Error::MalformedConnectionInformation(format!(
                    "setting {} must be a non-negative integer or boolean on this server",
                    self.key
                ))
            })?;
            writer.write_var_uint(value).await?;
        } else {
            let flags = if self.important { SETTING_FLAG_IMPORTANT } else { 0 };
            writer.write_var_uint(flags).await?;
            writer.write_string(self.value.to_string()).await?;
        }
        Ok(())
    }
}

/// An ordered collection of query settings.
#[derive(Debug, Clone, Default, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Settings(pub Vec<Setting>);

impl Settings {
    /// Adds a new setting with the given name and value.
    pub fn add_setting<S>(&mut self, name: impl Into<String>, setting: S)
    where
        SettingValue: From<S>,
    {
        self.0.push(Setting { key: name.into(), value: setting.into(), important: false });
    }

    /// Return new settings with the given name and value added.
    #[must_use]
    pub fn with_setting<S>(mut self, name: impl Into<String>, setting: S) -> Self
    where
        SettingValue: From<S>,
    {
        self.add_setting(name, setting);
        self
    }

    /// Mark a setting as important: the server rejects the query if it does not know it.
    #[must_use]
    pub fn with_important_setting<S>(mut self, name: impl Into<String>, setting: S) -> Self
    where
        SettingValue: From<S>,
    {
        self.0.push(Setting { key: name.into(), value: setting.into(), important: true });
        self
    }

    /// Each setting formatted as `key = value`.
    pub fn encode_to_strings(&self) -> Vec<String> {
        self.0.iter().map(|setting| format!("{} = {}", setting.key, setting.value)).collect()
    }

    /// Writes every setting followed by the empty-name terminator.
    pub(crate) async fn encode<W: ClickHouseWrite>(
        &self,
        writer: &mut W,
        revision: u64,
    ) -> Result<()> {
        for setting in &self.0 {
            setting.encode(writer, revision).await?;
        }
        writer.write_string("").await
    }
}

impl<T, K, S> From<T> for Settings
where
    T: IntoIterator<Item = (K, S)>,
    K: Into<String>,
    SettingValue: From<S>,
{
    fn from(value: T) -> Self {
        Self(
            value
                .into_iter()
                .map(|(k, v)| Setting { key: k.into(), value: v.into(), important: false })
                .collect(),
        )
    }
}

impl std::ops::Deref for Settings {
    type Target = [Setting];

    fn deref(&self) -> &Self::Target { &self.0 }
}
