//! Preference keys and the byte encoding the shell's key/value store holds.

use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

pub const MAX_VALUE_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KvError {
    #[error("value too large: {size} bytes, max {max}")]
    ValueTooLarge { size: usize, max: usize },

    #[error("serialization failed for {key:?}: {message}")]
    Serialization { message: String, key: Option<String> },

    #[error("key/value store unavailable: {0}")]
    Unavailable(String),
}

/// Keys under which the shell persists user preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettingKey {
    UserName,
    DeveloperOptions,
    Latitude,
    Longitude,
}

impl SettingKey {
    pub const ALL: [Self; 4] = [
        Self::UserName,
        Self::DeveloperOptions,
        Self::Latitude,
        Self::Longitude,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserName => "userName",
            Self::DeveloperOptions => "developerOptions",
            Self::Latitude => "latitude",
            Self::Longitude => "longitude",
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON-encoded value as handed to the platform preference store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvValue {
    data: Vec<u8>,
}

impl KvValue {
    pub fn new(data: Vec<u8>) -> Result<Self, KvError> {
        if data.len() > MAX_VALUE_SIZE {
            return Err(KvError::ValueTooLarge {
                size: data.len(),
                max: MAX_VALUE_SIZE,
            });
        }
        Ok(Self { data })
    }

    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self, KvError> {
        let data = serde_json::to_vec(value).map_err(|e| KvError::Serialization {
            message: e.to_string(),
            key: None,
        })?;
        Self::new(data)
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Decode the value stored under `key`. Failures name the key.
    pub fn decode<T: DeserializeOwned>(&self, key: SettingKey) -> Result<T, KvError> {
        serde_json::from_slice(&self.data).map_err(|e| KvError::Serialization {
            message: e.to_string(),
            key: Some(key.to_string()),
        })
    }
}
