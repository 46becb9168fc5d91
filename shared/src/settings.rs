//! User preferences read by the core.
//!
//! `SettingsState` is immutable from the outside: every change goes
//! through a named `with_*` transition that returns a new state. The shell
//! owns the preference store; the core reads it one [`SettingKey`] at a
//! time with [`SettingsState::apply_stored`] and writes it back from
//! [`SettingsState::to_entries`].

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::kv::{KvError, KvValue, SettingKey};
use crate::model::LatLon;
use crate::validation::{
    is_valid_sign_up_name, is_valid_user_name, MAX_SIGN_UP_NAME_CHARS, MAX_USER_NAME_CHARS,
};

pub const DEFAULT_USER_NAME: &str = "GeoQuest";
pub const DEFAULT_COORDINATE_TEXT: &str = "0.0";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("invalid user name '{name}', expected 1..={max} letters, digits or spaces")]
    InvalidUserName { name: String, max: usize },

    #[error(transparent)]
    Kv(#[from] KvError),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SettingsState {
    user_name: String,
    developer_options_enabled: bool,
    manual_latitude: String,
    manual_longitude: String,
}

impl Default for SettingsState {
    fn default() -> Self {
        Self::new(DEFAULT_USER_NAME)
    }
}

impl SettingsState {
    /// Defaults for a device with nothing stored, naming the user
    /// `default_user_name` until they sign up.
    pub fn new(default_user_name: impl Into<String>) -> Self {
        Self {
            user_name: default_user_name.into(),
            developer_options_enabled: false,
            manual_latitude: DEFAULT_COORDINATE_TEXT.to_string(),
            manual_longitude: DEFAULT_COORDINATE_TEXT.to_string(),
        }
    }

    /// Fold one stored preference into the state. `None` means the key was
    /// never written and the current value stays.
    pub fn apply_stored(
        self,
        key: SettingKey,
        stored: Option<Vec<u8>>,
    ) -> Result<Self, SettingsError> {
        let Some(bytes) = stored else {
            debug!(%key, "setting not stored, keeping default");
            return Ok(self);
        };
        let value = KvValue::new(bytes)?;
        let state = match key {
            SettingKey::UserName => Self {
                user_name: value.decode(key)?,
                ..self
            },
            SettingKey::DeveloperOptions => Self {
                developer_options_enabled: value.decode(key)?,
                ..self
            },
            SettingKey::Latitude => Self {
                manual_latitude: value.decode(key)?,
                ..self
            },
            SettingKey::Longitude => Self {
                manual_longitude: value.decode(key)?,
                ..self
            },
        };
        debug!(%key, "setting loaded");
        Ok(state)
    }

    /// Every preference encoded for the key/value store. An invalid user
    /// name aborts before anything is encoded.
    pub fn to_entries(&self) -> Result<Vec<(SettingKey, KvValue)>, SettingsError> {
        if !is_valid_user_name(&self.user_name) {
            warn!("refusing to save settings with an invalid user name");
            return Err(SettingsError::InvalidUserName {
                name: self.user_name.clone(),
                max: MAX_USER_NAME_CHARS,
            });
        }
        Ok(vec![
            (
                SettingKey::UserName,
                KvValue::from_serializable(&self.user_name)?,
            ),
            (
                SettingKey::DeveloperOptions,
                KvValue::from_serializable(&self.developer_options_enabled)?,
            ),
            (
                SettingKey::Latitude,
                KvValue::from_serializable(&self.manual_latitude)?,
            ),
            (
                SettingKey::Longitude,
                KvValue::from_serializable(&self.manual_longitude)?,
            ),
        ])
    }

    /// Encode the name chosen at sign-up, which may be longer than the
    /// settings screen allows.
    pub fn sign_up_entry(name: &str) -> Result<(SettingKey, KvValue), SettingsError> {
        if !is_valid_sign_up_name(name) {
            return Err(SettingsError::InvalidUserName {
                name: name.to_string(),
                max: MAX_SIGN_UP_NAME_CHARS,
            });
        }
        Ok((SettingKey::UserName, KvValue::from_serializable(&name)?))
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn developer_options_enabled(&self) -> bool {
        self.developer_options_enabled
    }

    pub fn manual_latitude(&self) -> &str {
        &self.manual_latitude
    }

    pub fn manual_longitude(&self) -> &str {
        &self.manual_longitude
    }

    #[must_use]
    pub fn with_user_name(self, name: impl Into<String>) -> Self {
        Self {
            user_name: name.into(),
            ..self
        }
    }

    #[must_use]
    pub fn with_developer_options(self, enabled: bool) -> Self {
        Self {
            developer_options_enabled: enabled,
            ..self
        }
    }

    #[must_use]
    pub fn with_manual_location(
        self,
        latitude: impl Into<String>,
        longitude: impl Into<String>,
    ) -> Self {
        Self {
            manual_latitude: latitude.into(),
            manual_longitude: longitude.into(),
            ..self
        }
    }

    pub fn is_user_name_valid(&self) -> bool {
        is_valid_user_name(&self.user_name)
    }

    /// Manual override as coordinates. Text that does not parse as a
    /// finite number counts as `0.0` for that axis.
    pub fn manual_location(&self) -> LatLon {
        fn parse(text: &str) -> f64 {
            text.trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .unwrap_or(0.0)
        }
        LatLon::new(parse(&self.manual_latitude), parse(&self.manual_longitude))
    }

    /// Where the map centres when there are no quests: the device's last
    /// known position if the host has one, otherwise the manual override.
    pub fn fallback_location(&self, device: Option<LatLon>) -> LatLon {
        device.unwrap_or_else(|| self.manual_location())
    }
}
