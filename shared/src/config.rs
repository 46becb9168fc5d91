use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::camera::{MAX_ZOOM, MIN_ZOOM, QUEST_MAP_ZOOM};
use crate::settings::DEFAULT_USER_NAME;
use crate::validation::{is_valid_user_name, DescriptionPolicy, MAX_USER_NAME_CHARS};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("camera zoom {0} is outside 1..=21")]
    ZoomOutOfRange(f64),

    #[error("description limit must be positive")]
    EmptyDescriptionLimit,

    #[error("default author '{0}' is not a valid user name")]
    InvalidDefaultAuthor(String),

    #[error("invalid configuration JSON: {0}")]
    Parse(String),
}

/// Host-supplied settings that do not change at runtime.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct CoreConfig {
    pub description_policy: DescriptionPolicy,
    /// Author used when nobody has signed up yet.
    pub default_author: String,
    pub camera_zoom: f64,
    /// SQLite file. `None` keeps quests in memory.
    pub database_path: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            description_policy: DescriptionPolicy::EXTENDED,
            default_author: DEFAULT_USER_NAME.to_string(),
            camera_zoom: QUEST_MAP_ZOOM,
            database_path: None,
        }
    }
}

impl CoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.camera_zoom.is_finite() || !(MIN_ZOOM..=MAX_ZOOM).contains(&self.camera_zoom) {
            return Err(ConfigError::ZoomOutOfRange(self.camera_zoom));
        }
        if self.description_policy.max_chars == 0 {
            return Err(ConfigError::EmptyDescriptionLimit);
        }
        if !is_valid_user_name(&self.default_author) {
            return Err(ConfigError::InvalidDefaultAuthor(
                self.default_author.chars().take(MAX_USER_NAME_CHARS + 1).collect(),
            ));
        }
        Ok(())
    }

    /// Parse and validate. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
