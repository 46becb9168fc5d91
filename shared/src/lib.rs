#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod app;
pub mod camera;
pub mod capabilities;
pub mod config;
pub mod event;
pub mod kv;
pub mod model;
pub mod repository;
pub mod selection;
pub mod settings;
pub mod store;
pub mod validation;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use app::{App, Model, QuestRow, ViewDirectives, ViewModel};
pub use camera::{compute_camera_target, markers_geojson, CameraSource, CameraTarget};
pub use capabilities::Capabilities;
pub use config::{ConfigError, CoreConfig};
pub use crux_core::{render::Render, App as CruxApp, Effect};
pub use event::Event;
pub use kv::{KvError, KvValue, SettingKey};
pub use model::{LatLon, Quest, QuestDraft, QuestId, Route, SelectionState};
pub use repository::{
    await_quest, clear_all, open_repository, populate_sample_quests, save_quest,
    LocalQuestRepository, QuestRepository, SaveOutcome,
};
pub use selection::{SelectionSink, SelectionSync, SelectionSyncController, SyncDirective, Transition};
pub use settings::{SettingsError, SettingsState};
pub use store::{MemoryStorage, QuestStorage, QuestStore, QuestStream, StoreError, TryRecvError};
#[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
pub use store::SqliteStorage;
pub use validation::{
    is_valid_description, is_valid_title, validate_quest_details, DescriptionPolicy,
    ValidationError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Transient,
    Permanent,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Storage,
    Serialization,
    Configuration,
    InvalidState,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Storage => "STORAGE_ERROR",
            Self::Serialization => "SERIALIZATION_ERROR",
            Self::Configuration => "CONFIG_ERROR",
            Self::InvalidState => "INVALID_STATE",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    #[must_use]
    pub const fn default_severity(self) -> ErrorSeverity {
        match self {
            Self::Storage => ErrorSeverity::Transient,
            Self::Serialization | Self::InvalidState | Self::Internal => ErrorSeverity::Fatal,
            Self::Validation | Self::NotFound | Self::Configuration => ErrorSeverity::Permanent,
        }
    }

    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Storage)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub message: String,
    pub internal_message: Option<String>,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            internal_message: None,
            context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal_message = Some(internal.into());
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable() && !matches!(self.severity, ErrorSeverity::Fatal)
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::Validation => self.message.clone(),
            ErrorKind::NotFound => "The requested quest could not be found.".into(),
            ErrorKind::Storage => {
                "Unable to read or save quests on this device. Please try again.".into()
            }
            ErrorKind::Serialization => {
                "Saved settings could not be read. Please review them in Settings.".into()
            }
            ErrorKind::Configuration => "The app is misconfigured. Please reinstall it.".into(),
            ErrorKind::InvalidState => {
                "The app is in an invalid state. Please restart the app.".into()
            }
            ErrorKind::Internal => {
                "An unexpected error occurred. Please try again or contact support.".into()
            }
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)?;
        if let Some(internal) = &self.internal_message {
            write!(f, " (internal: {internal})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Storage(detail) => {
                AppError::new(ErrorKind::Storage, "Quest storage failed").with_internal(detail)
            }
            StoreError::LockPoisoned => AppError::new(ErrorKind::Internal, e.to_string()),
            StoreError::Closed => AppError::new(ErrorKind::InvalidState, e.to_string()),
        }
    }
}

impl From<KvError> for AppError {
    fn from(e: KvError) -> Self {
        match e {
            KvError::ValueTooLarge { .. } => AppError::new(ErrorKind::Validation, e.to_string()),
            KvError::Serialization { ref key, .. } => {
                let err = AppError::new(ErrorKind::Serialization, e.to_string());
                match key {
                    Some(key) => err.with_context("key", key.clone()),
                    None => err,
                }
            }
            KvError::Unavailable(_) => AppError::new(ErrorKind::Storage, e.to_string()),
        }
    }
}

impl From<SettingsError> for AppError {
    fn from(e: SettingsError) -> Self {
        match e {
            SettingsError::InvalidUserName { max, .. } => AppError::new(
                ErrorKind::Validation,
                format!("User name must be 1 to {max} letters, digits or spaces."),
            ),
            SettingsError::Kv(kv) => kv.into(),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::new(ErrorKind::Configuration, e.to_string())
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::new(ErrorKind::Validation, e.to_string())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserFacingError {
    pub message: String,
    pub is_transient: bool,
    pub is_retryable: bool,
    pub error_code: String,
}

impl From<&AppError> for UserFacingError {
    fn from(e: &AppError) -> Self {
        Self {
            message: e.user_facing_message(),
            is_transient: e.severity == ErrorSeverity::Transient,
            is_retryable: e.is_retryable(),
            error_code: e.code().to_string(),
        }
    }
}
