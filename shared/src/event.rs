use serde::{Deserialize, Serialize};

use crate::config::CoreConfig;
use crate::kv::SettingKey;
use crate::model::{LatLon, Quest, QuestDraft, QuestId, Route};
use crate::repository::SaveOutcome;
use crate::settings::SettingsState;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Event {
    Noop,

    /// Replace the quest repository with the one `CoreConfig` describes.
    /// Sent once, before `AppStarted`.
    Configure(CoreConfig),
    /// Load stored preferences and start following the quest list.
    AppStarted,

    // Quest list
    /// New snapshot from the all-quests stream, title-ordered.
    QuestsChanged(Vec<Quest>),
    /// The all-quests stream ended with a persistence failure.
    QuestStreamFailed {
        message: String,
    },

    // Selection
    /// List item or map marker tapped.
    QuestSelected(QuestId),
    SelectionCleared,
    /// The shell finished scrolling the list.
    ScrollHandled,

    // Quest writes
    SaveQuest(QuestDraft),
    MarkCompleted(QuestId),
    DeleteQuest(QuestId),
    /// Developer options only.
    PopulateSamples,
    /// Developer options only.
    ClearAll,

    // Settings
    SignUp {
        name: String,
    },
    SettingsChanged(SettingsState),
    /// `None` when the platform has no last known position.
    DeviceLocationChanged(Option<LatLon>),

    RouteChanged(Route),
    ErrorDismissed,

    // Capability responses
    #[serde(skip)]
    QuestSaved(SaveOutcome),
    #[serde(skip)]
    QuestWriteFailed {
        message: String,
    },
    #[serde(skip)]
    SettingLoaded {
        key: SettingKey,
        value: Result<Option<Vec<u8>>, String>,
    },
    #[serde(skip)]
    SettingStored {
        key: SettingKey,
        result: Result<(), String>,
    },
}

impl Event {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::Configure(_) => "configure",
            Self::AppStarted => "app_started",
            Self::QuestsChanged(_) => "quests_changed",
            Self::QuestStreamFailed { .. } => "quest_stream_failed",
            Self::QuestSelected(_) => "quest_selected",
            Self::SelectionCleared => "selection_cleared",
            Self::ScrollHandled => "scroll_handled",
            Self::SaveQuest(_) => "save_quest",
            Self::MarkCompleted(_) => "mark_completed",
            Self::DeleteQuest(_) => "delete_quest",
            Self::PopulateSamples => "populate_samples",
            Self::ClearAll => "clear_all",
            Self::SignUp { .. } => "sign_up",
            Self::SettingsChanged(_) => "settings_changed",
            Self::DeviceLocationChanged(_) => "device_location_changed",
            Self::RouteChanged(_) => "route_changed",
            Self::ErrorDismissed => "error_dismissed",
            Self::QuestSaved(_) => "quest_saved",
            Self::QuestWriteFailed { .. } => "quest_write_failed",
            Self::SettingLoaded { .. } => "setting_loaded",
            Self::SettingStored { .. } => "setting_stored",
        }
    }

    #[must_use]
    pub const fn is_user_initiated(&self) -> bool {
        matches!(
            self,
            Self::QuestSelected(_)
                | Self::SelectionCleared
                | Self::SaveQuest(_)
                | Self::MarkCompleted(_)
                | Self::DeleteQuest(_)
                | Self::PopulateSamples
                | Self::ClearAll
                | Self::SignUp { .. }
                | Self::SettingsChanged(_)
                | Self::RouteChanged(_)
                | Self::ErrorDismissed
        )
    }
}
