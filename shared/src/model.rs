use serde::{Deserialize, Serialize};
use std::fmt;

/// Row identifier assigned by the quest store.
///
/// `0` marks a quest that has not been persisted yet; the store assigns a
/// fresh id when such a quest is upserted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestId(pub i64);

impl QuestId {
    pub const UNSAVED: Self = Self(0);

    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn is_unsaved(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for QuestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Plain lat/lon pair. Capture happens outside the core, so values are
/// stored as given and only checked on request.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    #[must_use]
    pub fn is_in_range(self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Persisted quest row. Serde names follow the `quest` table columns so
/// shells and storage backends share one layout.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Quest {
    pub id: QuestId,
    #[serde(rename = "questTitle")]
    pub title: String,
    #[serde(rename = "questDescription")]
    pub description: String,
    #[serde(rename = "questDifficulty")]
    pub difficulty: i32,
    /// Opaque handle to a photo managed by the shell.
    #[serde(rename = "questImageUri")]
    pub image_ref: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub author: String,
    #[serde(rename = "isCompleted")]
    pub is_completed: bool,
}

impl Quest {
    #[must_use]
    pub fn location(&self) -> LatLon {
        LatLon::new(self.latitude, self.longitude)
    }

    #[must_use]
    pub fn to_draft(&self) -> QuestDraft {
        QuestDraft {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            difficulty: self.difficulty,
            image_ref: self.image_ref.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            author: self.author.clone(),
        }
    }

    /// Plain-text body handed to the platform share sheet.
    #[must_use]
    pub fn share_text(&self) -> String {
        format!(
            "Quest Title: {}\nQuest Description: {}\nQuest Difficulty: {}/5",
            self.title, self.description, self.difficulty
        )
    }
}

/// Editable form state for a quest before it is written.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct QuestDraft {
    pub id: QuestId,
    pub title: String,
    pub description: String,
    pub difficulty: i32,
    pub image_ref: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub author: String,
}

impl Default for QuestDraft {
    fn default() -> Self {
        Self {
            id: QuestId::UNSAVED,
            title: String::new(),
            description: String::new(),
            difficulty: 1,
            image_ref: None,
            latitude: 0.0,
            longitude: 0.0,
            author: crate::settings::DEFAULT_USER_NAME.to_string(),
        }
    }
}

impl QuestDraft {
    #[must_use]
    pub fn into_quest(self) -> Quest {
        Quest {
            id: self.id,
            title: self.title,
            description: self.description,
            difficulty: self.difficulty,
            image_ref: self.image_ref,
            latitude: self.latitude,
            longitude: self.longitude,
            author: self.author,
            is_completed: false,
        }
    }
}

/// The quest highlighted across the list and the map, if any.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SelectionState {
    #[default]
    Unselected,
    Selected(QuestId),
}

impl SelectionState {
    #[must_use]
    pub const fn selected_id(self) -> Option<QuestId> {
        match self {
            Self::Unselected => None,
            Self::Selected(id) => Some(id),
        }
    }

    #[must_use]
    pub fn is_selected(self, id: QuestId) -> bool {
        self == Self::Selected(id)
    }
}

/// Screens a shell can route to. Quest-scoped routes key off the store id.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum Route {
    #[default]
    Home,
    SignUp,
    Settings,
    CreateQuest,
    ViewQuest {
        id: QuestId,
    },
    FindQuest {
        id: QuestId,
    },
}

impl Route {
    #[must_use]
    pub fn path(self) -> String {
        match self {
            Self::Home => "home".into(),
            Self::SignUp => "sign_up".into(),
            Self::Settings => "settings".into(),
            Self::CreateQuest => "create_quest".into(),
            Self::ViewQuest { id } => format!("view_quest/{id}"),
            Self::FindQuest { id } => format!("find_quest/{id}"),
        }
    }

    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Home => "GeoQuest",
            Self::SignUp => "Sign Up",
            Self::Settings => "Settings",
            Self::CreateQuest => "Create Quest",
            Self::ViewQuest { .. } => "View Quest",
            Self::FindQuest { .. } => "Find Quest",
        }
    }

    #[must_use]
    pub const fn quest_id(self) -> Option<QuestId> {
        match self {
            Self::ViewQuest { id } | Self::FindQuest { id } => Some(id),
            _ => None,
        }
    }
}
