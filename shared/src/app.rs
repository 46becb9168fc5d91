use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::camera::{markers_geojson, CameraTarget};
use crate::capabilities::{Capabilities, Compose, KeyValue};
use crate::config::CoreConfig;
use crate::event::Event;
use crate::kv::{KvError, KvValue, SettingKey};
use crate::model::{LatLon, Quest, QuestId, Route};
use crate::repository::{
    clear_all, open_repository, populate_sample_quests, save_quest, LocalQuestRepository,
    QuestRepository, SaveOutcome,
};
use crate::selection::{SelectionSink, SelectionSyncController};
use crate::settings::SettingsState;
use crate::store::{MemoryStorage, StoreError};
use crate::{AppError, AppResult, ErrorKind, UserFacingError};

#[derive(Default)]
pub struct App;

/// Scroll and camera instructions waiting for the shell.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ViewDirectives {
    /// List index the shell still has to scroll to.
    pub scroll_to_index: Option<usize>,
    pub camera: Option<CameraTarget>,
}

impl SelectionSink for ViewDirectives {
    fn scroll_list_to(&mut self, index: usize) {
        self.scroll_to_index = Some(index);
    }

    fn move_camera(&mut self, target: CameraTarget) {
        self.camera = Some(target);
    }
}

pub struct Model {
    pub config: CoreConfig,
    pub repository: Arc<dyn QuestRepository>,
    pub selection: SelectionSyncController<ViewDirectives>,
    pub settings: SettingsState,
    /// Whether a user name was found in the preference store.
    pub registered: bool,
    pub device_location: Option<LatLon>,
    pub route: Route,
    pub error: Option<AppError>,
    watching: bool,
}

impl Default for Model {
    fn default() -> Self {
        Self::new(
            CoreConfig::default(),
            Arc::new(LocalQuestRepository::from_storage(MemoryStorage::new())),
        )
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("config", &self.config)
            .field("selection", self.selection.state())
            .field("settings", &self.settings)
            .field("registered", &self.registered)
            .field("route", &self.route)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl Model {
    /// Model writing quests through `repository`.
    #[must_use]
    pub fn new(config: CoreConfig, repository: Arc<dyn QuestRepository>) -> Self {
        let settings = SettingsState::new(config.default_author.clone());
        let selection = SelectionSyncController::with_zoom(
            ViewDirectives::default(),
            settings.fallback_location(None),
            config.camera_zoom,
        );
        Self {
            config,
            repository,
            selection,
            settings,
            registered: false,
            device_location: None,
            route: Route::default(),
            error: None,
            watching: false,
        }
    }

    /// Validate `config` and open the repository it names.
    pub fn open(config: CoreConfig) -> AppResult<Self> {
        config.validate()?;
        let repository = open_repository(&config)?;
        Ok(Self::new(config, repository))
    }

    fn quest(&self, id: QuestId) -> Option<Quest> {
        self.selection
            .state()
            .snapshot()
            .quests
            .iter()
            .find(|q| q.id == id)
            .cloned()
    }

    fn refresh_fallback(&mut self) {
        let fallback = self.settings.fallback_location(self.device_location);
        self.selection.on_fallback_changed(fallback);
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QuestRow {
    pub id: QuestId,
    pub title: String,
    pub difficulty: i32,
    pub author: String,
    pub is_completed: bool,
    pub is_selected: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ViewModel {
    pub quests: Vec<QuestRow>,
    pub selected_id: Option<QuestId>,
    pub camera: CameraTarget,
    pub markers: geojson::FeatureCollection,
    pub scroll_to_index: Option<usize>,
    pub route: Route,
    pub title: String,
    pub user_name: String,
    pub is_registered: bool,
    pub developer_options: bool,
    pub description_limit: usize,
    pub error: Option<UserFacingError>,
}

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        debug!(event = event.name(), user = event.is_user_initiated(), "event");

        match event {
            Event::Noop => return,

            Event::Configure(config) => match Model::open(config) {
                Ok(configured) => {
                    info!("core configured");
                    *model = configured;
                }
                Err(e) => {
                    error!("configuration rejected: {e}");
                    model.error = Some(e);
                }
            },

            Event::AppStarted => {
                for key in SettingKey::ALL {
                    caps.kv.get(key.as_str().to_string(), move |value| {
                        Event::SettingLoaded {
                            key,
                            value: value.map_err(|e| e.to_string()),
                        }
                    });
                }
                if !model.watching {
                    model.watching = true;
                    watch_quests(&caps.compose, Arc::clone(&model.repository));
                }
                return;
            }

            Event::QuestsChanged(quests) => {
                model.selection.on_quests_changed(quests);
            }

            Event::QuestStreamFailed { message } => {
                warn!(%message, "quest stream terminated");
                model.watching = false;
                model.error = Some(
                    AppError::new(ErrorKind::Storage, "Quest list stopped updating")
                        .with_internal(message),
                );
            }

            Event::QuestSelected(id) => {
                model.selection.sink_mut().scroll_to_index = None;
                model.selection.select(id);
            }

            Event::SelectionCleared => {
                model.selection.clear_selection();
                model.selection.sink_mut().scroll_to_index = None;
            }

            Event::ScrollHandled => {
                model.selection.sink_mut().scroll_to_index = None;
            }

            Event::SaveQuest(mut draft) => {
                if model.settings.developer_options_enabled() {
                    let at = model.settings.manual_location();
                    debug!(lat = at.lat, lon = at.lon, "using manual location for new quest");
                    draft.latitude = at.lat;
                    draft.longitude = at.lon;
                }
                let repository = Arc::clone(&model.repository);
                let policy = model.config.description_policy;
                let settings = model.settings.clone();
                caps.compose.spawn(|context| async move {
                    match save_quest(repository.as_ref(), draft, policy, &settings).await {
                        Ok(outcome) => context.update_app(Event::QuestSaved(outcome)),
                        Err(e) => context.update_app(Event::QuestWriteFailed {
                            message: e.to_string(),
                        }),
                    }
                });
                return;
            }

            Event::MarkCompleted(id) => {
                let Some(mut quest) = model.quest(id) else {
                    warn!(quest_id = %id, "completion ignored, quest not in list");
                    return;
                };
                if quest.is_completed {
                    return;
                }
                quest.is_completed = true;
                let repository = Arc::clone(&model.repository);
                spawn_write(&caps.compose, async move {
                    repository.update_quest(&quest).await
                });
                return;
            }

            Event::DeleteQuest(id) => {
                let Some(quest) = model.quest(id) else {
                    warn!(quest_id = %id, "delete ignored, quest not in list");
                    return;
                };
                let repository = Arc::clone(&model.repository);
                spawn_write(&caps.compose, async move {
                    repository.delete_quest(&quest).await
                });
                return;
            }

            Event::PopulateSamples => {
                if !model.settings.developer_options_enabled() {
                    warn!("sample data ignored, developer options are off");
                    return;
                }
                let repository = Arc::clone(&model.repository);
                spawn_write(&caps.compose, async move {
                    populate_sample_quests(repository.as_ref()).await.map(|count| {
                        debug!(count, "sample quests written");
                    })
                });
                return;
            }

            Event::ClearAll => {
                if !model.settings.developer_options_enabled() {
                    warn!("clear ignored, developer options are off");
                    return;
                }
                let repository = Arc::clone(&model.repository);
                spawn_write(&caps.compose, async move {
                    clear_all(repository.as_ref()).await
                });
                return;
            }

            Event::QuestSaved(outcome) => match outcome {
                SaveOutcome::Saved(id) => {
                    info!(quest_id = %id, "quest created");
                    if model.route == Route::CreateQuest {
                        model.route = Route::Home;
                    }
                }
                SaveOutcome::Rejected(reason) => {
                    model.error = Some(reason.into());
                }
            },

            Event::QuestWriteFailed { message } => {
                model.error = Some(StoreError::Storage(message).into());
            }

            Event::SignUp { name } => match SettingsState::sign_up_entry(&name) {
                Ok((key, value)) => {
                    model.settings = model.settings.clone().with_user_name(name);
                    model.registered = true;
                    if model.route == Route::SignUp {
                        model.route = Route::Home;
                    }
                    store_setting(&caps.kv, key, value);
                }
                Err(e) => {
                    model.error = Some(e.into());
                }
            },

            Event::SettingsChanged(settings) => match settings.to_entries() {
                Ok(entries) => {
                    model.settings = settings;
                    model.refresh_fallback();
                    for (key, value) in entries {
                        store_setting(&caps.kv, key, value);
                    }
                }
                Err(e) => {
                    model.error = Some(e.into());
                }
            },

            Event::SettingLoaded { key, value } => match value {
                Ok(stored) => {
                    if key == SettingKey::UserName {
                        model.registered = stored.is_some();
                        if stored.is_none() && model.route == Route::Home {
                            model.route = Route::SignUp;
                        }
                    }
                    match model.settings.clone().apply_stored(key, stored) {
                        Ok(settings) => {
                            model.settings = settings;
                            model.refresh_fallback();
                        }
                        Err(e) => {
                            warn!(%key, "stored setting unreadable: {e}");
                            model.error = Some(e.into());
                        }
                    }
                }
                Err(message) => {
                    error!(%key, "failed to read setting: {message}");
                    model.error = Some(
                        AppError::from(KvError::Unavailable(message))
                            .with_context("key", key.as_str()),
                    );
                }
            },

            Event::SettingStored { key, result } => {
                if let Err(message) = result {
                    error!(%key, "failed to store setting: {message}");
                    model.error = Some(
                        AppError::from(KvError::Unavailable(message))
                            .with_context("key", key.as_str()),
                    );
                } else {
                    debug!(%key, "setting stored");
                    return;
                }
            }

            Event::DeviceLocationChanged(location) => {
                model.device_location = location;
                model.refresh_fallback();
            }

            Event::RouteChanged(route) => {
                model.route = route;
            }

            Event::ErrorDismissed => {
                model.error = None;
            }
        }

        caps.render.render();
    }

    fn view(&self, model: &Model) -> ViewModel {
        let state = model.selection.state();
        let snapshot = state.snapshot();
        let quests = snapshot
            .quests
            .iter()
            .map(|q| QuestRow {
                id: q.id,
                title: q.title.clone(),
                difficulty: q.difficulty,
                author: q.author.clone(),
                is_completed: q.is_completed,
                is_selected: snapshot.selection.is_selected(q.id),
            })
            .collect();
        let directives = model.selection.sink();

        ViewModel {
            quests,
            selected_id: snapshot.selection.selected_id(),
            camera: directives
                .camera
                .unwrap_or_else(|| state.camera_target()),
            markers: markers_geojson(&snapshot.quests),
            scroll_to_index: directives.scroll_to_index,
            route: model.route,
            title: model.route.title().to_string(),
            user_name: model.settings.user_name().to_string(),
            is_registered: model.registered,
            developer_options: model.settings.developer_options_enabled(),
            description_limit: model.config.description_policy.max_chars,
            error: model.error.as_ref().map(UserFacingError::from),
        }
    }
}

/// Forward every all-quests snapshot to the app until the stream ends.
fn watch_quests(compose: &Compose<Event>, repository: Arc<dyn QuestRepository>) {
    compose.spawn(|context| async move {
        let mut stream = repository.get_all_quests().await;
        while let Some(snapshot) = stream.next().await {
            match snapshot {
                Ok(quests) => context.update_app(Event::QuestsChanged(quests)),
                Err(e) => {
                    context.update_app(Event::QuestStreamFailed {
                        message: e.to_string(),
                    });
                    break;
                }
            }
        }
    });
}

/// Run a repository write. Success shows up through the quest stream, so
/// only failures are reported back.
fn spawn_write<F>(compose: &Compose<Event>, write: F)
where
    F: Future<Output = Result<(), StoreError>> + Send + 'static,
{
    compose.spawn(|context| async move {
        if let Err(e) = write.await {
            context.update_app(Event::QuestWriteFailed {
                message: e.to_string(),
            });
        }
    });
}

fn store_setting(kv: &KeyValue<Event>, key: SettingKey, value: KvValue) {
    kv.set(key.as_str().to_string(), value.into_bytes(), move |result| {
        Event::SettingStored {
            key,
            result: result.map(|_| ()).map_err(|e| e.to_string()),
        }
    });
}
