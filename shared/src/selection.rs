//! Keeps the quest list, the map camera and the selected quest in step.
//!
//! [`SelectionSync`] is the state container: it exposes an immutable
//! [`SelectionSnapshot`] and changes only through [`Transition`]s, so a
//! recorded transition log replays to the same state. The
//! [`SelectionSyncController`] drives a [`SelectionSink`] (list view + map)
//! from those transitions.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::camera::{compute_camera_target_at, CameraTarget, QUEST_MAP_ZOOM};
use crate::model::{LatLon, Quest, QuestId, SelectionState};

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SelectionSnapshot {
    /// Latest quest list, title-ordered as delivered by the store.
    pub quests: Vec<Quest>,
    pub selection: SelectionState,
    pub fallback: LatLon,
}

impl SelectionSnapshot {
    /// First position of `id` in the title-ordered list.
    #[must_use]
    pub fn index_of(&self, id: QuestId) -> Option<usize> {
        self.quests.iter().position(|q| q.id == id)
    }

    #[must_use]
    pub fn selected_quest(&self) -> Option<&Quest> {
        let id = self.selection.selected_id()?;
        self.quests.iter().find(|q| q.id == id)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Transition {
    /// A list item or map marker was activated.
    Select(QuestId),
    /// Explicit reset by the host. Nothing in the core triggers it.
    Clear,
    QuestsChanged(Vec<Quest>),
    FallbackChanged(LatLon),
}

/// What the views must do after a transition.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct SyncDirective {
    pub scroll_to_index: Option<usize>,
    pub camera: CameraTarget,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SelectionSync {
    snapshot: SelectionSnapshot,
    zoom: f64,
}

impl Default for SelectionSync {
    fn default() -> Self {
        Self::new(QUEST_MAP_ZOOM)
    }
}

impl SelectionSync {
    #[must_use]
    pub fn new(zoom: f64) -> Self {
        Self {
            snapshot: SelectionSnapshot::default(),
            zoom,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> &SelectionSnapshot {
        &self.snapshot
    }

    #[must_use]
    pub fn camera_target(&self) -> CameraTarget {
        compute_camera_target_at(
            &self.snapshot.quests,
            self.snapshot.selection,
            self.snapshot.fallback,
            self.zoom,
        )
    }

    pub fn apply(&mut self, transition: Transition) -> SyncDirective {
        let scroll_to_index = match transition {
            Transition::Select(id) => {
                self.snapshot.selection = SelectionState::Selected(id);
                let index = self.snapshot.index_of(id);
                debug!(quest_id = %id, ?index, "quest selected");
                index
            }
            Transition::Clear => {
                self.snapshot.selection = SelectionState::Unselected;
                None
            }
            Transition::QuestsChanged(quests) => {
                self.snapshot.quests = quests;
                None
            }
            Transition::FallbackChanged(location) => {
                self.snapshot.fallback = location;
                None
            }
        };
        SyncDirective {
            scroll_to_index,
            camera: self.camera_target(),
        }
    }

    pub fn select(&mut self, id: QuestId) -> SyncDirective {
        self.apply(Transition::Select(id))
    }

    pub fn clear(&mut self) -> SyncDirective {
        self.apply(Transition::Clear)
    }

    pub fn replace_quests(&mut self, quests: Vec<Quest>) -> SyncDirective {
        self.apply(Transition::QuestsChanged(quests))
    }

    pub fn set_fallback(&mut self, location: LatLon) -> SyncDirective {
        self.apply(Transition::FallbackChanged(location))
    }

    /// Rebuild state from a transition log.
    #[must_use]
    pub fn replay(zoom: f64, transitions: impl IntoIterator<Item = Transition>) -> Self {
        let mut sync = Self::new(zoom);
        for transition in transitions {
            sync.apply(transition);
        }
        sync
    }
}

/// The presentation side the controller drives.
pub trait SelectionSink {
    fn scroll_list_to(&mut self, index: usize);
    fn move_camera(&mut self, target: CameraTarget);
}

pub struct SelectionSyncController<K: SelectionSink> {
    state: SelectionSync,
    sink: K,
}

impl<K: SelectionSink> SelectionSyncController<K> {
    pub fn new(sink: K, fallback: LatLon) -> Self {
        Self::with_zoom(sink, fallback, QUEST_MAP_ZOOM)
    }

    pub fn with_zoom(sink: K, fallback: LatLon, zoom: f64) -> Self {
        let mut state = SelectionSync::new(zoom);
        state.set_fallback(fallback);
        Self { state, sink }
    }

    pub fn state(&self) -> &SelectionSync {
        &self.state
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut K {
        &mut self.sink
    }

    pub fn select(&mut self, id: QuestId) {
        self.dispatch(Transition::Select(id));
    }

    pub fn clear_selection(&mut self) {
        self.dispatch(Transition::Clear);
    }

    pub fn on_quests_changed(&mut self, quests: Vec<Quest>) {
        self.dispatch(Transition::QuestsChanged(quests));
    }

    pub fn on_fallback_changed(&mut self, location: LatLon) {
        self.dispatch(Transition::FallbackChanged(location));
    }

    fn dispatch(&mut self, transition: Transition) {
        let directive = self.state.apply(transition);
        if let Some(index) = directive.scroll_to_index {
            self.sink.scroll_list_to(index);
        }
        self.sink.move_camera(directive.camera);
    }
}
