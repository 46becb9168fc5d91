use std::collections::BTreeMap;

use tokio::sync::RwLock;

use super::StoreError;
use crate::model::{Quest, QuestId};

/// Row-level persistence behind [`super::QuestStore`].
///
/// Implementations store what they are given; field rules live in
/// [`crate::validation`]. Title ordering is byte-wise ascending with the id
/// as a tie-break, matching SQLite's default `BINARY` collation.
#[async_trait::async_trait]
pub trait QuestStorage: Send + Sync {
    /// Insert or fully replace by id. An unsaved id gets a fresh one.
    async fn upsert(&self, quest: &Quest) -> Result<QuestId, StoreError>;
    /// Replace an existing row. Returns `false` when no row had that id.
    async fn update(&self, quest: &Quest) -> Result<bool, StoreError>;
    async fn delete(&self, id: QuestId) -> Result<bool, StoreError>;
    async fn delete_all(&self) -> Result<usize, StoreError>;
    async fn all_by_title(&self) -> Result<Vec<Quest>, StoreError>;
    async fn by_id(&self, id: QuestId) -> Result<Option<Quest>, StoreError>;
    async fn completed(&self) -> Result<Vec<Quest>, StoreError>;
}

pub(crate) fn sort_by_title(quests: &mut [Quest]) {
    quests.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
}

#[derive(Default)]
struct MemoryState {
    rows: BTreeMap<QuestId, Quest>,
    last_id: i64,
}

/// Volatile backend for tests and the wasm build.
#[derive(Default)]
pub struct MemoryStorage {
    state: RwLock<MemoryState>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl QuestStorage for MemoryStorage {
    async fn upsert(&self, quest: &Quest) -> Result<QuestId, StoreError> {
        let mut state = self.state.write().await;
        let id = if quest.id.is_unsaved() {
            state.last_id = state
                .last_id
                .checked_add(1)
                .ok_or_else(|| StoreError::Storage("quest id space exhausted".into()))?;
            QuestId(state.last_id)
        } else {
            state.last_id = state.last_id.max(quest.id.0);
            quest.id
        };
        let mut row = quest.clone();
        row.id = id;
        state.rows.insert(id, row);
        Ok(id)
    }

    async fn update(&self, quest: &Quest) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        match state.rows.get_mut(&quest.id) {
            Some(row) => {
                *row = quest.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: QuestId) -> Result<bool, StoreError> {
        Ok(self.state.write().await.rows.remove(&id).is_some())
    }

    async fn delete_all(&self) -> Result<usize, StoreError> {
        let mut state = self.state.write().await;
        let count = state.rows.len();
        state.rows.clear();
        Ok(count)
    }

    async fn all_by_title(&self) -> Result<Vec<Quest>, StoreError> {
        let mut quests: Vec<Quest> = self.state.read().await.rows.values().cloned().collect();
        sort_by_title(&mut quests);
        Ok(quests)
    }

    async fn by_id(&self, id: QuestId) -> Result<Option<Quest>, StoreError> {
        Ok(self.state.read().await.rows.get(&id).cloned())
    }

    async fn completed(&self) -> Result<Vec<Quest>, StoreError> {
        let mut quests: Vec<Quest> = self
            .state
            .read()
            .await
            .rows
            .values()
            .filter(|q| q.is_completed)
            .cloned()
            .collect();
        sort_by_title(&mut quests);
        Ok(quests)
    }
}
