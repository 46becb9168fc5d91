//! Typed access to quests for the presentation layer.
//!
//! Higher layers hold a `dyn QuestRepository` (or a generic bound on it)
//! and never touch the storage engine directly.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::CoreConfig;
use crate::model::{Quest, QuestDraft, QuestId};
use crate::settings::SettingsState;
#[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
use crate::store::SqliteStorage;
use crate::store::{MemoryStorage, QuestStorage, QuestStore, QuestStream, StoreError};
use crate::validation::{check_difficulty, check_quest_details, DescriptionPolicy, ValidationError};

#[async_trait]
pub trait QuestRepository: Send + Sync {
    /// Every quest, title-ordered, re-emitted on each change.
    async fn get_all_quests(&self) -> QuestStream<Vec<Quest>>;

    /// One quest. Silent until a row with `id` exists.
    async fn get_quest(&self, id: QuestId) -> QuestStream<Quest>;

    async fn get_completed_quests(&self) -> QuestStream<Vec<Quest>>;

    /// Insert, or replace the row with the same id.
    async fn add_quest(&self, quest: &Quest) -> Result<QuestId, StoreError>;

    async fn update_quest(&self, quest: &Quest) -> Result<(), StoreError>;

    async fn delete_quest(&self, quest: &Quest) -> Result<(), StoreError>;

    async fn delete_all_quests(&self) -> Result<(), StoreError>;
}

/// Repository backed by a [`QuestStore`].
pub struct LocalQuestRepository<S: QuestStorage> {
    store: Arc<QuestStore<S>>,
}

impl<S: QuestStorage> Clone for LocalQuestRepository<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: QuestStorage> LocalQuestRepository<S> {
    pub fn new(store: Arc<QuestStore<S>>) -> Self {
        Self { store }
    }

    pub fn from_storage(storage: S) -> Self {
        Self::new(Arc::new(QuestStore::new(Arc::new(storage))))
    }

    pub fn store(&self) -> &Arc<QuestStore<S>> {
        &self.store
    }
}

#[async_trait]
impl<S: QuestStorage + 'static> QuestRepository for LocalQuestRepository<S> {
    async fn get_all_quests(&self) -> QuestStream<Vec<Quest>> {
        self.store.stream_all().await
    }

    async fn get_quest(&self, id: QuestId) -> QuestStream<Quest> {
        self.store.stream_by_id(id).await
    }

    async fn get_completed_quests(&self) -> QuestStream<Vec<Quest>> {
        self.store.stream_completed().await
    }

    async fn add_quest(&self, quest: &Quest) -> Result<QuestId, StoreError> {
        self.store.upsert(quest).await
    }

    async fn update_quest(&self, quest: &Quest) -> Result<(), StoreError> {
        self.store.update(quest).await
    }

    async fn delete_quest(&self, quest: &Quest) -> Result<(), StoreError> {
        self.store.delete(quest).await
    }

    async fn delete_all_quests(&self) -> Result<(), StoreError> {
        self.store.delete_all().await
    }
}

/// Open the repository `config` asks for: the SQLite file at
/// `database_path`, or an in-memory store when no path is set.
pub fn open_repository(config: &CoreConfig) -> Result<Arc<dyn QuestRepository>, StoreError> {
    match &config.database_path {
        #[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
        Some(path) => Ok(Arc::new(LocalQuestRepository::from_storage(
            SqliteStorage::open(path)?,
        ))),
        #[cfg(not(all(feature = "sqlite", not(target_arch = "wasm32"))))]
        Some(path) => Err(StoreError::Storage(format!(
            "built without SQLite, cannot open {}",
            path.display()
        ))),
        None => {
            info!("no database path configured, keeping quests in memory");
            Ok(Arc::new(LocalQuestRepository::from_storage(
                MemoryStorage::new(),
            )))
        }
    }
}

/// Result of [`save_quest`]. A rejected draft is not an error.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(QuestId),
    Rejected(ValidationError),
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved(_))
    }

    pub fn saved_id(&self) -> Option<QuestId> {
        match self {
            SaveOutcome::Saved(id) => Some(*id),
            SaveOutcome::Rejected(_) => None,
        }
    }
}

/// Validate a draft and write it. The author is always the current user.
#[instrument(skip_all, fields(title_len = draft.title.chars().count()))]
pub async fn save_quest<R>(
    repo: &R,
    mut draft: QuestDraft,
    policy: DescriptionPolicy,
    settings: &SettingsState,
) -> Result<SaveOutcome, StoreError>
where
    R: QuestRepository + ?Sized,
{
    draft.author = settings.user_name().to_string();

    let checked = check_quest_details(&draft, policy).and_then(|()| check_difficulty(draft.difficulty));
    if let Err(reason) = checked {
        warn!(%reason, "quest draft rejected");
        return Ok(SaveOutcome::Rejected(reason));
    }

    let id = repo.add_quest(&draft.into_quest()).await?;
    info!(quest_id = %id, "quest saved");
    Ok(SaveOutcome::Saved(id))
}

/// First emission of `get_quest(id)`. Waits indefinitely for the row to
/// appear; wrap in a timeout if a definite answer is needed.
pub async fn await_quest<R>(repo: &R, id: QuestId) -> Result<Quest, StoreError>
where
    R: QuestRepository + ?Sized,
{
    let mut stream = repo.get_quest(id).await;
    stream.recv().await.unwrap_or(Err(StoreError::Closed))
}

/// Demo quests inserted from the developer options screen.
pub fn sample_quests() -> Vec<Quest> {
    [
        ("Big Ben", "Find the clock tower by the river.", 1, 51.5007, -0.1246),
        ("Eiffel Tower", "Climb to the second floor!", 2, 48.8584, 2.2945),
        ("Colosseum", "Count the arches on the outer wall.", 3, 41.8902, 12.4922),
        ("Sagrada Familia", "Spot the Nativity facade.", 3, 41.4036, 2.1744),
        ("Brandenburg Gate", "Walk through the central arch.", 2, 52.5163, 13.3777),
        ("Matterhorn Base", "Reach the hut at Hornli before noon.", 5, 45.9763, 7.6586),
    ]
    .into_iter()
    .map(|(title, description, difficulty, latitude, longitude)| Quest {
        id: QuestId::UNSAVED,
        title: title.to_string(),
        description: description.to_string(),
        difficulty,
        image_ref: None,
        latitude,
        longitude,
        author: crate::settings::DEFAULT_USER_NAME.to_string(),
        is_completed: false,
    })
    .collect()
}

#[instrument(skip_all)]
pub async fn populate_sample_quests<R>(repo: &R) -> Result<usize, StoreError>
where
    R: QuestRepository + ?Sized,
{
    let quests = sample_quests();
    for quest in &quests {
        repo.add_quest(quest).await?;
    }
    info!(count = quests.len(), "sample quests inserted");
    Ok(quests.len())
}

#[instrument(skip_all)]
pub async fn clear_all<R>(repo: &R) -> Result<(), StoreError>
where
    R: QuestRepository + ?Sized,
{
    repo.delete_all_quests().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStorage, TryRecvError};
    use crate::validation::validate_quest_details;

    fn repo() -> LocalQuestRepository<MemoryStorage> {
        LocalQuestRepository::from_storage(MemoryStorage::new())
    }

    fn draft(title: &str) -> QuestDraft {
        QuestDraft {
            title: title.into(),
            description: "Look behind the old oak".into(),
            difficulty: 3,
            latitude: 10.0,
            longitude: 20.0,
            ..QuestDraft::default()
        }
    }

    #[tokio::test]
    async fn test_save_stamps_author() {
        let repo = repo();
        let settings = SettingsState::default().with_user_name("Mapper");

        let outcome = save_quest(&repo, draft("Oak Tree"), DescriptionPolicy::SIMPLE, &settings)
            .await
            .unwrap();
        let id = outcome.saved_id().unwrap();

        let quest = await_quest(&repo, id).await.unwrap();
        assert_eq!(quest.author, "Mapper");
        assert_eq!(quest.title, "Oak Tree");
        assert!(!quest.is_completed);
    }

    #[tokio::test]
    async fn test_invalid_draft_is_not_written() {
        let repo = repo();
        let settings = SettingsState::default();
        let mut all = repo.get_all_quests().await;
        assert_eq!(all.recv().await.unwrap().unwrap(), Vec::<Quest>::new());

        let bad = draft("Oak_Tree");
        assert!(!validate_quest_details(&bad, DescriptionPolicy::EXTENDED));
        let outcome = save_quest(&repo, bad, DescriptionPolicy::EXTENDED, &settings)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SaveOutcome::Rejected(ValidationError::InvalidTitleCharacters)
        );
        assert_eq!(all.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_difficulty_out_of_range_is_rejected() {
        let repo = repo();
        let mut d = draft("Oak Tree");
        d.difficulty = 6;
        let outcome = save_quest(&repo, d, DescriptionPolicy::EXTENDED, &SettingsState::default())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SaveOutcome::Rejected(ValidationError::DifficultyOutOfRange(6))
        );
    }

    #[tokio::test]
    async fn test_description_policy_applies() {
        let repo = repo();
        let mut d = draft("Long Walk");
        d.description = "a".repeat(300);
        let settings = SettingsState::default();

        let simple = save_quest(&repo, d.clone(), DescriptionPolicy::SIMPLE, &settings)
            .await
            .unwrap();
        assert!(!simple.is_saved());

        let extended = save_quest(&repo, d, DescriptionPolicy::EXTENDED, &settings)
            .await
            .unwrap();
        assert!(extended.is_saved());
    }

    #[tokio::test]
    async fn test_await_quest_resolves_when_row_appears() {
        let repo = repo();
        let writer = repo.clone();

        let pending = tokio::spawn(async move { await_quest(&writer, QuestId(1)).await });
        tokio::task::yield_now().await;

        let mut quest = draft("Late Arrival").into_quest();
        quest.id = QuestId(1);
        repo.add_quest(&quest).await.unwrap();

        let found = pending.await.unwrap().unwrap();
        assert_eq!(found.title, "Late Arrival");
    }

    #[tokio::test]
    async fn test_completed_and_update() {
        let repo = repo();
        let id = repo.add_quest(&draft("Oak Tree").into_quest()).await.unwrap();
        let mut completed = repo.get_completed_quests().await;
        assert!(completed.recv().await.unwrap().unwrap().is_empty());

        let mut quest = await_quest(&repo, id).await.unwrap();
        quest.is_completed = true;
        repo.update_quest(&quest).await.unwrap();

        let done = completed.recv().await.unwrap().unwrap();
        assert_eq!(done, vec![quest.clone()]);

        repo.delete_quest(&quest).await.unwrap();
        assert!(completed.recv().await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sample_data_populate_and_clear() {
        let repo = repo();
        let inserted = populate_sample_quests(&repo).await.unwrap();
        assert_eq!(inserted, sample_quests().len());

        let mut all = repo.get_all_quests().await;
        let quests = all.recv().await.unwrap().unwrap();
        assert_eq!(quests.len(), inserted);
        assert!(quests.windows(2).all(|w| w[0].title <= w[1].title));
        assert!(quests
            .iter()
            .all(|q| validate_quest_details(&q.to_draft(), DescriptionPolicy::SIMPLE)));

        clear_all(&repo).await.unwrap();
        assert!(all.recv().await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_repository_without_path_is_in_memory() {
        let repo = open_repository(&CoreConfig::default()).unwrap();
        let id = repo.add_quest(&draft("Pier").into_quest()).await.unwrap();
        assert_eq!(await_quest(repo.as_ref(), id).await.unwrap().title, "Pier");
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_open_repository_uses_database_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig {
            database_path: Some(dir.path().join("quests.db")),
            ..CoreConfig::default()
        };

        let first = open_repository(&config).unwrap();
        let id = first.add_quest(&draft("Lighthouse").into_quest()).await.unwrap();
        drop(first);

        let reopened = open_repository(&config).unwrap();
        assert_eq!(
            await_quest(reopened.as_ref(), id).await.unwrap().title,
            "Lighthouse"
        );
    }

    #[tokio::test]
    async fn test_usable_as_trait_object() {
        let repo: Arc<dyn QuestRepository> = Arc::new(repo());
        let outcome = save_quest(
            repo.as_ref(),
            draft("Dyn Quest"),
            DescriptionPolicy::default(),
            &SettingsState::default(),
        )
        .await
        .unwrap();
        assert!(outcome.is_saved());
    }
}
