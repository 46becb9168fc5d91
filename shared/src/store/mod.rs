//! Quest entity store with live query streams.
//!
//! Writes are serialized through a single async gate. Inside the gate the
//! store persists the change, re-reads the table once and pushes fresh
//! snapshots to every live subscription before the write returns, so a
//! subscriber can never observe a partially applied write.

mod storage;

#[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
mod sqlite;

pub use self::storage::{MemoryStorage, QuestStorage};
pub use tokio::sync::mpsc::error::TryRecvError;

#[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
pub use self::sqlite::SqliteStorage;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, instrument, warn};

use crate::model::{Quest, QuestId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("storage lock poisoned")]
    LockPoisoned,

    #[error("store closed")]
    Closed,
}

type Sender<T> = mpsc::UnboundedSender<Result<T, StoreError>>;

/// Live sequence of query snapshots.
///
/// The first item is the snapshot at subscription time; later items follow
/// every relevant write. A persistence failure arrives as a final `Err` and
/// the stream then ends. Dropping the stream cancels the subscription.
pub struct QuestStream<T> {
    rx: mpsc::UnboundedReceiver<Result<T, StoreError>>,
}

impl<T> QuestStream<T> {
    fn channel() -> (Sender<T>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Wait for the next snapshot. `None` once the store is gone or the
    /// stream has been terminated.
    pub async fn recv(&mut self) -> Option<Result<T, StoreError>> {
        self.rx.recv().await
    }

    /// Next snapshot if one is already queued. `Empty` means the stream is
    /// idle; `Disconnected` means it has ended and will never yield again.
    pub fn try_recv(&mut self) -> Result<Result<T, StoreError>, TryRecvError> {
        self.rx.try_recv()
    }
}

impl<T> Stream for QuestStream<T> {
    type Item = Result<T, StoreError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

enum Subscription {
    All {
        tx: Sender<Vec<Quest>>,
    },
    ById {
        id: QuestId,
        last: Option<Quest>,
        tx: Sender<Quest>,
    },
    Completed {
        last: Vec<Quest>,
        tx: Sender<Vec<Quest>>,
    },
}

impl Subscription {
    /// Push the part of `snapshot` this subscription watches. Returns
    /// `false` once the receiving side is gone.
    fn deliver(&mut self, snapshot: &[Quest]) -> bool {
        match self {
            Self::All { tx } => tx.send(Ok(snapshot.to_vec())).is_ok(),
            Self::ById { id, last, tx } => {
                let current = snapshot.iter().find(|q| q.id == *id);
                if current == last.as_ref() {
                    return !tx.is_closed();
                }
                *last = current.cloned();
                match current {
                    Some(quest) => tx.send(Ok(quest.clone())).is_ok(),
                    // A removed row produces no item.
                    None => !tx.is_closed(),
                }
            }
            Self::Completed { last, tx } => {
                let completed: Vec<Quest> =
                    snapshot.iter().filter(|q| q.is_completed).cloned().collect();
                if completed == *last {
                    return !tx.is_closed();
                }
                *last = completed.clone();
                tx.send(Ok(completed)).is_ok()
            }
        }
    }

    fn fail(&self, err: StoreError) {
        // Receivers that are already gone don't need the error.
        match self {
            Self::All { tx } | Self::Completed { tx, .. } => {
                let _ = tx.send(Err(err));
            }
            Self::ById { tx, .. } => {
                let _ = tx.send(Err(err));
            }
        }
    }
}

#[derive(Default)]
struct Registry {
    subscriptions: Vec<Subscription>,
}

/// The persistence boundary for quests.
pub struct QuestStore<S: QuestStorage> {
    storage: Arc<S>,
    gate: Mutex<Registry>,
}

impl<S: QuestStorage> QuestStore<S> {
    pub fn new(storage: Arc<S>) -> Self {
        info!("quest store ready");
        Self {
            storage,
            gate: Mutex::new(Registry::default()),
        }
    }

    /// All quests ordered ascending by title.
    pub async fn stream_all(&self) -> QuestStream<Vec<Quest>> {
        let mut registry = self.gate.lock().await;
        let (tx, stream) = QuestStream::channel();
        match self.storage.all_by_title().await {
            Ok(all) => {
                if tx.send(Ok(all)).is_ok() {
                    registry.subscriptions.push(Subscription::All { tx });
                }
            }
            Err(e) => {
                error!("initial quest query failed: {e}");
                let _ = tx.send(Err(e));
            }
        }
        stream
    }

    /// One quest by id. Emits nothing until a row with that id exists.
    pub async fn stream_by_id(&self, id: QuestId) -> QuestStream<Quest> {
        let mut registry = self.gate.lock().await;
        let (tx, stream) = QuestStream::channel();
        match self.storage.by_id(id).await {
            Ok(current) => {
                if let Some(quest) = &current {
                    let _ = tx.send(Ok(quest.clone()));
                }
                registry.subscriptions.push(Subscription::ById {
                    id,
                    last: current,
                    tx,
                });
            }
            Err(e) => {
                error!(quest_id = %id, "initial quest lookup failed: {e}");
                let _ = tx.send(Err(e));
            }
        }
        stream
    }

    /// Quests flagged completed, ordered by title.
    pub async fn stream_completed(&self) -> QuestStream<Vec<Quest>> {
        let mut registry = self.gate.lock().await;
        let (tx, stream) = QuestStream::channel();
        match self.storage.completed().await {
            Ok(completed) => {
                if tx.send(Ok(completed.clone())).is_ok() {
                    registry.subscriptions.push(Subscription::Completed {
                        last: completed,
                        tx,
                    });
                }
            }
            Err(e) => {
                error!("initial completed-quest query failed: {e}");
                let _ = tx.send(Err(e));
            }
        }
        stream
    }

    #[instrument(skip(self, quest), fields(quest_id = %quest.id))]
    pub async fn upsert(&self, quest: &Quest) -> Result<QuestId, StoreError> {
        let mut registry = self.gate.lock().await;
        let id = self.storage.upsert(quest).await.map_err(|e| {
            error!("failed to persist quest: {e}");
            e
        })?;
        info!(assigned_id = %id, "quest stored");
        self.publish(&mut registry).await;
        Ok(id)
    }

    #[instrument(skip(self, quest), fields(quest_id = %quest.id))]
    pub async fn update(&self, quest: &Quest) -> Result<(), StoreError> {
        let mut registry = self.gate.lock().await;
        let matched = self.storage.update(quest).await.map_err(|e| {
            error!("failed to update quest: {e}");
            e
        })?;
        if matched {
            info!("quest updated");
            self.publish(&mut registry).await;
        } else {
            warn!("update ignored, no quest with that id");
        }
        Ok(())
    }

    #[instrument(skip(self, quest), fields(quest_id = %quest.id))]
    pub async fn delete(&self, quest: &Quest) -> Result<(), StoreError> {
        let mut registry = self.gate.lock().await;
        let removed = self.storage.delete(quest.id).await.map_err(|e| {
            error!("failed to delete quest: {e}");
            e
        })?;
        if removed {
            info!("quest deleted");
            self.publish(&mut registry).await;
        } else {
            debug!("delete ignored, no quest with that id");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_all(&self) -> Result<(), StoreError> {
        let mut registry = self.gate.lock().await;
        let count = self.storage.delete_all().await.map_err(|e| {
            error!("failed to clear quests: {e}");
            e
        })?;
        info!(count, "all quests deleted");
        self.publish(&mut registry).await;
        Ok(())
    }

    /// Number of live subscriptions, counting ones whose receiver was
    /// dropped since the last write.
    pub async fn subscriber_count(&self) -> usize {
        self.gate.lock().await.subscriptions.len()
    }

    async fn publish(&self, registry: &mut Registry) {
        if registry.subscriptions.is_empty() {
            return;
        }
        match self.storage.all_by_title().await {
            Ok(snapshot) => {
                let before = registry.subscriptions.len();
                registry.subscriptions.retain_mut(|sub| sub.deliver(&snapshot));
                let dropped = before - registry.subscriptions.len();
                if dropped > 0 {
                    warn!(dropped, "removed closed subscriptions");
                }
                debug!(
                    subscribers = registry.subscriptions.len(),
                    "published quest snapshot"
                );
            }
            Err(e) => {
                error!("re-query after write failed, terminating streams: {e}");
                for sub in registry.subscriptions.drain(..) {
                    sub.fail(e.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn quest(id: i64, title: &str) -> Quest {
        Quest {
            id: QuestId(id),
            title: title.into(),
            description: String::new(),
            difficulty: 2,
            image_ref: None,
            latitude: 10.0,
            longitude: 20.0,
            author: "GeoQuest".into(),
            is_completed: false,
        }
    }

    fn titles(quests: &[Quest]) -> Vec<&str> {
        quests.iter().map(|q| q.title.as_str()).collect()
    }

    fn memory_store() -> QuestStore<MemoryStorage> {
        QuestStore::new(Arc::new(MemoryStorage::new()))
    }

    /// Wraps a backend and fails reads or writes on demand.
    struct FlakyStorage<S> {
        inner: S,
        fail_writes: AtomicBool,
        fail_reads: AtomicBool,
    }

    impl<S> FlakyStorage<S> {
        fn new(inner: S) -> Self {
            Self {
                inner,
                fail_writes: AtomicBool::new(false),
                fail_reads: AtomicBool::new(false),
            }
        }

        fn write_result(&self) -> Result<(), StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                Err(StoreError::Storage("disk full".into()))
            } else {
                Ok(())
            }
        }

        fn read_result(&self) -> Result<(), StoreError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                Err(StoreError::Storage("database locked".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait::async_trait]
    impl<S: QuestStorage> QuestStorage for FlakyStorage<S> {
        async fn upsert(&self, quest: &Quest) -> Result<QuestId, StoreError> {
            self.write_result()?;
            self.inner.upsert(quest).await
        }
        async fn update(&self, quest: &Quest) -> Result<bool, StoreError> {
            self.write_result()?;
            self.inner.update(quest).await
        }
        async fn delete(&self, id: QuestId) -> Result<bool, StoreError> {
            self.write_result()?;
            self.inner.delete(id).await
        }
        async fn delete_all(&self) -> Result<usize, StoreError> {
            self.write_result()?;
            self.inner.delete_all().await
        }
        async fn all_by_title(&self) -> Result<Vec<Quest>, StoreError> {
            self.read_result()?;
            self.inner.all_by_title().await
        }
        async fn by_id(&self, id: QuestId) -> Result<Option<Quest>, StoreError> {
            self.read_result()?;
            self.inner.by_id(id).await
        }
        async fn completed(&self) -> Result<Vec<Quest>, StoreError> {
            self.read_result()?;
            self.inner.completed().await
        }
    }

    #[tokio::test]
    async fn test_stream_all_replays_then_follows_writes() {
        let store = memory_store();
        store.upsert(&quest(1, "Mill")).await.unwrap();

        let mut stream = store.stream_all().await;
        assert_eq!(titles(&stream.try_recv().unwrap().unwrap()), vec!["Mill"]);
        assert_eq!(stream.try_recv(), Err(TryRecvError::Empty));

        store.upsert(&quest(2, "Abbey")).await.unwrap();
        let next = stream.try_recv().unwrap().unwrap();
        assert_eq!(titles(&next), vec!["Abbey", "Mill"]);
    }

    #[tokio::test]
    async fn test_stream_all_ordered_regardless_of_insertion_order() {
        let store = memory_store();
        for (id, title) in [(1, "Zeppelin"), (2, "Castle"), (3, "Nook"), (4, "Bridge")] {
            store.upsert(&quest(id, title)).await.unwrap();
        }
        let mut stream = store.stream_all().await;
        let all = stream.recv().await.unwrap().unwrap();
        assert_eq!(titles(&all), vec!["Bridge", "Castle", "Nook", "Zeppelin"]);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let once = memory_store();
        let twice = memory_store();
        let q = quest(7, "Windmill");

        once.upsert(&q).await.unwrap();
        twice.upsert(&q).await.unwrap();
        twice.upsert(&q).await.unwrap();

        let a = once.stream_all().await.recv().await.unwrap().unwrap();
        let b = twice.stream_all().await.recv().await.unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(b.len(), 1);
    }

    #[tokio::test]
    async fn test_unsaved_quest_receives_id() {
        let store = memory_store();
        let id = store.upsert(&quest(0, "Fresh")).await.unwrap();
        assert!(!id.is_unsaved());
        let mut stream = store.stream_by_id(id).await;
        assert_eq!(stream.try_recv().unwrap().unwrap().title, "Fresh");
    }

    #[tokio::test]
    async fn test_stream_by_id_waits_for_row() {
        let store = memory_store();
        let mut stream = store.stream_by_id(QuestId(5)).await;
        assert_eq!(stream.try_recv(), Err(TryRecvError::Empty));

        store.upsert(&quest(1, "Other")).await.unwrap();
        assert_eq!(stream.try_recv(), Err(TryRecvError::Empty));

        store.upsert(&quest(5, "Target")).await.unwrap();
        assert_eq!(stream.try_recv().unwrap().unwrap().title, "Target");
    }

    #[tokio::test]
    async fn test_stream_by_id_only_emits_on_change() {
        let store = memory_store();
        store.upsert(&quest(1, "Quay")).await.unwrap();
        let mut stream = store.stream_by_id(QuestId(1)).await;
        stream.try_recv().unwrap().unwrap();

        store.upsert(&quest(2, "Elsewhere")).await.unwrap();
        assert_eq!(stream.try_recv(), Err(TryRecvError::Empty));

        let mut done = quest(1, "Quay");
        done.is_completed = true;
        store.update(&done).await.unwrap();
        assert!(stream.try_recv().unwrap().unwrap().is_completed);

        store.delete(&done).await.unwrap();
        assert_eq!(stream.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_stream_completed() {
        let store = memory_store();
        store.upsert(&quest(1, "Open")).await.unwrap();
        let mut stream = store.stream_completed().await;
        assert!(stream.try_recv().unwrap().unwrap().is_empty());

        let mut finished = quest(2, "Done");
        finished.is_completed = true;
        store.upsert(&finished).await.unwrap();
        let completed = stream.try_recv().unwrap().unwrap();
        assert_eq!(titles(&completed), vec!["Done"]);

        store.upsert(&quest(3, "Another Open")).await.unwrap();
        assert_eq!(stream.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_update_of_missing_row_is_silent() {
        let store = memory_store();
        let mut stream = store.stream_all().await;
        stream.try_recv().unwrap().unwrap();

        store.update(&quest(42, "Ghost")).await.unwrap();
        assert_eq!(stream.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_delete_and_delete_all() {
        let store = memory_store();
        let a = quest(1, "A");
        store.upsert(&a).await.unwrap();
        store.upsert(&quest(2, "B")).await.unwrap();
        let mut stream = store.stream_all().await;
        stream.try_recv().unwrap().unwrap();

        store.delete(&a).await.unwrap();
        assert_eq!(titles(&stream.try_recv().unwrap().unwrap()), vec!["B"]);

        store.delete_all().await.unwrap();
        assert!(stream.try_recv().unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_get_identical_snapshots() {
        let store = memory_store();
        let mut first = store.stream_all().await;
        let mut second = store.stream_all().await;
        store.upsert(&quest(1, "Shared")).await.unwrap();

        first.try_recv().unwrap().unwrap();
        second.try_recv().unwrap().unwrap();
        assert_eq!(
            first.try_recv().unwrap().unwrap(),
            second.try_recv().unwrap().unwrap()
        );
    }

    #[tokio::test]
    async fn test_dropped_stream_is_unregistered() {
        let store = memory_store();
        let stream = store.stream_all().await;
        let _kept = store.stream_completed().await;
        assert_eq!(store.subscriber_count().await, 2);

        drop(stream);
        store.upsert(&quest(1, "Trigger")).await.unwrap();
        assert_eq!(store.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_writes_are_all_applied() {
        let store = Arc::new(memory_store());
        let mut stream = store.stream_all().await;
        stream.try_recv().unwrap().unwrap();

        let handles: Vec<_> = (1..=20)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.upsert(&quest(i, &format!("Quest {i:02}"))).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut sizes = Vec::new();
        while let Ok(snapshot) = stream.try_recv() {
            sizes.push(snapshot.unwrap().len());
        }
        assert_eq!(sizes, (1..=20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let storage = Arc::new(FlakyStorage::new(MemoryStorage::new()));
        let store = QuestStore::new(Arc::clone(&storage));
        let mut stream = store.stream_all().await;
        stream.try_recv().unwrap().unwrap();

        storage.fail_writes.store(true, Ordering::SeqCst);
        let err = store.upsert(&quest(1, "Lost")).await.unwrap_err();
        assert_eq!(err, StoreError::Storage("disk full".into()));
        assert_eq!(stream.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_read_failure_terminates_streams() {
        let storage = Arc::new(FlakyStorage::new(MemoryStorage::new()));
        let store = QuestStore::new(Arc::clone(&storage));
        let mut stream = store.stream_all().await;
        stream.try_recv().unwrap().unwrap();

        storage.fail_reads.store(true, Ordering::SeqCst);
        store.upsert(&quest(1, "Written")).await.unwrap();

        assert!(matches!(stream.recv().await, Some(Err(StoreError::Storage(_)))));
        assert!(stream.recv().await.is_none());
        assert_eq!(store.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_try_recv_tells_idle_from_ended() {
        let storage = Arc::new(FlakyStorage::new(MemoryStorage::new()));
        let store = QuestStore::new(Arc::clone(&storage));
        let mut stream = store.stream_all().await;
        stream.try_recv().unwrap().unwrap();
        assert_eq!(stream.try_recv(), Err(TryRecvError::Empty));

        storage.fail_reads.store(true, Ordering::SeqCst);
        store.upsert(&quest(1, "Written")).await.unwrap();
        assert!(matches!(stream.try_recv(), Ok(Err(StoreError::Storage(_)))));
        assert_eq!(stream.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[tokio::test]
    async fn test_failed_subscribe_yields_error_then_ends() {
        let storage = Arc::new(FlakyStorage::new(MemoryStorage::new()));
        storage.fail_reads.store(true, Ordering::SeqCst);
        let store = QuestStore::new(Arc::clone(&storage));

        let items: Vec<_> = store.stream_completed().await.collect().await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }
}
