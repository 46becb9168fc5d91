use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use super::storage::QuestStorage;
use super::StoreError;
use crate::model::{Quest, QuestId};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS quest (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    questTitle TEXT NOT NULL,
    questDescription TEXT NOT NULL,
    questDifficulty INTEGER NOT NULL,
    questImageUri TEXT,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    author TEXT NOT NULL,
    isCompleted INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_quest_title ON quest(questTitle);
CREATE INDEX IF NOT EXISTS idx_quest_completed ON quest(isCompleted);
"#;

const COLUMNS: &str = "id, questTitle, questDescription, questDifficulty, questImageUri, \
                       latitude, longitude, author, isCompleted";

fn backend(e: rusqlite::Error) -> StoreError {
    StoreError::Storage(e.to_string())
}

fn quest_from_row(row: &Row<'_>) -> rusqlite::Result<Quest> {
    Ok(Quest {
        id: QuestId(row.get(0)?),
        title: row.get(1)?,
        description: row.get(2)?,
        difficulty: row.get(3)?,
        image_ref: row.get(4)?,
        latitude: row.get(5)?,
        longitude: row.get(6)?,
        author: row.get(7)?,
        is_completed: row.get(8)?,
    })
}

/// SQLite-backed quest table.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref()).map_err(backend)?;
        info!(path = %path.as_ref().display(), "opened quest database");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory().map_err(backend)?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA).map_err(backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn query_list(&self, sql: &str) -> Result<Vec<Quest>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).map_err(backend)?;
        let rows = stmt.query_map([], quest_from_row).map_err(backend)?;
        let quests = rows.collect::<Result<Vec<_>, _>>().map_err(backend)?;
        Ok(quests)
    }
}

#[async_trait::async_trait]
impl QuestStorage for SqliteStorage {
    async fn upsert(&self, quest: &Quest) -> Result<QuestId, StoreError> {
        let conn = self.conn()?;
        let key = if quest.id.is_unsaved() { None } else { Some(quest.id.0) };
        conn.execute(
            &format!("INSERT OR REPLACE INTO quest ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
            params![
                key,
                quest.title,
                quest.description,
                quest.difficulty,
                quest.image_ref,
                quest.latitude,
                quest.longitude,
                quest.author,
                quest.is_completed,
            ],
        )
        .map_err(backend)?;
        Ok(match key {
            Some(id) => QuestId(id),
            None => QuestId(conn.last_insert_rowid()),
        })
    }

    async fn update(&self, quest: &Quest) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE quest SET questTitle = ?2, questDescription = ?3, questDifficulty = ?4, \
                 questImageUri = ?5, latitude = ?6, longitude = ?7, author = ?8, isCompleted = ?9 \
                 WHERE id = ?1",
                params![
                    quest.id.0,
                    quest.title,
                    quest.description,
                    quest.difficulty,
                    quest.image_ref,
                    quest.latitude,
                    quest.longitude,
                    quest.author,
                    quest.is_completed,
                ],
            )
            .map_err(backend)?;
        Ok(changed > 0)
    }

    async fn delete(&self, id: QuestId) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let changed = conn
            .execute("DELETE FROM quest WHERE id = ?1", params![id.0])
            .map_err(backend)?;
        Ok(changed > 0)
    }

    async fn delete_all(&self) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM quest", []).map_err(backend)
    }

    async fn all_by_title(&self) -> Result<Vec<Quest>, StoreError> {
        self.query_list(&format!(
            "SELECT {COLUMNS} FROM quest ORDER BY questTitle ASC, id ASC"
        ))
    }

    async fn by_id(&self, id: QuestId) -> Result<Option<Quest>, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM quest WHERE id = ?1"),
            params![id.0],
            quest_from_row,
        )
        .optional()
        .map_err(backend)
    }

    async fn completed(&self) -> Result<Vec<Quest>, StoreError> {
        self.query_list(&format!(
            "SELECT {COLUMNS} FROM quest WHERE isCompleted = 1 ORDER BY questTitle ASC, id ASC"
        ))
    }
}
