use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{ params, Connection, OpenFlags, OptionalExtension };
use serde_json::Value;
use std::path::{ Path, PathBuf };
use std::sync::{ Arc, Mutex };

use super::{ StateStore, StoreError };
use crate::models::state::STATE_ID;

/// Single-row table `memory(id, state, updated_at)`. `updated_at` is written
/// on every save and never consulted.
pub struct SqliteStateStore {
    db_path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStateStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open_with_flags(
            &db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        Self::init(&conn)?;
        Ok(Self { db_path, conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self { db_path: PathBuf::from(":memory:"), conn: Arc::new(Mutex::new(conn)) })
    }

    fn init(conn: &Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS memory (
                id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );"
        )
    }

    /// Runs `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
        where T: Send + 'static, F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| StoreError::Task(format!("connection lock poisoned: {}", e)))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn get(&self) -> Result<Option<Value>, StoreError> {
        let raw: Option<String> = self.with_conn(|conn| {
            Ok(
                conn
                    .query_row("SELECT state FROM memory WHERE id = ?1", params![STATE_ID], |row|
                        row.get(0)
                    )
                    .optional()?
            )
        }).await?;

        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, state: &Value) -> Result<(), StoreError> {
        let text = serde_json::to_string(state)?;
        let updated_at = Utc::now().to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO memory (id, state, updated_at) VALUES (?1, ?2, ?3)",
                params![STATE_ID, text, updated_at]
            )?;
            Ok(())
        }).await
    }

    fn describe(&self) -> String {
        format!("sqlite at {}", self.db_path.display())
    }
}
