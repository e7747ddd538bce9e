//! SQLite-backed durable key/value storage.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use tokio::sync::Mutex;

use crate::clock::{Clock, SystemClock};

use super::{StorageAdapter, StorageError, StorageResult};

/// SQLite implementation of [`crate::persist::StorageAdapter`].
///
/// Survives process restarts. Every call runs on the blocking pool.
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Opens or creates a SQLite-backed store at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Opens an in-memory SQLite store.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StorageResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            f(&*conn)
        })
        .await
        .map_err(|e| StorageError::Join(e.to_string()))?
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let key = key.to_string();
        self.run(move |conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
            .map_err(|e| StorageError::ReadFailed {
                key: key.clone(),
                reason: e.to_string(),
            })
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let key = key.to_string();
        let value = value.to_string();
        let ts_ms = SystemClock.now_ms();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO kv(key, value, updated_ms) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_ms = excluded.updated_ms",
                params![key, value, ts_ms as i64],
            )
            .map(|_| ())
            .map_err(|e| StorageError::WriteFailed {
                key: key.clone(),
                reason: e.to_string(),
            })
        })
        .await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let key = key.to_string();
        self.run(move |conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
                .map(|_| ())
                .map_err(|e| StorageError::DeleteFailed {
                    key: key.clone(),
                    reason: e.to_string(),
                })
        })
        .await
    }
}
