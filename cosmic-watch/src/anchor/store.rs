//! Durable thread store.
//!
//! [`ThreadStore`] and [`MessageLog`] are the seams the engine talks to;
//! [`SqliteThreadStore`] implements both on one SQLite connection.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Messages kept per thread; older ones are pruned on insert.
pub const MAX_MESSAGES_PER_THREAD: usize = 100;

/// Durable marker for the start of an object's discussion thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadAnchor {
    /// Object identity (feed id)
    pub identity: String,
    /// Object display name
    pub name: String,
    /// Transport-assigned handle of the anchor message
    pub handle: String,
    pub created_at: DateTime<Utc>,
}

/// One message in a discussion thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub username: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Errors raised by the thread store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Anchor already exists for {0}")]
    Duplicate(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Cannot create store directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("Store task failed: {0}")]
    Task(String),
}

impl From<StoreError> for cosmic_common::Error {
    fn from(err: StoreError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Anchor persistence.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Whether an anchor exists for the identity.
    async fn exists(&self, identity: &str) -> Result<bool, StoreError>;

    /// Persist a new anchor. Fails with [`StoreError::Duplicate`] if one exists.
    async fn insert(&self, anchor: &ThreadAnchor) -> Result<(), StoreError>;

    /// Remove an anchor. Returns whether one existed.
    async fn delete(&self, identity: &str) -> Result<bool, StoreError>;

    /// All anchors, newest first.
    async fn list(&self) -> Result<Vec<ThreadAnchor>, StoreError>;

    /// Anchor whose message carries the given handle.
    async fn find_by_handle(&self, handle: &str) -> Result<Option<ThreadAnchor>, StoreError>;
}

/// Per-thread discussion log.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Append a message, pruning the thread to [`MAX_MESSAGES_PER_THREAD`].
    async fn append(&self, identity: &str, message: &ThreadMessage) -> Result<(), StoreError>;

    /// Messages for a thread, oldest first.
    async fn messages(&self, identity: &str) -> Result<Vec<ThreadMessage>, StoreError>;

    /// Drop every message of a thread. Returns the number removed.
    async fn clear(&self, identity: &str) -> Result<usize, StoreError>;
}

fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{raw}': {e}")))
}

/// SQLite-backed thread store.
#[derive(Clone)]
pub struct SqliteThreadStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteThreadStore {
    /// Open (or create) the store at the given path.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Directory {
                path: parent.display().to_string(),
                source,
            })?;
        }
        Self::init(Connection::open(db_path)?)
    }

    /// Private in-memory store.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    fn row_to_anchor(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String, String)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    }

    fn build_anchor(
        (identity, name, handle, created_at): (String, String, String, String),
    ) -> Result<ThreadAnchor, StoreError> {
        Ok(ThreadAnchor {
            identity,
            name,
            handle,
            created_at: parse_timestamp(&created_at)?,
        })
    }
}

#[async_trait]
impl ThreadStore for SqliteThreadStore {
    async fn exists(&self, identity: &str) -> Result<bool, StoreError> {
        let identity = identity.to_string();
        self.with_conn(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM thread_anchors WHERE identity = ?1",
                    params![identity],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn insert(&self, anchor: &ThreadAnchor) -> Result<(), StoreError> {
        let anchor = anchor.clone();
        self.with_conn(move |conn| {
            let result = conn.execute(
                "INSERT INTO thread_anchors (identity, name, handle, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    anchor.identity,
                    anchor.name,
                    anchor.handle,
                    timestamp(&anchor.created_at)
                ],
            );

            match result {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Err(StoreError::Duplicate(anchor.identity.clone()))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn delete(&self, identity: &str) -> Result<bool, StoreError> {
        let identity = identity.to_string();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "DELETE FROM thread_anchors WHERE identity = ?1",
                params![identity],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn list(&self) -> Result<Vec<ThreadAnchor>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT identity, name, handle, created_at
                 FROM thread_anchors ORDER BY created_at DESC, rowid DESC",
            )?;
            let rows = stmt.query_map([], Self::row_to_anchor)?;

            let mut anchors = Vec::new();
            for row in rows {
                anchors.push(Self::build_anchor(row?)?);
            }
            Ok(anchors)
        })
        .await
    }

    async fn find_by_handle(&self, handle: &str) -> Result<Option<ThreadAnchor>, StoreError> {
        let handle = handle.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT identity, name, handle, created_at
                     FROM thread_anchors WHERE handle = ?1",
                    params![handle],
                    Self::row_to_anchor,
                )
                .optional()?;
            row.map(Self::build_anchor).transpose()
        })
        .await
    }
}

#[async_trait]
impl MessageLog for SqliteThreadStore {
    async fn append(&self, identity: &str, message: &ThreadMessage) -> Result<(), StoreError> {
        let identity = identity.to_string();
        let message = message.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO thread_messages (identity, username, text, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    identity,
                    message.username,
                    message.text,
                    timestamp(&message.created_at)
                ],
            )?;

            let pruned = conn.execute(
                "DELETE FROM thread_messages
                 WHERE identity = ?1 AND id NOT IN (
                     SELECT id FROM thread_messages WHERE identity = ?1
                     ORDER BY id DESC LIMIT ?2
                 )",
                params![identity, MAX_MESSAGES_PER_THREAD as i64],
            )?;
            if pruned > 0 {
                tracing::debug!(identity = %identity, pruned, "Pruned old thread messages");
            }
            Ok(())
        })
        .await
    }

    async fn messages(&self, identity: &str) -> Result<Vec<ThreadMessage>, StoreError> {
        let identity = identity.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT username, text, created_at FROM thread_messages
                 WHERE identity = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![identity], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;

            let mut messages = Vec::new();
            for row in rows {
                let (username, text, created_at) = row?;
                messages.push(ThreadMessage {
                    username,
                    text,
                    created_at: parse_timestamp(&created_at)?,
                });
            }
            Ok(messages)
        })
        .await
    }

    async fn clear(&self, identity: &str) -> Result<usize, StoreError> {
        let identity = identity.to_string();
        self.with_conn(move |conn| {
            Ok(conn.execute(
                "DELETE FROM thread_messages WHERE identity = ?1",
                params![identity],
            )?)
        })
        .await
    }
}
