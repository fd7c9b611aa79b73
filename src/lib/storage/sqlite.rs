use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use tokio::sync::{Mutex, Semaphore};

use super::{StoreError, StoredRow, TableRow, TableStore, Version};

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.into())
    }
}

/// SQLite table backend. The connection lives behind a mutex and every call
/// runs on the blocking pool; the semaphore bounds how many operations queue
/// up on it at once.
pub struct SqliteTable {
    conn: Arc<Mutex<Connection>>,
    semaphore: Arc<Semaphore>,
}

const SELECT_COLUMNS: &str =
    "partition_key, row_key, version, created_at, name, description, is_completed, timestamp";

impl SqliteTable {
    pub fn new(path: &str, max_concurrent_ops: usize) -> Result<Self> {
        Self::with_connection(Connection::open(path)?, max_concurrent_ops)
    }

    pub fn new_memory(max_concurrent_ops: usize) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, max_concurrent_ops)
    }

    fn with_connection(conn: Connection, max_concurrent_ops: usize) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS todos (
                  partition_key TEXT NOT NULL,
                  row_key TEXT NOT NULL,
                  version INTEGER NOT NULL,
                  created_at TEXT NOT NULL,
                  name TEXT NOT NULL,
                  description TEXT,
                  is_completed INTEGER NOT NULL,
                  timestamp TEXT NOT NULL,
                  PRIMARY KEY (partition_key, row_key))
                ",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            semaphore: Arc::new(Semaphore::new(max_concurrent_ops)),
        })
    }
}

#[async_trait]
impl TableStore for SqliteTable {
    async fn insert(&self, row: TableRow) -> Result<StoredRow, StoreError> {
        let permit = self.semaphore.acquire().await.map_err(anyhow::Error::from)?;
        let conn = self.conn.clone();
        let stored = tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let timestamp = Utc::now();
            let result = conn.execute(
                "INSERT INTO todos (partition_key, row_key, version, created_at, name, description, is_completed, timestamp)
                 VALUES (?, ?, 1, ?, ?, ?, ?, ?)",
                params![
                    row.partition_key,
                    row.row_key,
                    row.created_at.to_rfc3339(),
                    row.name,
                    row.description,
                    row.is_completed,
                    timestamp.to_rfc3339(),
                ],
            );
            match result {
                Ok(_) => Ok(StoredRow {
                    row,
                    version: Version(1),
                    timestamp,
                }),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Err(StoreError::RowExists(row.row_key))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(anyhow::Error::from)??;
        drop(permit);
        Ok(stored)
    }

    async fn get(&self, partition: &str, row_key: &str) -> Result<StoredRow, StoreError> {
        let permit = self.semaphore.acquire().await.map_err(anyhow::Error::from)?;
        let conn = self.conn.clone();
        let partition = partition.to_string();
        let row_key = row_key.to_string();
        let stored = tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let found = conn
                .query_row(
                    &format!(
                        "SELECT {SELECT_COLUMNS} FROM todos
                         WHERE partition_key = ? AND row_key = ?"
                    ),
                    params![partition, row_key],
                    read_stored,
                )
                .optional()?;
            found.ok_or(StoreError::NotFound(row_key))
        })
        .await
        .map_err(anyhow::Error::from)??;
        drop(permit);
        Ok(stored)
    }

    async fn scan(&self, partition: &str) -> Result<Vec<StoredRow>, StoreError> {
        let permit = self.semaphore.acquire().await.map_err(anyhow::Error::from)?;
        let conn = self.conn.clone();
        let partition = partition.to_string();
        let rows = tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM todos
                 WHERE partition_key = ? ORDER BY row_key"
            ))?;
            let mapped = stmt.query_map([partition], read_stored)?;
            let mut rows = Vec::new();
            for row in mapped {
                rows.push(row?);
            }
            Ok::<Vec<StoredRow>, StoreError>(rows)
        })
        .await
        .map_err(anyhow::Error::from)??;
        drop(permit);
        Ok(rows)
    }

    async fn replace(&self, row: TableRow, expected: &Version) -> Result<StoredRow, StoreError> {
        let permit = self.semaphore.acquire().await.map_err(anyhow::Error::from)?;
        let conn = self.conn.clone();
        let expected = expected.0;
        let stored = tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let timestamp = Utc::now();
            // created_at is immutable and deliberately left out of the SET list.
            let changed = conn.execute(
                "UPDATE todos
                 SET name = ?, description = ?, is_completed = ?, version = version + 1, timestamp = ?
                 WHERE partition_key = ? AND row_key = ? AND version = ?",
                params![
                    row.name,
                    row.description,
                    row.is_completed,
                    timestamp.to_rfc3339(),
                    row.partition_key,
                    row.row_key,
                    expected as i64,
                ],
            )?;
            if changed == 0 {
                let exists: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM todos WHERE partition_key = ? AND row_key = ?",
                    params![row.partition_key, row.row_key],
                    |r| r.get(0),
                )?;
                return if exists > 0 {
                    Err(StoreError::VersionMismatch(row.row_key))
                } else {
                    Err(StoreError::NotFound(row.row_key))
                };
            }
            Ok(StoredRow {
                row,
                version: Version(expected + 1),
                timestamp,
            })
        })
        .await
        .map_err(anyhow::Error::from)??;
        drop(permit);
        Ok(stored)
    }

    async fn delete(
        &self,
        partition: &str,
        row_key: &str,
        expected: Option<&Version>,
    ) -> Result<(), StoreError> {
        let permit = self.semaphore.acquire().await.map_err(anyhow::Error::from)?;
        let conn = self.conn.clone();
        let partition = partition.to_string();
        let row_key = row_key.to_string();
        let expected = expected.map(|v| v.0 as i64);
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let changed = match expected {
                Some(version) => conn.execute(
                    "DELETE FROM todos WHERE partition_key = ? AND row_key = ? AND version = ?",
                    params![partition, row_key, version],
                )?,
                None => conn.execute(
                    "DELETE FROM todos WHERE partition_key = ? AND row_key = ?",
                    params![partition, row_key],
                )?,
            };
            if changed == 0 {
                if expected.is_some() {
                    let exists: i64 = conn.query_row(
                        "SELECT COUNT(*) FROM todos WHERE partition_key = ? AND row_key = ?",
                        params![partition, row_key],
                        |r| r.get(0),
                    )?;
                    if exists > 0 {
                        return Err(StoreError::VersionMismatch(row_key));
                    }
                }
                return Err(StoreError::NotFound(row_key));
            }
            Ok::<(), StoreError>(())
        })
        .await
        .map_err(anyhow::Error::from)??;
        drop(permit);
        Ok(())
    }
}

fn read_stored(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRow> {
    let created_at: String = row.get(3)?;
    let timestamp: String = row.get(7)?;
    Ok(StoredRow {
        row: TableRow {
            partition_key: row.get(0)?,
            row_key: row.get(1)?,
            created_at: parse_rfc3339(&created_at)?,
            name: row.get(4)?,
            description: row.get(5)?,
            is_completed: row.get(6)?,
        },
        version: Version(row.get::<_, i64>(2)? as u64),
        timestamp: parse_rfc3339(&timestamp)?,
    })
}

fn parse_rfc3339(value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}
