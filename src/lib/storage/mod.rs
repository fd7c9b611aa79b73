pub mod memory;
pub mod row;
#[cfg(feature = "storage")]
pub mod sqlite;

pub use memory::*;
pub use row::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Opaque write token handed out by the store on every read. A conditional
/// replace must present the token from the read it is based on; the store
/// rejects it if any write landed in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version(pub u64);

/// A row together with the store-managed metadata the application never sets.
#[derive(Debug, Clone)]
pub struct StoredRow {
    pub row: TableRow,
    pub version: Version,
    pub timestamp: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Row {0} not found")]
    NotFound(String),
    #[error("Row {0} already exists")]
    RowExists(String),
    #[error("Version mismatch on row {0}")]
    VersionMismatch(String),
    #[error("Storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

#[async_trait]
pub trait TableStore: Send + Sync {
    /// Unconditional insert of a new row.
    async fn insert(&self, row: TableRow) -> Result<StoredRow, StoreError>;
    /// Point lookup by (partition, row key).
    async fn get(&self, partition: &str, row_key: &str) -> Result<StoredRow, StoreError>;
    /// Full partition scan in the store's native row-key order, materialized
    /// in memory.
    async fn scan(&self, partition: &str) -> Result<Vec<StoredRow>, StoreError>;
    /// Replace the row only if its stored version still equals `expected`.
    async fn replace(&self, row: TableRow, expected: &Version) -> Result<StoredRow, StoreError>;
    /// Delete by key. `None` ignores the current version and deletes
    /// unconditionally.
    async fn delete(
        &self,
        partition: &str,
        row_key: &str,
        expected: Option<&Version>,
    ) -> Result<(), StoreError>;
}
