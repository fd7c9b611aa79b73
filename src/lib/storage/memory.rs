use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{StoreError, StoredRow, TableRow, TableStore, Version};

/// In-memory table backend. The BTreeMap keeps rows in (partition, row key)
/// order, which is the scan order the trait promises.
#[derive(Default)]
pub struct MemoryTable {
    rows: RwLock<BTreeMap<(String, String), StoredRow>>,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TableStore for MemoryTable {
    async fn insert(&self, row: TableRow) -> Result<StoredRow, StoreError> {
        let mut rows = self.rows.write().await;
        let key = (row.partition_key.clone(), row.row_key.clone());
        if rows.contains_key(&key) {
            return Err(StoreError::RowExists(row.row_key));
        }
        let stored = StoredRow {
            row,
            version: Version(1),
            timestamp: Utc::now(),
        };
        rows.insert(key, stored.clone());
        Ok(stored)
    }

    async fn get(&self, partition: &str, row_key: &str) -> Result<StoredRow, StoreError> {
        let rows = self.rows.read().await;
        rows.get(&(partition.to_string(), row_key.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(row_key.to_string()))
    }

    async fn scan(&self, partition: &str) -> Result<Vec<StoredRow>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|stored| stored.row.partition_key == partition)
            .cloned()
            .collect())
    }

    async fn replace(&self, row: TableRow, expected: &Version) -> Result<StoredRow, StoreError> {
        let mut rows = self.rows.write().await;
        let key = (row.partition_key.clone(), row.row_key.clone());
        let Some(current) = rows.get_mut(&key) else {
            return Err(StoreError::NotFound(row.row_key));
        };
        if current.version != *expected {
            return Err(StoreError::VersionMismatch(row.row_key));
        }
        current.row = row;
        current.version = Version(current.version.0 + 1);
        current.timestamp = Utc::now();
        Ok(current.clone())
    }

    async fn delete(
        &self,
        partition: &str,
        row_key: &str,
        expected: Option<&Version>,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        let key = (partition.to_string(), row_key.to_string());
        match rows.get(&key) {
            None => Err(StoreError::NotFound(row_key.to_string())),
            Some(current) => {
                if let Some(expected) = expected {
                    if current.version != *expected {
                        return Err(StoreError::VersionMismatch(row_key.to_string()));
                    }
                }
                rows.remove(&key);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(key: &str) -> TableRow {
        TableRow {
            partition_key: "TODO".to_string(),
            row_key: key.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            name: "Buy milk".to_string(),
            description: None,
            is_completed: false,
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_row_key() {
        let table = MemoryTable::new();
        table.insert(row("a")).await.unwrap();
        let err = table.insert(row("a")).await.unwrap_err();
        assert!(matches!(err, StoreError::RowExists(_)));
    }

    #[tokio::test]
    async fn replace_rejects_stale_version() {
        let table = MemoryTable::new();
        let first = table.insert(row("a")).await.unwrap();

        let replaced = table.replace(row("a"), &first.version).await.unwrap();
        assert_eq!(replaced.version, Version(2));

        // The token from before the replace no longer proves anything.
        let err = table.replace(row("a"), &first.version).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionMismatch(_)));
    }

    #[tokio::test]
    async fn delete_with_none_ignores_version() {
        let table = MemoryTable::new();
        table.insert(row("a")).await.unwrap();
        table.replace(row("a"), &Version(1)).await.unwrap();

        table.delete("TODO", "a", None).await.unwrap();
        let err = table.delete("TODO", "a", None).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_with_version_checks_it() {
        let table = MemoryTable::new();
        table.insert(row("a")).await.unwrap();
        let current = table.replace(row("a"), &Version(1)).await.unwrap();

        let err = table.delete("TODO", "a", Some(&Version(1))).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionMismatch(_)));
        table.delete("TODO", "a", Some(&current.version)).await.unwrap();
    }

    #[tokio::test]
    async fn scan_returns_partition_in_row_key_order() {
        let table = MemoryTable::new();
        table.insert(row("b")).await.unwrap();
        table.insert(row("a")).await.unwrap();
        let mut other = row("c");
        other.partition_key = "OTHER".to_string();
        table.insert(other).await.unwrap();

        let scanned = table.scan("TODO").await.unwrap();
        let keys: Vec<&str> = scanned.iter().map(|s| s.row.row_key.as_str()).collect();
        assert_eq!(keys, ["a", "b"]);
    }
}
