use std::sync::Arc;

use crate::core::{Clock, CreateTodo, IdSource, RandomIds, SystemClock, Todo, TodoError, UpdateTodo};
use crate::storage::{StoreError, TableRow, TableStore};

#[cfg(feature = "tracing")]
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Every todo lives under this one partition, so the whole collection is
    /// a single scan set. Repartitioning means changing this value, not the
    /// operation logic.
    pub partition: String,
    /// Extra fetch-merge-replace rounds after a version mismatch before the
    /// update is surfaced as a conflict.
    pub conflict_retries: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            partition: "TODO".to_string(),
            conflict_retries: 3,
        }
    }
}

pub struct TodoService<S: TableStore + Send + Sync + 'static> {
    store: Arc<S>,
    config: ServiceConfig,
    ids: Arc<dyn IdSource>,
    clock: Arc<dyn Clock>,
}

impl<S: TableStore + Send + Sync + 'static> TodoService<S> {
    pub fn new(store: Arc<S>, config: ServiceConfig) -> Self {
        Self {
            store,
            config,
            ids: Arc::new(RandomIds),
            clock: Arc::new(SystemClock),
        }
    }

    /// Swap the id and time sources, so tests can pin both.
    pub fn with_sources(mut self, ids: Arc<dyn IdSource>, clock: Arc<dyn Clock>) -> Self {
        self.ids = ids;
        self.clock = clock;
        self
    }

    pub async fn create(&self, input: CreateTodo) -> Result<Todo, TodoError> {
        if input.name.trim().is_empty() {
            return Err(TodoError::Validation(
                "name must be a non-empty string".to_string(),
            ));
        }

        let todo = Todo {
            id: self.ids.next_id(),
            created_at: self.clock.now(),
            name: input.name,
            description: None,
            is_completed: false,
        };
        let row = TableRow::from_todo(&todo, &self.config.partition);
        // An id collision would come back as RowExists here; it is not retried.
        self.store.insert(row).await.map_err(TodoError::Storage)?;

        #[cfg(feature = "tracing")]
        info!(id = %todo.id, "Created todo");
        Ok(todo)
    }

    /// Scans the whole partition into memory. Acceptable only while the
    /// collection stays small; pagination is out of scope for this service.
    pub async fn list(&self) -> Result<Vec<Todo>, TodoError> {
        let rows = self
            .store
            .scan(&self.config.partition)
            .await
            .map_err(TodoError::Storage)?;

        #[cfg(feature = "tracing")]
        info!(count = rows.len(), "Listing todos");
        Ok(rows.into_iter().map(|stored| stored.row.into_todo()).collect())
    }

    pub async fn get(&self, id: &str) -> Result<Todo, TodoError> {
        match self.store.get(&self.config.partition, id).await {
            Ok(stored) => Ok(stored.row.into_todo()),
            Err(StoreError::NotFound(_)) => Err(TodoError::NotFound(id.to_string())),
            Err(e) => Err(TodoError::Storage(e)),
        }
    }

    /// Fetch, merge, then conditionally replace on the version read at fetch
    /// time. A concurrent writer makes the replace come back as a version
    /// mismatch; the whole round is retried a bounded number of times before
    /// the update is reported as a conflict.
    pub async fn update(&self, id: &str, patch: UpdateTodo) -> Result<Todo, TodoError> {
        let mut attempts = 0;
        loop {
            let stored = match self.store.get(&self.config.partition, id).await {
                Ok(stored) => stored,
                Err(StoreError::NotFound(_)) => return Err(TodoError::NotFound(id.to_string())),
                Err(e) => return Err(TodoError::Storage(e)),
            };
            let version = stored.version;
            let mut row = stored.row;
            apply_patch(&mut row, &patch);

            match self.store.replace(row, &version).await {
                Ok(replaced) => {
                    #[cfg(feature = "tracing")]
                    info!(id = %id, "Updated todo");
                    return Ok(replaced.row.into_todo());
                }
                Err(StoreError::VersionMismatch(_)) if attempts < self.config.conflict_retries => {
                    attempts += 1;
                    #[cfg(feature = "tracing")]
                    warn!(id = %id, attempts, "Version mismatch, retrying update");
                }
                Err(StoreError::VersionMismatch(_)) => {
                    return Err(TodoError::Conflict(id.to_string()));
                }
                Err(StoreError::NotFound(_)) => return Err(TodoError::NotFound(id.to_string())),
                Err(e) => return Err(TodoError::Storage(e)),
            }
        }
    }

    /// Deletes regardless of the row's current version, so no read is needed
    /// first. A second delete of the same id reports not-found.
    pub async fn delete(&self, id: &str) -> Result<(), TodoError> {
        match self.store.delete(&self.config.partition, id, None).await {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                info!(id = %id, "Deleted todo");
                Ok(())
            }
            Err(StoreError::NotFound(_)) => Err(TodoError::NotFound(id.to_string())),
            Err(e) => Err(TodoError::Storage(e)),
        }
    }
}

// Merge-on-update: text fields only overwrite when supplied non-empty, so a
// stored value can never be blanked. is_completed overwrites whenever it is
// supplied, including an explicit false.
fn apply_patch(row: &mut TableRow, patch: &UpdateTodo) {
    if let Some(name) = &patch.name {
        if !name.is_empty() {
            row.name = name.clone();
        }
    }
    if let Some(description) = &patch.description {
        if !description.is_empty() {
            row.description = Some(description.clone());
        }
    }
    if let Some(is_completed) = patch.is_completed {
        row.is_completed = is_completed;
    }
}
