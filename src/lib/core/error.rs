use thiserror::Error;

use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum TodoError {
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Todo {0} not found")]
    NotFound(String),
    #[error("Write conflict on todo {0}")]
    Conflict(String),
    #[error("Storage error: {0}")]
    Storage(#[source] StoreError),
}
