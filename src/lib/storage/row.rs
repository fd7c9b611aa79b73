use chrono::{DateTime, Utc};

use crate::core::Todo;

/// The persisted shape of a todo. The partition key groups every item into
/// one scan set; the row key carries the todo's id and is unique within the
/// partition by construction.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub partition_key: String,
    pub row_key: String,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub description: Option<String>,
    pub is_completed: bool,
}

impl TableRow {
    pub fn from_todo(todo: &Todo, partition: &str) -> Self {
        Self {
            partition_key: partition.to_string(),
            row_key: todo.id.clone(),
            created_at: todo.created_at,
            name: todo.name.clone(),
            description: todo.description.clone(),
            is_completed: todo.is_completed,
        }
    }

    /// The partition key stays behind; version and timestamp never reach the
    /// row in the first place.
    pub fn into_todo(self) -> Todo {
        Todo {
            id: self.row_key,
            created_at: self.created_at,
            name: self.name,
            description: self.description,
            is_completed: self.is_completed,
        }
    }
}
