use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::column::ColumnKey;

/// A task record as persisted by the Task API.
///
/// Order inside a column lives in `above_task_id` only. Any `position`
/// field sent by the server is ignored on deserialization and never sent
/// back; ranks are recomputed locally from the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub column_id: Option<Uuid>,
    #[serde(default)]
    pub above_task_id: Option<Uuid>,
    pub board_id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn column(&self) -> ColumnKey {
        ColumnKey::from(self.column_id)
    }

    pub fn with_above_task(self, above_task_id: Option<Uuid>) -> Self {
        Self {
            above_task_id,
            ..self
        }
    }

    pub fn with_column(self, column: ColumnKey) -> Self {
        Self {
            column_id: column.as_column_id(),
            ..self
        }
    }

    pub fn ranked(self, position: usize) -> RankedTask {
        RankedTask {
            task: self,
            position,
        }
    }
}

/// A task together with its derived 0-based rank inside its column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedTask {
    #[serde(flatten)]
    pub task: Task,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    pub column_id: Option<Uuid>,
    pub above_task_id: Option<Uuid>,
    pub board_id: Uuid,
}

/// Input for a new task. The column and the tail pointer are resolved
/// against the current board snapshot.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub column: ColumnKey,
}

/// Fields left as `None` keep their current value. `description:
/// Some(None)` clears the description.
#[derive(Debug, Clone, Default)]
pub struct EditTask {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub column: Option<ColumnKey>,
}
