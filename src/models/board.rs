use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::column::{Column, ColumnKey, UNASSIGNED_COLUMN_NAME};
use super::task::{RankedTask, Task};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub columns: Vec<Column>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Board {
    pub fn column(&self, id: Uuid) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == id)
    }

    /// Display name of a column, including the unassigned pseudo-column.
    pub fn column_name(&self, key: ColumnKey) -> Option<&str> {
        match key {
            ColumnKey::Unassigned => Some(UNASSIGNED_COLUMN_NAME),
            ColumnKey::Column(id) => self.column(id).map(|c| c.name.as_str()),
        }
    }

    /// Column keys in render order: the unassigned column first, then the
    /// board's columns as stored.
    pub fn column_keys(&self) -> Vec<ColumnKey> {
        std::iter::once(ColumnKey::Unassigned)
            .chain(self.columns.iter().map(|c| ColumnKey::Column(c.id)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBoardColumnRequest {
    pub title: String,
    #[serde(default)]
    pub items: Vec<Task>,
    /// The new column replaces the unassigned column and is placed first.
    #[serde(default)]
    pub was_unassigned: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBoardColumnResponse {
    pub column: Column,
    #[serde(default)]
    pub items: Vec<Task>,
}

/// Ordered tasks of one column, as handed to a renderer.
#[derive(Debug, Clone, Serialize)]
pub struct GroupedTasks {
    pub column_id: ColumnKey,
    pub name: String,
    pub items: Vec<RankedTask>,
}
