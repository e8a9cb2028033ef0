pub mod config;
pub mod error;
pub mod manager;
pub mod models;
pub mod ordering;
pub mod services;

pub use config::{Config, RefreshStrategy};
pub use error::{AppError, Result};
pub use manager::{BoardEvent, TaskOrderManager};
pub use ordering::{BoardOrder, ColumnOrder, DragEvent, DragLocation, UpdateSet};
pub use services::{HttpTaskApi, InMemoryTaskApi, TaskApi};

pub mod test_utils {
    use std::sync::atomic::{AtomicI64, Ordering};

    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    use crate::models::{Board, Column, ColumnKey, Task};

    static CLOCK: AtomicI64 = AtomicI64::new(1_700_000_000);

    /// Strictly increasing timestamps, so creation order is deterministic.
    pub fn next_timestamp() -> DateTime<Utc> {
        let secs = CLOCK.fetch_add(1, Ordering::SeqCst);
        DateTime::from_timestamp(secs, 0).expect("timestamp in range")
    }

    pub fn task_in(board_id: Uuid, column: ColumnKey, title: &str) -> Task {
        Task {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: None,
            column_id: column.as_column_id(),
            above_task_id: None,
            board_id,
            created_at: next_timestamp(),
            updated_at: None,
        }
    }

    /// A well-formed column: the first title is the head, every other task
    /// points at the one before it.
    pub fn chain(board_id: Uuid, column: ColumnKey, titles: &[&str]) -> Vec<Task> {
        let mut tasks: Vec<Task> = Vec::with_capacity(titles.len());
        for title in titles {
            let above = tasks.last().map(|t| t.id);
            tasks.push(task_in(board_id, column, title).with_above_task(above));
        }
        tasks
    }

    pub fn column(name: &str) -> Column {
        Column {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: next_timestamp(),
            updated_at: None,
        }
    }

    pub fn board_with_columns(names: &[&str]) -> Board {
        Board {
            id: Uuid::new_v4(),
            title: "Test board".to_string(),
            description: None,
            columns: names.iter().map(|name| column(name)).collect(),
            created_at: next_timestamp(),
            updated_at: None,
        }
    }
}
