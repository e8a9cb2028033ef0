use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::TaskApi;
use crate::error::{AppError, Result};
use crate::models::{
    Board, Column, CreateBoardColumnRequest, CreateBoardColumnResponse, CreateTaskRequest, Task,
};
use crate::ordering::BoardOrder;

#[derive(Default)]
struct Store {
    boards: HashMap<Uuid, Board>,
    tasks: HashMap<Uuid, Task>,
    updates: Vec<Vec<Uuid>>,
}

/// Task API kept in process memory. Counts calls and can be told to fail
/// the next one, which is what the manager's tests need.
#[derive(Default)]
pub struct InMemoryTaskApi {
    store: Mutex<Store>,
    calls: AtomicUsize,
    fail_next: AtomicBool,
    latency: Option<Duration>,
}

impl InMemoryTaskApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long before touching the store.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub async fn insert_board(&self, board: Board) {
        self.store.lock().await.boards.insert(board.id, board);
    }

    pub async fn insert_tasks(&self, tasks: impl IntoIterator<Item = Task>) {
        let mut store = self.store.lock().await;
        for task in tasks {
            store.tasks.insert(task.id, task);
        }
    }

    pub async fn task(&self, task_id: Uuid) -> Option<Task> {
        self.store.lock().await.tasks.get(&task_id).cloned()
    }

    /// Ids sent to each `update_tasks` call, oldest first.
    pub async fn update_history(&self) -> Vec<Vec<Uuid>> {
        self.store.lock().await.updates.clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Makes the next call fail with a server error.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    async fn enter(&self, action: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(AppError::Api {
                status: 503,
                message: format!("{} failed: service unavailable", action),
            });
        }
        Ok(())
    }
}

fn not_found(what: &str, id: Uuid) -> AppError {
    AppError::Api {
        status: 404,
        message: format!("{} {} not found", what, id),
    }
}

#[async_trait]
impl TaskApi for InMemoryTaskApi {
    async fn create_task(&self, request: CreateTaskRequest) -> Result<Task> {
        self.enter("Create task").await?;
        let task = Task {
            id: Uuid::new_v4(),
            title: request.title,
            description: request.description,
            column_id: request.column_id,
            above_task_id: request.above_task_id,
            board_id: request.board_id,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.store.lock().await.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn update_tasks(&self, tasks: &[Task]) -> Result<Vec<Task>> {
        self.enter("Update tasks").await?;
        let mut store = self.store.lock().await;
        if let Some(missing) = tasks.iter().find(|t| !store.tasks.contains_key(&t.id)) {
            return Err(not_found("Task", missing.id));
        }

        let now = Utc::now();
        let updated: Vec<Task> = tasks
            .iter()
            .map(|t| Task {
                updated_at: Some(now),
                ..t.clone()
            })
            .collect();
        for task in &updated {
            store.tasks.insert(task.id, task.clone());
        }
        store.updates.push(updated.iter().map(|t| t.id).collect());
        Ok(updated)
    }

    async fn delete_task(&self, task_id: Uuid) -> Result<()> {
        self.enter("Delete task").await?;
        self.store
            .lock()
            .await
            .tasks
            .remove(&task_id)
            .map(|_| ())
            .ok_or_else(|| not_found("Task", task_id))
    }

    async fn get_tasks_by_board_id(&self, board_id: Uuid) -> Result<Vec<Task>> {
        self.enter("Get board tasks").await?;
        let store = self.store.lock().await;
        Ok(store
            .tasks
            .values()
            .filter(|t| t.board_id == board_id)
            .cloned()
            .collect())
    }

    async fn get_board(&self, board_id: Uuid) -> Result<Board> {
        self.enter("Get board").await?;
        self.store
            .lock()
            .await
            .boards
            .get(&board_id)
            .cloned()
            .ok_or_else(|| not_found("Board", board_id))
    }

    async fn update_board(&self, board: &Board) -> Result<Board> {
        self.enter("Update board").await?;
        let mut store = self.store.lock().await;
        if !store.boards.contains_key(&board.id) {
            return Err(not_found("Board", board.id));
        }
        let updated = Board {
            updated_at: Some(Utc::now()),
            ..board.clone()
        };
        store.boards.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn create_board_column(
        &self,
        board_id: Uuid,
        request: CreateBoardColumnRequest,
    ) -> Result<CreateBoardColumnResponse> {
        self.enter("Create board column").await?;
        let mut store = self.store.lock().await;
        let board = store
            .boards
            .get_mut(&board_id)
            .ok_or_else(|| not_found("Board", board_id))?;

        let now = Utc::now();
        let column = Column {
            id: Uuid::new_v4(),
            name: request.title,
            created_at: now,
            updated_at: Some(now),
        };
        if request.was_unassigned.unwrap_or(false) {
            board.columns.insert(0, column.clone());
        } else {
            board.columns.push(column.clone());
        }
        board.updated_at = Some(now);

        let items: Vec<Task> = request
            .items
            .into_iter()
            .map(|t| Task {
                column_id: Some(column.id),
                updated_at: Some(now),
                ..t
            })
            .collect();
        for task in &items {
            store.tasks.insert(task.id, task.clone());
        }

        let items = BoardOrder::from_tasks(board_id, items)
            .tasks()
            .cloned()
            .collect();
        Ok(CreateBoardColumnResponse { column, items })
    }

    async fn delete_board_column(&self, board_id: Uuid, column_id: Uuid) -> Result<Board> {
        self.enter("Delete board column").await?;
        let mut store = self.store.lock().await;
        let board = store
            .boards
            .get_mut(&board_id)
            .ok_or_else(|| not_found("Board", board_id))?;

        board.columns.retain(|c| c.id != column_id);
        board.updated_at = Some(Utc::now());
        let board = board.clone();

        store.tasks.retain(|_, t| t.column_id != Some(column_id));
        Ok(board)
    }
}
