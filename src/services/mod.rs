pub mod memory;
pub mod task_api;

pub use memory::InMemoryTaskApi;
pub use task_api::HttpTaskApi;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Board, CreateBoardColumnRequest, CreateBoardColumnResponse, CreateTaskRequest, Task};

/// The persistence collaborator the manager writes through.
/// Real implementation: `HttpTaskApi`. Test double: `InMemoryTaskApi`.
#[async_trait]
pub trait TaskApi: Send + Sync {
    async fn create_task(&self, request: CreateTaskRequest) -> Result<Task>;

    /// Bulk upsert of the given records.
    async fn update_tasks(&self, tasks: &[Task]) -> Result<Vec<Task>>;

    async fn delete_task(&self, task_id: Uuid) -> Result<()>;

    async fn get_tasks_by_board_id(&self, board_id: Uuid) -> Result<Vec<Task>>;

    async fn get_board(&self, board_id: Uuid) -> Result<Board>;

    async fn update_board(&self, board: &Board) -> Result<Board>;

    async fn create_board_column(
        &self,
        board_id: Uuid,
        request: CreateBoardColumnRequest,
    ) -> Result<CreateBoardColumnResponse>;

    async fn delete_board_column(&self, board_id: Uuid, column_id: Uuid) -> Result<Board>;
}
