pub mod board;
pub mod column;
pub mod task;

pub use board::{Board, CreateBoardColumnRequest, CreateBoardColumnResponse, GroupedTasks};
pub use column::{Column, ColumnKey, UNASSIGNED_COLUMN_ID, UNASSIGNED_COLUMN_NAME};
pub use task::{CreateTaskRequest, EditTask, NewTask, RankedTask, Task};
