//! Board-level coordination around the ordering core.
//!
//! Every operation on a board runs under that board's FIFO lock: it plans
//! against the current snapshot, writes through the [`TaskApi`], and only
//! after the API confirms does it swap in a fresh snapshot. A failed write
//! leaves the snapshot untouched.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{Config, RefreshStrategy};
use crate::error::{AppError, Result};
use crate::models::{
    Board, ColumnKey, CreateBoardColumnRequest, CreateBoardColumnResponse, EditTask, NewTask, Task,
};
use crate::ordering::{BoardOrder, DragEvent, UpdateSet};
use crate::services::TaskApi;

/// Published after every completed or failed operation. The UI layer turns
/// these into notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardEvent {
    TasksMoved {
        board_id: Uuid,
        task_ids: Vec<Uuid>,
    },
    TaskCreated {
        board_id: Uuid,
        task_id: Uuid,
    },
    TasksUpdated {
        board_id: Uuid,
        task_ids: Vec<Uuid>,
    },
    TaskDeleted {
        board_id: Uuid,
        task_id: Uuid,
    },
    ChainRepaired {
        board_id: Uuid,
        task_ids: Vec<Uuid>,
    },
    ColumnCreated {
        board_id: Uuid,
        column_id: Uuid,
    },
    ColumnDeleted {
        board_id: Uuid,
        column_id: Uuid,
    },
    BoardUpdated {
        board_id: Uuid,
    },
    OperationFailed {
        board_id: Uuid,
        operation: &'static str,
        message: String,
    },
}

#[derive(Default)]
struct BoardSlot {
    queue: Mutex<()>,
    snapshot: RwLock<Option<Arc<BoardOrder>>>,
}

pub struct TaskOrderManager<A: TaskApi> {
    api: Arc<A>,
    refresh: RefreshStrategy,
    boards: Mutex<HashMap<Uuid, Arc<BoardSlot>>>,
    events: broadcast::Sender<BoardEvent>,
}

impl<A: TaskApi> TaskOrderManager<A> {
    pub fn new(api: Arc<A>, config: &Config) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);
        Self {
            api,
            refresh: config.refresh,
            boards: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn api(&self) -> &A {
        self.api.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.events.subscribe()
    }

    /// Last snapshot of a board, if it has been loaded.
    pub async fn snapshot(&self, board_id: Uuid) -> Option<Arc<BoardOrder>> {
        let slot = self.slot(board_id).await;
        let snapshot = slot.snapshot.read().await;
        snapshot.clone()
    }

    /// Fetches every task of the board and replaces the snapshot.
    pub async fn load(&self, board_id: Uuid) -> Result<Arc<BoardOrder>> {
        let slot = self.slot(board_id).await;
        let _turn = slot.queue.lock().await;

        let tasks = self
            .api
            .get_tasks_by_board_id(board_id)
            .await
            .map_err(|e| self.failed(board_id, "load", e))?;
        let order = BoardOrder::from_tasks(board_id, tasks);
        info!("Loaded board {} with {} task(s)", board_id, order.task_count());
        Ok(self.swap(&slot, order).await)
    }

    pub async fn move_task(&self, board_id: Uuid, drag: DragEvent) -> Result<Arc<BoardOrder>> {
        let slot = self.slot(board_id).await;
        let _turn = slot.queue.lock().await;
        let current = self.current(&slot, board_id).await?;

        let updates = current.plan_move(&drag)?;
        if updates.is_empty() {
            debug!("Drag {:?} on board {} changes nothing", drag, board_id);
            return Ok(current);
        }

        let task_ids = updates.ids();
        let next = self.persist(&slot, &current, "move", updates).await?;
        info!("Moved task(s) {:?} on board {}", task_ids, board_id);
        self.publish(BoardEvent::TasksMoved { board_id, task_ids });
        Ok(next)
    }

    /// Creates a task at the tail of its column.
    pub async fn create_task(&self, board_id: Uuid, new_task: NewTask) -> Result<Task> {
        let slot = self.slot(board_id).await;
        let _turn = slot.queue.lock().await;
        let current = self.current(&slot, board_id).await?;

        let request = current.plan_create(new_task)?;
        debug!(
            "Creating task {:?} in column {:?} after {:?}",
            request.title, request.column_id, request.above_task_id
        );
        let created = self
            .api
            .create_task(request)
            .await
            .map_err(|e| self.failed(board_id, "create", e))?;

        let next = self
            .refreshed(&current, std::slice::from_ref(&created), None)
            .await;
        self.swap(&slot, next).await;

        info!("Created task {} on board {}", created.id, board_id);
        self.publish(BoardEvent::TaskCreated {
            board_id,
            task_id: created.id,
        });
        Ok(created)
    }

    /// Updates a task's content. A column change appends the task to the
    /// new column and closes the gap in the old one.
    pub async fn edit_task(
        &self,
        board_id: Uuid,
        task_id: Uuid,
        edit: EditTask,
    ) -> Result<Arc<BoardOrder>> {
        let slot = self.slot(board_id).await;
        let _turn = slot.queue.lock().await;
        let current = self.current(&slot, board_id).await?;

        let updates = current.plan_edit(task_id, edit)?;
        if updates.is_empty() {
            return Ok(current);
        }

        let task_ids = updates.ids();
        let next = self.persist(&slot, &current, "edit", updates).await?;
        info!("Edited task {} on board {}", task_id, board_id);
        self.publish(BoardEvent::TasksUpdated { board_id, task_ids });
        Ok(next)
    }

    /// Deletes a task and relinks its successor onto its predecessor.
    ///
    /// The delete is sent first. A failed relink is retried once as a
    /// repair of the remaining tasks; if that fails too, the snapshot
    /// reflects the confirmed delete and [`AppError::PartialDelete`] is
    /// returned. [`repair`](Self::repair) closes the chain afterwards.
    pub async fn delete_task(&self, board_id: Uuid, task_id: Uuid) -> Result<Arc<BoardOrder>> {
        let slot = self.slot(board_id).await;
        let _turn = slot.queue.lock().await;
        let current = self.current(&slot, board_id).await?;

        let updates = current.plan_delete(task_id)?;
        self.api
            .delete_task(task_id)
            .await
            .map_err(|e| self.failed(board_id, "delete", e))?;

        let relinked = if updates.is_empty() {
            Ok(Vec::new())
        } else {
            match self.api.update_tasks(updates.tasks()).await {
                Ok(confirmed) => Ok(confirmed),
                Err(e) => {
                    warn!(
                        "Relink after deleting task {} failed, repairing board {}: {}",
                        task_id, board_id, e
                    );
                    let repair = current.without_task(task_id).plan_repair();
                    self.api.update_tasks(repair.tasks()).await
                }
            }
        };

        match relinked {
            Ok(confirmed) => {
                let next = self.refreshed(&current, &confirmed, Some(task_id)).await;
                let next = self.swap(&slot, next).await;
                info!("Deleted task {} from board {}", task_id, board_id);
                self.publish(BoardEvent::TaskDeleted { board_id, task_id });
                Ok(next)
            }
            Err(e) => {
                let next = self.refreshed(&current, &[], Some(task_id)).await;
                self.swap(&slot, next).await;
                let partial = AppError::PartialDelete {
                    task_id,
                    message: e.to_string(),
                };
                Err(self.failed(board_id, "delete", partial))
            }
        }
    }

    /// Rewrites every column whose stored pointers do not form a valid chain.
    pub async fn repair(&self, board_id: Uuid) -> Result<Arc<BoardOrder>> {
        let slot = self.slot(board_id).await;
        let _turn = slot.queue.lock().await;
        let current = self.current(&slot, board_id).await?;

        let updates = current.plan_repair();
        if updates.is_empty() {
            return Ok(current);
        }

        let task_ids = updates.ids();
        warn!("Repairing {} task(s) on board {}", task_ids.len(), board_id);
        let next = self.persist(&slot, &current, "repair", updates).await?;
        self.publish(BoardEvent::ChainRepaired { board_id, task_ids });
        Ok(next)
    }

    pub async fn create_column(
        &self,
        board_id: Uuid,
        request: CreateBoardColumnRequest,
    ) -> Result<CreateBoardColumnResponse> {
        let slot = self.slot(board_id).await;
        let _turn = slot.queue.lock().await;
        let current = self.current(&slot, board_id).await?;

        let response = self
            .api
            .create_board_column(board_id, request)
            .await
            .map_err(|e| self.failed(board_id, "create column", e))?;

        let next = self.refreshed(&current, &response.items, None).await;
        self.swap(&slot, next).await;

        info!("Created column {} on board {}", response.column.id, board_id);
        self.publish(BoardEvent::ColumnCreated {
            board_id,
            column_id: response.column.id,
        });
        Ok(response)
    }

    /// Deletes a column together with its tasks.
    pub async fn delete_column(&self, board_id: Uuid, column_id: Uuid) -> Result<Board> {
        let slot = self.slot(board_id).await;
        let _turn = slot.queue.lock().await;
        let current = self.current(&slot, board_id).await?;

        let board = self
            .api
            .delete_board_column(board_id, column_id)
            .await
            .map_err(|e| self.failed(board_id, "delete column", e))?;

        let without = current.without_column(ColumnKey::Column(column_id));
        let next = match self.refresh {
            RefreshStrategy::Merge => without,
            RefreshStrategy::Refetch => self.refetch_or(&without).await,
        };
        self.swap(&slot, next).await;

        info!("Deleted column {} of board {}", column_id, board_id);
        self.publish(BoardEvent::ColumnDeleted {
            board_id,
            column_id,
        });
        Ok(board)
    }

    pub async fn update_board(&self, board: &Board) -> Result<Board> {
        let slot = self.slot(board.id).await;
        let _turn = slot.queue.lock().await;

        let updated = self
            .api
            .update_board(board)
            .await
            .map_err(|e| self.failed(board.id, "update board", e))?;

        info!("Updated board {}", updated.id);
        self.publish(BoardEvent::BoardUpdated { board_id: updated.id });
        Ok(updated)
    }

    /// Forgets a board's snapshot and queue. Waits for the running
    /// operation on that board, if any; the next operation reloads it.
    pub async fn unload(&self, board_id: Uuid) -> bool {
        let slot = self.boards.lock().await.get(&board_id).cloned();
        let Some(slot) = slot else {
            return false;
        };
        let _turn = slot.queue.lock().await;

        let mut boards = self.boards.lock().await;
        let unchanged = boards
            .get(&board_id)
            .is_some_and(|current| Arc::ptr_eq(current, &slot));
        if unchanged {
            boards.remove(&board_id);
            debug!("Unloaded board {}", board_id);
        }
        unchanged
    }

    async fn slot(&self, board_id: Uuid) -> Arc<BoardSlot> {
        let mut boards = self.boards.lock().await;
        boards.entry(board_id).or_default().clone()
    }

    /// Snapshot to plan against. Must be called while holding the board's
    /// queue lock; loads the board on first use.
    async fn current(&self, slot: &BoardSlot, board_id: Uuid) -> Result<Arc<BoardOrder>> {
        if let Some(order) = slot.snapshot.read().await.clone() {
            return Ok(order);
        }

        let tasks = self
            .api
            .get_tasks_by_board_id(board_id)
            .await
            .map_err(|e| self.failed(board_id, "load", e))?;
        Ok(self.swap(slot, BoardOrder::from_tasks(board_id, tasks)).await)
    }

    async fn persist(
        &self,
        slot: &BoardSlot,
        current: &BoardOrder,
        operation: &'static str,
        updates: UpdateSet,
    ) -> Result<Arc<BoardOrder>> {
        let board_id = current.board_id();
        debug!(
            "Sending {} record(s) for {} on board {}",
            updates.len(),
            operation,
            board_id
        );

        let confirmed = self
            .api
            .update_tasks(updates.tasks())
            .await
            .map_err(|e| self.failed(board_id, operation, e))?;

        let next = self.refreshed(current, &confirmed, None).await;
        Ok(self.swap(slot, next).await)
    }

    /// Snapshot after a confirmed write, built the configured way.
    async fn refreshed(
        &self,
        current: &BoardOrder,
        confirmed: &[Task],
        removed: Option<Uuid>,
    ) -> BoardOrder {
        let merged = match removed {
            Some(task_id) => current.without_task(task_id).apply(confirmed),
            None => current.apply(confirmed),
        };

        match self.refresh {
            RefreshStrategy::Merge => merged,
            RefreshStrategy::Refetch => self.refetch_or(&merged).await,
        }
    }

    async fn refetch_or(&self, fallback: &BoardOrder) -> BoardOrder {
        let board_id = fallback.board_id();
        match self.api.get_tasks_by_board_id(board_id).await {
            Ok(tasks) => BoardOrder::from_tasks(board_id, tasks),
            Err(e) => {
                warn!(
                    "Refetch of board {} failed, keeping confirmed records: {}",
                    board_id, e
                );
                fallback.clone()
            }
        }
    }

    async fn swap(&self, slot: &BoardSlot, next: BoardOrder) -> Arc<BoardOrder> {
        if let Err(e) = next.verify() {
            warn!("Board {} snapshot is not a valid chain: {}", next.board_id(), e);
        }
        let next = Arc::new(next);
        *slot.snapshot.write().await = Some(next.clone());
        next
    }

    fn failed(&self, board_id: Uuid, operation: &'static str, e: AppError) -> AppError {
        error!("Failed to {} on board {}: {}", operation, board_id, e);
        self.publish(BoardEvent::OperationFailed {
            board_id,
            operation,
            message: e.to_string(),
        });
        e
    }

    fn publish(&self, event: BoardEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
