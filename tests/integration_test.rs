use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kanban_order::models::{
    Board, ColumnKey, CreateBoardColumnRequest, CreateBoardColumnResponse, CreateTaskRequest,
    EditTask, NewTask, Task,
};
use kanban_order::test_utils::{board_with_columns, chain, task_in};
use kanban_order::{
    AppError, BoardEvent, BoardOrder, Config, DragEvent, DragLocation, InMemoryTaskApi,
    RefreshStrategy, TaskApi, TaskOrderManager,
};
use uuid::Uuid;

struct Fixture {
    manager: TaskOrderManager<InMemoryTaskApi>,
    board_id: Uuid,
    x: ColumnKey,
    y: ColumnKey,
    xs: Vec<Task>,
    ys: Vec<Task>,
}

async fn setup_with(api: InMemoryTaskApi, refresh: RefreshStrategy) -> Fixture {
    let board = board_with_columns(&["X", "Y"]);
    let x = ColumnKey::Column(board.columns[0].id);
    let y = ColumnKey::Column(board.columns[1].id);
    let xs = chain(board.id, x, &["A", "B", "C"]);
    let ys = chain(board.id, y, &["D"]);

    api.insert_board(board.clone()).await;
    api.insert_tasks(xs.iter().chain(ys.iter()).cloned()).await;

    let config = Config {
        refresh,
        ..Config::default()
    };
    let manager = TaskOrderManager::new(Arc::new(api), &config);
    manager.load(board.id).await.unwrap();

    Fixture {
        manager,
        board_id: board.id,
        x,
        y,
        xs,
        ys,
    }
}

async fn setup() -> Fixture {
    setup_with(InMemoryTaskApi::new(), RefreshStrategy::Refetch).await
}

async fn stored_order(fixture: &Fixture) -> BoardOrder {
    let tasks = fixture
        .manager
        .api()
        .get_tasks_by_board_id(fixture.board_id)
        .await
        .unwrap();
    BoardOrder::from_tasks(fixture.board_id, tasks)
}

/// In-memory Task API whose next `failures` bulk updates fail.
struct FlakyUpdates {
    inner: InMemoryTaskApi,
    failures: AtomicUsize,
}

#[async_trait]
impl TaskApi for FlakyUpdates {
    async fn create_task(&self, request: CreateTaskRequest) -> kanban_order::Result<Task> {
        self.inner.create_task(request).await
    }

    async fn update_tasks(&self, tasks: &[Task]) -> kanban_order::Result<Vec<Task>> {
        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(AppError::Network("connection reset".to_string()));
        }
        self.inner.update_tasks(tasks).await
    }

    async fn delete_task(&self, task_id: Uuid) -> kanban_order::Result<()> {
        self.inner.delete_task(task_id).await
    }

    async fn get_tasks_by_board_id(&self, board_id: Uuid) -> kanban_order::Result<Vec<Task>> {
        self.inner.get_tasks_by_board_id(board_id).await
    }

    async fn get_board(&self, board_id: Uuid) -> kanban_order::Result<Board> {
        self.inner.get_board(board_id).await
    }

    async fn update_board(&self, board: &Board) -> kanban_order::Result<Board> {
        self.inner.update_board(board).await
    }

    async fn create_board_column(
        &self,
        board_id: Uuid,
        request: CreateBoardColumnRequest,
    ) -> kanban_order::Result<CreateBoardColumnResponse> {
        self.inner.create_board_column(board_id, request).await
    }

    async fn delete_board_column(
        &self,
        board_id: Uuid,
        column_id: Uuid,
    ) -> kanban_order::Result<Board> {
        self.inner.delete_board_column(board_id, column_id).await
    }
}

async fn setup_flaky(
    failures: usize,
) -> (TaskOrderManager<FlakyUpdates>, Uuid, ColumnKey, Vec<Task>) {
    let board = board_with_columns(&["X"]);
    let x = ColumnKey::Column(board.columns[0].id);
    let xs = chain(board.id, x, &["A", "B", "C"]);

    let inner = InMemoryTaskApi::new();
    inner.insert_board(board.clone()).await;
    inner.insert_tasks(xs.clone()).await;
    let api = FlakyUpdates {
        inner,
        failures: AtomicUsize::new(failures),
    };

    let manager = TaskOrderManager::new(Arc::new(api), &Config::default());
    manager.load(board.id).await.unwrap();
    (manager, board.id, x, xs)
}

fn titles(order: &BoardOrder, key: ColumnKey) -> Vec<String> {
    order.column_tasks(key).iter().map(|t| t.title.clone()).collect()
}

fn column_ids(order: &BoardOrder, key: ColumnKey) -> Vec<Uuid> {
    order.column_tasks(key).iter().map(|t| t.id).collect()
}

#[tokio::test]
async fn test_noop_drags_make_no_api_calls() {
    let f = setup().await;
    let calls = f.manager.api().calls();

    f.manager
        .move_task(
            f.board_id,
            DragEvent::new(DragLocation::new(f.x, 1), DragLocation::new(f.x, 1)),
        )
        .await
        .unwrap();
    f.manager
        .move_task(f.board_id, DragEvent::cancelled(DragLocation::new(f.x, 0)))
        .await
        .unwrap();

    assert_eq!(f.manager.api().calls(), calls);
}

#[tokio::test]
async fn test_cross_column_move_sends_minimal_set() {
    let f = setup().await;

    let order = f
        .manager
        .move_task(
            f.board_id,
            DragEvent::new(DragLocation::new(f.x, 0), DragLocation::new(f.y, 1)),
        )
        .await
        .unwrap();

    let history = f.manager.api().update_history().await;
    assert_eq!(history, vec![vec![f.xs[0].id, f.xs[1].id]]);

    let moved = f.manager.api().task(f.xs[0].id).await.unwrap();
    assert_eq!(moved.column_id, f.y.as_column_id());
    assert_eq!(moved.above_task_id, Some(f.ys[0].id));
    let promoted = f.manager.api().task(f.xs[1].id).await.unwrap();
    assert_eq!(promoted.above_task_id, None);

    assert!(order.verify().is_ok());
    assert_eq!(column_ids(&order, f.x), vec![f.xs[1].id, f.xs[2].id]);
    assert_eq!(column_ids(&order, f.y), vec![f.ys[0].id, f.xs[0].id]);
}

#[tokio::test]
async fn test_failed_update_keeps_snapshot() {
    let f = setup().await;
    let mut events = f.manager.subscribe();
    let before = f.manager.snapshot(f.board_id).await.unwrap();

    f.manager.api().fail_next();
    let err = f
        .manager
        .move_task(
            f.board_id,
            DragEvent::new(DragLocation::new(f.x, 0), DragLocation::new(f.x, 2)),
        )
        .await
        .unwrap_err();

    assert!(err.is_recoverable());
    let after = f.manager.snapshot(f.board_id).await.unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert!(f.manager.api().update_history().await.is_empty());

    match events.recv().await.unwrap() {
        BoardEvent::OperationFailed { operation, .. } => assert_eq!(operation, "move"),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_out_of_range_drag_is_not_sent() {
    let f = setup().await;
    let calls = f.manager.api().calls();

    let err = f
        .manager
        .move_task(
            f.board_id,
            DragEvent::new(DragLocation::new(f.y, 3), DragLocation::new(f.x, 0)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvariantViolation(_)));
    assert!(!err.is_recoverable());
    assert_eq!(f.manager.api().calls(), calls);
}

#[tokio::test]
async fn test_create_appends_to_column_tail() {
    let f = setup().await;

    let created = f
        .manager
        .create_task(
            f.board_id,
            NewTask {
                title: "E".to_string(),
                description: Some("after C".to_string()),
                column: f.x,
            },
        )
        .await
        .unwrap();
    assert_eq!(created.above_task_id, Some(f.xs[2].id));

    let empty = f
        .manager
        .create_task(
            f.board_id,
            NewTask {
                title: "F".to_string(),
                description: None,
                column: ColumnKey::Unassigned,
            },
        )
        .await
        .unwrap();
    assert_eq!(empty.above_task_id, None);
    assert_eq!(empty.column_id, None);

    let order = f.manager.snapshot(f.board_id).await.unwrap();
    assert_eq!(order.column(f.x).unwrap().tail().unwrap().id, created.id);
    assert!(order.verify().is_ok());
}

#[tokio::test]
async fn test_delete_splices_successor() {
    let f = setup().await;

    let order = f.manager.delete_task(f.board_id, f.xs[1].id).await.unwrap();

    let c = f.manager.api().task(f.xs[2].id).await.unwrap();
    assert_eq!(c.above_task_id, Some(f.xs[0].id));
    let a = f.manager.api().task(f.xs[0].id).await.unwrap();
    assert_eq!(a.above_task_id, None);
    assert!(f.manager.api().task(f.xs[1].id).await.is_none());

    let ranked = order.column(f.x).unwrap().ranked();
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[1].task.id, f.xs[2].id);
    assert_eq!(ranked[1].position, 1);
}

#[tokio::test]
async fn test_failed_delete_changes_nothing() {
    let f = setup().await;
    let before = f.manager.snapshot(f.board_id).await.unwrap();

    f.manager.api().fail_next();
    assert!(f.manager.delete_task(f.board_id, f.xs[0].id).await.is_err());

    assert!(f.manager.api().task(f.xs[0].id).await.is_some());
    let after = f.manager.snapshot(f.board_id).await.unwrap();
    assert!(Arc::ptr_eq(&before, &after));
}

#[tokio::test]
async fn test_edit_moves_task_to_new_column_tail() {
    let f = setup().await;

    let order = f
        .manager
        .edit_task(
            f.board_id,
            f.xs[1].id,
            EditTask {
                title: Some("B, moved".to_string()),
                column: Some(f.y),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(order.verify().is_ok());
    assert_eq!(column_ids(&order, f.x), vec![f.xs[0].id, f.xs[2].id]);
    assert_eq!(column_ids(&order, f.y), vec![f.ys[0].id, f.xs[1].id]);
    let stored = f.manager.api().task(f.xs[1].id).await.unwrap();
    assert_eq!(stored.title, "B, moved");
}

#[tokio::test]
async fn test_concurrent_moves_are_serialized() {
    let f = setup_with(
        InMemoryTaskApi::with_latency(Duration::from_millis(5)),
        RefreshStrategy::Refetch,
    )
    .await;
    let drag = DragEvent::new(DragLocation::new(f.x, 0), DragLocation::new(f.x, 2));

    let (first, second) = tokio::join!(
        f.manager.move_task(f.board_id, drag),
        f.manager.move_task(f.board_id, drag)
    );
    first.unwrap();
    second.unwrap();

    assert_eq!(f.manager.api().update_history().await.len(), 2);
    let stored = stored_order(&f).await;
    stored.verify().unwrap();
    assert_eq!(column_ids(&stored, f.x), vec![f.xs[2].id, f.xs[0].id, f.xs[1].id]);
}

#[tokio::test]
async fn test_merge_and_refetch_agree() {
    let refetch = setup().await;
    let merge = setup_with(InMemoryTaskApi::new(), RefreshStrategy::Merge).await;

    for f in [&refetch, &merge] {
        let ops = [
            DragEvent::new(DragLocation::new(f.x, 2), DragLocation::new(f.x, 0)),
            DragEvent::new(DragLocation::new(f.x, 1), DragLocation::new(f.y, 0)),
            DragEvent::new(DragLocation::new(f.y, 1), DragLocation::new(ColumnKey::Unassigned, 0)),
        ];
        for drag in ops {
            f.manager.move_task(f.board_id, drag).await.unwrap();
        }
    }

    let a = refetch.manager.snapshot(refetch.board_id).await.unwrap();
    let b = merge.manager.snapshot(merge.board_id).await.unwrap();
    a.verify().unwrap();
    b.verify().unwrap();

    assert_eq!(titles(&a, refetch.x), vec!["C", "B"]);
    assert_eq!(titles(&b, merge.x), vec!["C", "B"]);
    assert_eq!(titles(&a, refetch.y), vec!["A"]);
    assert_eq!(titles(&b, merge.y), vec!["A"]);
    assert_eq!(titles(&a, ColumnKey::Unassigned), vec!["D"]);
    assert_eq!(titles(&b, ColumnKey::Unassigned), vec!["D"]);
}

#[tokio::test]
async fn test_column_lifecycle() {
    let f = setup().await;
    let unassigned = chain(f.board_id, ColumnKey::Unassigned, &["U1", "U2"]);
    f.manager.api().insert_tasks(unassigned.clone()).await;
    f.manager.load(f.board_id).await.unwrap();

    let response = f
        .manager
        .create_column(
            f.board_id,
            CreateBoardColumnRequest {
                title: "Backlog".to_string(),
                items: unassigned.clone(),
                was_unassigned: Some(true),
            },
        )
        .await
        .unwrap();

    let backlog = ColumnKey::Column(response.column.id);
    let order = f.manager.snapshot(f.board_id).await.unwrap();
    assert!(order.column(ColumnKey::Unassigned).is_none());
    assert_eq!(
        column_ids(&order, backlog),
        vec![unassigned[0].id, unassigned[1].id]
    );

    let board = f
        .manager
        .delete_column(f.board_id, response.column.id)
        .await
        .unwrap();
    assert!(board.column(response.column.id).is_none());
    let order = f.manager.snapshot(f.board_id).await.unwrap();
    assert!(order.column(backlog).is_none());
    assert_eq!(order.task_count(), f.xs.len() + f.ys.len());
}

#[tokio::test]
async fn test_update_board_renames_column() {
    let f = setup().await;
    let mut events = f.manager.subscribe();

    let mut board = f.manager.api().get_board(f.board_id).await.unwrap();
    board.columns[0].name = "Doing".to_string();
    let updated = f.manager.update_board(&board).await.unwrap();

    assert_eq!(updated.columns[0].name, "Doing");
    assert!(updated.updated_at.is_some());
    assert_eq!(
        events.recv().await.unwrap(),
        BoardEvent::BoardUpdated {
            board_id: f.board_id
        }
    );
}

#[tokio::test]
async fn test_repair_rewrites_broken_chain() {
    let api = InMemoryTaskApi::new();
    let board = board_with_columns(&["X"]);
    let x = ColumnKey::Column(board.columns[0].id);
    let a = task_in(board.id, x, "A");
    let b = task_in(board.id, x, "B");
    let c = task_in(board.id, x, "C").with_above_task(Some(a.id));
    api.insert_board(board.clone()).await;
    api.insert_tasks(vec![a.clone(), b.clone(), c.clone()]).await;

    let manager = TaskOrderManager::new(Arc::new(api), &Config::default());
    let loaded = manager.load(board.id).await.unwrap();
    assert!(loaded.verify().is_err());

    let repaired = manager.repair(board.id).await.unwrap();
    repaired.verify().unwrap();
    assert_eq!(repaired.task_count(), 3);

    let tasks = manager.api().get_tasks_by_board_id(board.id).await.unwrap();
    BoardOrder::from_tasks(board.id, tasks).verify().unwrap();
}

#[tokio::test]
async fn test_move_publishes_event() {
    let f = setup().await;
    let mut events = f.manager.subscribe();

    f.manager
        .move_task(
            f.board_id,
            DragEvent::new(DragLocation::new(f.x, 2), DragLocation::new(f.x, 1)),
        )
        .await
        .unwrap();

    assert_eq!(
        events.recv().await.unwrap(),
        BoardEvent::TasksMoved {
            board_id: f.board_id,
            task_ids: vec![f.xs[2].id, f.xs[1].id],
        }
    );
}

#[tokio::test]
async fn test_failed_relink_after_delete_is_repaired() {
    let (manager, board_id, x, xs) = setup_flaky(1).await;

    let order = manager.delete_task(board_id, xs[1].id).await.unwrap();

    order.verify().unwrap();
    assert_eq!(column_ids(&order, x), vec![xs[0].id, xs[2].id]);
    let c = manager.api().inner.task(xs[2].id).await.unwrap();
    assert_eq!(c.above_task_id, Some(xs[0].id));
}

#[tokio::test]
async fn test_unrepaired_relink_is_partial_delete() {
    let (manager, board_id, x, xs) = setup_flaky(2).await;
    let mut events = manager.subscribe();

    let err = manager.delete_task(board_id, xs[1].id).await.unwrap_err();

    assert!(matches!(err, AppError::PartialDelete { task_id, .. } if task_id == xs[1].id));
    assert!(!err.is_recoverable());
    assert!(manager.api().inner.task(xs[1].id).await.is_none());
    let snapshot = manager.snapshot(board_id).await.unwrap();
    assert!(snapshot.find(xs[1].id).is_none());
    match events.recv().await.unwrap() {
        BoardEvent::OperationFailed { operation, .. } => assert_eq!(operation, "delete"),
        other => panic!("unexpected event {:?}", other),
    }

    let repaired = manager.repair(board_id).await.unwrap();
    repaired.verify().unwrap();
    assert_eq!(column_ids(&repaired, x), vec![xs[0].id, xs[2].id]);
    let tasks = manager.api().get_tasks_by_board_id(board_id).await.unwrap();
    BoardOrder::from_tasks(board_id, tasks).verify().unwrap();
}

#[tokio::test]
async fn test_unload_forgets_board() {
    let f = setup().await;

    assert!(!f.manager.unload(Uuid::new_v4()).await);
    assert!(f.manager.unload(f.board_id).await);
    assert!(f.manager.snapshot(f.board_id).await.is_none());

    let calls = f.manager.api().calls();
    let order = f
        .manager
        .move_task(
            f.board_id,
            DragEvent::new(DragLocation::new(f.x, 0), DragLocation::new(f.x, 1)),
        )
        .await
        .unwrap();
    assert_eq!(column_ids(&order, f.x), vec![f.xs[1].id, f.xs[0].id, f.xs[2].id]);
    // reload, update, refetch
    assert_eq!(f.manager.api().calls(), calls + 3);
}

#[tokio::test]
#[ignore] // Needs a Task API on KANBAN_API_URL. Run with: cargo test -- --ignored
async fn test_live_api_round_trip() {
    let config = Config::from_env().expect("valid configuration");
    let api = Arc::new(kanban_order::HttpTaskApi::from_config(&config).unwrap());
    let board_id: Uuid = std::env::var("KANBAN_TEST_BOARD")
        .expect("KANBAN_TEST_BOARD")
        .parse()
        .unwrap();
    let manager = TaskOrderManager::new(api, &config);

    let created = manager
        .create_task(
            board_id,
            NewTask {
                title: format!("live-{}", Uuid::new_v4()),
                description: None,
                column: ColumnKey::Unassigned,
            },
        )
        .await
        .unwrap();
    let order = manager.delete_task(board_id, created.id).await.unwrap();
    assert!(order.find(created.id).is_none());
}
