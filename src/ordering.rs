//! Task ordering inside kanban columns.
//!
//! A column is a singly linked chain: every task names the task directly
//! above it, the head names none. Everything here is a pure function of a
//! [`BoardOrder`] snapshot; the result of a drag, create or delete is the
//! minimal set of records whose `column_id` or `above_task_id` must be
//! persisted.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Board, ColumnKey, CreateTaskRequest, EditTask, GroupedTasks, NewTask, RankedTask, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DragLocation {
    pub column: ColumnKey,
    pub index: usize,
}

impl DragLocation {
    pub fn new(column: impl Into<ColumnKey>, index: usize) -> Self {
        Self {
            column: column.into(),
            index,
        }
    }
}

/// End of a drag gesture. `destination` is `None` when the task was dropped
/// outside of any column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DragEvent {
    pub source: DragLocation,
    pub destination: Option<DragLocation>,
}

impl DragEvent {
    pub fn new(source: DragLocation, destination: DragLocation) -> Self {
        Self {
            source,
            destination: Some(destination),
        }
    }

    pub fn cancelled(source: DragLocation) -> Self {
        Self {
            source,
            destination: None,
        }
    }
}

/// Records to send to the bulk update endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct UpdateSet {
    tasks: Vec<Task>,
}

impl UpdateSet {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.tasks.iter().map(|t| t.id).collect()
    }

    pub fn into_tasks(self) -> Vec<Task> {
        self.tasks
    }
}

/// The tasks of one column in chain order. Index `i` is the task's position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnOrder {
    key: ColumnKey,
    tasks: Vec<Task>,
}

impl ColumnOrder {
    /// Orders `tasks` by walking the chain from the head. Tasks that cannot
    /// be reached from the head (dangling or cyclic pointers, two tasks
    /// claiming the same predecessor) are appended as sub-chains, oldest
    /// first.
    pub fn build(key: ColumnKey, tasks: Vec<Task>) -> Self {
        let ids: HashSet<Uuid> = tasks.iter().map(|t| t.id).collect();

        let mut successors: HashMap<Option<Uuid>, Vec<usize>> = HashMap::new();
        for (i, task) in tasks.iter().enumerate() {
            let above = task
                .above_task_id
                .filter(|above| *above != task.id && ids.contains(above));
            successors.entry(above).or_default().push(i);
        }
        for indices in successors.values_mut() {
            indices.sort_by_key(|&i| (tasks[i].created_at, tasks[i].id));
        }

        let mut by_age: Vec<usize> = (0..tasks.len()).collect();
        by_age.sort_by_key(|&i| (tasks[i].created_at, tasks[i].id));

        let mut visited = vec![false; tasks.len()];
        let mut order = Vec::with_capacity(tasks.len());

        let walk = |start: Option<Uuid>, order: &mut Vec<usize>, visited: &mut Vec<bool>| {
            let mut cursor = start;
            while let Some(next) = successors
                .get(&cursor)
                .and_then(|c| c.iter().copied().find(|&i| !visited[i]))
            {
                visited[next] = true;
                order.push(next);
                cursor = Some(tasks[next].id);
            }
        };

        walk(None, &mut order, &mut visited);
        for &i in &by_age {
            if !visited[i] {
                visited[i] = true;
                order.push(i);
                walk(Some(tasks[i].id), &mut order, &mut visited);
            }
        }

        let mut slots: Vec<Option<Task>> = tasks.into_iter().map(Some).collect();
        let tasks: Vec<Task> = order.into_iter().filter_map(|i| slots[i].take()).collect();

        let column = Self { key, tasks };
        if let Err(e) = column.verify() {
            warn!("Column {} has an inconsistent chain: {}", key, e);
        }
        column
    }

    pub fn key(&self) -> ColumnKey {
        self.key
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Task> {
        self.tasks.get(index)
    }

    pub fn tail(&self) -> Option<&Task> {
        self.tasks.last()
    }

    pub fn position_of(&self, task_id: Uuid) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == task_id)
    }

    pub fn ranked(&self) -> Vec<RankedTask> {
        self.tasks
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, t)| t.ranked(i))
            .collect()
    }

    /// Checks that the stored pointers describe exactly this order: one
    /// head, every other task pointing at its predecessor, all tasks in
    /// this column.
    pub fn verify(&self) -> Result<()> {
        let mut above = None;
        for (position, task) in self.tasks.iter().enumerate() {
            if task.column() != self.key {
                return Err(AppError::InvariantViolation(format!(
                    "task {} is listed in column {} but belongs to {}",
                    task.id,
                    self.key,
                    task.column()
                )));
            }
            if task.above_task_id != above {
                return Err(AppError::InvariantViolation(format!(
                    "task {} at position {} points at {:?}, expected {:?}",
                    task.id, position, task.above_task_id, above
                )));
            }
            above = Some(task.id);
        }
        Ok(())
    }
}

/// Immutable snapshot of every column of a board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardOrder {
    board_id: Uuid,
    columns: BTreeMap<ColumnKey, ColumnOrder>,
}

impl BoardOrder {
    pub fn empty(board_id: Uuid) -> Self {
        Self {
            board_id,
            columns: BTreeMap::new(),
        }
    }

    pub fn from_tasks(board_id: Uuid, tasks: impl IntoIterator<Item = Task>) -> Self {
        let mut grouped: BTreeMap<ColumnKey, Vec<Task>> = BTreeMap::new();
        for task in tasks {
            grouped.entry(task.column()).or_default().push(task);
        }

        let columns = grouped
            .into_iter()
            .map(|(key, tasks)| (key, ColumnOrder::build(key, tasks)))
            .collect();

        Self { board_id, columns }
    }

    pub fn board_id(&self) -> Uuid {
        self.board_id
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnOrder> {
        self.columns.values()
    }

    pub fn column(&self, key: ColumnKey) -> Option<&ColumnOrder> {
        self.columns.get(&key)
    }

    /// Tasks of a column in order; empty for a column the snapshot has no
    /// tasks for.
    pub fn column_tasks(&self, key: ColumnKey) -> &[Task] {
        self.columns.get(&key).map(|c| c.tasks()).unwrap_or(&[])
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.columns.values().flat_map(|c| c.tasks().iter())
    }

    pub fn task_count(&self) -> usize {
        self.columns.values().map(|c| c.len()).sum()
    }

    /// Column, position and record of a task.
    pub fn find(&self, task_id: Uuid) -> Option<(ColumnKey, usize, &Task)> {
        self.columns.values().find_map(|column| {
            column
                .position_of(task_id)
                .map(|position| (column.key(), position, &column.tasks[position]))
        })
    }

    pub fn verify(&self) -> Result<()> {
        self.columns.values().try_for_each(|c| c.verify())
    }

    /// Tasks grouped per board column in render order. Columns without tasks
    /// are included with no items.
    pub fn grouped(&self, board: &Board) -> Vec<GroupedTasks> {
        board
            .column_keys()
            .into_iter()
            .map(|key| GroupedTasks {
                column_id: key,
                name: board.column_name(key).unwrap_or_default().to_string(),
                items: self.column(key).map(|c| c.ranked()).unwrap_or_default(),
            })
            .collect()
    }

    /// Computes the records to persist for a finished drag.
    ///
    /// `destination.index` is the task's final rank in the destination
    /// column. An index past the end appends.
    pub fn plan_move(&self, drag: &DragEvent) -> Result<UpdateSet> {
        let Some(destination) = drag.destination else {
            debug!("Drag of {:?} cancelled, nothing to update", drag.source);
            return Ok(UpdateSet::default());
        };
        if drag.source == destination {
            debug!("Task dropped on its own position {:?}", drag.source);
            return Ok(UpdateSet::default());
        }

        let source_tasks = self.column_tasks(drag.source.column);
        if drag.source.index >= source_tasks.len() {
            return Err(AppError::invariant(format!(
                "source index {} out of range for column {} with {} tasks",
                drag.source.index,
                drag.source.column,
                source_tasks.len()
            )));
        }

        let mut source_list = source_tasks.to_vec();
        let moved = source_list.remove(drag.source.index);
        let moved_id = moved.id;

        let same_column = drag.source.column == destination.column;
        let mut destination_list = if same_column {
            std::mem::take(&mut source_list)
        } else {
            self.column_tasks(destination.column).to_vec()
        };
        let insert_at = destination.index.min(destination_list.len());
        destination_list.insert(insert_at, moved);

        let mut updates = relink(destination.column, &destination_list);
        if !same_column {
            updates.extend(relink(drag.source.column, &source_list));
        }
        updates.sort_by_key(|t| t.id != moved_id);

        debug!(
            "Planned move of {} from {:?} to {:?}: {} record(s)",
            moved_id,
            drag.source,
            destination,
            updates.len()
        );
        Ok(UpdateSet { tasks: updates })
    }

    /// Request for a task appended at the tail of its column.
    pub fn plan_create(&self, new_task: NewTask) -> Result<CreateTaskRequest> {
        let title = new_task.title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("Task title is required".to_string()));
        }

        let above_task_id = self
            .column(new_task.column)
            .and_then(|c| c.tail())
            .map(|t| t.id);

        Ok(CreateTaskRequest {
            title: title.to_string(),
            description: new_task.description,
            column_id: new_task.column.as_column_id(),
            above_task_id,
            board_id: self.board_id,
        })
    }

    /// Records to persist so the chain closes over a deleted task. For a
    /// well-formed column that is the successor alone, now pointing at the
    /// deleted task's predecessor.
    pub fn plan_delete(&self, task_id: Uuid) -> Result<UpdateSet> {
        let (key, position, _) = self
            .find(task_id)
            .ok_or_else(|| AppError::NotFound(format!("task {}", task_id)))?;

        let mut remaining = self.column_tasks(key).to_vec();
        remaining.remove(position);

        Ok(UpdateSet {
            tasks: relink(key, &remaining),
        })
    }

    /// Content edits produce one record. Changing the column is an append
    /// move into the new column.
    pub fn plan_edit(&self, task_id: Uuid, edit: EditTask) -> Result<UpdateSet> {
        let (key, position, current) = self
            .find(task_id)
            .ok_or_else(|| AppError::NotFound(format!("task {}", task_id)))?;

        let title = match edit.title {
            Some(title) if title.trim().is_empty() => {
                return Err(AppError::Validation("Task title is required".to_string()))
            }
            Some(title) => title.trim().to_string(),
            None => current.title.clone(),
        };
        let description = match edit.description {
            Some(description) => description,
            None => current.description.clone(),
        };

        let mut updates = match edit.column {
            Some(column) if column != key => {
                let destination = DragLocation::new(column, self.column_tasks(column).len());
                self.plan_move(&DragEvent::new(DragLocation::new(key, position), destination))?
                    .into_tasks()
            }
            _ => Vec::new(),
        };

        let content_changed = title != current.title || description != current.description;
        let moved = updates.iter().position(|t| t.id == task_id);
        match moved {
            Some(i) => {
                updates[i].title = title;
                updates[i].description = description;
            }
            None if content_changed => updates.insert(
                0,
                Task {
                    title,
                    description,
                    ..current.clone()
                },
            ),
            None => {}
        }

        Ok(UpdateSet { tasks: updates })
    }

    /// Rewrites every column whose stored pointers disagree with the
    /// reconstructed order.
    pub fn plan_repair(&self) -> UpdateSet {
        let tasks = self
            .columns
            .values()
            .flat_map(|c| relink(c.key(), c.tasks()))
            .collect();
        UpdateSet { tasks }
    }

    /// New snapshot with `records` inserted or replacing tasks of the same id.
    pub fn apply(&self, records: &[Task]) -> Self {
        let mut tasks: HashMap<Uuid, Task> = self.tasks().map(|t| (t.id, t.clone())).collect();
        for record in records {
            tasks.insert(record.id, record.clone());
        }
        Self::from_tasks(self.board_id, tasks.into_values())
    }

    pub fn without_task(&self, task_id: Uuid) -> Self {
        Self::from_tasks(
            self.board_id,
            self.tasks().filter(|t| t.id != task_id).cloned(),
        )
    }

    pub fn without_column(&self, key: ColumnKey) -> Self {
        let mut columns = self.columns.clone();
        columns.remove(&key);
        Self {
            board_id: self.board_id,
            columns,
        }
    }
}

/// Records of `order` whose stored column or predecessor differ from their
/// place in `order`, rewritten to match it.
fn relink(key: ColumnKey, order: &[Task]) -> Vec<Task> {
    let mut changed = Vec::new();
    let mut above = None;
    for task in order {
        if task.above_task_id != above || task.column() != key {
            changed.push(task.clone().with_column(key).with_above_task(above));
        }
        above = Some(task.id);
    }
    changed
}
