//! Diff engine: compares a fresh board fetch against the snapshot store.
//!
//! For each fetched task, in fetch order:
//! - unknown id → [`ChangeEvent::NewTask`], column entry time = now
//! - known id → one event per differing field, compared in the fixed order
//!   title, assignees, column, completion, deletion. Deletion only fires on
//!   the false → true edge. Columns compare by id, so renaming a column is
//!   not a move. A column change records the dwell time in the previous
//!   column and restarts the clock; any other change keeps it.
//!
//! Ids known before but missing from the fetch produce
//! [`ChangeEvent::TaskRemoved`] and leave the store, so after every diff the
//! store holds exactly the ids of the latest fetch.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};

use super::WatchError;
use super::directory::{AssigneeDirectory, ColumnDirectory};
use super::snapshot::{SnapshotStore, TaskSnapshot};
use crate::weeek::{Task, TaskId};

/// A task moved between columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnTransition {
    pub task_id: TaskId,
    pub title: String,
    pub from: String,
    pub to: String,
    /// Seconds the task spent in `from`.
    pub dwell_secs: f64,
    pub moved_at: DateTime<Utc>,
    /// Assignees on the task before the move.
    pub assignees_before: BTreeSet<String>,
}

/// One semantic change on a watched board.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    NewTask {
        task_id: TaskId,
        title: String,
        column: String,
        assignees: String,
    },
    TitleChanged {
        task_id: TaskId,
        old: String,
        new: String,
    },
    AssigneeChanged {
        task_id: TaskId,
        title: String,
        old: String,
        new: String,
    },
    ColumnChanged(ColumnTransition),
    StatusChanged {
        task_id: TaskId,
        title: String,
        was_completed: bool,
        completed: bool,
    },
    TaskDeleted {
        task_id: TaskId,
        title: String,
    },
    TaskRemoved {
        task_id: TaskId,
        title: String,
    },
}

impl ChangeEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            Self::ColumnChanged(t) => t.task_id,
            Self::NewTask { task_id, .. }
            | Self::TitleChanged { task_id, .. }
            | Self::AssigneeChanged { task_id, .. }
            | Self::StatusChanged { task_id, .. }
            | Self::TaskDeleted { task_id, .. }
            | Self::TaskRemoved { task_id, .. } => *task_id,
        }
    }

    /// Current title of the task the event is about.
    pub fn title(&self) -> &str {
        match self {
            Self::ColumnChanged(t) => &t.title,
            Self::TitleChanged { new, .. } => new,
            Self::NewTask { title, .. }
            | Self::AssigneeChanged { title, .. }
            | Self::StatusChanged { title, .. }
            | Self::TaskDeleted { title, .. }
            | Self::TaskRemoved { title, .. } => title,
        }
    }
}

/// Diff `tasks` against `store`, updating the store in place.
///
/// Fails without touching the store when the fetch is malformed (the same
/// task id twice).
pub fn diff_board(
    store: &mut SnapshotStore,
    tasks: &[Task],
    columns: &ColumnDirectory,
    assignees: &AssigneeDirectory,
    now: DateTime<Utc>,
) -> Result<Vec<ChangeEvent>, WatchError> {
    let mut seen: HashSet<TaskId> = HashSet::with_capacity(tasks.len());
    for task in tasks {
        if !seen.insert(task.id) {
            return Err(WatchError::DuplicateTask(task.id));
        }
    }

    let mut events = Vec::new();

    for task in tasks {
        let assignee_ids: BTreeSet<String> = task.assignees.iter().cloned().collect();
        let mut next = TaskSnapshot {
            task_id: task.id,
            title: task.title.clone(),
            description: task.description.clone(),
            column_id: task.column_id,
            column: columns.name(task.column_id),
            completed: task.completed,
            deleted: task.deleted,
            assignee_names: assignees.render(&assignee_ids),
            assignee_ids,
            column_entered_at: now,
        };

        match store.get(task.id) {
            None => {
                events.push(ChangeEvent::NewTask {
                    task_id: task.id,
                    title: next.title.clone(),
                    column: next.column.clone(),
                    assignees: next.assignee_names.clone(),
                });
            }
            Some(prev) => {
                next.column_entered_at = prev.column_entered_at;
                compare(prev, &mut next, now, &mut events);
            }
        }

        store.insert(next);
    }

    for id in store.ids() {
        if seen.contains(&id) {
            continue;
        }
        if let Some(gone) = store.remove(id) {
            events.push(ChangeEvent::TaskRemoved {
                task_id: id,
                title: gone.title,
            });
        }
    }

    Ok(events)
}

/// Field-by-field comparison of a known task.
fn compare(
    prev: &TaskSnapshot,
    next: &mut TaskSnapshot,
    now: DateTime<Utc>,
    events: &mut Vec<ChangeEvent>,
) {
    if prev.title != next.title {
        events.push(ChangeEvent::TitleChanged {
            task_id: next.task_id,
            old: prev.title.clone(),
            new: next.title.clone(),
        });
    }

    if prev.assignee_ids != next.assignee_ids {
        events.push(ChangeEvent::AssigneeChanged {
            task_id: next.task_id,
            title: next.title.clone(),
            old: prev.assignee_names.clone(),
            new: next.assignee_names.clone(),
        });
    }

    if prev.column_id != next.column_id {
        events.push(ChangeEvent::ColumnChanged(ColumnTransition {
            task_id: next.task_id,
            title: next.title.clone(),
            from: prev.column.clone(),
            to: next.column.clone(),
            dwell_secs: dwell_secs(prev.column_entered_at, now),
            moved_at: now,
            assignees_before: prev.assignee_ids.clone(),
        }));
        next.column_entered_at = now;
    }

    if prev.completed != next.completed {
        events.push(ChangeEvent::StatusChanged {
            task_id: next.task_id,
            title: next.title.clone(),
            was_completed: prev.completed,
            completed: next.completed,
        });
    }

    if !prev.deleted && next.deleted {
        events.push(ChangeEvent::TaskDeleted {
            task_id: next.task_id,
            title: next.title.clone(),
        });
    }
}

/// Seconds between `since` and `now`, never negative.
fn dwell_secs(since: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - since).num_milliseconds().max(0);
    millis as f64 / 1000.0
}
