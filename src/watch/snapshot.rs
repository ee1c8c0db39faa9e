//! Snapshot store: last observed state of every task on a watched board.
//!
//! Owned by exactly one session; only the diff engine mutates it.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};

use crate::weeek::{ColumnId, TaskId};

/// Last observed state of one remote task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSnapshot {
    pub task_id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub column_id: Option<ColumnId>,
    /// Resolved column display name.
    pub column: String,
    pub completed: bool,
    pub deleted: bool,
    /// Resolved assignee names, comma separated, or "unassigned".
    pub assignee_names: String,
    pub assignee_ids: BTreeSet<String>,
    /// When the task entered `column` (first sighting counts as entry).
    pub column_entered_at: DateTime<Utc>,
}

/// Task id → last known state for one watch session.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    tasks: HashMap<TaskId, TaskSnapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, task_id: TaskId) -> Option<&TaskSnapshot> {
        self.tasks.get(&task_id)
    }

    pub fn contains(&self, task_id: TaskId) -> bool {
        self.tasks.contains_key(&task_id)
    }

    /// Insert or replace; returns the previous snapshot.
    pub fn insert(&mut self, snapshot: TaskSnapshot) -> Option<TaskSnapshot> {
        self.tasks.insert(snapshot.task_id, snapshot)
    }

    pub fn remove(&mut self, task_id: TaskId) -> Option<TaskSnapshot> {
        self.tasks.remove(&task_id)
    }

    /// Known task ids, ascending.
    pub fn ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.tasks.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
