//! Task Source: the remote project-management service the bot watches.
//!
//! [`TaskSource`] is the seam the watch core depends on; [`WeeekClient`] is
//! the production implementation backed by the Weeek public REST API.

pub mod client;

pub use client::WeeekClient;

use async_trait::async_trait;
use color_eyre::Result;
use serde::{Deserialize, Serialize};

pub type ProjectId = i64;
pub type BoardId = i64;
pub type ColumnId = i64;
pub type TaskId = i64;

/// A project in the workspace.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    #[serde(default)]
    pub name: String,
}

/// A Kanban board inside a project.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Board {
    pub id: BoardId,
    #[serde(default)]
    pub name: String,
}

/// A named stage within a board.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    #[serde(default)]
    pub name: String,
}

/// A remote task as returned by the task listing endpoint.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "boardColumnId")]
    pub column_id: Option<ColumnId>,
    #[serde(default, rename = "isCompleted")]
    pub completed: bool,
    #[serde(default, rename = "isDeleted")]
    pub deleted: bool,
    /// Member identifiers assigned to the task.
    #[serde(default, alias = "assigneeIds")]
    pub assignees: Vec<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// A workspace member who can be assigned to tasks.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl Member {
    /// "First Last", trimmed; falls back to the member id when both are empty.
    pub fn display_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim();
        if name.is_empty() {
            self.id.clone()
        } else {
            name.to_owned()
        }
    }
}

/// One page request for the task listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub per_page: u32,
    pub offset: u32,
}

/// One page of tasks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    pub has_more: bool,
}

/// Payload for creating a task in a board column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTask {
    pub project_id: ProjectId,
    pub column_id: ColumnId,
    pub title: String,
    pub description: String,
}

/// Remote task source. Every call may fail with a transport error or a
/// non-success response.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn list_projects(&self) -> Result<Vec<Project>>;

    async fn list_boards(&self, project_id: ProjectId) -> Result<Vec<Board>>;

    async fn list_columns(&self, board_id: BoardId) -> Result<Vec<Column>>;

    /// List tasks on a board. `None` requests the source's default page.
    async fn list_tasks(
        &self,
        project_id: ProjectId,
        board_id: BoardId,
        page: Option<PageRequest>,
    ) -> Result<TaskPage>;

    /// Members that may be assigned to tasks on the board.
    async fn list_members(&self, board_id: BoardId) -> Result<Vec<Member>>;

    async fn get_task(&self, task_id: TaskId) -> Result<Task>;

    /// Create a task. Returns whether the source accepted it.
    async fn create_task(&self, task: &NewTask) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_deserializes_weeek_shape() {
        let json = r#"{
            "id": 17,
            "title": "Write report",
            "description": "<p>draft</p>",
            "boardColumnId": 3,
            "isCompleted": false,
            "isDeleted": false,
            "assignees": ["u-1", "u-2"],
            "createdAt": "2025-03-01T10:00:00Z",
            "dueDate": null,
            "type": "action",
            "priority": 2
        }"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.id, 17);
        assert_eq!(task.column_id, Some(3));
        assert_eq!(task.assignees, vec!["u-1", "u-2"]);
        assert_eq!(task.kind.as_deref(), Some("action"));
        assert!(task.due_date.is_none());
    }

    #[test]
    fn test_task_defaults_missing_fields() {
        let task: Task = serde_json::from_str(r#"{"id": 5}"#).unwrap();
        assert_eq!(task.title, "");
        assert!(task.assignees.is_empty());
        assert!(!task.completed);
        assert!(!task.deleted);
        assert!(task.column_id.is_none());
    }

    #[test]
    fn test_task_accepts_assignee_ids_alias() {
        let task: Task = serde_json::from_str(r#"{"id": 5, "assigneeIds": ["a"]}"#).unwrap();
        assert_eq!(task.assignees, vec!["a"]);
    }

    #[test]
    fn test_member_display_name() {
        let full = Member {
            id: "u-1".into(),
            first_name: "Anna".into(),
            last_name: "Petrova".into(),
        };
        assert_eq!(full.display_name(), "Anna Petrova");

        let first_only = Member {
            id: "u-2".into(),
            first_name: "Ivan".into(),
            last_name: String::new(),
        };
        assert_eq!(first_only.display_name(), "Ivan");

        let anonymous = Member {
            id: "u-3".into(),
            first_name: String::new(),
            last_name: String::new(),
        };
        assert_eq!(anonymous.display_name(), "u-3");
    }
}
