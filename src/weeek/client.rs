//! Weeek public API client.
//!
//! Every endpoint answers with an envelope `{"success": bool, ...}` where the
//! payload sits under an endpoint-specific key (`projects`, `boardColumns`,
//! `tasks`, ...). A non-2xx status or `success: false` is an error.

use async_trait::async_trait;
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, bail, eyre};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use super::{
    Board, BoardId, Column, Member, NewTask, PageRequest, Project, ProjectId, Task, TaskId,
    TaskPage, TaskSource,
};

pub const DEFAULT_BASE_URL: &str = "https://api.weeek.net/public/v1";

/// Weeek REST client. Reuses one HTTP client for connection pooling.
pub struct WeeekClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl WeeekClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .wrap_err("failed to build Weeek HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .wrap_err_with(|| format!("GET {path} failed"))?;
        Self::read_envelope(path, response).await
    }

    async fn read_envelope(path: &str, response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable>".to_string());
            bail!("Weeek API returned {status} for {path}: {body}");
        }

        let body: Value = response
            .json()
            .await
            .wrap_err_with(|| format!("invalid JSON from {path}"))?;
        if !body.get("success").and_then(Value::as_bool).unwrap_or(false) {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            bail!("Weeek API rejected {path}: {message}");
        }
        Ok(body)
    }
}

/// Pull `key` out of an envelope and deserialize it.
fn take_field<T: DeserializeOwned>(body: &mut Value, key: &str) -> Result<T> {
    let value = body
        .get_mut(key)
        .map(Value::take)
        .ok_or_else(|| eyre!("response is missing `{key}`"))?;
    serde_json::from_value(value).wrap_err_with(|| format!("unexpected shape of `{key}`"))
}

#[async_trait]
impl TaskSource for WeeekClient {
    async fn list_projects(&self) -> Result<Vec<Project>> {
        let mut body = self.get("tm/projects", &[]).await?;
        take_field(&mut body, "projects")
    }

    async fn list_boards(&self, project_id: ProjectId) -> Result<Vec<Board>> {
        let mut body = self
            .get("tm/boards", &[("projectId", project_id.to_string())])
            .await?;
        take_field(&mut body, "boards")
    }

    async fn list_columns(&self, board_id: BoardId) -> Result<Vec<Column>> {
        let mut body = self
            .get("tm/board-columns", &[("boardId", board_id.to_string())])
            .await?;
        take_field(&mut body, "boardColumns")
    }

    async fn list_tasks(
        &self,
        project_id: ProjectId,
        board_id: BoardId,
        page: Option<PageRequest>,
    ) -> Result<TaskPage> {
        let mut query = vec![
            ("projectId", project_id.to_string()),
            ("boardId", board_id.to_string()),
        ];
        if let Some(page) = page {
            query.push(("perPage", page.per_page.to_string()));
            query.push(("offset", page.offset.to_string()));
        }

        let mut body = self.get("tm/tasks", &query).await?;
        let tasks: Vec<Task> = take_field(&mut body, "tasks")?;
        let has_more = body
            .get("hasMore")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(TaskPage { tasks, has_more })
    }

    async fn list_members(&self, _board_id: BoardId) -> Result<Vec<Member>> {
        // Membership is workspace-wide in Weeek.
        let mut body = self.get("ws/members", &[]).await?;
        take_field(&mut body, "members")
    }

    async fn get_task(&self, task_id: TaskId) -> Result<Task> {
        let mut body = self.get(&format!("tm/tasks/{task_id}"), &[]).await?;
        take_field(&mut body, "task")
    }

    async fn create_task(&self, task: &NewTask) -> Result<bool> {
        let payload = serde_json::json!({
            "locations": [{
                "projectId": task.project_id,
                "boardColumnId": task.column_id,
            }],
            "title": task.title,
            "description": task.description,
            "type": "action",
            "priority": 0,
        });

        let response = self
            .client
            .post(self.url("tm/tasks"))
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await
            .wrap_err("POST tm/tasks failed")?;

        match Self::read_envelope("tm/tasks", response).await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!(error = %e, title = %task.title, "task creation rejected");
                Ok(false)
            }
        }
    }
}
