//! Board fetcher: pulls one board's columns, tasks and members from the
//! task source.

use color_eyre::eyre::{WrapErr, bail, eyre};
use std::sync::Arc;
use tracing::{debug, warn};

use super::WatchError;
use super::directory::{AssigneeDirectory, ColumnDirectory};
use crate::weeek::{BoardId, PageRequest, ProjectId, Task, TaskSource};

/// Upper bound on pages fetched in one iteration.
const MAX_PAGES: u32 = 200;

pub struct BoardFetcher {
    source: Arc<dyn TaskSource>,
    project_id: ProjectId,
    board_id: BoardId,
    page_size: Option<u32>,
}

impl BoardFetcher {
    pub fn new(
        source: Arc<dyn TaskSource>,
        project_id: ProjectId,
        board_id: BoardId,
        page_size: Option<u32>,
    ) -> Self {
        Self {
            source,
            project_id,
            board_id,
            page_size,
        }
    }

    pub async fn fetch_members(&self) -> Result<AssigneeDirectory, WatchError> {
        let members = self
            .source
            .list_members(self.board_id)
            .await
            .wrap_err("failed to list members")
            .map_err(WatchError::Fetch)?;
        Ok(AssigneeDirectory::from_members(&members))
    }

    pub async fn fetch_columns(&self) -> Result<ColumnDirectory, WatchError> {
        let columns = self
            .source
            .list_columns(self.board_id)
            .await
            .wrap_err_with(|| format!("failed to list columns of board {}", self.board_id))
            .map_err(WatchError::Fetch)?;
        Ok(ColumnDirectory::from_columns(&columns))
    }

    /// All tasks on the board, in source order.
    pub async fn fetch_tasks(&self) -> Result<Vec<Task>, WatchError> {
        self.fetch_all()
            .await
            .wrap_err_with(|| format!("failed to list tasks of board {}", self.board_id))
            .map_err(WatchError::Fetch)
    }

    async fn fetch_all(&self) -> color_eyre::Result<Vec<Task>> {
        let Some(per_page) = self.page_size else {
            let page = self
                .source
                .list_tasks(self.project_id, self.board_id, None)
                .await?;
            if page.has_more {
                warn!(
                    board_id = self.board_id,
                    tasks = page.tasks.len(),
                    "task listing has more pages; set tasks_page_size to fetch them all"
                );
            }
            return Ok(page.tasks);
        };

        let mut tasks = Vec::new();
        let mut offset: u32 = 0;
        for _ in 0..MAX_PAGES {
            let page = self
                .source
                .list_tasks(
                    self.project_id,
                    self.board_id,
                    Some(PageRequest { per_page, offset }),
                )
                .await?;
            let received = page.tasks.len();
            tasks.extend(page.tasks);
            if !page.has_more || received == 0 {
                debug!(board_id = self.board_id, tasks = tasks.len(), "fetched all pages");
                return Ok(tasks);
            }
            offset = offset.checked_add(per_page).ok_or_else(|| {
                eyre!("task offset overflowed after {} tasks", tasks.len())
            })?;
        }
        bail!("board {} has more than {MAX_PAGES} pages of tasks", self.board_id)
    }
}
