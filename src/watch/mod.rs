//! Board watching: the polling and change-detection engine.
//!
//! One watch session per chat polls a board, diffs the fetched tasks
//! against the session's snapshot store, notifies the chat about every
//! change and reports column transitions to the log sink.
//!
//! - [`fetcher`] pulls columns, tasks and members from the task source.
//! - [`diff`] turns a fetch into typed [`ChangeEvent`]s.
//! - [`notify`] renders events into chat messages.
//! - [`transition`] emits one log record per assignee for column moves.
//! - [`poller`] is the per-session loop.
//! - [`supervisor`] owns the loops: at most one per chat.

pub mod diff;
pub mod directory;
pub mod fetcher;
pub mod notify;
pub mod poller;
pub mod snapshot;
pub mod supervisor;
pub mod transition;

pub use diff::{ChangeEvent, ColumnTransition, diff_board};
pub use directory::{AssigneeDirectory, ColumnDirectory};
pub use snapshot::{SnapshotStore, TaskSnapshot};
pub use supervisor::{SessionExit, SessionState, SessionSupervisor, WatchSession};

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::channel::Channel;
use crate::log_sink::LogSink;
use crate::weeek::{BoardId, ProjectId, TaskId, TaskSource};

/// The board a chat is watching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchTarget {
    pub project_id: ProjectId,
    pub board_id: BoardId,
    /// Display name, recorded with every logged transition.
    pub board_name: String,
}

/// Per-session loop tuning.
#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    /// Page size for task listing; `None` fetches in one request.
    pub page_size: Option<u32>,
    /// Warn the chat once when fetches start failing.
    pub notify_fetch_errors: bool,
    /// Offset used for `move_time` in log records.
    pub time_zone: FixedOffset,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            error_backoff: Duration::from_secs(5),
            page_size: None,
            notify_fetch_errors: true,
            time_zone: Utc.fix(),
        }
    }
}

/// Errors a watch iteration can end with.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The task source failed or answered with a non-success response.
    #[error("board fetch failed: {0:#}")]
    Fetch(color_eyre::Report),

    /// The same task id appeared twice in one fetch.
    #[error("task {0} appears more than once in a single board fetch")]
    DuplicateTask(TaskId),
}

impl WatchError {
    /// Transient errors are retried; everything else ends the session.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }
}

/// Source of "now" for dwell-time bookkeeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Collaborators shared by every session a supervisor starts.
#[derive(Clone)]
pub struct WatchContext {
    pub source: Arc<dyn TaskSource>,
    pub sink: Arc<dyn LogSink>,
    pub channel: Arc<dyn Channel>,
    pub clock: Arc<dyn Clock>,
    pub settings: WatchSettings,
}
