//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use boardwatch::channel::{Channel, ChannelEvent, OutboundMessage};
use boardwatch::log_sink::{LogSink, MoveRecord};
use boardwatch::watch::{Clock, WatchContext, WatchSettings, WatchTarget};
use boardwatch::weeek::{
    Board, BoardId, Column, Member, NewTask, PageRequest, Project, ProjectId, Task, TaskId,
    TaskPage, TaskSource,
};
use chrono::{DateTime, TimeZone, Utc};
use color_eyre::Result;
use color_eyre::eyre::{bail, eyre};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

pub const TODO: i64 = 1;
pub const DOING: i64 = 2;
pub const DONE: i64 = 3;

pub fn task(id: TaskId, title: &str, column: i64, assignees: &[&str]) -> Task {
    Task {
        id,
        title: title.into(),
        column_id: Some(column),
        assignees: assignees.iter().map(|a| a.to_string()).collect(),
        ..Task::default()
    }
}

/// Remote board whose contents the test rewrites between polls.
#[derive(Debug, Default)]
pub struct BoardState {
    pub projects: Vec<Project>,
    pub boards: Vec<Board>,
    pub columns: Vec<Column>,
    pub members: Vec<Member>,
    pub tasks: Vec<Task>,
    pub fail_tasks: bool,
    pub fail_members: bool,
    /// Make task listings panic.
    pub panic_tasks: bool,
    pub created: Vec<NewTask>,
    pub task_fetches: usize,
}

pub struct FakeSource {
    state: Mutex<BoardState>,
    /// One-shot gate that holds the next task listing open.
    gate: Mutex<Option<Arc<Notify>>>,
    fetch_started: Arc<Notify>,
}

impl FakeSource {
    /// One project (1) with one board (10, "Sprint") and Todo/Doing/Done.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(BoardState {
                projects: vec![Project {
                    id: 1,
                    name: "Apollo".into(),
                }],
                boards: vec![Board {
                    id: 10,
                    name: "Sprint".into(),
                }],
                columns: vec![
                    Column {
                        id: TODO,
                        name: "Todo".into(),
                    },
                    Column {
                        id: DOING,
                        name: "Doing".into(),
                    },
                    Column {
                        id: DONE,
                        name: "Done".into(),
                    },
                ],
                members: vec![
                    Member {
                        id: "a".into(),
                        first_name: "Anna".into(),
                        last_name: "Petrova".into(),
                    },
                    Member {
                        id: "b".into(),
                        first_name: "Boris".into(),
                        last_name: "Kim".into(),
                    },
                ],
                ..BoardState::default()
            }),
            gate: Mutex::new(None),
            fetch_started: Arc::new(Notify::new()),
        })
    }

    /// Hold the next task listing until the returned gate is notified.
    pub fn hold_next_task_fetch(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Fires once a held task listing has started.
    pub async fn held_fetch_started(&self) {
        self.fetch_started.notified().await;
    }

    pub fn set_tasks(&self, tasks: Vec<Task>) {
        self.update(|s| s.tasks = tasks);
    }

    pub fn update(&self, f: impl FnOnce(&mut BoardState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn read<T>(&self, f: impl FnOnce(&BoardState) -> T) -> T {
        f(&self.state.lock().unwrap())
    }
}

#[async_trait]
impl TaskSource for FakeSource {
    async fn list_projects(&self) -> Result<Vec<Project>> {
        Ok(self.read(|s| s.projects.clone()))
    }

    async fn list_boards(&self, _project_id: ProjectId) -> Result<Vec<Board>> {
        Ok(self.read(|s| s.boards.clone()))
    }

    async fn list_columns(&self, _board_id: BoardId) -> Result<Vec<Column>> {
        Ok(self.read(|s| s.columns.clone()))
    }

    async fn list_tasks(
        &self,
        _project_id: ProjectId,
        _board_id: BoardId,
        page: Option<PageRequest>,
    ) -> Result<TaskPage> {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            self.fetch_started.notify_one();
            gate.notified().await;
        }
        if self.read(|s| s.panic_tasks) {
            panic!("task listing blew up");
        }

        let mut state = self.state.lock().unwrap();
        state.task_fetches += 1;
        if state.fail_tasks {
            bail!("Weeek API returned 503 Service Unavailable");
        }
        Ok(match page {
            None => TaskPage {
                tasks: state.tasks.clone(),
                has_more: false,
            },
            Some(PageRequest { per_page, offset }) => {
                let start = (offset as usize).min(state.tasks.len());
                let end = (start + per_page as usize).min(state.tasks.len());
                TaskPage {
                    tasks: state.tasks[start..end].to_vec(),
                    has_more: end < state.tasks.len(),
                }
            }
        })
    }

    async fn list_members(&self, _board_id: BoardId) -> Result<Vec<Member>> {
        let state = self.state.lock().unwrap();
        if state.fail_members {
            bail!("Weeek API returned 401 Unauthorized");
        }
        Ok(state.members.clone())
    }

    async fn get_task(&self, task_id: TaskId) -> Result<Task> {
        self.read(|s| s.tasks.iter().find(|t| t.id == task_id).cloned())
            .ok_or_else(|| eyre!("task {task_id} not found"))
    }

    async fn create_task(&self, task: &NewTask) -> Result<bool> {
        self.update(|s| s.created.push(task.clone()));
        Ok(true)
    }
}

/// Log sink that records every delivery attempt.
#[derive(Default)]
pub struct RecordingSink {
    pub records: Mutex<Vec<MoveRecord>>,
    pub fail: Mutex<bool>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<MoveRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[async_trait]
impl LogSink for RecordingSink {
    async fn log_move(&self, record: &MoveRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        if *self.fail.lock().unwrap() {
            bail!("log sink returned 500 Internal Server Error");
        }
        Ok(())
    }
}

/// Chat channel that records outbound traffic.
#[derive(Default)]
pub struct RecordingChannel {
    pub sent: Mutex<Vec<OutboundMessage>>,
    pub edited: Mutex<Vec<(i64, OutboundMessage)>>,
    pub answered: Mutex<Vec<String>>,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.text.clone())
            .collect()
    }

    pub fn last(&self) -> OutboundMessage {
        self.sent
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no message sent")
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.texts().iter().filter(|t| t.contains(needle)).count()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn run(&self, _tx: Sender<ChannelEvent>, cancel: CancellationToken) {
        cancel.cancelled().await;
    }

    async fn send_message(&self, msg: &OutboundMessage) -> Result<()> {
        self.sent.lock().unwrap().push(msg.clone());
        Ok(())
    }

    async fn edit_message(&self, message_id: i64, msg: &OutboundMessage) -> Result<()> {
        self.edited.lock().unwrap().push((message_id, msg.clone()));
        Ok(())
    }

    async fn answer_callback_query(&self, callback_query_id: &str) {
        self.answered
            .lock()
            .unwrap()
            .push(callback_query_id.to_owned());
    }
}

/// Wall clock driven by tokio's (pausable) clock, starting at [`t0`].
pub struct TokioClock {
    start: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start: tokio::time::Instant::now(),
        })
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.start.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        t0() + elapsed
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap()
}

pub fn sprint() -> WatchTarget {
    WatchTarget {
        project_id: 1,
        board_id: 10,
        board_name: "Sprint".into(),
    }
}

pub struct Harness {
    pub source: Arc<FakeSource>,
    pub sink: Arc<RecordingSink>,
    pub channel: Arc<RecordingChannel>,
    pub ctx: WatchContext,
}

impl Harness {
    /// 2s poll interval, 5s backoff, UTC+3.
    pub fn new() -> Self {
        let source = FakeSource::new();
        let sink = RecordingSink::new();
        let channel = RecordingChannel::new();
        let ctx = WatchContext {
            source: source.clone(),
            sink: sink.clone(),
            channel: channel.clone(),
            clock: TokioClock::new(),
            settings: WatchSettings {
                poll_interval: Duration::from_secs(2),
                error_backoff: Duration::from_secs(5),
                page_size: None,
                notify_fetch_errors: true,
                time_zone: chrono::FixedOffset::east_opt(3 * 3600).unwrap(),
            },
        };
        Self {
            source,
            sink,
            channel,
            ctx,
        }
    }
}

/// Let paused time run forward so sessions make progress.
pub async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}
