//! Bot mode: Telegram front-end driving the watch supervisor.
//!
//! The bot runs a `tokio::select!` loop over:
//! 1. Telegram updates (via mpsc channel from the background long-poll)
//! 2. A reap timer collecting watch loops that ended on their own
//! 3. Shutdown signals (SIGTERM/SIGINT)

pub mod render;
pub mod selections;

use color_eyre::eyre::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::telegram::TelegramChannel;
use crate::channel::{Channel, ChannelEvent, OutboundMessage};
use crate::config::Config;
use crate::log_sink::{HttpLogSink, LogSink};
use crate::watch::fetcher::BoardFetcher;
use crate::watch::{
    AssigneeDirectory, Clock, ColumnDirectory, SessionExit, SessionSupervisor, SystemClock,
    WatchContext, WatchError, WatchTarget,
};
use crate::weeek::{BoardId, ColumnId, NewTask, ProjectId, TaskId, TaskSource, WeeekClient};
use selections::SelectionStore;

const HELP: &str = "\
/projects - choose a project and a board to watch
/watch <project_id> <board_id> - watch a board directly
/stop - stop watching
/status - what is being watched
/tasks [column] [page] - list tasks of the selected board
/task <id> - show one task
/add <column> | <title> | <description> - create a task
/help - this message";

/// An inline keyboard press, decoded from its callback data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callback {
    Project(ProjectId),
    Board(ProjectId, BoardId),
    /// Task list page, optionally limited to one column.
    Page(u32, Option<ColumnId>),
    /// Column picked for the task list; `None` is "all columns".
    Tasks(Option<ColumnId>),
    Task(TaskId),
}

impl Callback {
    pub fn parse(data: &str) -> Option<Self> {
        let (kind, rest) = data.split_once(':')?;
        match kind {
            "project" => rest.parse().ok().map(Self::Project),
            "board" => {
                let (project, board) = rest.split_once(':')?;
                Some(Self::Board(project.parse().ok()?, board.parse().ok()?))
            }
            "page" => {
                let (page, column) = match rest.split_once(':') {
                    Some((page, column)) => (page, Some(column.parse().ok()?)),
                    None => (rest, None),
                };
                let page = page.parse().ok().filter(|p| *p > 0)?;
                Some(Self::Page(page, column))
            }
            "tasks" => match rest {
                "all" => Some(Self::Tasks(None)),
                column => column.parse().ok().map(|id| Self::Tasks(Some(id))),
            },
            "task" => rest.parse().ok().map(Self::Task),
            _ => None,
        }
    }
}

/// Arguments of `/tasks [column] [page]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TasksArgs {
    /// Column name or id; `None` lists every column.
    pub column: Option<String>,
    pub page: u32,
}

impl TasksArgs {
    /// A trailing number is the page and anything before it names the column.
    pub fn parse(args: &str) -> Option<Self> {
        let args = args.trim();
        let (column, page) = match args.rsplit_once(char::is_whitespace) {
            Some((column, page)) => match page.parse::<u32>() {
                Ok(page) => (column.trim(), page),
                Err(_) => (args, 1),
            },
            None => match args.parse::<u32>() {
                Ok(page) => ("", page),
                Err(_) => (args, 1),
            },
        };
        if page == 0 {
            return None;
        }
        Some(Self {
            column: (!column.is_empty()).then(|| column.to_owned()),
            page,
        })
    }
}

/// Which column a task listing is limited to.
enum ColumnQuery<'a> {
    All,
    Id(ColumnId),
    Name(&'a str),
}

impl From<Option<ColumnId>> for ColumnQuery<'_> {
    fn from(column: Option<ColumnId>) -> Self {
        column.map_or(Self::All, Self::Id)
    }
}

/// Arguments of `/add <column> | <title> | <description>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddArgs {
    pub column: String,
    pub title: String,
    pub description: String,
}

impl AddArgs {
    pub fn parse(args: &str) -> Option<Self> {
        let mut parts = args.splitn(3, '|').map(str::trim);
        let column = parts.next().filter(|c| !c.is_empty())?;
        let title = parts.next().filter(|t| !t.is_empty())?;
        let description = parts.next().unwrap_or_default();
        Some(Self {
            column: column.to_owned(),
            title: title.to_owned(),
            description: description.to_owned(),
        })
    }
}

pub struct Bot {
    config: Config,
    channel: Arc<dyn Channel>,
    source: Arc<dyn TaskSource>,
    supervisor: SessionSupervisor,
    selections: SelectionStore,
}

impl Bot {
    pub fn new(
        config: Config,
        channel: Arc<dyn Channel>,
        source: Arc<dyn TaskSource>,
        sink: Arc<dyn LogSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let ctx = WatchContext {
            source: source.clone(),
            sink,
            channel: channel.clone(),
            clock,
            settings: config.watch_settings()?,
        };
        let selections = SelectionStore::load(&config.state_path);
        Ok(Self {
            config,
            channel,
            source,
            supervisor: SessionSupervisor::new(ctx),
            selections,
        })
    }

    pub fn supervisor(&self) -> &SessionSupervisor {
        &self.supervisor
    }

    /// Run until `cancel` fires or the channel closes. Every watch is
    /// stopped and awaited before returning.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        let (tx, mut rx) = mpsc::channel::<ChannelEvent>(64);
        let channel = self.channel.clone();
        let poll_cancel = cancel.clone();
        tokio::spawn(async move {
            channel.run(tx, poll_cancel).await;
        });

        self.resume().await;

        let mut reap_timer = tokio::time::interval(Duration::from_secs(5));
        reap_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // Skip the first immediate tick.
        reap_timer.tick().await;

        info!(channel = self.channel.name(), "ready, listening for commands");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("shutting down");
                    break;
                }

                event = rx.recv() => {
                    match event {
                        Some(event) => {
                            if let Err(e) = self.handle_event(event).await {
                                warn!("error handling event: {e:#}");
                            }
                        }
                        None => {
                            info!("channel closed, shutting down");
                            break;
                        }
                    }
                }

                _ = reap_timer.tick() => self.reap().await,
            }
        }

        self.supervisor.shutdown().await;
        self.selections.save()?;
        info!("state saved, goodbye");
        Ok(())
    }

    /// Restart the watches that were running before the last shutdown.
    pub async fn resume(&mut self) {
        for (chat_id, target) in self.selections.watching() {
            if !self.config.is_chat_allowed(chat_id) {
                continue;
            }
            info!(chat_id, board_id = target.board_id, "resuming watch");
            self.supervisor.replace(chat_id, target).await;
        }
    }

    /// Forget loops that ended on their own so they are not resumed.
    async fn reap(&mut self) {
        let mut changed = false;
        for (chat_id, exit) in self.supervisor.reap().await {
            if exit != SessionExit::Cancelled {
                changed |= self.selections.set_watching(chat_id, false);
            }
        }
        if changed {
            self.save_selections();
        }
    }

    /// Handle one event from the channel.
    pub async fn handle_event(&mut self, event: ChannelEvent) -> Result<()> {
        match event {
            ChannelEvent::CallbackQuery {
                chat_id,
                message_id,
                user_name,
                data,
                callback_query_id,
            } => {
                // Always acknowledge immediately to dismiss Telegram's spinner.
                self.channel.answer_callback_query(&callback_query_id).await;
                if !self.config.is_chat_allowed(chat_id) {
                    return Ok(());
                }
                debug!(chat_id, user = %user_name, %data, "callback");
                self.handle_callback(chat_id, message_id, &data).await
            }
            ChannelEvent::Command {
                chat_id,
                user_name,
                command,
                args,
                ..
            } => {
                if !self.config.is_chat_allowed(chat_id) {
                    debug!(chat_id, "ignoring command from disallowed chat");
                    return Ok(());
                }
                info!(chat_id, user = %user_name, "command /{command} {args}");
                self.handle_command(chat_id, &command, args.trim()).await
            }
            ChannelEvent::Message { chat_id, .. } => {
                if !self.config.is_chat_allowed(chat_id) {
                    return Ok(());
                }
                self.send(chat_id, "I only understand commands. Try /help.")
                    .await
            }
        }
    }

    async fn handle_callback(
        &mut self,
        chat_id: i64,
        message_id: Option<i64>,
        data: &str,
    ) -> Result<()> {
        match Callback::parse(data) {
            Some(Callback::Project(project_id)) => self.choose_project(chat_id, project_id).await,
            Some(Callback::Board(project_id, board_id)) => {
                self.watch_board(chat_id, project_id, board_id).await
            }
            Some(Callback::Page(page, column)) => {
                self.show_tasks(chat_id, page, column.into(), message_id)
                    .await
            }
            Some(Callback::Tasks(column)) => {
                self.show_tasks(chat_id, 1, column.into(), message_id)
                    .await
            }
            Some(Callback::Task(task_id)) => self.show_task(chat_id, task_id).await,
            None => {
                warn!(chat_id, data, "unknown callback data");
                Ok(())
            }
        }
    }

    async fn handle_command(&mut self, chat_id: i64, command: &str, args: &str) -> Result<()> {
        match command {
            "start" | "projects" => self.list_projects(chat_id).await,
            "watch" => {
                let mut ids = args.split_whitespace().map(str::parse::<i64>);
                match (ids.next(), ids.next(), ids.next()) {
                    (Some(Ok(project_id)), Some(Ok(board_id)), None) => {
                        self.watch_board(chat_id, project_id, board_id).await
                    }
                    _ => self.send(chat_id, "Usage: /watch <project_id> <board_id>").await,
                }
            }
            "stop" => self.stop(chat_id).await,
            "status" => self.status(chat_id).await,
            "tasks" if args.is_empty() => self.choose_task_column(chat_id).await,
            "tasks" => match TasksArgs::parse(args) {
                Some(TasksArgs { column, page }) => {
                    let column = column.as_deref().map_or(ColumnQuery::All, ColumnQuery::Name);
                    self.show_tasks(chat_id, page, column, None).await
                }
                None => self.send(chat_id, "Usage: /tasks [column] [page]").await,
            },
            "task" => match args.parse::<TaskId>() {
                Ok(task_id) => self.show_task(chat_id, task_id).await,
                Err(_) => self.send(chat_id, "Usage: /task <id>").await,
            },
            "add" => match AddArgs::parse(args) {
                Some(add) => self.add_task(chat_id, add).await,
                None => {
                    self.send(chat_id, "Usage: /add <column> | <title> | <description>")
                        .await
                }
            },
            "help" => self.send(chat_id, HELP).await,
            _ => self.send(chat_id, "Unknown command. Try /help.").await,
        }
    }

    async fn list_projects(&mut self, chat_id: i64) -> Result<()> {
        let projects = match self.source.list_projects().await {
            Ok(projects) => projects,
            Err(e) => {
                warn!(chat_id, "failed to list projects: {e:#}");
                return self.send(chat_id, "⚠️ Could not load projects.").await;
            }
        };
        if projects.is_empty() {
            return self.send(chat_id, "No projects found.").await;
        }
        let msg = OutboundMessage::text(chat_id, "Choose a project:")
            .with_buttons(render::project_buttons(&projects));
        self.channel.send_message(&msg).await
    }

    /// A project change stops the chat's watch before listing boards.
    async fn choose_project(&mut self, chat_id: i64, project_id: ProjectId) -> Result<()> {
        if self.supervisor.stop(chat_id).await.is_some() {
            self.send(chat_id, "⏹ Stopped watching the previous board.")
                .await?;
        }
        self.selections.select_project(chat_id, project_id);
        self.save_selections();

        let boards = match self.source.list_boards(project_id).await {
            Ok(boards) => boards,
            Err(e) => {
                warn!(chat_id, project_id, "failed to list boards: {e:#}");
                return self.send(chat_id, "⚠️ Could not load boards.").await;
            }
        };
        if boards.is_empty() {
            return self.send(chat_id, "This project has no boards.").await;
        }
        let msg = OutboundMessage::text(chat_id, "Choose a board to watch:")
            .with_buttons(render::board_buttons(project_id, &boards));
        self.channel.send_message(&msg).await
    }

    async fn watch_board(
        &mut self,
        chat_id: i64,
        project_id: ProjectId,
        board_id: BoardId,
    ) -> Result<()> {
        let board_name = match self.source.list_boards(project_id).await {
            Ok(boards) => match boards.into_iter().find(|b| b.id == board_id) {
                Some(board) if !board.name.trim().is_empty() => board.name,
                Some(_) => format!("Board {board_id}"),
                None => {
                    return self
                        .send(chat_id, &format!("Board {board_id} not found in project {project_id}."))
                        .await;
                }
            },
            Err(e) => {
                warn!(chat_id, project_id, "failed to resolve board name: {e:#}");
                format!("Board {board_id}")
            }
        };

        let target = WatchTarget {
            project_id,
            board_id,
            board_name,
        };
        self.send(chat_id, &format!("✅ Watching {}", target.board_name))
            .await?;
        if let Some(previous) = self.supervisor.replace(chat_id, target.clone()).await {
            debug!(chat_id, ?previous, "replaced previous watch");
        }
        self.selections.select_board(chat_id, target);
        self.save_selections();
        Ok(())
    }

    async fn stop(&mut self, chat_id: i64) -> Result<()> {
        let stopped = self.supervisor.stop(chat_id).await;
        if self.selections.set_watching(chat_id, false) {
            self.save_selections();
        }
        match (stopped, self.selections.board(chat_id)) {
            (Some(_), Some(board)) => {
                let text = format!("⏹ Stopped watching {}.", board.board_name);
                self.send(chat_id, &text).await
            }
            (Some(_), None) => self.send(chat_id, "⏹ Stopped watching.").await,
            (None, _) => self.send(chat_id, "Not watching any board.").await,
        }
    }

    async fn status(&mut self, chat_id: i64) -> Result<()> {
        let text = match self.supervisor.session(chat_id) {
            Some(session) => {
                let tz = self.config.time_zone()?;
                format!(
                    "👀 Watching {} (project {}, board {}) since {}",
                    session.target.board_name,
                    session.target.project_id,
                    session.target.board_id,
                    session.created_at.with_timezone(&tz).format("%Y-%m-%d %H:%M"),
                )
            }
            None => "Not watching any board. Use /projects to pick one.".to_owned(),
        };
        self.send(chat_id, &text).await
    }

    /// Column picker for the task list, with an "all columns" entry.
    async fn choose_task_column(&mut self, chat_id: i64) -> Result<()> {
        let Some(board) = self.selections.board(chat_id).cloned() else {
            return self
                .send(chat_id, "Select a board first with /projects.")
                .await;
        };
        let columns = match self.source.list_columns(board.board_id).await {
            Ok(columns) => columns,
            Err(e) => {
                warn!(chat_id, board_id = board.board_id, "failed to list columns: {e:#}");
                return self.send(chat_id, "⚠️ Could not load columns.").await;
            }
        };
        let msg = OutboundMessage::text(chat_id, format!("📋 {}: choose a column", board.board_name))
            .with_buttons(render::column_buttons(&columns));
        self.channel.send_message(&msg).await
    }

    /// Show a page of the selected board's tasks, editing `message_id` in
    /// place when the page was requested from a keyboard.
    async fn show_tasks(
        &mut self,
        chat_id: i64,
        page: u32,
        column: ColumnQuery<'_>,
        message_id: Option<i64>,
    ) -> Result<()> {
        let Some(board) = self.selections.board(chat_id).cloned() else {
            return self
                .send(chat_id, "Select a board first with /projects.")
                .await;
        };

        let fetcher = BoardFetcher::new(
            self.source.clone(),
            board.project_id,
            board.board_id,
            self.config.tasks_page_size,
        );
        let fetched = async {
            let columns = fetcher.fetch_columns().await?;
            let tasks = fetcher.fetch_tasks().await?;
            Ok::<_, WatchError>((columns, tasks))
        }
        .await;
        let (columns, tasks) = match fetched {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(chat_id, board_id = board.board_id, "failed to list tasks: {e:#}");
                return self.send(chat_id, "⚠️ Could not load tasks.").await;
            }
        };

        let filter = match column {
            ColumnQuery::All => None,
            ColumnQuery::Id(id) => Some(id),
            ColumnQuery::Name(name) => match columns.find(name) {
                Some(id) => Some(id),
                None => {
                    let text = format!("Column \"{name}\" not found on {}.", board.board_name);
                    return self.send(chat_id, &text).await;
                }
            },
        };

        let (tasks, has_more) =
            render::paginate(tasks, filter, page, self.config.tasks_per_page);
        let (text, buttons) =
            render::task_page(&board.board_name, &tasks, &columns, filter, page, has_more);
        let msg = OutboundMessage::text(chat_id, text).with_buttons(buttons);
        match message_id {
            Some(message_id) => self.channel.edit_message(message_id, &msg).await,
            None => self.channel.send_message(&msg).await,
        }
    }

    async fn show_task(&mut self, chat_id: i64, task_id: TaskId) -> Result<()> {
        let task = match self.source.get_task(task_id).await {
            Ok(task) => task,
            Err(e) => {
                warn!(chat_id, task_id, "failed to load task: {e:#}");
                return self.send(chat_id, "⚠️ Task not found.").await;
            }
        };

        let board_id = self.selections.board(chat_id).map(|b| b.board_id);
        let columns = match board_id {
            Some(board_id) => self
                .source
                .list_columns(board_id)
                .await
                .map(|c| ColumnDirectory::from_columns(&c))
                .unwrap_or_default(),
            None => ColumnDirectory::default(),
        };
        let assignees = self
            .source
            .list_members(board_id.unwrap_or_default())
            .await
            .map(|m| AssigneeDirectory::from_members(&m))
            .unwrap_or_default();

        let text = render::task_details(
            &task,
            &columns,
            &assignees,
            self.config.weeek.workspace_id.as_deref(),
        );
        self.send(chat_id, &text).await
    }

    async fn add_task(&mut self, chat_id: i64, add: AddArgs) -> Result<()> {
        let Some(board) = self.selections.board(chat_id).cloned() else {
            return self
                .send(chat_id, "Select a board first with /projects.")
                .await;
        };

        let columns = match self.source.list_columns(board.board_id).await {
            Ok(columns) => ColumnDirectory::from_columns(&columns),
            Err(e) => {
                warn!(chat_id, board_id = board.board_id, "failed to list columns: {e:#}");
                return self.send(chat_id, "⚠️ Could not load columns.").await;
            }
        };
        let Some(column_id) = columns.find(&add.column) else {
            let text = format!("Column \"{}\" not found on {}.", add.column, board.board_name);
            return self.send(chat_id, &text).await;
        };

        let task = NewTask {
            project_id: board.project_id,
            column_id,
            title: add.title,
            description: add.description,
        };
        let text = match self.source.create_task(&task).await {
            Ok(true) => format!("✅ Task \"{}\" created.", task.title),
            Ok(false) => format!("❌ The task \"{}\" was rejected.", task.title),
            Err(e) => {
                warn!(chat_id, "failed to create task: {e:#}");
                format!("❌ Failed to create task: {e}")
            }
        };
        self.send(chat_id, &text).await
    }

    async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        self.channel
            .send_message(&OutboundMessage::text(chat_id, text))
            .await
    }

    fn save_selections(&self) {
        if let Err(e) = self.selections.save() {
            warn!("failed to save selections: {e:#}");
        }
    }
}

/// Start the bot in the foreground with the production collaborators.
pub async fn run(config: Config) -> Result<()> {
    let channel: Arc<dyn Channel> = Arc::new(TelegramChannel::new(
        config.telegram.api_base.clone(),
        config.telegram.bot_token.clone(),
        config.allowed_user_ids.clone(),
    )?);
    let source: Arc<dyn TaskSource> =
        Arc::new(WeeekClient::new(&config.weeek.base_url, &config.weeek.token)?);
    let sink: Arc<dyn LogSink> = Arc::new(HttpLogSink::new(&config.log_sink.base_url)?);

    info!(
        poll_interval_secs = config.poll_interval_secs,
        state = %config.state_path.display(),
        "starting boardwatch"
    );

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    let mut bot = Bot::new(config, channel, source, sink, Arc::new(SystemClock))?;
    bot.run(cancel).await
}

/// Cancel `cancel` on SIGINT or SIGTERM.
fn spawn_shutdown_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    warn!("failed to install SIGTERM handler: {e}");
                    let _ = ctrl_c.await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        info!("shutdown signal received");
        cancel.cancel();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_callbacks() {
        assert_eq!(Callback::parse("project:12"), Some(Callback::Project(12)));
        assert_eq!(Callback::parse("board:12:34"), Some(Callback::Board(12, 34)));
        assert_eq!(Callback::parse("page:3"), Some(Callback::Page(3, None)));
        assert_eq!(Callback::parse("page:3:20"), Some(Callback::Page(3, Some(20))));
        assert_eq!(Callback::parse("tasks:all"), Some(Callback::Tasks(None)));
        assert_eq!(Callback::parse("tasks:20"), Some(Callback::Tasks(Some(20))));
        assert_eq!(Callback::parse("task:99"), Some(Callback::Task(99)));
        assert_eq!(Callback::parse("page:0"), None);
        assert_eq!(Callback::parse("board:12"), None);
        assert_eq!(Callback::parse("page:0:20"), None);
        assert_eq!(Callback::parse("page:2:x"), None);
        assert_eq!(Callback::parse("tasks:x"), None);
        assert_eq!(Callback::parse("sort:date"), None);
        assert_eq!(Callback::parse("garbage"), None);
    }

    #[test]
    fn test_parse_tasks_args() {
        let args = |column: Option<&str>, page| TasksArgs {
            column: column.map(str::to_owned),
            page,
        };
        assert_eq!(TasksArgs::parse("3"), Some(args(None, 3)));
        assert_eq!(TasksArgs::parse("Doing"), Some(args(Some("Doing"), 1)));
        assert_eq!(TasksArgs::parse("In progress 2"), Some(args(Some("In progress"), 2)));
        assert_eq!(TasksArgs::parse("In progress"), Some(args(Some("In progress"), 1)));
        assert_eq!(TasksArgs::parse("0"), None);
        assert_eq!(TasksArgs::parse("Doing 0"), None);
    }

    #[test]
    fn test_parse_add_args() {
        assert_eq!(
            AddArgs::parse("Todo | Write report | first draft"),
            Some(AddArgs {
                column: "Todo".into(),
                title: "Write report".into(),
                description: "first draft".into(),
            })
        );
        assert_eq!(
            AddArgs::parse("Todo|Only title"),
            Some(AddArgs {
                column: "Todo".into(),
                title: "Only title".into(),
                description: String::new(),
            })
        );
        assert_eq!(
            AddArgs::parse("Todo | a | b | c").map(|a| a.description),
            Some("b | c".into())
        );
        assert_eq!(AddArgs::parse("Todo"), None);
        assert_eq!(AddArgs::parse(" | title"), None);
        assert_eq!(AddArgs::parse("Todo |  "), None);
    }
}
