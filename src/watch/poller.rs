//! Per-session polling loop.
//!
//! Initialization fetches members, columns and tasks; any failure there ends
//! the session with [`SessionExit::InitFailed`]. Steady state then repeats
//! check cancellation → sleep → refresh columns (best-effort) → fetch tasks
//! → diff → notify → log column moves. Transient fetch failures back off and
//! retry; anything else ends the session with [`SessionExit::Failed`].
//!
//! Cancellation is observed at the top of every iteration and while
//! sleeping. An in-flight fetch always runs to completion.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::diff::{ChangeEvent, diff_board};
use super::directory::{AssigneeDirectory, ColumnDirectory};
use super::fetcher::BoardFetcher;
use super::notify::{self, Notifier};
use super::snapshot::SnapshotStore;
use super::supervisor::SessionExit;
use super::transition::TransitionLogger;
use super::{Clock, WatchContext, WatchError, WatchSettings, WatchTarget};
use crate::weeek::Task;

struct Poller {
    chat_id: i64,
    target: WatchTarget,
    fetcher: BoardFetcher,
    notifier: Notifier,
    logger: TransitionLogger,
    clock: Arc<dyn Clock>,
    settings: WatchSettings,
    store: SnapshotStore,
    columns: ColumnDirectory,
    assignees: AssigneeDirectory,
    /// Set while fetches keep failing; the chat is warned once per streak.
    failing: bool,
}

/// Run one watch session until it is cancelled or fails.
pub async fn run_session(
    chat_id: i64,
    target: WatchTarget,
    ctx: WatchContext,
    cancel: CancellationToken,
) -> SessionExit {
    if cancel.is_cancelled() {
        return SessionExit::Cancelled;
    }

    info!(
        chat_id,
        project_id = target.project_id,
        board_id = target.board_id,
        board = %target.board_name,
        "watch session starting"
    );

    let board_name = target.board_name.clone();
    let channel = ctx.channel.clone();
    let mut poller = match Poller::init(chat_id, target, ctx).await {
        Ok(poller) => poller,
        Err(e) => {
            error!(chat_id, "watch session failed to initialize: {e}");
            Notifier::new(channel, chat_id)
                .send(format!("⚠️ Could not start watching {board_name}: {e}"))
                .await;
            return SessionExit::InitFailed(e.to_string());
        }
    };

    let mut delay = poller.settings.poll_interval;
    loop {
        if cancel.is_cancelled() {
            break;
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        delay = poller.settings.poll_interval;
        match poller.iterate().await {
            Ok(()) => {}
            Err(e) if e.is_transient() => {
                poller.on_transient_failure(&e).await;
                delay = poller.settings.error_backoff;
            }
            Err(e) => {
                error!(chat_id, board_id = poller.target.board_id, "watch session failed: {e}");
                poller
                    .notifier
                    .send(format!(
                        "⚠️ Stopped watching {}: {e}",
                        poller.target.board_name
                    ))
                    .await;
                return SessionExit::Failed(e.to_string());
            }
        }
    }

    info!(chat_id, board_id = poller.target.board_id, "watch session cancelled");
    SessionExit::Cancelled
}

impl Poller {
    /// Fetch the directories and the baseline task list. The baseline is
    /// diffed against the empty store, so every task is announced as new.
    async fn init(
        chat_id: i64,
        target: WatchTarget,
        ctx: WatchContext,
    ) -> Result<Self, WatchError> {
        let fetcher = BoardFetcher::new(
            ctx.source.clone(),
            target.project_id,
            target.board_id,
            ctx.settings.page_size,
        );
        let assignees = fetcher.fetch_members().await?;
        let columns = fetcher.fetch_columns().await?;
        let tasks = fetcher.fetch_tasks().await?;

        let mut poller = Self {
            chat_id,
            fetcher,
            notifier: Notifier::new(ctx.channel.clone(), chat_id),
            logger: TransitionLogger::new(ctx.sink.clone(), ctx.settings.time_zone),
            clock: ctx.clock.clone(),
            settings: ctx.settings.clone(),
            store: SnapshotStore::new(),
            columns,
            assignees,
            target,
            failing: false,
        };

        poller.apply(&tasks).await?;
        info!(
            chat_id,
            board_id = poller.target.board_id,
            tasks = poller.store.len(),
            columns = poller.columns.len(),
            members = poller.assignees.len(),
            "watch session running"
        );
        Ok(poller)
    }

    async fn iterate(&mut self) -> Result<(), WatchError> {
        match self.fetcher.fetch_columns().await {
            Ok(columns) => self.columns = columns,
            Err(e) => warn!(
                chat_id = self.chat_id,
                board_id = self.target.board_id,
                "keeping previous column names: {e}"
            ),
        }

        let tasks = self.fetcher.fetch_tasks().await?;
        if self.failing {
            info!(chat_id = self.chat_id, board_id = self.target.board_id, "board fetch recovered");
            self.failing = false;
        }
        self.apply(&tasks).await
    }

    /// Diff a fetch, notify the chat and log column moves.
    async fn apply(&mut self, tasks: &[Task]) -> Result<(), WatchError> {
        let events = diff_board(
            &mut self.store,
            tasks,
            &self.columns,
            &self.assignees,
            self.clock.now(),
        )?;
        if events.is_empty() {
            return Ok(());
        }
        debug!(chat_id = self.chat_id, events = events.len(), "board changed");

        self.notifier.notify(&events).await;

        for event in &events {
            if let ChangeEvent::ColumnChanged(transition) = event {
                self.logger
                    .log(transition, &self.assignees, &self.target.board_name)
                    .await;
            }
        }
        Ok(())
    }

    async fn on_transient_failure(&mut self, e: &WatchError) {
        warn!(
            chat_id = self.chat_id,
            board_id = self.target.board_id,
            backoff_secs = self.settings.error_backoff.as_secs(),
            "{e}"
        );
        if !self.failing {
            self.failing = true;
            if self.settings.notify_fetch_errors {
                self.notifier
                    .send(notify::fetch_warning(&self.target.board_name))
                    .await;
            }
        }
    }
}
