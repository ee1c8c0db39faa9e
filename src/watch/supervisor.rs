//! Session supervisor: owns at most one polling loop per chat.
//!
//! Starting a watch always goes through [`SessionSupervisor::replace`], which
//! cancels any loop already running for the chat and awaits its exit before
//! spawning the new one.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::notify::Notifier;
use super::poller::run_session;
use super::{WatchContext, WatchTarget};

/// One chat's active polling subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchSession {
    pub chat_id: i64,
    pub target: WatchTarget,
    pub created_at: DateTime<Utc>,
}

/// Observable state of a chat's watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
}

/// How a polling loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionExit {
    /// Cancellation was requested and observed.
    Cancelled,
    /// The first fetch failed; the loop never reached steady state.
    InitFailed(String),
    /// An unexpected error ended the loop.
    Failed(String),
    /// The loop's task panicked before it could tell the chat.
    Panicked,
}

struct RunningSession {
    session: WatchSession,
    cancel: CancellationToken,
    handle: JoinHandle<SessionExit>,
}

/// Decrements the active-loop counter when a loop's task ends, however it
/// ends.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct SessionSupervisor {
    ctx: WatchContext,
    sessions: HashMap<i64, RunningSession>,
    active: Arc<AtomicUsize>,
}

impl SessionSupervisor {
    pub fn new(ctx: WatchContext) -> Self {
        Self {
            ctx,
            sessions: HashMap::new(),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Stop the chat's current loop (if any), wait for it to exit, then start
    /// watching `target`. Returns how the previous loop ended.
    pub async fn replace(&mut self, chat_id: i64, target: WatchTarget) -> Option<SessionExit> {
        let previous = self.stop(chat_id).await;

        let cancel = CancellationToken::new();
        let guard = ActiveGuard::enter(self.active.clone());
        let handle = tokio::spawn({
            let ctx = self.ctx.clone();
            let cancel = cancel.clone();
            let target = target.clone();
            async move {
                let _guard = guard;
                run_session(chat_id, target, ctx, cancel).await
            }
        });

        info!(
            chat_id,
            board_id = target.board_id,
            board = %target.board_name,
            "watch started"
        );
        let session = WatchSession {
            chat_id,
            target,
            created_at: self.ctx.clock.now(),
        };
        self.sessions.insert(
            chat_id,
            RunningSession {
                session,
                cancel,
                handle,
            },
        );
        previous
    }

    /// Cancel the chat's loop and wait until it has exited.
    pub async fn stop(&mut self, chat_id: i64) -> Option<SessionExit> {
        let running = self.sessions.remove(&chat_id)?;
        running.cancel.cancel();
        let exit = join(running.handle).await;
        info!(chat_id, ?exit, "watch stopped");
        Some(exit)
    }

    pub fn state(&self, chat_id: i64) -> SessionState {
        match self.sessions.get(&chat_id) {
            Some(running) if !running.handle.is_finished() => SessionState::Running,
            _ => SessionState::Idle,
        }
    }

    /// The chat's session while its loop is still running.
    pub fn session(&self, chat_id: i64) -> Option<&WatchSession> {
        self.sessions
            .get(&chat_id)
            .filter(|running| !running.handle.is_finished())
            .map(|running| &running.session)
    }

    /// Number of loop tasks currently alive, across all chats.
    pub fn active_loops(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Collect loops that ended on their own (init failure or fatal error).
    /// A panicked loop never reached its own farewell, so the chat is told
    /// here.
    pub async fn reap(&mut self) -> Vec<(i64, SessionExit)> {
        let finished: Vec<i64> = self
            .sessions
            .iter()
            .filter(|(_, running)| running.handle.is_finished())
            .map(|(chat_id, _)| *chat_id)
            .collect();

        let mut exits = Vec::with_capacity(finished.len());
        for chat_id in finished {
            if let Some(running) = self.sessions.remove(&chat_id) {
                let exit = join(running.handle).await;
                info!(chat_id, ?exit, "watch ended");
                if exit == SessionExit::Panicked {
                    Notifier::new(self.ctx.channel.clone(), chat_id)
                        .send(format!(
                            "⚠️ Stopped watching {}: the watch loop crashed.",
                            running.session.target.board_name
                        ))
                        .await;
                }
                exits.push((chat_id, exit));
            }
        }
        exits
    }

    /// Cancel every loop, then wait for all of them.
    pub async fn shutdown(&mut self) {
        for running in self.sessions.values() {
            running.cancel.cancel();
        }
        for (chat_id, running) in self.sessions.drain() {
            let exit = join(running.handle).await;
            info!(chat_id, ?exit, "watch stopped for shutdown");
        }
    }
}

async fn join(handle: JoinHandle<SessionExit>) -> SessionExit {
    match handle.await {
        Ok(exit) => exit,
        Err(e) if e.is_panic() => {
            error!("watch loop panicked");
            SessionExit::Panicked
        }
        Err(_) => SessionExit::Cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MockChannel;
    use crate::log_sink::MockLogSink;
    use crate::watch::{SystemClock, WatchSettings};
    use crate::weeek::{MockTaskSource, TaskPage};
    use color_eyre::eyre::eyre;
    use std::time::Duration;

    fn healthy_source() -> MockTaskSource {
        let mut source = MockTaskSource::new();
        source.expect_list_members().returning(|_| Ok(vec![]));
        source.expect_list_columns().returning(|_| Ok(vec![]));
        source
            .expect_list_tasks()
            .returning(|_, _, _| Ok(TaskPage::default()));
        source
    }

    fn context(source: MockTaskSource) -> WatchContext {
        let mut channel = MockChannel::new();
        channel.expect_send_message().returning(|_| Ok(()));
        WatchContext {
            source: Arc::new(source),
            sink: Arc::new(MockLogSink::new()),
            channel: Arc::new(channel),
            clock: Arc::new(SystemClock),
            settings: WatchSettings::default(),
        }
    }

    fn target(board_id: i64) -> WatchTarget {
        WatchTarget {
            project_id: 1,
            board_id,
            board_name: format!("Board {board_id}"),
        }
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_replace_keeps_exactly_one_loop() {
        let mut supervisor = SessionSupervisor::new(context(healthy_source()));

        assert_eq!(supervisor.replace(7, target(1)).await, None);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(supervisor.active_loops(), 1);

        let previous = supervisor.replace(7, target(2)).await;
        assert_eq!(previous, Some(SessionExit::Cancelled));
        assert_eq!(supervisor.active_loops(), 1);
        assert_eq!(supervisor.state(7), SessionState::Running);
        assert_eq!(supervisor.session(7).unwrap().target.board_id, 2);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_stop_returns_chat_to_idle() {
        let mut supervisor = SessionSupervisor::new(context(healthy_source()));
        supervisor.replace(7, target(1)).await;

        assert_eq!(supervisor.stop(7).await, Some(SessionExit::Cancelled));
        assert_eq!(supervisor.state(7), SessionState::Idle);
        assert_eq!(supervisor.active_loops(), 0);
        assert_eq!(supervisor.stop(7).await, None);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_init_failure_leaves_chat_idle() {
        let mut source = MockTaskSource::new();
        source
            .expect_list_members()
            .returning(|_| Err(eyre!("401 Unauthorized")));
        let mut supervisor = SessionSupervisor::new(context(source));

        supervisor.replace(7, target(1)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(supervisor.state(7), SessionState::Idle);
        assert!(supervisor.session(7).is_none());
        let exits = supervisor.reap().await;
        assert_eq!(exits.len(), 1);
        assert!(matches!(exits[0], (7, SessionExit::InitFailed(_))));
        assert_eq!(supervisor.active_loops(), 0);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_chats_are_independent_and_shutdown_stops_all() {
        let mut supervisor = SessionSupervisor::new(context(healthy_source()));
        supervisor.replace(1, target(10)).await;
        supervisor.replace(2, target(20)).await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(supervisor.active_loops(), 2);

        supervisor.stop(1).await;
        assert_eq!(supervisor.state(2), SessionState::Running);
        assert_eq!(supervisor.active_loops(), 1);

        supervisor.shutdown().await;
        assert_eq!(supervisor.active_loops(), 0);
        assert_eq!(supervisor.state(2), SessionState::Idle);
    }
}
