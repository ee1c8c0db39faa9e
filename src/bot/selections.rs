//! Per-chat project/board selection with persistence.
//!
//! Selections are persisted as JSON (default `.boardwatch/selections.json`)
//! so watches resume after a restart.

use chrono::{DateTime, Utc};
use color_eyre::eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::watch::WatchTarget;
use crate::weeek::ProjectId;

/// What one chat has selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSelection {
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    /// The selected board; kept after `/stop` so `/tasks` still works.
    #[serde(default)]
    pub board: Option<WatchTarget>,
    /// Whether the board should be watched (resumed on restart).
    #[serde(default)]
    pub watching: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SelectionState {
    #[serde(default)]
    chats: HashMap<i64, ChatSelection>,
}

pub struct SelectionStore {
    path: PathBuf,
    state: SelectionState,
}

impl SelectionStore {
    /// Load from `path`. A missing or unreadable file starts empty.
    pub fn load(path: &Path) -> Self {
        let state = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), "ignoring corrupt selections file: {e}");
                SelectionState::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SelectionState::default(),
            Err(e) => {
                warn!(path = %path.display(), "failed to read selections: {e}");
                SelectionState::default()
            }
        };
        Self {
            path: path.to_path_buf(),
            state,
        }
    }

    /// Persist to disk (write to a temp file, then rename).
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.state)
            .wrap_err("failed to serialize selections")?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .wrap_err_with(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .wrap_err_with(|| format!("failed to replace {}", self.path.display()))
    }

    pub fn get(&self, chat_id: i64) -> Option<&ChatSelection> {
        self.state.chats.get(&chat_id)
    }

    /// The chat's selected board, watched or not.
    pub fn board(&self, chat_id: i64) -> Option<&WatchTarget> {
        self.get(chat_id).and_then(|s| s.board.as_ref())
    }

    /// A project change forgets the board and stops watching.
    pub fn select_project(&mut self, chat_id: i64, project_id: ProjectId) {
        self.state.chats.insert(
            chat_id,
            ChatSelection {
                project_id: Some(project_id),
                board: None,
                watching: false,
                updated_at: Utc::now(),
            },
        );
    }

    /// Select a board and mark it watched.
    pub fn select_board(&mut self, chat_id: i64, target: WatchTarget) {
        self.state.chats.insert(
            chat_id,
            ChatSelection {
                project_id: Some(target.project_id),
                board: Some(target),
                watching: true,
                updated_at: Utc::now(),
            },
        );
    }

    /// Returns false when the chat has nothing selected.
    pub fn set_watching(&mut self, chat_id: i64, watching: bool) -> bool {
        match self.state.chats.get_mut(&chat_id) {
            Some(selection) => {
                selection.watching = watching;
                selection.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Chats whose watch should be running, ordered by chat id.
    pub fn watching(&self) -> Vec<(i64, WatchTarget)> {
        let mut watching: Vec<(i64, WatchTarget)> = self
            .state
            .chats
            .iter()
            .filter(|(_, s)| s.watching)
            .filter_map(|(chat_id, s)| s.board.clone().map(|b| (*chat_id, b)))
            .collect();
        watching.sort_by_key(|(chat_id, _)| *chat_id);
        watching
    }
}
