//! Bot configuration loaded from `boardwatch.toml`.

use chrono::FixedOffset;
use color_eyre::eyre::{Result, bail, eyre};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::channel::telegram::DEFAULT_API_BASE;
use crate::watch::WatchSettings;
use crate::weeek::client::DEFAULT_BASE_URL;

pub const DEFAULT_CONFIG_PATH: &str = "boardwatch.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Pause between board polls (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Pause after a failed board fetch before retrying (seconds).
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,

    /// Fetch tasks page by page with this page size. Unset = one request.
    #[serde(default)]
    pub tasks_page_size: Option<u32>,

    /// Warn the chat when a board fetch starts failing.
    #[serde(default = "default_true")]
    pub notify_fetch_errors: bool,

    /// Fixed UTC offset used for transition timestamps sent to the log sink.
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,

    /// Tasks shown per page by `/tasks`.
    #[serde(default = "default_tasks_per_page")]
    pub tasks_per_page: u32,

    /// Where chat selections are persisted.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// User IDs allowed to interact with the bot. Empty = allow all users.
    #[serde(default)]
    pub allowed_user_ids: Vec<i64>,

    /// Chat IDs the bot will respond in. Empty = allow all chats.
    #[serde(default)]
    pub allowed_chat_ids: Vec<i64>,

    pub telegram: TelegramConfig,

    pub weeek: WeeekConfig,

    pub log_sink: LogSinkConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Bot API token from @BotFather. `TELEGRAM_TOKEN` overrides it.
    #[serde(default)]
    pub bot_token: String,

    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeeekConfig {
    /// Public API token. `WEEEK_TOKEN` overrides it.
    #[serde(default)]
    pub token: String,

    #[serde(default = "default_weeek_base_url")]
    pub base_url: String,

    /// Workspace id, used to build task links.
    #[serde(default)]
    pub workspace_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSinkConfig {
    pub base_url: String,
}

fn default_poll_interval() -> u64 {
    2
}

fn default_error_backoff() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

fn default_utc_offset() -> i32 {
    3
}

fn default_tasks_per_page() -> u32 {
    5
}

fn default_state_path() -> PathBuf {
    PathBuf::from(".boardwatch/selections.json")
}

fn default_telegram_api_base() -> String {
    DEFAULT_API_BASE.into()
}

fn default_weeek_base_url() -> String {
    DEFAULT_BASE_URL.into()
}

impl Config {
    /// Load, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                eyre!(
                    "No config found at {}\n\n\
                     Create it with at least:\n\n\
                     [telegram]\n\
                     bot_token = \"your-bot-token\"\n\n\
                     [weeek]\n\
                     token = \"your-weeek-token\"\n\n\
                     [log_sink]\n\
                     base_url = \"http://localhost:8000\"\n",
                    path.display()
                )
            } else {
                eyre!("failed to read {}: {e}", path.display())
            }
        })?;
        let mut config: Config = toml::from_str(&content)
            .map_err(|e| eyre!("failed to parse {}: {e}", path.display()))?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Replace tokens with `TELEGRAM_TOKEN` / `WEEEK_TOKEN` when set.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("TELEGRAM_TOKEN").filter(|t| !t.trim().is_empty()) {
            self.telegram.bot_token = token;
        }
        if let Some(token) = lookup("WEEEK_TOKEN").filter(|t| !t.trim().is_empty()) {
            self.weeek.token = token;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be greater than zero");
        }
        if self.tasks_page_size == Some(0) {
            bail!("tasks_page_size must be greater than zero when set");
        }
        if self.tasks_per_page == 0 {
            bail!("tasks_per_page must be greater than zero");
        }
        if self.telegram.bot_token.trim().is_empty() {
            bail!("telegram.bot_token is empty (set it or TELEGRAM_TOKEN)");
        }
        if self.weeek.token.trim().is_empty() {
            bail!("weeek.token is empty (set it or WEEEK_TOKEN)");
        }
        self.time_zone()?;
        Ok(())
    }

    /// The fixed offset transition timestamps are rendered in.
    pub fn time_zone(&self) -> Result<FixedOffset> {
        if !(-23..=23).contains(&self.utc_offset_hours) {
            bail!(
                "utc_offset_hours must be within -23..=23, got {}",
                self.utc_offset_hours
            );
        }
        FixedOffset::east_opt(self.utc_offset_hours * 3600)
            .ok_or_else(|| eyre!("invalid utc_offset_hours {}", self.utc_offset_hours))
    }

    /// Settings handed to every watch session.
    pub fn watch_settings(&self) -> Result<WatchSettings> {
        Ok(WatchSettings {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            error_backoff: Duration::from_secs(self.error_backoff_secs),
            page_size: self.tasks_page_size,
            notify_fetch_errors: self.notify_fetch_errors,
            time_zone: self.time_zone()?,
        })
    }

    /// Check if a chat ID is allowed.
    pub fn is_chat_allowed(&self, chat_id: i64) -> bool {
        self.allowed_chat_ids.is_empty() || self.allowed_chat_ids.contains(&chat_id)
    }
}
