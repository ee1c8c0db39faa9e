//! Telegram Bot API client using raw reqwest (no framework).
//!
//! Uses long-polling via `getUpdates`, sends responses via `sendMessage` and
//! rewrites paginated views in place via `editMessageText`.

use super::{Channel, ChannelEvent, InlineButton, OutboundMessage};
use async_trait::async_trait;
use color_eyre::eyre::{Result, WrapErr, bail};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Maximum message length for Telegram (we chunk below this).
const MAX_MESSAGE_LEN: usize = 4000;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API client.
pub struct TelegramChannel {
    api_base: String,
    bot_token: String,
    allowed_user_ids: Vec<i64>,
    client: reqwest::Client,
}

// --- Telegram API response types ---

#[derive(Debug, Deserialize)]
struct TgResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUpdate {
    update_id: i64,
    message: Option<TgMessage>,
    callback_query: Option<TgCallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct TgCallbackQuery {
    id: String,
    from: TgUser,
    message: Option<TgMessage>,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    chat: TgChat,
    from: Option<TgUser>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    username: Option<String>,
}

impl TelegramChannel {
    pub fn new(
        api_base: impl Into<String>,
        bot_token: String,
        allowed_user_ids: Vec<i64>,
    ) -> Result<Self> {
        // Must outlive the 30s long-poll timeout.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .wrap_err("failed to build Telegram HTTP client")?;

        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_owned(),
            bot_token,
            allowed_user_ids,
            client,
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    fn is_user_allowed(&self, user_id: i64) -> bool {
        self.allowed_user_ids.is_empty() || self.allowed_user_ids.contains(&user_id)
    }

    /// Parse a message into a ChannelEvent.
    fn parse_message(msg: &TgMessage) -> Option<ChannelEvent> {
        let text = msg.text.as_deref()?.trim();
        if text.is_empty() {
            return None;
        }

        let user = msg.from.as_ref()?;
        let user_name = user
            .username
            .clone()
            .unwrap_or_else(|| user.first_name.clone());

        if let Some(rest) = text.strip_prefix('/') {
            // Split command from args: "/watch 1 2" -> ("watch", "1 2")
            let (command, args) = match rest.split_once(' ') {
                Some((cmd, args)) => (cmd, args),
                None => (rest, ""),
            };
            // Strip @botname suffix from commands like "/tasks@mybot"
            let command = command.split('@').next().unwrap_or(command);
            Some(ChannelEvent::Command {
                chat_id: msg.chat.id,
                message_id: msg.message_id,
                user_id: user.id,
                user_name,
                command: command.to_owned(),
                args: args.trim().to_owned(),
            })
        } else {
            Some(ChannelEvent::Message {
                chat_id: msg.chat.id,
                message_id: msg.message_id,
                user_id: user.id,
                user_name,
                text: text.to_owned(),
            })
        }
    }

    /// Long-poll for updates from Telegram.
    async fn get_updates(&self, offset: i64) -> Result<Vec<TgUpdate>> {
        let resp = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", "30".to_string()),
            ])
            .send()
            .await?;

        let body: TgResponse<Vec<TgUpdate>> = resp.json().await?;

        if !body.ok {
            let desc = body.description.unwrap_or_default();
            bail!("Telegram API error: {desc}");
        }

        Ok(body.result.unwrap_or_default())
    }

    async fn call(&self, method: &str, payload: &serde_json::Value) -> Result<()> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(payload)
            .send()
            .await
            .wrap_err_with(|| format!("{method} request failed"))?;

        let body: TgResponse<serde_json::Value> = resp.json().await?;
        if !body.ok {
            let desc = body.description.unwrap_or_default();
            bail!("{method} failed: {desc}");
        }
        Ok(())
    }

    /// Send a text message, chunking if necessary.
    /// If `buttons` is non-empty, attaches an inline keyboard to the *last* chunk only.
    async fn send_text(&self, chat_id: i64, text: &str, buttons: &[Vec<InlineButton>]) -> Result<()> {
        let chunks = chunk_message(text);
        let last_idx = chunks.len().saturating_sub(1);
        for (i, chunk) in chunks.iter().enumerate() {
            let mut payload = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk,
            });

            if i == last_idx && !buttons.is_empty() {
                payload["reply_markup"] = inline_keyboard(buttons);
            }

            self.call("sendMessage", &payload).await?;
        }
        Ok(())
    }
}

/// Build a `reply_markup` value for an inline keyboard.
fn inline_keyboard(buttons: &[Vec<InlineButton>]) -> serde_json::Value {
    let keyboard: Vec<Vec<serde_json::Value>> = buttons
        .iter()
        .map(|row| {
            row.iter()
                .map(|btn| {
                    serde_json::json!({
                        "text": btn.text,
                        "callback_data": btn.callback_data,
                    })
                })
                .collect()
        })
        .collect();
    serde_json::json!({ "inline_keyboard": keyboard })
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn run(&self, tx: Sender<ChannelEvent>, cancel: CancellationToken) {
        let mut offset: i64 = 0;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let updates = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.get_updates(offset) => {
                    match result {
                        Ok(updates) => updates,
                        Err(e) => {
                            warn!(error = %e, "telegram poll failed");
                            tokio::time::sleep(Duration::from_secs(5)).await;
                            continue;
                        }
                    }
                }
            };

            for update in updates {
                offset = update.update_id + 1;

                if let Some(cq) = update.callback_query {
                    if !self.is_user_allowed(cq.from.id) {
                        debug!(user_id = cq.from.id, "ignoring callback from unauthorized user");
                        continue;
                    }

                    let chat_id = cq.message.as_ref().map_or(cq.from.id, |m| m.chat.id);
                    let message_id = cq.message.as_ref().map(|m| m.message_id);
                    let user_name = cq.from.username.unwrap_or(cq.from.first_name);

                    if let Some(data) = cq.data {
                        let event = ChannelEvent::CallbackQuery {
                            chat_id,
                            message_id,
                            user_name,
                            data,
                            callback_query_id: cq.id,
                        };
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    continue;
                }

                let Some(msg) = update.message else {
                    continue;
                };

                if let Some(user) = &msg.from
                    && !self.is_user_allowed(user.id)
                {
                    debug!(user_id = user.id, "ignoring message from unauthorized user");
                    continue;
                }

                if let Some(event) = Self::parse_message(&msg)
                    && tx.send(event).await.is_err()
                {
                    // Receiver dropped.
                    return;
                }
            }
        }
    }

    async fn send_message(&self, msg: &OutboundMessage) -> Result<()> {
        self.send_text(msg.chat_id, &msg.text, &msg.buttons).await
    }

    async fn edit_message(&self, message_id: i64, msg: &OutboundMessage) -> Result<()> {
        let text = chunk_message(&msg.text).first().copied().unwrap_or_default();
        let mut payload = serde_json::json!({
            "chat_id": msg.chat_id,
            "message_id": message_id,
            "text": text,
        });
        if !msg.buttons.is_empty() {
            payload["reply_markup"] = inline_keyboard(&msg.buttons);
        }
        self.call("editMessageText", &payload).await
    }

    async fn answer_callback_query(&self, callback_query_id: &str) {
        let payload = serde_json::json!({ "callback_query_id": callback_query_id });
        if let Err(e) = self.call("answerCallbackQuery", &payload).await {
            warn!(error = %e, "answerCallbackQuery failed");
        }
    }
}

/// Split a message into chunks that fit within Telegram's limit.
fn chunk_message(text: &str) -> Vec<&str> {
    if text.len() <= MAX_MESSAGE_LEN {
        return vec![text];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= MAX_MESSAGE_LEN {
            chunks.push(remaining);
            break;
        }

        let limit = floor_char_boundary(remaining, MAX_MESSAGE_LEN);
        // Try to split at a newline within the limit.
        let split_at = match remaining[..limit].rfind('\n') {
            Some(0) | None => limit,
            Some(i) => i,
        };

        let (chunk, rest) = remaining.split_at(split_at);
        chunks.push(chunk);
        // Skip the newline we split on.
        remaining = rest.strip_prefix('\n').unwrap_or(rest);
    }

    chunks
}

/// Largest char boundary at or below `max`.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    let mut i = max.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
