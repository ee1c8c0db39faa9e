//! Channel abstraction for the chat transport (Telegram today).

pub mod telegram;

use async_trait::async_trait;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

/// An event received from a channel.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A regular text message from a user.
    Message {
        chat_id: i64,
        message_id: i64,
        user_id: i64,
        user_name: String,
        text: String,
    },

    /// A slash command from a user (e.g. /watch, /tasks).
    Command {
        chat_id: i64,
        message_id: i64,
        user_id: i64,
        user_name: String,
        command: String,
        args: String,
    },

    /// An inline keyboard button press.
    CallbackQuery {
        chat_id: i64,
        /// The message carrying the keyboard, when Telegram still has it.
        message_id: Option<i64>,
        user_name: String,
        data: String,
        callback_query_id: String,
    },
}

/// One inline keyboard button.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// A message to send back through a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub chat_id: i64,
    pub text: String,
    /// Inline keyboard rows; empty means no keyboard.
    pub buttons: Vec<Vec<InlineButton>>,
}

impl OutboundMessage {
    pub fn text(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            buttons: Vec::new(),
        }
    }

    pub fn with_buttons(mut self, buttons: Vec<Vec<InlineButton>>) -> Self {
        self.buttons = buttons;
        self
    }
}

/// Trait for messaging channel integrations.
///
/// Implementations run a background loop that produces `ChannelEvent`s
/// and can send outbound messages.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Run the channel's receive loop, sending events to `tx`.
    /// Should run until `cancel` is triggered.
    async fn run(&self, tx: Sender<ChannelEvent>, cancel: CancellationToken);

    /// Send a message through this channel.
    async fn send_message(&self, msg: &OutboundMessage) -> color_eyre::Result<()>;

    /// Replace the text and keyboard of a previously sent message.
    async fn edit_message(&self, message_id: i64, msg: &OutboundMessage)
    -> color_eyre::Result<()>;

    /// Dismiss the client-side spinner of a button press.
    async fn answer_callback_query(&self, callback_query_id: &str);
}
