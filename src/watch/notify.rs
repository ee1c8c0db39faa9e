//! Notifier: renders change events into chat messages.
//!
//! New and removed tasks get a message each. All field changes of one task
//! within an iteration share a single "task updated" message, one line per
//! event. When an iteration produces more than [`BATCH_THRESHOLD`] messages
//! they are folded into one summary so a board import does not flood the
//! chat.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use super::diff::ChangeEvent;
use crate::channel::{Channel, OutboundMessage};
use crate::weeek::TaskId;

pub const BATCH_THRESHOLD: usize = 5;

pub struct Notifier {
    channel: Arc<dyn Channel>,
    chat_id: i64,
}

impl Notifier {
    pub fn new(channel: Arc<dyn Channel>, chat_id: i64) -> Self {
        Self { channel, chat_id }
    }

    /// Send the rendered messages for one iteration. Delivery failures are
    /// logged, never propagated.
    pub async fn notify(&self, events: &[ChangeEvent]) {
        for text in render(events) {
            self.send(text).await;
        }
    }

    /// Send a plain text message to the chat.
    pub async fn send(&self, text: impl Into<String>) {
        let msg = OutboundMessage::text(self.chat_id, text);
        if let Err(e) = self.channel.send_message(&msg).await {
            warn!(chat_id = self.chat_id, "failed to deliver notification: {e:#}");
        }
    }
}

/// Render one iteration's events into message texts, in event order.
pub fn render(events: &[ChangeEvent]) -> Vec<String> {
    enum Slot {
        Single(String),
        Update { title: String, lines: Vec<String> },
    }

    let mut slots: Vec<Slot> = Vec::new();
    let mut updates: HashMap<TaskId, usize> = HashMap::new();

    for event in events {
        match event {
            ChangeEvent::NewTask {
                title,
                column,
                assignees,
                ..
            } => slots.push(Slot::Single(format!(
                "🆕 New task: {title} (in {column})\n👤 {assignees}"
            ))),
            ChangeEvent::TaskRemoved { title, .. } => {
                slots.push(Slot::Single(format!("❌ Task {title} disappeared")))
            }
            _ => {
                let line = update_line(event);
                let idx = *updates.entry(event.task_id()).or_insert_with(|| {
                    slots.push(Slot::Update {
                        title: event.title().to_owned(),
                        lines: Vec::new(),
                    });
                    slots.len() - 1
                });
                if let Slot::Update { lines, .. } = &mut slots[idx] {
                    lines.push(line);
                }
            }
        }
    }

    let messages: Vec<String> = slots
        .into_iter()
        .map(|slot| match slot {
            Slot::Single(text) => text,
            Slot::Update { title, lines } => {
                format!("🔔 Task updated: {title}\n{}", lines.join("\n"))
            }
        })
        .collect();

    if messages.len() > BATCH_THRESHOLD {
        vec![format!(
            "📋 {} changes on the board:\n\n{}",
            messages.len(),
            messages.join("\n\n")
        )]
    } else {
        messages
    }
}

fn update_line(event: &ChangeEvent) -> String {
    match event {
        ChangeEvent::TitleChanged { old, new, .. } => format!("✏️ Title: {old} → {new}"),
        ChangeEvent::AssigneeChanged { old, new, .. } => format!("👤 Assignees: {old} → {new}"),
        ChangeEvent::ColumnChanged(t) => format!(
            "📂 Column: {} → {} (after {})",
            t.from,
            t.to,
            format_dwell(t.dwell_secs)
        ),
        ChangeEvent::StatusChanged { completed, .. } => {
            if *completed {
                "⚡ Status: completed".to_owned()
            } else {
                "⚡ Status: reopened".to_owned()
            }
        }
        ChangeEvent::TaskDeleted { .. } => "🗑 Task deleted".to_owned(),
        ChangeEvent::NewTask { title, .. } | ChangeEvent::TaskRemoved { title, .. } => {
            title.clone()
        }
    }
}

/// Human-readable dwell time.
pub fn format_dwell(secs: f64) -> String {
    let mins = (secs / 60.0).floor() as i64;
    if mins < 1 {
        "< 1m".to_string()
    } else if mins < 60 {
        format!("{mins}m")
    } else {
        format!("{}h {}m", mins / 60, mins % 60)
    }
}

/// Text of the one-per-streak warning about a failing board fetch.
pub fn fetch_warning(board_name: &str) -> String {
    format!("⚠️ Can't reach the board {board_name} right now. Retrying in the background.")
}
