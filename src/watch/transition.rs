//! Transition logger: turns a column move into log sink records, one per
//! assignee held before the move.

use chrono::FixedOffset;
use std::sync::Arc;
use tracing::{debug, warn};

use super::diff::ColumnTransition;
use super::directory::{AssigneeDirectory, UNASSIGNED};
use crate::log_sink::{LogSink, MoveRecord};

pub struct TransitionLogger {
    sink: Arc<dyn LogSink>,
    time_zone: FixedOffset,
}

impl TransitionLogger {
    pub fn new(sink: Arc<dyn LogSink>, time_zone: FixedOffset) -> Self {
        Self { sink, time_zone }
    }

    /// Records for one transition. An empty assignee set still yields one
    /// record attributed to "unassigned".
    pub fn records_for(
        &self,
        transition: &ColumnTransition,
        assignees: &AssigneeDirectory,
        board_name: &str,
    ) -> Vec<MoveRecord> {
        let users: Vec<String> = if transition.assignees_before.is_empty() {
            vec![UNASSIGNED.to_owned()]
        } else {
            transition
                .assignees_before
                .iter()
                .map(|id| assignees.name(id))
                .collect()
        };

        let move_time = transition
            .moved_at
            .with_timezone(&self.time_zone)
            .to_rfc3339();

        users
            .into_iter()
            .map(|user_name| MoveRecord {
                task_id: transition.task_id.to_string(),
                task_title: transition.title.clone(),
                from_column: transition.from.clone(),
                to_column: transition.to.clone(),
                user_name,
                move_time: move_time.clone(),
                time_spent: transition.dwell_secs,
                board_name: board_name.to_owned(),
            })
            .collect()
    }

    /// Deliver every record. Failures are logged and dropped; returns how
    /// many records the sink accepted.
    pub async fn log(
        &self,
        transition: &ColumnTransition,
        assignees: &AssigneeDirectory,
        board_name: &str,
    ) -> usize {
        let mut delivered = 0;
        for record in self.records_for(transition, assignees, board_name) {
            match self.sink.log_move(&record).await {
                Ok(()) => {
                    delivered += 1;
                    debug!(
                        task_id = %record.task_id,
                        user = %record.user_name,
                        from = %record.from_column,
                        to = %record.to_column,
                        "logged column move"
                    );
                }
                Err(e) => warn!(
                    task_id = %record.task_id,
                    user = %record.user_name,
                    "failed to log column move: {e:#}"
                ),
            }
        }
        delivered
    }
}
