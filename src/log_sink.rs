//! Log Sink: the time-tracking backend that stores column transitions.
//!
//! Records are POSTed as JSON to `{base_url}/log_move/`; the backend answers
//! `201 Created` when it stored the record. Anything else is a failure.

use async_trait::async_trait;
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, bail};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One column transition attributed to one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub task_id: String,
    pub task_title: String,
    pub from_column: String,
    pub to_column: String,
    pub user_name: String,
    /// ISO-8601 timestamp in the configured fixed offset.
    pub move_time: String,
    /// Seconds spent in `from_column`.
    pub time_spent: f64,
    pub board_name: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn log_move(&self, record: &MoveRecord) -> Result<()>;
}

/// HTTP client for the log backend.
pub struct HttpLogSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpLogSink {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .wrap_err("failed to build log sink HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/log_move/", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LogSink for HttpLogSink {
    async fn log_move(&self, record: &MoveRecord) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(record)
            .send()
            .await
            .wrap_err_with(|| format!("POST {} failed", self.endpoint))?;

        let status = response.status();
        if status != reqwest::StatusCode::CREATED {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable>".to_string());
            bail!("log sink returned {status}: {body}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let sink = HttpLogSink::new("http://localhost:8000/").unwrap();
        assert_eq!(sink.endpoint(), "http://localhost:8000/log_move/");
    }

    #[test]
    fn test_record_serializes_backend_field_names() {
        let record = MoveRecord {
            task_id: "42".into(),
            task_title: "Ship it".into(),
            from_column: "Todo".into(),
            to_column: "Done".into(),
            user_name: "Anna Petrova".into(),
            move_time: "2025-03-01T13:00:00+03:00".into(),
            time_spent: 90.5,
            board_name: "Sprint".into(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["task_id"], "42");
        assert_eq!(json["from_column"], "Todo");
        assert_eq!(json["to_column"], "Done");
        assert_eq!(json["time_spent"], 90.5);
        assert_eq!(json["move_time"], "2025-03-01T13:00:00+03:00");
    }
}
