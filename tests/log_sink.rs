//! Log sink contract tests: one POST per record, `201 Created` only.

use boardwatch::log_sink::{HttpLogSink, LogSink, MoveRecord};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn record() -> MoveRecord {
    MoveRecord {
        task_id: "42".into(),
        task_title: "Ship it".into(),
        from_column: "Todo".into(),
        to_column: "Done".into(),
        user_name: "Anna Petrova".into(),
        move_time: "2025-03-01T13:00:02+03:00".into(),
        time_spent: 2.0,
        board_name: "Sprint".into(),
    }
}

#[tokio::test]
async fn test_record_is_posted_as_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/log_move/"))
        .and(body_json(json!({
            "task_id": "42",
            "task_title": "Ship it",
            "from_column": "Todo",
            "to_column": "Done",
            "user_name": "Anna Petrova",
            "move_time": "2025-03-01T13:00:02+03:00",
            "time_spent": 2.0,
            "board_name": "Sprint"
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let sink = HttpLogSink::new(&server.uri()).unwrap();
    sink.log_move(&record()).await.unwrap();
}

#[tokio::test]
async fn test_server_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/log_move/"))
        .respond_with(ResponseTemplate::new(500).set_body_string("db down"))
        .expect(1)
        .mount(&server)
        .await;

    let sink = HttpLogSink::new(&server.uri()).unwrap();
    let err = sink.log_move(&record()).await.unwrap_err();
    assert!(format!("{err}").contains("500"), "{err}");
}

#[tokio::test]
async fn test_plain_ok_is_not_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/log_move/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let sink = HttpLogSink::new(&server.uri()).unwrap();
    assert!(sink.log_move(&record()).await.is_err());
}
