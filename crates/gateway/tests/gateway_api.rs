//! Integration tests for the HTTP gateways.
//!
//! Each test serves a scripted stand-in for the job runner on an ephemeral
//! port and drives [`HttpJobGateway`] / [`RecordsGateway`] against it.

use std::collections::HashMap;
use std::time::Duration;

use assert_matches::assert_matches;
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crawldeck_core::form::SubmissionForm;
use crawldeck_core::job::JobStatus;
use crawldeck_gateway::api::{HttpJobGateway, JobGateway};
use crawldeck_gateway::config::GatewayConfig;
use crawldeck_gateway::error::FALLBACK_MESSAGE;
use crawldeck_gateway::records::{RecordQuery, RecordsGateway};

// ---------------------------------------------------------------------------
// Scripted runner
// ---------------------------------------------------------------------------

async fn run_sync(Json(body): Json<Value>) -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "crawl finished",
        "data": {"stdout": "ok", "echo": body}
    }))
}

async fn run_async(Json(body): Json<Value>) -> Json<Value> {
    if body["platform"] == "zhihu" {
        return Json(json!({"success": false, "message": "platform disabled"}));
    }
    Json(json!({"success": true, "task_times_id": "abc123", "message": "queued"}))
}

async fn task_status(Path(id): Path<String>) -> impl IntoResponse {
    match id.as_str() {
        "missing" => (StatusCode::NOT_FOUND, Json(json!({"detail": "Task not found"}))).into_response(),
        "explode" => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response(),
        "slow" => {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(json!({"task_times_id": id, "status": "running"})).into_response()
        }
        // Shape of a SQLite-backed runner: flags come back as integer columns.
        "sqlite-row" => Json(json!({
            "task_times_id": id,
            "status": "completed",
            "message": "done",
            "result": {"stdout": "saved 50 notes", "stderr": ""},
            "created_at": "2024-03-01 10:00:00",
            "updated_at": "2024-03-01 10:07:12",
            "formData": {
                "platform": "xhs",
                "type": "search",
                "keywords": "rust",
                "lt": "qrcode",
                "start": 1,
                "get_comment": 0,
                "get_sub_comment": 0,
                "storage_type": null
            }
        }))
        .into_response(),
        _ => Json(json!({
            "task_times_id": id,
            "status": "completed",
            "message": "done",
            "created_at": "2024-03-01 10:00:00",
            "updated_at": "2024-03-01T10:05:00Z",
            "formData": {"platform": "bili", "type": "search", "keywords": "test", "start": null}
        }))
        .into_response(),
    }
}

async fn delete_task(Path(id): Path<String>) -> impl IntoResponse {
    if id == "missing" {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "Task not found"}))).into_response();
    }
    Json(json!({"message": format!("Task {id} deleted")})).into_response()
}

async fn list_tasks(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let db = params.get("database").cloned().unwrap_or_default();
    let mut tasks = vec![
        json!({
            "task_times_id": "t1",
            "status": "running",
            "message": db,
            "formData": {"platform": "dy", "get_comment": 1, "get_sub_comment": 0, "storage_type": "mysql"}
        }),
        json!({"task_times_id": "t2", "status": "failed", "message": "exit 1", "created_at": null}),
    ];
    if db == "all" {
        tasks.insert(1, json!({"task_times_id": 42, "status": "running"}));
        tasks.push(json!({
            "task_times_id": "t3",
            "status": "completed",
            "formData": {"platform": "myspace", "get_comment": "sometimes"}
        }));
    }
    Json(json!({ "tasks": tasks }))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "healthy", "message": "API running"}))
}

async fn tables() -> Json<Value> {
    Json(json!({"success": true, "message": "ok", "data": ["bilibili_video", "xhs_note"]}))
}

async fn table_data(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "ok",
        "data": {
            "data": [{"video_id": "BV1", "task": params.get("task_times_id")}],
            "total": 41,
            "page": params.get("page"),
            "page_size": params.get("page_size")
        }
    }))
}

async fn spawn_runner() -> String {
    let api = Router::new()
        .route("/crawler/run", post(run_sync))
        .route("/crawler/run-async", post(run_async))
        .route("/crawler/task/{id}", get(task_status).delete(delete_task))
        .route("/crawler/tasks", get(list_tasks))
        .route("/health", get(health))
        .route("/sqlite/tables", get(tables))
        .route("/sqlite/data", get(table_data));
    let app = Router::new().nest("/api", api);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api")
}

async fn gateway() -> HttpJobGateway {
    HttpJobGateway::new(&GatewayConfig::new(spawn_runner().await)).unwrap()
}

// ---------------------------------------------------------------------------
// Job endpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_sync_posts_crawl_request() {
    let gateway = gateway().await;
    let form = SubmissionForm {
        keywords: "test".into(),
        ..Default::default()
    };

    let response = gateway.submit_sync(&form).await.unwrap();

    assert!(response.success);
    assert_eq!(response.message.as_deref(), Some("crawl finished"));
    let echo = &response.data.unwrap()["echo"];
    assert_eq!(echo["platform"], "bili");
    assert_eq!(echo["type"], "search");
    assert_eq!(echo["keywords"], "test");
    assert_eq!(echo["storage_type"], "sqlite");
}

#[tokio::test]
async fn submit_async_returns_job_id() {
    let gateway = gateway().await;

    let response = gateway.submit_async(&SubmissionForm::default()).await.unwrap();

    assert!(response.success);
    assert_eq!(response.task_times_id.as_deref(), Some("abc123"));
    assert_eq!(response.message.as_deref(), Some("queued"));
}

#[tokio::test]
async fn logical_rejection_is_not_a_transport_failure() {
    let gateway = gateway().await;
    let form = SubmissionForm {
        platform: crawldeck_core::form::Platform::Zhihu,
        ..Default::default()
    };

    let response = gateway.submit_async(&form).await.unwrap();

    assert!(!response.success);
    assert_eq!(response.message.as_deref(), Some("platform disabled"));
}

#[tokio::test]
async fn get_status_decodes_report() {
    let gateway = gateway().await;

    let report = gateway.get_status("abc123").await.unwrap();

    assert_eq!(report.job_id.as_deref(), Some("abc123"));
    assert_eq!(report.status, Some(JobStatus::Completed));
    assert!(report.created_at.is_some());
    assert!(report.updated_at.is_some());
    assert_eq!(report.form.unwrap().start, 0);
}

#[tokio::test]
async fn get_status_decodes_sqlite_row_with_integer_flags() {
    let gateway = gateway().await;

    let report = gateway.get_status("sqlite-row").await.unwrap();

    assert_eq!(report.status, Some(JobStatus::Completed));
    assert_eq!(report.result.unwrap()["stdout"], "saved 50 notes");
    let form = report.form.unwrap();
    assert_eq!(form.keywords, "rust");
    assert!(!form.get_comment);
    assert!(!form.get_sub_comment);
}

#[tokio::test]
async fn not_found_uses_detail_message() {
    let gateway = gateway().await;

    let failure = gateway.get_status("missing").await.unwrap_err();

    assert_eq!(failure.status, Some(404));
    assert_eq!(failure.message, "Task not found");
    assert_eq!(failure.data.unwrap()["detail"], "Task not found");
}

#[tokio::test]
async fn plain_text_error_falls_back_to_transport_text() {
    let gateway = gateway().await;

    let failure = gateway.get_status("explode").await.unwrap_err();

    assert_eq!(failure.status, Some(500));
    assert_eq!(failure.message, "Request failed with status code 500");
}

#[tokio::test]
async fn path_segments_are_escaped() {
    let gateway = gateway().await;

    let report = gateway.get_status("a b/c").await;

    // The id reaches the handler as a single segment instead of a new route.
    assert_matches!(report, Ok(r) if r.job_id.as_deref() == Some("a b/c"));
}

#[tokio::test]
async fn list_all_passes_database_and_unwraps_tasks() {
    let gateway = gateway().await;

    let tasks = gateway.list_all("mysql").await.unwrap();

    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].message.as_deref(), Some("mysql"));
    assert_eq!(tasks[1].status, Some(JobStatus::Failed));
    assert!(tasks[1].created_at.is_none());
    assert!(tasks[0].form.as_ref().unwrap().get_comment);
}

#[tokio::test]
async fn list_all_keeps_good_records_around_bad_ones() {
    let gateway = gateway().await;

    let tasks = gateway.list_all("all").await.unwrap();

    let ids: Vec<_> = tasks.iter().map(|t| t.job_id.as_deref().unwrap()).collect();
    assert_eq!(ids, ["t1", "t2", "t3"]);
    assert_eq!(tasks[2].status, Some(JobStatus::Completed));
    assert!(tasks[2].form.is_none());
}

#[tokio::test]
async fn delete_round_trip() {
    let gateway = gateway().await;

    let response = gateway.delete("abc123").await.unwrap();
    assert_eq!(response.message.as_deref(), Some("Task abc123 deleted"));

    let failure = gateway.delete("missing").await.unwrap_err();
    assert_eq!(failure.status, Some(404));
}

#[tokio::test]
async fn health_check() {
    let gateway = gateway().await;

    let health = gateway.health().await.unwrap();

    assert_eq!(health.status, "healthy");
}

#[tokio::test]
async fn request_timeout_is_enforced() {
    let config = GatewayConfig::new(spawn_runner().await).with_timeout(Duration::from_millis(200));
    let gateway = HttpJobGateway::new(&config).unwrap();

    let failure = gateway.get_status("slow").await.unwrap_err();

    assert!(failure.status.is_none());
    assert_ne!(failure.message, FALLBACK_MESSAGE);
}

#[tokio::test]
async fn unreachable_runner_has_no_status() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let gateway = HttpJobGateway::new(&GatewayConfig::new(format!("http://{addr}/api"))).unwrap();

    let failure = gateway.health().await.unwrap_err();

    assert!(failure.status.is_none());
    assert!(failure.data.is_none());
    assert!(!failure.message.is_empty());
}

// ---------------------------------------------------------------------------
// Records endpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn records_list_tables() {
    let records = RecordsGateway::new(&GatewayConfig::new(spawn_runner().await)).unwrap();

    let tables = records.list_tables().await.unwrap();

    assert_eq!(tables, vec!["bilibili_video", "xhs_note"]);
}

#[tokio::test]
async fn records_fetch_page_with_job_filter() {
    let records = RecordsGateway::new(&GatewayConfig::new(spawn_runner().await)).unwrap();
    let query = RecordQuery::new("bilibili_video").page(2, 10).for_job("abc123");

    let page = records.fetch_page(&query).await.unwrap();

    assert_eq!(page.total, 41);
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0]["task"], "abc123");
}
