use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use tf_core::config::Config;
use tf_core::store::{MemoryStore, TaskStore};
use tf_core::types::{Task, TaskStatus, TaskType};
use tf_daemon::daemon::Daemon;
use tower::ServiceExt;

async fn daemon_with(tasks: Vec<Task>) -> (Daemon, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::with_tasks(tasks).await);
    (Daemon::with_store(Config::default(), store.clone()), store)
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn stale_task() -> Task {
    let mut task = Task::new("idle", TaskType::Bug).with_status(TaskStatus::InProgress);
    task.updated_at = Utc::now() - chrono::Duration::hours(100);
    task
}

#[tokio::test]
async fn auto_flow_route_supports_dry_run() {
    let task = stale_task();
    let (daemon, store) = daemon_with(vec![task.clone()]).await;

    let response = daemon
        .router()
        .oneshot(post("/api/automation/auto-flow", r#"{"dry_run": true}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let json = json_body(response).await;
    assert_eq!(json["dry_run"], true);
    assert_eq!(json["timed_out"], 1);
    assert_eq!(
        store.load(task.id).await.unwrap().status,
        TaskStatus::InProgress
    );
}

#[tokio::test]
async fn schedule_route_accepts_empty_body() {
    let task = stale_task();
    let (daemon, store) = daemon_with(vec![task.clone()]).await;

    let response = daemon
        .router()
        .oneshot(post("/api/automation/schedule", ""))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["timed_out"], 1);
    assert_eq!(store.load(task.id).await.unwrap().status, TaskStatus::Blocked);
}

#[tokio::test]
async fn zero_timeout_is_rejected() {
    let (daemon, _) = daemon_with(Vec::new()).await;

    let response = daemon
        .router()
        .oneshot(post("/api/automation/auto-flow", r#"{"timeout_hours": 0}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn task_routes_are_served_by_the_daemon() {
    let task = Task::new("t", TaskType::Feature);
    let (daemon, _) = daemon_with(vec![task.clone()]).await;

    let response = daemon
        .router()
        .oneshot(
            Request::builder()
                .uri(format!("/api/tasks/{}/available-transitions", task.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn daemon_stops_on_shutdown() {
    let (daemon, _) = daemon_with(Vec::new()).await;
    let daemon = Arc::new(daemon);
    let shutdown = daemon.shutdown_handle();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();

    let running = daemon.clone();
    let handle = tokio::spawn(async move { running.run_with_listener(listener).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.trigger();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("daemon should stop")
        .unwrap();
    assert!(result.is_ok());
}
