use super::*;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use tf_core::config::WorkflowConfig;
use tf_core::events::EventBus;
use tf_core::store::{MemoryStore, TaskStore};
use tf_core::types::{Task, TaskStatus, TaskType};
use tf_engine::WorkflowEngine;

/// Build a test router over an in-memory store seeded with `tasks`.
async fn test_app(tasks: Vec<Task>) -> (axum::Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::with_tasks(tasks).await);
    let engine = WorkflowEngine::with_defaults(
        store.clone(),
        WorkflowConfig::default(),
        Arc::new(EventBus::new()),
    );
    let state = Arc::new(ApiState::new(Arc::new(engine)));
    (router::api_router(state), store)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn available_transitions_for_pending_task() {
    let task = Task::new("t", TaskType::Feature);
    let (app, _) = test_app(vec![task.clone()]).await;

    let response = app
        .oneshot(get(&format!("/api/tasks/{}/available-transitions", task.id)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let json = json_body(response).await;
    assert_eq!(json["current_status"], "pending");
    assert_eq!(
        json["available"],
        json!(["in_progress", "blocked", "cancelled"])
    );
}

#[tokio::test]
async fn validate_transition_reports_errors_without_mutating() {
    let task = Task::new("t", TaskType::Feature);
    let (app, store) = test_app(vec![task.clone()]).await;

    let response = app
        .oneshot(post(
            &format!("/api/tasks/{}/validate-transition", task.id),
            json!({ "to_status": "COMPLETED" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["valid"], false);
    assert_eq!(json["errors"].as_array().unwrap().len(), 1);
    assert_eq!(
        store.load(task.id).await.unwrap().status,
        TaskStatus::Pending
    );
}

#[tokio::test]
async fn transition_returns_updated_task() {
    let task = Task::new("t", TaskType::Bug).with_status(TaskStatus::InProgress);
    let (app, _) = test_app(vec![task.clone()]).await;

    let response = app
        .oneshot(post(
            &format!("/api/tasks/{}/transition", task.id),
            json!({ "to_status": "completed" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "completed");
    assert_eq!(json["progress"], 100);
}

#[tokio::test]
async fn rejected_transition_is_422() {
    let main = Task::main("m").with_status(TaskStatus::InProgress);
    let open = Task::sub("s", main.id);
    let (app, _) = test_app(vec![main.clone(), open]).await;

    let response = app
        .oneshot(post(
            &format!("/api/tasks/{}/transition", main.id),
            json!({ "to_status": "completed" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = json_body(response).await;
    assert!(json["errors"][0]
        .as_str()
        .unwrap()
        .contains("1 sub-task(s) not completed"));
}

#[tokio::test]
async fn unknown_status_is_400() {
    let task = Task::new("t", TaskType::Bug);
    let (app, _) = test_app(vec![task.clone()]).await;

    let response = app
        .oneshot(post(
            &format!("/api/tasks/{}/transition", task.id),
            json!({ "to_status": "finished" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_task_is_404() {
    let (app, _) = test_app(Vec::new()).await;

    let response = app
        .oneshot(get(&format!("/api/tasks/{}/health", uuid::Uuid::new_v4())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(json_body(response).await["error"].is_string());
}

#[tokio::test]
async fn batch_transition_keeps_request_order() {
    let a = Task::new("a", TaskType::Feature);
    let b = Task::new("b", TaskType::Feature).with_status(TaskStatus::Cancelled);
    let (app, _) = test_app(vec![a.clone(), b.clone()]).await;

    let response = app
        .oneshot(post(
            "/api/tasks/batch-transition",
            json!({ "task_ids": [b.id, a.id], "to_status": "in_progress" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    let results = json["results"].as_array().unwrap();
    assert_eq!(results[0]["task_id"], b.id.to_string());
    assert_eq!(results[0]["success"], false);
    assert_eq!(results[1]["task_id"], a.id.to_string());
    assert_eq!(results[1]["success"], true);
}

#[tokio::test]
async fn progress_on_terminal_task_is_409() {
    let task = Task::new("t", TaskType::Bug).with_status(TaskStatus::Completed);
    let (app, _) = test_app(vec![task.clone()]).await;

    let response = app
        .oneshot(post(
            &format!("/api/tasks/{}/progress", task.id),
            json!({ "progress": 10 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn status_lists_rule_chain() {
    let (app, _) = test_app(Vec::new()).await;

    let response = app.oneshot(get("/api/status")).await.unwrap();

    let json = json_body(response).await;
    assert_eq!(
        json["rules"],
        json!(["basic_transition", "sub_task_completion", "parent_task_status"])
    );
}
