use anyhow::{bail, Context, Result};
use serde_json::Value;
use tf_core::store::TaskStore;
use tf_core::types::{TaskStatus, TransitionContext};
use tf_engine::WorkflowEngine;
use uuid::Uuid;

use super::table;

/// Parse `--context`; anything but a JSON object is rejected.
pub fn parse_context(raw: Option<&str>) -> Result<TransitionContext> {
    let Some(raw) = raw else {
        return Ok(TransitionContext::new());
    };
    match serde_json::from_str::<Value>(raw).context("--context is not valid JSON")? {
        Value::Object(map) => Ok(TransitionContext::from(map)),
        other => bail!("--context must be a JSON object, got {other}"),
    }
}

fn list(statuses: &[TaskStatus]) -> String {
    if statuses.is_empty() {
        return "(none)".to_string();
    }
    statuses
        .iter()
        .map(TaskStatus::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

pub async fn transitions(engine: &WorkflowEngine, id: Uuid) -> Result<String> {
    let task = engine.store().load(id).await?;
    let available = engine.available_transitions(&task).await?;
    Ok(table(
        &format!("task {id}"),
        &[
            ("status", task.status.to_string()),
            ("available", list(&available)),
        ],
    ))
}

pub async fn validate(engine: &WorkflowEngine, id: Uuid, to: TaskStatus) -> Result<String> {
    let task = engine.store().load(id).await?;
    let report = engine.validate_transition(&task, to).await?;
    let mut out = format!(
        "{} -> {}: {}\n",
        task.status,
        to,
        if report.valid { "allowed" } else { "rejected" }
    );
    for error in &report.errors {
        out.push_str(&format!("  - {error}\n"));
    }
    Ok(out)
}

/// Apply a transition; a rule rejection is an error so the exit code is
/// non-zero.
pub async fn transition(
    engine: &WorkflowEngine,
    id: Uuid,
    to: TaskStatus,
    context: TransitionContext,
) -> Result<String> {
    let outcome = engine.transition(id, to, context).await?;
    if !outcome.applied {
        bail!(
            "transition {} -> {} rejected: {}",
            outcome.from,
            outcome.to,
            outcome.errors.join("; ")
        );
    }
    let mut out = format!("{} -> {}\n", outcome.from, outcome.to);
    if let Some(parent) = outcome.parent_completion.filter(|p| p.completed) {
        if let Some(parent_id) = parent.parent_id {
            out.push_str(&format!("parent {parent_id} completed\n"));
        }
    }
    Ok(out)
}

pub async fn health(engine: &WorkflowEngine, id: Uuid) -> Result<String> {
    let task = engine.store().load(id).await?;
    let report = engine.check_workflow_health(&task).await?;
    if report.is_healthy {
        return Ok(format!("task {id} is healthy\n"));
    }
    let mut out = format!("task {id} has {} issue(s)\n", report.issues.len());
    for (issue, advice) in report.issues.iter().zip(&report.recommendations) {
        out.push_str(&format!("  - {issue} ({advice})\n"));
    }
    Ok(out)
}

pub async fn progress(engine: &WorkflowEngine, id: Uuid, value: u8) -> Result<String> {
    let task = engine.update_progress(id, value).await?;
    Ok(format!("task {} progress {}%\n", task.id, task.progress))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tf_core::config::WorkflowConfig;
    use tf_core::events::EventBus;
    use tf_core::store::MemoryStore;
    use tf_core::types::{Task, TaskType};

    use super::*;

    async fn engine(tasks: Vec<Task>) -> WorkflowEngine {
        let store = Arc::new(MemoryStore::with_tasks(tasks).await);
        WorkflowEngine::with_defaults(store, WorkflowConfig::default(), Arc::new(EventBus::new()))
    }

    #[test]
    fn context_must_be_an_object() {
        assert!(parse_context(None).unwrap().is_empty());
        let ctx = parse_context(Some(r#"{"reason":"vendor"}"#)).unwrap();
        assert_eq!(ctx.reason(), Some("vendor"));
        assert!(parse_context(Some("[1,2]")).is_err());
        assert!(parse_context(Some("{broken")).is_err());
    }

    #[tokio::test]
    async fn transitions_lists_targets() {
        let task = Task::new("t", TaskType::Feature);
        let engine = engine(vec![task.clone()]).await;

        let out = transitions(&engine, task.id).await.unwrap();

        assert!(out.contains("status     pending"));
        assert!(out.contains("in_progress"));
        assert!(!out.contains("completed"));
    }

    #[tokio::test]
    async fn validate_reports_rule_errors() {
        let parent = Task::main("epic").with_status(TaskStatus::InProgress);
        let child = Task::sub("step", parent.id);
        let engine = engine(vec![parent.clone(), child]).await;

        let out = validate(&engine, parent.id, TaskStatus::Completed).await.unwrap();

        assert!(out.starts_with("in_progress -> completed: rejected"));
        assert!(out.contains("1 sub-task"));
    }

    #[tokio::test]
    async fn rejected_transition_is_an_error() {
        let task = Task::new("t", TaskType::Bug);
        let engine = engine(vec![task.clone()]).await;

        let err = transition(&engine, task.id, TaskStatus::Completed, TransitionContext::new())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("rejected"));
    }

    #[tokio::test]
    async fn completing_last_sub_task_reports_parent() {
        let parent = Task::main("epic").with_status(TaskStatus::InProgress);
        let child = Task::sub("step", parent.id).with_status(TaskStatus::InProgress);
        let engine = engine(vec![parent.clone(), child.clone()]).await;

        let out = transition(&engine, child.id, TaskStatus::Completed, TransitionContext::new())
            .await
            .unwrap();

        assert!(out.contains(&format!("parent {} completed", parent.id)));
    }

    #[tokio::test]
    async fn unknown_task_fails() {
        let engine = engine(Vec::new()).await;
        assert!(health(&engine, Uuid::new_v4()).await.is_err());
        assert!(progress(&engine, Uuid::new_v4(), 10).await.is_err());
    }

    #[tokio::test]
    async fn health_and_progress_render() {
        let task = Task::new("t", TaskType::Feature).with_status(TaskStatus::Blocked);
        let engine = engine(vec![task.clone()]).await;

        let out = health(&engine, task.id).await.unwrap();
        assert!(out.contains("1 issue(s)"));
        assert!(out.contains("record why the task is blocked"));

        let out = progress(&engine, task.id, 40).await.unwrap();
        assert_eq!(out, format!("task {} progress 40%\n", task.id));
    }
}
