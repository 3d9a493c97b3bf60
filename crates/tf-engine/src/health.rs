use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tf_core::config::HealthConfig;
use tf_core::types::{Task, TaskStatus};
use uuid::Uuid;

use crate::rule::TaskRelations;

/// Diagnostic result of [`crate::WorkflowEngine::check_workflow_health`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub task_id: Uuid,
    pub is_healthy: bool,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

impl HealthReport {
    fn new(task_id: Uuid) -> Self {
        Self {
            task_id,
            is_healthy: true,
            issues: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    fn flag(&mut self, issue: String, recommendation: &str) {
        self.is_healthy = false;
        self.issues.push(issue);
        self.recommendations.push(recommendation.to_string());
    }
}

fn hours(h: u64) -> Duration {
    let max_hours = i64::MAX / 3_600_000;
    Duration::hours(i64::try_from(h).unwrap_or(max_hours).min(max_hours))
}

/// Evaluate `task` against the health heuristics at instant `now`.
///
/// Pure: reads only the task, its pre-loaded relations and the thresholds.
pub fn assess(
    task: &Task,
    relations: &TaskRelations,
    thresholds: &HealthConfig,
    now: DateTime<Utc>,
) -> HealthReport {
    let mut report = HealthReport::new(task.id);
    let idle = now.signed_duration_since(task.updated_at);

    if task.status == TaskStatus::InProgress && idle > hours(thresholds.in_progress_timeout_hours) {
        report.flag(
            format!(
                "in progress without updates for {}h (limit {}h)",
                idle.num_hours(),
                thresholds.in_progress_timeout_hours
            ),
            "consider blocking or re-assigning",
        );
    }

    if task.is_main()
        && !task.status.is_terminal()
        && relations.children.is_empty()
        && now.signed_duration_since(task.created_at)
            > hours(thresholds.main_without_subtasks_grace_hours)
    {
        report.flag(
            "no sub-tasks defined".to_string(),
            "break the main task down into sub-tasks",
        );
    }

    if task.status == TaskStatus::Blocked && task.metadata_str("blocked_reason").is_none() {
        report.flag(
            "blocked without a recorded reason".to_string(),
            "record why the task is blocked",
        );
    }

    if let Some(due) = task.due_date {
        if !task.status.is_terminal() && due < now {
            report.flag(
                format!("overdue since {}", due.to_rfc3339()),
                "reschedule or escalate",
            );
        }
    }

    if let Some(parent) = relations.parent.as_ref() {
        if parent.status.is_terminal() && !task.status.is_terminal() {
            report.flag(
                format!(
                    "parent is {} but sub-task is still {}",
                    parent.status, task.status
                ),
                "cancel or complete the sub-task",
            );
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> HealthConfig {
        HealthConfig::default()
    }

    #[test]
    fn fresh_task_is_healthy() {
        let task = Task::new("bug", tf_core::types::TaskType::Bug);
        let report = assess(&task, &TaskRelations::default(), &thresholds(), Utc::now());
        assert!(report.is_healthy);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn stale_in_progress_task_is_flagged() {
        let mut task = Task::new("bug", tf_core::types::TaskType::Bug)
            .with_status(TaskStatus::InProgress);
        task.updated_at = Utc::now() - Duration::hours(100);
        let report = assess(&task, &TaskRelations::default(), &thresholds(), Utc::now());
        assert!(!report.is_healthy);
        assert!(report
            .recommendations
            .contains(&"consider blocking or re-assigning".to_string()));
    }

    #[test]
    fn main_without_children_after_grace_is_flagged() {
        let mut task = Task::main("epic");
        task.created_at = Utc::now() - Duration::hours(30);
        let report = assess(&task, &TaskRelations::default(), &thresholds(), Utc::now());
        assert_eq!(report.issues, vec!["no sub-tasks defined".to_string()]);

        task.created_at = Utc::now();
        let report = assess(&task, &TaskRelations::default(), &thresholds(), Utc::now());
        assert!(report.is_healthy);
    }

    #[test]
    fn blocked_without_reason_is_flagged() {
        let mut task = Task::new("x", tf_core::types::TaskType::Feature)
            .with_status(TaskStatus::Blocked);
        let report = assess(&task, &TaskRelations::default(), &thresholds(), Utc::now());
        assert!(!report.is_healthy);

        task.set_metadata("blocked_reason", "waiting on vendor");
        let report = assess(&task, &TaskRelations::default(), &thresholds(), Utc::now());
        assert!(report.is_healthy);
    }

    #[test]
    fn overdue_and_orphaned_sub_task_are_flagged() {
        let parent = Task::main("p").with_status(TaskStatus::Cancelled);
        let task = Task::sub("s", parent.id).with_due_date(Utc::now() - Duration::hours(1));
        let relations = TaskRelations {
            parent: Some(parent),
            ..TaskRelations::default()
        };
        let report = assess(&task, &relations, &thresholds(), Utc::now());
        assert_eq!(report.issues.len(), 2);
        assert_eq!(report.recommendations.len(), 2);
    }
}
