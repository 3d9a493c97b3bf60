use tf_core::types::{Task, TaskStatus};
use tracing::debug;

use crate::rule::{RuleError, TransitionRequest, WorkflowRule};

/// Children that still block their parent's completion: anything that is
/// neither COMPLETED nor CANCELLED.
pub fn incomplete_children(children: &[Task]) -> usize {
    children
        .iter()
        .filter(|c| !matches!(c.status, TaskStatus::Completed | TaskStatus::Cancelled))
        .count()
}

/// A MAIN task may only complete once all of its sub-tasks are done.
pub struct SubTaskCompletionRule;

impl WorkflowRule for SubTaskCompletionRule {
    fn name(&self) -> &str {
        "sub_task_completion"
    }

    fn description(&self) -> &str {
        "Main tasks complete only when every non-cancelled sub-task is completed"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn can_apply(&self, req: &TransitionRequest<'_>) -> bool {
        req.task.is_main() && req.to == TaskStatus::Completed
    }

    fn validate(&self, req: &TransitionRequest<'_>) -> Result<(), RuleError> {
        let pending = incomplete_children(&req.relations.children);
        debug!(
            task_id = %req.task.id,
            children = req.relations.children.len(),
            incomplete = pending,
            "checked sub-task completion"
        );
        if pending > 0 {
            return Err(RuleError::Rejected(format!(
                "cannot complete main task: {pending} sub-task(s) not completed"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::TaskRelations;
    use tf_core::types::TransitionContext;

    fn validate_with(children: Vec<Task>) -> Result<(), RuleError> {
        let main = Task::main("m").with_status(TaskStatus::InProgress);
        let ctx = TransitionContext::new();
        let relations = TaskRelations {
            children,
            ..TaskRelations::default()
        };
        SubTaskCompletionRule.validate(&TransitionRequest {
            task: &main,
            from: TaskStatus::InProgress,
            to: TaskStatus::Completed,
            context: &ctx,
            relations: &relations,
        })
    }

    fn child(status: TaskStatus) -> Task {
        Task::sub("c", uuid::Uuid::new_v4()).with_status(status)
    }

    #[test]
    fn cancelled_children_do_not_block() {
        let result = validate_with(vec![
            child(TaskStatus::Completed),
            child(TaskStatus::Completed),
            child(TaskStatus::Cancelled),
        ]);
        assert!(result.is_ok());
    }

    #[test]
    fn message_counts_incomplete_children() {
        let result = validate_with(vec![
            child(TaskStatus::Completed),
            child(TaskStatus::Blocked),
            child(TaskStatus::Pending),
        ]);
        assert_eq!(
            result,
            Err(RuleError::Rejected(
                "cannot complete main task: 2 sub-task(s) not completed".into()
            ))
        );
    }

    #[test]
    fn only_applies_to_main_tasks_completing() {
        let sub = Task::sub("s", uuid::Uuid::new_v4());
        let ctx = TransitionContext::new();
        let relations = TaskRelations::default();
        let req = TransitionRequest {
            task: &sub,
            from: TaskStatus::InProgress,
            to: TaskStatus::Completed,
            context: &ctx,
            relations: &relations,
        };
        assert!(!SubTaskCompletionRule.can_apply(&req));
    }
}
