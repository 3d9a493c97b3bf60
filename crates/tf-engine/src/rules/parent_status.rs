use tf_core::types::{Task, TaskStatus};
use tracing::debug;

use crate::rule::{HookEffects, RuleError, TransitionRequest, WorkflowRule};

/// Keeps a SUB task consistent with the state of its parent.
pub struct ParentTaskStatusRule {
    auto_complete_parent: bool,
}

impl ParentTaskStatusRule {
    pub fn new(auto_complete_parent: bool) -> Self {
        Self {
            auto_complete_parent,
        }
    }
}

impl WorkflowRule for ParentTaskStatusRule {
    fn name(&self) -> &str {
        "parent_task_status"
    }

    fn description(&self) -> &str {
        "Sub-tasks cannot start or reopen while their parent is stopped or finished"
    }

    fn priority(&self) -> i32 {
        20
    }

    fn can_apply(&self, req: &TransitionRequest<'_>) -> bool {
        req.task.is_sub() && req.task.parent_task_id.is_some()
    }

    fn validate(&self, req: &TransitionRequest<'_>) -> Result<(), RuleError> {
        let Some(parent) = req.relations.parent.as_ref() else {
            return Err(RuleError::Rejected(format!(
                "parent task {} not found",
                req.task.parent_task_id.map(|id| id.to_string()).unwrap_or_default()
            )));
        };

        let blocked = match parent.status {
            TaskStatus::Completed | TaskStatus::Cancelled => {
                matches!(req.to, TaskStatus::Pending | TaskStatus::InProgress)
            }
            TaskStatus::Blocked | TaskStatus::OnHold => req.to == TaskStatus::InProgress,
            TaskStatus::Pending | TaskStatus::InProgress => false,
        };
        if blocked {
            return Err(RuleError::Rejected(format!(
                "cannot move sub-task to {} while parent task is {}",
                req.to, parent.status
            )));
        }
        Ok(())
    }

    fn after_transition(
        &self,
        task: &mut Task,
        req: &TransitionRequest<'_>,
        effects: &mut HookEffects,
    ) {
        if req.to != TaskStatus::Completed || !self.auto_complete_parent {
            return;
        }
        let Some(parent) = req.relations.parent.as_ref() else {
            return;
        };
        if !parent.is_main() || parent.status.is_terminal() {
            return;
        }

        // Whether every sibling is done is decided by the engine after this
        // task is saved, against the children as stored at that point.
        debug!(
            task_id = %task.id,
            parent_id = %parent.id,
            "sub-task completed, parent completion check requested"
        );
        effects.parent_completion_candidate = Some(parent.id);
    }
}
