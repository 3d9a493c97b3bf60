use chrono::Utc;
use tf_core::types::{Task, TaskStatus};
use tracing::debug;

use crate::rule::{HookEffects, RuleError, TransitionRequest, WorkflowRule};

/// Enforces the static adjacency matrix and keeps lifecycle bookkeeping.
pub struct BasicTransitionRule;

impl WorkflowRule for BasicTransitionRule {
    fn name(&self) -> &str {
        "basic_transition"
    }

    fn description(&self) -> &str {
        "Only transitions present in the status matrix are allowed"
    }

    fn priority(&self) -> i32 {
        1
    }

    fn validate(&self, req: &TransitionRequest<'_>) -> Result<(), RuleError> {
        if req.from == req.to {
            return Err(RuleError::Rejected(format!("task is already {}", req.to)));
        }
        if !req.from.can_transition_to(&req.to) {
            return Err(RuleError::Rejected(format!(
                "cannot transition from {} to {}",
                req.from, req.to
            )));
        }
        Ok(())
    }

    fn after_transition(
        &self,
        task: &mut Task,
        req: &TransitionRequest<'_>,
        _effects: &mut HookEffects,
    ) {
        let now = Utc::now();
        match req.to {
            TaskStatus::InProgress => {
                if task.started_at.is_none() {
                    task.started_at = Some(now);
                }
                task.metadata.remove("blocked_reason");
            }
            TaskStatus::Completed => {
                task.progress = 100;
                task.completed_at = Some(now);
            }
            TaskStatus::Blocked => {
                if let Some(reason) = req.context.reason() {
                    task.set_metadata("blocked_reason", reason);
                }
            }
            TaskStatus::Cancelled | TaskStatus::OnHold => {
                if let Some(reason) = req.context.reason() {
                    task.set_metadata("last_transition_reason", reason);
                }
            }
            TaskStatus::Pending => {}
        }
        debug!(task_id = %task.id, from = %req.from, to = %req.to, "lifecycle bookkeeping applied");
    }
}
