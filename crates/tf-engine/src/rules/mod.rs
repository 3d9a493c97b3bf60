//! The ordered rule chain and the rules shipped by default.

mod basic;
mod parent_status;
mod subtask_completion;

use std::sync::Arc;

use tf_core::config::WorkflowConfig;

use crate::rule::{TransitionRequest, WorkflowRule};

pub use basic::BasicTransitionRule;
pub use parent_status::ParentTaskStatusRule;
pub use subtask_completion::{incomplete_children, SubTaskCompletionRule};

/// Rules kept sorted by ascending priority. Registration order breaks ties.
#[derive(Clone, Default)]
pub struct RuleSet {
    rules: Vec<Arc<dyn WorkflowRule>>,
}

impl RuleSet {
    /// An empty chain. Every transition passes an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// The basic-matrix, sub-task-completion and parent-status rules.
    pub fn with_defaults(config: &WorkflowConfig) -> Self {
        let mut set = Self::new();
        set.register(Arc::new(BasicTransitionRule));
        set.register(Arc::new(SubTaskCompletionRule));
        set.register(Arc::new(ParentTaskStatusRule::new(
            config.auto_complete_parent,
        )));
        set
    }

    pub fn register(&mut self, rule: Arc<dyn WorkflowRule>) {
        self.rules.push(rule);
        // `sort_by_key` is stable.
        self.rules.sort_by_key(|r| r.priority());
    }

    /// Rules whose `can_apply` holds for `req`, in evaluation order.
    pub fn applicable<'s>(&'s self, req: &TransitionRequest<'_>) -> Vec<&'s Arc<dyn WorkflowRule>> {
        self.rules.iter().filter(|r| r.can_apply(req)).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl std::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleSet").field("rules", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{RuleError, TaskRelations};
    use tf_core::types::{Task, TaskStatus, TransitionContext};

    struct Named(&'static str, i32);

    impl WorkflowRule for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "test rule"
        }
        fn priority(&self) -> i32 {
            self.1
        }
        fn validate(&self, _req: &TransitionRequest<'_>) -> Result<(), RuleError> {
            Ok(())
        }
    }

    #[test]
    fn defaults_are_ordered_by_priority() {
        let set = RuleSet::with_defaults(&WorkflowConfig::default());
        assert_eq!(
            set.names(),
            vec!["basic_transition", "sub_task_completion", "parent_task_status"]
        );
    }

    #[test]
    fn custom_rule_slots_in_by_priority_with_stable_ties() {
        let mut set = RuleSet::with_defaults(&WorkflowConfig::default());
        set.register(Arc::new(Named("audit_a", 10)));
        set.register(Arc::new(Named("first", 0)));
        set.register(Arc::new(Named("audit_b", 10)));

        assert_eq!(
            set.names(),
            vec![
                "first",
                "basic_transition",
                "sub_task_completion",
                "audit_a",
                "audit_b",
                "parent_task_status"
            ]
        );
    }

    #[test]
    fn applicable_filters_by_can_apply() {
        let set = RuleSet::with_defaults(&WorkflowConfig::default());
        let task = Task::main("m").with_status(TaskStatus::InProgress);
        let ctx = TransitionContext::new();
        let relations = TaskRelations::default();
        let req = TransitionRequest {
            task: &task,
            from: task.status,
            to: TaskStatus::Blocked,
            context: &ctx,
            relations: &relations,
        };

        let names: Vec<&str> = set.applicable(&req).iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["basic_transition"]);
    }
}
