use tf_core::types::{Task, TaskStatus, TransitionContext};
use uuid::Uuid;

/// Parent and children of the task under evaluation, loaded by the engine
/// before the rule chain runs. Rules never query the store themselves.
#[derive(Debug, Clone, Default)]
pub struct TaskRelations {
    pub parent: Option<Task>,
    /// Owned sub-tasks; only loaded for MAIN tasks.
    pub children: Vec<Task>,
}

/// Everything a rule can see about one transition attempt.
#[derive(Debug, Clone, Copy)]
pub struct TransitionRequest<'a> {
    /// The task as committed before this transition.
    pub task: &'a Task,
    pub from: TaskStatus,
    pub to: TaskStatus,
    pub context: &'a TransitionContext,
    pub relations: &'a TaskRelations,
}

/// Follow-up work requested by `after_transition` hooks. The engine acts on
/// it once the transition is committed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookEffects {
    /// Parent to re-check for completion once this transition is saved.
    pub parent_completion_candidate: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    /// Ordinary validation failure with a human-readable reason.
    #[error("{0}")]
    Rejected(String),
    /// The rule could not evaluate the request at all.
    #[error("internal: {0}")]
    Internal(String),
}

/// One independent business rule in the chain.
///
/// Rules are evaluated in ascending [`priority`](WorkflowRule::priority);
/// a rule whose [`can_apply`](WorkflowRule::can_apply) returns `false` is
/// skipped entirely for that transition.
pub trait WorkflowRule: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Lower runs first.
    fn priority(&self) -> i32;

    fn can_apply(&self, _req: &TransitionRequest<'_>) -> bool {
        true
    }

    fn validate(&self, req: &TransitionRequest<'_>) -> Result<(), RuleError>;

    /// Runs once every applicable rule has validated, before the status
    /// changes. Must not block the transition.
    fn before_transition(&self, _req: &TransitionRequest<'_>) {}

    /// Runs after the status has been set on `task` and before it is
    /// persisted. May adjust bookkeeping fields but never `status`.
    fn after_transition(
        &self,
        _task: &mut Task,
        _req: &TransitionRequest<'_>,
        _effects: &mut HookEffects,
    ) {
    }
}
