use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tf_core::config::{HealthConfig, WorkflowConfig};
use tf_core::events::{EventKind, EventSink, WorkflowEvent};
use tf_core::store::{StoreError, TaskStore};
use tf_core::types::{Task, TaskStatus, TransitionContext};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::WorkflowError;
use crate::health::{self, HealthReport};
use crate::rule::{HookEffects, RuleError, TaskRelations, TransitionRequest};
use crate::rules::{incomplete_children, RuleSet};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Outcome of a dry-run validation with every blocking reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Result of [`WorkflowEngine::auto_complete_parent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentCompletion {
    pub parent_id: Option<Uuid>,
    /// A completion transition was issued for the parent.
    pub attempted: bool,
    /// The parent is now COMPLETED because of this call.
    pub completed: bool,
}

impl ParentCompletion {
    fn skipped(parent_id: Option<Uuid>) -> Self {
        Self {
            parent_id,
            attempted: false,
            completed: false,
        }
    }
}

/// Result of [`WorkflowEngine::transition`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub task_id: Uuid,
    pub from: TaskStatus,
    pub to: TaskStatus,
    pub applied: bool,
    /// Rejection reasons when `applied` is false.
    pub errors: Vec<String>,
    /// The task as it is now committed.
    pub task: Task,
    /// Set when this transition triggered a parent auto-completion attempt.
    pub parent_completion: Option<ParentCompletion>,
}

/// What a transition would commit, computed without saving or emitting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionPreview {
    pub allowed: bool,
    pub errors: Vec<String>,
    /// The projected task when allowed, otherwise the task unchanged.
    pub task: Task,
}

/// Per-task entry of [`WorkflowEngine::batch_transition`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub task_id: Uuid,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Evaluation {
    FailFast,
    CollectAll,
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// Evaluates the rule chain for transition requests and is the single place
/// where a task's status is written.
///
/// Transitions on the same task id are serialized by a per-task lock;
/// transitions on different tasks run independently.
pub struct WorkflowEngine {
    store: Arc<dyn TaskStore>,
    rules: RuleSet,
    config: WorkflowConfig,
    health: HealthConfig,
    events: Arc<dyn EventSink>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn TaskStore>,
        rules: RuleSet,
        config: WorkflowConfig,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            rules,
            config,
            health: HealthConfig::default(),
            events,
            locks: DashMap::new(),
        }
    }

    /// Engine with the default rule chain for `config`.
    pub fn with_defaults(
        store: Arc<dyn TaskStore>,
        config: WorkflowConfig,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let rules = RuleSet::with_defaults(&config);
        Self::new(store, rules, config, events)
    }

    /// Override the health-check thresholds.
    pub fn with_health(mut self, health: HealthConfig) -> Self {
        self.health = health;
        self
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn health_thresholds(&self) -> &HealthConfig {
        &self.health
    }

    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    // -----------------------------------------------------------------------
    // Dry-run entry points
    // -----------------------------------------------------------------------

    /// Whether `task` may move to `to` right now. Never mutates.
    pub async fn can_transition(&self, task: &Task, to: TaskStatus) -> Result<bool, WorkflowError> {
        let relations = self.load_relations(task).await?;
        let ctx = TransitionContext::new();
        let errors = self.evaluate(task, to, &ctx, &relations, Evaluation::FailFast)?;
        Ok(errors.is_empty())
    }

    /// Run every applicable rule and report all blocking reasons.
    pub async fn validate_transition(
        &self,
        task: &Task,
        to: TaskStatus,
    ) -> Result<ValidationReport, WorkflowError> {
        let errors = self.transition_errors(task, to).await?;
        Ok(ValidationReport {
            valid: errors.is_empty(),
            errors,
        })
    }

    pub async fn transition_errors(
        &self,
        task: &Task,
        to: TaskStatus,
    ) -> Result<Vec<String>, WorkflowError> {
        let relations = self.load_relations(task).await?;
        let ctx = TransitionContext::new();
        self.evaluate(task, to, &ctx, &relations, Evaluation::CollectAll)
    }

    /// Every status `task` could move to right now.
    pub async fn available_transitions(&self, task: &Task) -> Result<Vec<TaskStatus>, WorkflowError> {
        let relations = self.load_relations(task).await?;
        let ctx = TransitionContext::new();
        let mut out = Vec::new();
        for to in TaskStatus::all() {
            if self
                .evaluate(task, *to, &ctx, &relations, Evaluation::FailFast)?
                .is_empty()
            {
                out.push(*to);
            }
        }
        Ok(out)
    }

    /// Run the rule chain and the `after_transition` hooks against a copy of
    /// `task`. Nothing is saved and no event is emitted.
    pub async fn preview_transition(
        &self,
        task: &Task,
        to: TaskStatus,
        context: &TransitionContext,
    ) -> Result<TransitionPreview, WorkflowError> {
        let relations = self.load_relations(task).await?;
        let errors = self.evaluate(task, to, context, &relations, Evaluation::FailFast)?;
        if !errors.is_empty() {
            return Ok(TransitionPreview {
                allowed: false,
                errors,
                task: task.clone(),
            });
        }

        let req = TransitionRequest {
            task,
            from: task.status,
            to,
            context,
            relations: &relations,
        };
        let mut projected = task.clone();
        projected.status = to;
        projected.touch();
        let mut effects = HookEffects::default();
        for rule in self.rules.applicable(&req) {
            rule.after_transition(&mut projected, &req, &mut effects);
        }
        projected.status = to;

        Ok(TransitionPreview {
            allowed: true,
            errors: Vec::new(),
            task: projected,
        })
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Move the task to `to` if every applicable rule agrees.
    ///
    /// A rule rejection is reported through the outcome (`applied == false`)
    /// and leaves the task untouched. When the committed transition completes
    /// the last open sub-task of a parent, the parent completion is attempted
    /// as a separate step afterwards.
    pub async fn transition(
        &self,
        task_id: Uuid,
        to: TaskStatus,
        context: TransitionContext,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let (mut outcome, effects) = self.apply(task_id, to, &context).await?;

        if let Some(parent_id) = effects.parent_completion_candidate {
            let completion = self.complete_parent_if_ready(parent_id, task_id).await;
            match completion {
                Ok(completion) => outcome.parent_completion = Some(completion),
                Err(e) => {
                    // The child's transition is committed regardless.
                    warn!(task_id = %task_id, parent_id = %parent_id, error = %e, "parent auto-completion failed");
                    outcome.parent_completion = Some(ParentCompletion {
                        parent_id: Some(parent_id),
                        attempted: true,
                        completed: false,
                    });
                }
            }
        }

        Ok(outcome)
    }

    /// Complete the parent of `sub_task` when all of its sub-tasks are done.
    pub async fn auto_complete_parent(&self, sub_task: &Task) -> Result<ParentCompletion, WorkflowError> {
        match sub_task.parent_task_id {
            Some(parent_id) => self.complete_parent_if_ready(parent_id, sub_task.id).await,
            None => Ok(ParentCompletion::skipped(None)),
        }
    }

    /// Apply `transition` to each id independently, at most
    /// `batch_concurrency` at a time. Results follow input order.
    pub async fn batch_transition(
        &self,
        task_ids: &[Uuid],
        to: TaskStatus,
        context: TransitionContext,
    ) -> Vec<BatchItemResult> {
        let gate = Semaphore::new(self.config.batch_concurrency.max(1));
        let gate = &gate;
        let context = &context;

        let jobs = task_ids.iter().map(|&task_id| async move {
            let _permit = match gate.acquire().await {
                Ok(permit) => permit,
                Err(e) => {
                    return BatchItemResult {
                        task_id,
                        success: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            match self.transition(task_id, to, context.clone()).await {
                Ok(outcome) if outcome.applied => BatchItemResult {
                    task_id,
                    success: true,
                    error: None,
                },
                Ok(outcome) => BatchItemResult {
                    task_id,
                    success: false,
                    error: Some(outcome.errors.join("; ")),
                },
                Err(e) => BatchItemResult {
                    task_id,
                    success: false,
                    error: Some(e.to_string()),
                },
            }
        });

        let results = futures::future::join_all(jobs).await;
        let succeeded = results.iter().filter(|r| r.success).count();
        info!(total = results.len(), succeeded, to = %to, "batch transition finished");
        results
    }

    /// Set progress outside of a status change. Terminal tasks are frozen.
    pub async fn update_progress(&self, task_id: Uuid, progress: u8) -> Result<Task, WorkflowError> {
        let lock = self.lock_for(task_id);
        let result = {
            let _guard = lock.lock().await;
            let mut task = self.store.load(task_id).await?;
            if task.status.is_terminal() {
                Err(WorkflowError::Terminal(task_id, task.status))
            } else {
                task.progress = progress.min(100);
                task.touch();
                self.store.save(&task).await?;
                debug!(task_id = %task_id, progress = task.progress, "progress updated");
                Ok(task)
            }
        };
        drop(lock);
        self.release_lock(task_id);
        result
    }

    // -----------------------------------------------------------------------
    // Health
    // -----------------------------------------------------------------------

    pub async fn check_workflow_health(&self, task: &Task) -> Result<HealthReport, WorkflowError> {
        let relations = self.load_relations(task).await?;
        Ok(health::assess(task, &relations, &self.health, Utc::now()))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn lock_for(&self, task_id: Uuid) -> Arc<Mutex<()>> {
        self.locks.entry(task_id).or_default().clone()
    }

    /// Drop the lock entry once nobody else holds a handle to it.
    fn release_lock(&self, task_id: Uuid) {
        self.locks
            .remove_if(&task_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    async fn load_relations(&self, task: &Task) -> Result<TaskRelations, StoreError> {
        let parent = match task.parent_task_id {
            Some(_) => self.store.parent(task).await?,
            None => None,
        };
        let children = if task.is_main() {
            self.store.children(task.id).await?
        } else {
            Vec::new()
        };
        Ok(TaskRelations { parent, children })
    }

    /// Run the `validate` phase. Returns rejection messages; an `Internal`
    /// rule error aborts with [`WorkflowError::Rule`].
    fn evaluate(
        &self,
        task: &Task,
        to: TaskStatus,
        context: &TransitionContext,
        relations: &TaskRelations,
        mode: Evaluation,
    ) -> Result<Vec<String>, WorkflowError> {
        let req = TransitionRequest {
            task,
            from: task.status,
            to,
            context,
            relations,
        };
        let mut errors = Vec::new();
        for rule in self.rules.applicable(&req) {
            match rule.validate(&req) {
                Ok(()) => {}
                Err(RuleError::Rejected(message)) => {
                    debug!(task_id = %task.id, rule = rule.name(), %message, "rule rejected transition");
                    errors.push(message);
                    if mode == Evaluation::FailFast {
                        break;
                    }
                }
                Err(RuleError::Internal(message)) => {
                    error!(task_id = %task.id, rule = rule.name(), %message, "rule failed during validation");
                    return Err(WorkflowError::Rule {
                        rule: rule.name().to_string(),
                        message,
                    });
                }
            }
        }
        Ok(errors)
    }

    /// One locked transition attempt without any follow-up.
    async fn apply(
        &self,
        task_id: Uuid,
        to: TaskStatus,
        context: &TransitionContext,
    ) -> Result<(TransitionOutcome, HookEffects), WorkflowError> {
        let lock = self.lock_for(task_id);
        let result = {
            let _guard = lock.lock().await;
            self.apply_locked(task_id, to, context).await
        };
        drop(lock);
        self.release_lock(task_id);
        result
    }

    async fn apply_locked(
        &self,
        task_id: Uuid,
        to: TaskStatus,
        context: &TransitionContext,
    ) -> Result<(TransitionOutcome, HookEffects), WorkflowError> {
        let task = self.store.load(task_id).await?;
        let from = task.status;
        let relations = self.load_relations(&task).await?;

        self.events.emit(WorkflowEvent::transition(
            EventKind::TransitionAttempted,
            task_id,
            from,
            to,
            context,
        ));

        let errors = self.evaluate(&task, to, context, &relations, Evaluation::FailFast)?;
        if !errors.is_empty() {
            info!(task_id = %task_id, from = %from, to = %to, reason = %errors.join("; "), "transition rejected");
            self.events.emit(
                WorkflowEvent::transition(EventKind::TransitionRejected, task_id, from, to, context),
            );
            let outcome = TransitionOutcome {
                task_id,
                from,
                to,
                applied: false,
                errors,
                task,
                parent_completion: None,
            };
            return Ok((outcome, HookEffects::default()));
        }

        let req = TransitionRequest {
            task: &task,
            from,
            to,
            context,
            relations: &relations,
        };
        let applicable = self.rules.applicable(&req);

        for rule in &applicable {
            rule.before_transition(&req);
        }

        let mut committed = task.clone();
        committed.status = to;
        committed.touch();

        let mut effects = HookEffects::default();
        for rule in &applicable {
            rule.after_transition(&mut committed, &req, &mut effects);
        }
        // Hooks may touch bookkeeping only.
        committed.status = to;

        self.store.save(&committed).await?;

        info!(task_id = %task_id, from = %from, to = %to, "transition applied");
        self.events.emit(WorkflowEvent::transition(
            EventKind::TransitionApplied,
            task_id,
            from,
            to,
            context,
        ));

        let outcome = TransitionOutcome {
            task_id,
            from,
            to,
            applied: true,
            errors: Vec::new(),
            task: committed,
            parent_completion: None,
        };
        Ok((outcome, effects))
    }

    async fn complete_parent_if_ready(
        &self,
        parent_id: Uuid,
        triggered_by: Uuid,
    ) -> Result<ParentCompletion, WorkflowError> {
        let parent = match self.store.load(parent_id).await {
            Ok(parent) => parent,
            Err(StoreError::NotFound(_)) => return Ok(ParentCompletion::skipped(Some(parent_id))),
            Err(e) => return Err(e.into()),
        };
        if !parent.is_main() || parent.status.is_terminal() {
            return Ok(ParentCompletion::skipped(Some(parent_id)));
        }

        let children = self.store.children(parent_id).await?;
        if children.is_empty() || incomplete_children(&children) > 0 {
            return Ok(ParentCompletion::skipped(Some(parent_id)));
        }

        let ctx = TransitionContext::new()
            .with("auto_completed", true)
            .with("triggered_by", triggered_by.to_string());
        let (outcome, _) = self.apply(parent_id, TaskStatus::Completed, &ctx).await?;
        if outcome.applied {
            info!(parent_id = %parent_id, triggered_by = %triggered_by, "parent task auto-completed");
        }
        Ok(ParentCompletion {
            parent_id: Some(parent_id),
            attempted: true,
            completed: outcome.applied,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tf_core::events::EventBus;
    use tf_core::store::MemoryStore;

    async fn engine_with(tasks: Vec<Task>) -> (WorkflowEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_tasks(tasks).await);
        let engine = WorkflowEngine::with_defaults(
            store.clone(),
            WorkflowConfig::default(),
            Arc::new(EventBus::new()),
        );
        (engine, store)
    }

    #[tokio::test]
    async fn lock_entries_are_released() {
        let task = Task::main("m");
        let (engine, _store) = engine_with(vec![task.clone()]).await;

        engine
            .transition(task.id, TaskStatus::InProgress, TransitionContext::new())
            .await
            .unwrap();

        assert!(engine.locks.is_empty());
    }

    #[tokio::test]
    async fn progress_update_refreshes_timestamp() {
        let mut task = Task::main("m").with_status(TaskStatus::InProgress);
        task.updated_at = Utc::now() - chrono::Duration::hours(5);
        let before = task.updated_at;
        let (engine, store) = engine_with(vec![task.clone()]).await;

        let updated = engine.update_progress(task.id, 140).await.unwrap();

        assert_eq!(updated.progress, 100);
        assert!(updated.updated_at > before);
        assert_eq!(store.load(task.id).await.unwrap().progress, 100);
    }

    #[tokio::test]
    async fn progress_update_on_terminal_task_is_refused() {
        let task = Task::main("m").with_status(TaskStatus::Cancelled);
        let (engine, _store) = engine_with(vec![task.clone()]).await;

        let err = engine.update_progress(task.id, 10).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Terminal(_, TaskStatus::Cancelled)));
    }
}
