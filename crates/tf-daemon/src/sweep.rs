use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tf_core::config::AutomationConfig;
use tf_core::events::{EventKind, WorkflowEvent};
use tf_core::store::StoreError;
use tf_core::types::{Task, TaskStatus, TransitionContext};
use tf_engine::{WorkflowEngine, WorkflowError};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Options / errors
// ---------------------------------------------------------------------------

/// Knobs shared by every sweep of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepOptions {
    /// Report what would happen without transitioning or emitting events.
    pub dry_run: bool,
    /// IN_PROGRESS tasks idle for longer than this are blocked.
    pub timeout_hours: u64,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            timeout_hours: 72,
        }
    }
}

impl SweepOptions {
    pub fn from_config(config: &AutomationConfig) -> Self {
        Self {
            dry_run: false,
            timeout_hours: config.timeout_hours,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_timeout_hours(mut self, hours: u64) -> Self {
        self.timeout_hours = hours;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    #[error("{0} is already running")]
    AlreadyRunning(&'static str),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

impl From<StoreError> for AutomationError {
    fn from(err: StoreError) -> Self {
        AutomationError::Workflow(WorkflowError::Store(err))
    }
}

/// Saturating conversion for user-supplied hour counts.
pub(crate) fn hours(h: u64) -> Duration {
    let max_hours = i64::MAX / 3_600_000;
    Duration::hours(i64::try_from(h).unwrap_or(max_hours).min(max_hours))
}

/// `now - age`, clamped to the earliest representable instant.
pub(crate) fn older_than(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(age).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

// ---------------------------------------------------------------------------
// SweepGuard
// ---------------------------------------------------------------------------

/// Prevents two runs of the same job from overlapping.
#[derive(Debug)]
pub struct SweepGuard {
    job: &'static str,
    lock: Mutex<()>,
}

impl SweepGuard {
    pub fn new(job: &'static str) -> Self {
        Self {
            job,
            lock: Mutex::new(()),
        }
    }

    /// Fails immediately with [`AutomationError::AlreadyRunning`] instead of
    /// waiting for the current run.
    pub fn try_acquire(&self) -> Result<MutexGuard<'_, ()>, AutomationError> {
        self.lock.try_lock().map_err(|_| {
            warn!(job = self.job, "previous run still in progress, skipping");
            AutomationError::AlreadyRunning(self.job)
        })
    }
}

// ---------------------------------------------------------------------------
// SweepContext
// ---------------------------------------------------------------------------

/// Result of one sweep's attempt on one task.
#[derive(Debug)]
pub(crate) enum Attempt {
    Acted,
    Skipped,
    Failed,
}

/// Per-category counts of a single sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepTally {
    pub acted: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl SweepTally {
    pub(crate) fn record(&mut self, attempt: Attempt) {
        match attempt {
            Attempt::Acted => self.acted += 1,
            Attempt::Skipped => self.skipped += 1,
            Attempt::Failed => self.errors += 1,
        }
    }
}

/// State carried through the sweeps of one run.
///
/// Every task a sweep transitions (or, in a dry run, would transition) is
/// remembered with its resulting state, so later sweeps in the same run see
/// the same picture in both modes.
pub(crate) struct SweepContext<'a> {
    pub engine: &'a WorkflowEngine,
    pub opts: SweepOptions,
    pub now: DateTime<Utc>,
    projected: HashMap<Uuid, Task>,
}

impl<'a> SweepContext<'a> {
    pub fn new(engine: &'a WorkflowEngine, opts: SweepOptions) -> Self {
        Self {
            engine,
            opts,
            now: Utc::now(),
            projected: HashMap::new(),
        }
    }

    fn resolve(&self, task: Task) -> Task {
        match self.projected.get(&task.id) {
            Some(projected) => projected.clone(),
            None => task,
        }
    }

    /// Tasks currently in `status`, as of this run.
    pub async fn list(&self, status: TaskStatus) -> Result<Vec<Task>, StoreError> {
        let tasks = self.engine.store().list_by_status(status).await?;
        Ok(tasks
            .into_iter()
            .map(|t| self.resolve(t))
            .filter(|t| t.status == status)
            .collect())
    }

    pub async fn list_all(&self) -> Result<Vec<Task>, StoreError> {
        let tasks = self.engine.store().list_all().await?;
        Ok(tasks.into_iter().map(|t| self.resolve(t)).collect())
    }

    pub async fn children(&self, parent_id: Uuid) -> Result<Vec<Task>, StoreError> {
        let tasks = self.engine.store().children(parent_id).await?;
        Ok(tasks.into_iter().map(|t| self.resolve(t)).collect())
    }

    /// Emit unless this is a dry run.
    pub fn emit(&self, event: WorkflowEvent) {
        if !self.opts.dry_run {
            self.engine.events().emit(event);
        }
    }

    /// Move `task` to `to` through the engine, or preview it in a dry run.
    pub async fn attempt(
        &mut self,
        sweep: &'static str,
        task: &Task,
        to: TaskStatus,
        context: TransitionContext,
    ) -> Attempt {
        if self.opts.dry_run {
            return match self.engine.preview_transition(task, to, &context).await {
                Ok(preview) if preview.allowed => {
                    debug!(sweep, task_id = %task.id, from = %task.status, to = %to, "dry run: would transition");
                    self.projected.insert(task.id, preview.task);
                    Attempt::Acted
                }
                Ok(preview) => {
                    debug!(sweep, task_id = %task.id, reason = %preview.errors.join("; "), "dry run: would skip");
                    Attempt::Skipped
                }
                Err(e) => {
                    warn!(sweep, task_id = %task.id, error = %e, "sweep item failed");
                    Attempt::Failed
                }
            };
        }

        let context = context.with("sweep", sweep);
        match self.engine.transition(task.id, to, context.clone()).await {
            Ok(outcome) if outcome.applied => {
                info!(sweep, task_id = %task.id, from = %outcome.from, to = %outcome.to, "sweep transitioned task");
                self.emit(WorkflowEvent::transition(
                    EventKind::SweepAction,
                    task.id,
                    outcome.from,
                    outcome.to,
                    &context,
                ));
                self.projected.insert(task.id, outcome.task);
                Attempt::Acted
            }
            Ok(outcome) => {
                debug!(sweep, task_id = %task.id, reason = %outcome.errors.join("; "), "sweep skipped task");
                Attempt::Skipped
            }
            Err(e) => {
                warn!(sweep, task_id = %task.id, error = %e, "sweep item failed");
                Attempt::Failed
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Timeout sweep
// ---------------------------------------------------------------------------

pub const TIMEOUT_SWEEP: &str = "timeout";

/// Block IN_PROGRESS tasks without a due date that have been idle for longer
/// than `timeout_hours`.
pub(crate) async fn timeout_sweep(cx: &mut SweepContext<'_>) -> Result<SweepTally, AutomationError> {
    let cutoff = older_than(cx.now, hours(cx.opts.timeout_hours));
    let candidates: Vec<Task> = cx
        .list(TaskStatus::InProgress)
        .await?
        .into_iter()
        .filter(|t| t.due_date.is_none() && t.updated_at < cutoff)
        .collect();

    let mut tally = SweepTally::default();
    for task in &candidates {
        let context = TransitionContext::new()
            .with("auto_blocked", true)
            .with("reason", "timeout");
        let attempt = cx
            .attempt(TIMEOUT_SWEEP, task, TaskStatus::Blocked, context)
            .await;
        tally.record(attempt);
    }

    debug!(
        candidates = candidates.len(),
        blocked = tally.acted,
        skipped = tally.skipped,
        errors = tally.errors,
        "timeout sweep finished"
    );
    Ok(tally)
}
