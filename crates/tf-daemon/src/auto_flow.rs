use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tf_core::types::{TaskStatus, TransitionContext};
use tf_engine::rules::incomplete_children;
use tf_engine::WorkflowEngine;
use tf_telemetry::tracing_setup::create_operation_span;
use tracing::{debug, info, warn, Instrument};

use crate::sweep::{timeout_sweep, AutomationError, SweepContext, SweepGuard, SweepOptions, SweepTally};

pub const COMPLETION_SWEEP: &str = "parent_completion";
pub const AUTO_START_SWEEP: &str = "child_auto_start";

/// Result of one auto-flow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoFlowReport {
    /// IN_PROGRESS tasks blocked for inactivity.
    pub timed_out: usize,
    /// MAIN tasks completed because every sub-task is done.
    pub auto_completed: usize,
    /// PENDING sub-tasks started under an IN_PROGRESS parent.
    pub auto_started: usize,
    /// Candidates the rule chain refused.
    pub skipped: usize,
    pub errors: usize,
    pub dry_run: bool,
    pub timestamp: DateTime<Utc>,
}

impl AutoFlowReport {
    fn new(opts: &SweepOptions, now: DateTime<Utc>) -> Self {
        Self {
            timed_out: 0,
            auto_completed: 0,
            auto_started: 0,
            skipped: 0,
            errors: 0,
            dry_run: opts.dry_run,
            timestamp: now,
        }
    }

    /// Count of tasks acted on (or that would be, in a dry run).
    pub fn total_actions(&self) -> usize {
        self.timed_out + self.auto_completed + self.auto_started
    }
}

/// Runs the auto-flow job: timeout blocking, parent auto-completion and the
/// opt-in child auto-start.
pub struct AutoFlowRunner {
    engine: Arc<WorkflowEngine>,
    guard: SweepGuard,
}

impl AutoFlowRunner {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self {
            engine,
            guard: SweepGuard::new("auto_flow"),
        }
    }

    /// Execute one run. Fails with [`AutomationError::AlreadyRunning`] when a
    /// previous run has not finished yet.
    pub async fn run(&self, opts: SweepOptions) -> Result<AutoFlowReport, AutomationError> {
        let _running = self.guard.try_acquire()?;
        let (span, trace_id) = create_operation_span("auto_flow");
        debug!(%trace_id, dry_run = opts.dry_run, "auto-flow starting");
        self.run_sweeps(opts).instrument(span).await
    }

    async fn run_sweeps(&self, opts: SweepOptions) -> Result<AutoFlowReport, AutomationError> {
        let mut cx = SweepContext::new(&self.engine, opts);
        let mut report = AutoFlowReport::new(&opts, cx.now);

        let timeouts = timeout_sweep(&mut cx).await?;
        report.timed_out = timeouts.acted;
        report.skipped += timeouts.skipped;
        report.errors += timeouts.errors;

        let completions = completion_sweep(&mut cx).await?;
        report.auto_completed = completions.acted;
        report.skipped += completions.skipped;
        report.errors += completions.errors;

        if self.engine.config().auto_start_children {
            let starts = auto_start_sweep(&mut cx).await?;
            report.auto_started = starts.acted;
            report.skipped += starts.skipped;
            report.errors += starts.errors;
        }

        info!(
            timed_out = report.timed_out,
            auto_completed = report.auto_completed,
            auto_started = report.auto_started,
            skipped = report.skipped,
            errors = report.errors,
            dry_run = report.dry_run,
            "auto-flow completed"
        );
        Ok(report)
    }
}

/// Complete open MAIN tasks whose sub-tasks are all COMPLETED or CANCELLED.
///
/// A PENDING parent has no edge to COMPLETED and is counted as skipped.
async fn completion_sweep(cx: &mut SweepContext<'_>) -> Result<SweepTally, AutomationError> {
    let mut tally = SweepTally::default();
    let mut candidates = cx.list(TaskStatus::Pending).await?;
    candidates.extend(cx.list(TaskStatus::InProgress).await?);

    for task in candidates.iter().filter(|t| t.is_main()) {
        let children = match cx.children(task.id).await {
            Ok(children) => children,
            Err(e) => {
                warn!(sweep = COMPLETION_SWEEP, task_id = %task.id, error = %e, "failed to load sub-tasks");
                tally.errors += 1;
                continue;
            }
        };
        if children.is_empty() || incomplete_children(&children) > 0 {
            continue;
        }
        if task.status == TaskStatus::Pending {
            debug!(task_id = %task.id, "all sub-tasks done but parent never started");
            tally.skipped += 1;
            continue;
        }

        let context = TransitionContext::new()
            .with("auto_completed", true)
            .with("reason", "all sub-tasks done");
        let attempt = cx
            .attempt(COMPLETION_SWEEP, task, TaskStatus::Completed, context)
            .await;
        tally.record(attempt);
    }
    Ok(tally)
}

/// Start PENDING children of IN_PROGRESS MAIN tasks.
async fn auto_start_sweep(cx: &mut SweepContext<'_>) -> Result<SweepTally, AutomationError> {
    let mut tally = SweepTally::default();
    let parents = cx.list(TaskStatus::InProgress).await?;

    for parent in parents.iter().filter(|t| t.is_main()) {
        let children = match cx.children(parent.id).await {
            Ok(children) => children,
            Err(e) => {
                warn!(sweep = AUTO_START_SWEEP, task_id = %parent.id, error = %e, "failed to load sub-tasks");
                tally.errors += 1;
                continue;
            }
        };
        for child in children.iter().filter(|c| c.status == TaskStatus::Pending) {
            let context = TransitionContext::new().with("auto_started", true);
            let attempt = cx
                .attempt(AUTO_START_SWEEP, child, TaskStatus::InProgress, context)
                .await;
            tally.record(attempt);
        }
    }
    Ok(tally)
}
